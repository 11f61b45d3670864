//! Worker records and read-only lookups around them.
//!
//! Status and window only move through the lifecycle. `create` accepts any
//! consistent starting record; `update` touches the owning user and nothing
//! else, under the same per-worker lock the lifecycle takes.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use super::locks::WorkerLocks;
use super::status::StatusTable;
use crate::error::{Error, Result};
use crate::model::*;
use crate::ports::WorkerStore;

#[derive(Clone)]
pub struct Roster {
    store: Arc<dyn WorkerStore>,
    statuses: Arc<StatusTable>,
    locks: Arc<WorkerLocks>,
}

impl Roster {
    /// Share `locks` with the [`WorkerLifecycle`](super::WorkerLifecycle)
    /// running against the same store.
    pub fn new(
        store: Arc<dyn WorkerStore>,
        statuses: Arc<StatusTable>,
        locks: Arc<WorkerLocks>,
    ) -> Self {
        Self {
            store,
            statuses,
            locks,
        }
    }

    /// # Errors
    ///
    /// [`Error::InvalidRecord`] if the window is bound without `work`
    /// status, or `work` is given without a window.
    pub async fn create(&self, new: NewWorker) -> Result<Worker> {
        if !self.statuses.admits(new.status_id, new.window_id) {
            return Err(Error::InvalidRecord(format!(
                "status {} with window {:?}: a window is held exactly while working",
                new.status_id, new.window_id
            )));
        }
        self.store.insert(new).await
    }

    pub async fn get(&self, id: WorkerId) -> Result<Worker> {
        self.store
            .select_by_id(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("worker {id}")))
    }

    /// The worker record owned by a user.
    pub async fn me(&self, user_id: UserId) -> Result<Option<Worker>> {
        self.store.select_by_user_id(user_id).await
    }

    pub async fn list(&self, filter: &WorkerFilter, page: Option<Page>) -> Result<Vec<Worker>> {
        self.store.select(filter, page).await
    }

    /// Change the owning user of a worker record.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidRecord`] if the patch sets status or window; those go
    /// through `claim_window`, `go_on_break` and `finish_shift`.
    pub async fn update(&self, id: WorkerId, patch: &WorkerPatch) -> Result<Worker> {
        if patch.status_id.is_some() || patch.window_id.is_some() {
            return Err(Error::InvalidRecord(format!(
                "worker {id}: status and window change only through the lifecycle"
            )));
        }
        let _guard = self.locks.lock(id).await;
        if patch.is_empty() {
            return self.get(id).await;
        }
        self.store
            .update(&WorkerFilter::by_id(id), patch)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::NotFound(format!("worker {id}")))
    }

    pub async fn remove(&self, id: WorkerId) -> Result<RemovedWorker> {
        let _guard = self.locks.lock(id).await;
        self.store
            .delete(&WorkerFilter::by_id(id))
            .await?
            .into_iter()
            .next()
            .map(RemovedWorker::from)
            .ok_or_else(|| Error::NotFound(format!("worker {id}")))
    }

    pub fn status_by_name(&self, name: &str) -> Option<&StatusRecord> {
        self.statuses.record_by_name(name)
    }

    pub fn status(&self, id: StatusId) -> Option<&StatusRecord> {
        self.statuses.record(id)
    }

    pub fn statuses(&self) -> &[StatusRecord] {
        self.statuses.records()
    }

    /// Workers currently in `work` status.
    pub async fn active_workers(&self) -> Result<Vec<Worker>> {
        let work = self.statuses.resolve(WorkerStatus::Work)?;
        self.store.select(&WorkerFilter::by_status(work), None).await
    }

    /// Distinct windows occupied by working workers.
    pub async fn active_windows(&self) -> Result<usize> {
        let windows: BTreeSet<WindowId> = self
            .active_workers()
            .await?
            .into_iter()
            .filter_map(|w| w.window_id)
            .collect();
        Ok(windows.len())
    }

    pub async fn served_tickets(&self, id: WorkerId, period: ServicePeriod) -> Result<u64> {
        self.store.served_ticket_count(id, period).await
    }

    /// Mean service time in whole seconds, zero when nothing was served.
    pub async fn average_service_time(
        &self,
        id: WorkerId,
        period: ServicePeriod,
    ) -> Result<Duration> {
        let average = self.store.average_service_time(id, period).await?;
        Ok(average.map(round_to_seconds).unwrap_or_default())
    }

    pub async fn stats(&self, id: WorkerId, period: ServicePeriod) -> Result<ServiceStats> {
        Ok(ServiceStats {
            served: self.served_tickets(id, period).await?,
            average_service_time: self.average_service_time(id, period).await?,
        })
    }
}

fn round_to_seconds(d: Duration) -> Duration {
    Duration::from_secs_f64(d.as_secs_f64().round())
}
