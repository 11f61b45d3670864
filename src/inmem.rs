//! In-memory backend for both collaborator ports.
//!
//! Used by tests and local runs without Postgres. Supports failure and
//! latency injection on requeue, and failure injection on worker updates,
//! so the release compensation path can be exercised.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::model::*;
use crate::ports::{QueueAccess, WorkerStore};

/// A ticket as the in-memory backend keeps it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TicketRecord {
    pub id: TicketId,
    pub worker_id: Option<WorkerId>,
    pub purpose_id: PurposeId,
    pub status: TicketStatus,
    pub issued_at: DateTime<Utc>,
    pub service_time: Option<Duration>,
}

/// A requeue the backend has applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Requeue {
    pub ticket: TicketId,
    pub purpose: PurposeId,
    pub notify: bool,
}

#[derive(Default)]
struct State {
    statuses: Vec<StatusRecord>,
    workers: BTreeMap<WorkerId, Worker>,
    tickets: BTreeMap<TicketId, TicketRecord>,
    next_worker: i64,
    next_ticket: i64,
    failing_requeues: HashSet<TicketId>,
    requeue_delay: Option<Duration>,
    requeues: Vec<Requeue>,
    /// Worker updates still allowed before every further one fails.
    update_budget: Option<usize>,
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
}

impl MemoryStore {
    /// A store seeded with the `work`, `break` and `not work` statuses
    /// (ids 1, 2 and 3).
    pub fn new() -> Self {
        Self::with_statuses(
            WorkerStatus::ALL
                .iter()
                .zip(1..)
                .map(|(status, id)| StatusRecord {
                    id: StatusId(id),
                    name: status.as_str().to_string(),
                })
                .collect(),
        )
    }

    pub fn with_statuses(statuses: Vec<StatusRecord>) -> Self {
        let store = Self::default();
        store.lock().statuses = statuses;
        store
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn status_id(&self, status: WorkerStatus) -> Result<StatusId> {
        self.lock()
            .statuses
            .iter()
            .find(|r| r.name == status.as_str())
            .map(|r| r.id)
            .ok_or_else(|| Error::Config(format!("worker status '{status}' is not seeded")))
    }

    /// Onboard a worker in `not work` status with no window.
    pub fn add_worker(&self, user_id: UserId) -> Result<Worker> {
        let status_id = self.status_id(WorkerStatus::NotWork)?;
        let mut state = self.lock();
        insert_worker(
            &mut state,
            NewWorker {
                user_id,
                status_id,
                window_id: None,
            },
        )
    }

    /// Issue a ticket now, optionally already assigned to a worker.
    pub fn add_ticket(
        &self,
        worker: Option<WorkerId>,
        purpose: PurposeId,
        status: TicketStatus,
    ) -> TicketId {
        self.push_ticket(worker, purpose, status, Utc::now(), None)
    }

    /// Record a ticket a worker has finished serving.
    pub fn add_served_ticket(
        &self,
        worker: WorkerId,
        purpose: PurposeId,
        issued_at: DateTime<Utc>,
        service_time: Duration,
    ) -> TicketId {
        self.push_ticket(
            Some(worker),
            purpose,
            TicketStatus::Served,
            issued_at,
            Some(service_time),
        )
    }

    fn push_ticket(
        &self,
        worker_id: Option<WorkerId>,
        purpose_id: PurposeId,
        status: TicketStatus,
        issued_at: DateTime<Utc>,
        service_time: Option<Duration>,
    ) -> TicketId {
        let mut state = self.lock();
        state.next_ticket += 1;
        let id = TicketId(state.next_ticket);
        state.tickets.insert(
            id,
            TicketRecord {
                id,
                worker_id,
                purpose_id,
                status,
                issued_at,
                service_time,
            },
        );
        id
    }

    pub fn set_ticket_status(&self, ticket: TicketId, status: TicketStatus) {
        if let Some(record) = self.lock().tickets.get_mut(&ticket) {
            record.status = status;
        }
    }

    pub fn ticket(&self, id: TicketId) -> Option<TicketRecord> {
        self.lock().tickets.get(&id).cloned()
    }

    pub fn worker(&self, id: WorkerId) -> Option<Worker> {
        self.lock().workers.get(&id).cloned()
    }

    /// Make every requeue of `ticket` fail.
    pub fn fail_requeue(&self, ticket: TicketId) {
        self.lock().failing_requeues.insert(ticket);
    }

    /// Stall every requeue by `delay` before applying it.
    pub fn delay_requeue(&self, delay: Duration) {
        self.lock().requeue_delay = Some(delay);
    }

    /// Let the next `allowed` worker updates through, then fail the rest.
    pub fn fail_worker_updates_after(&self, allowed: usize) {
        self.lock().update_budget = Some(allowed);
    }

    /// Requeues applied so far, in order.
    pub fn requeues(&self) -> Vec<Requeue> {
        self.lock().requeues.clone()
    }
}

fn insert_worker(state: &mut State, new: NewWorker) -> Result<Worker> {
    if state.workers.values().any(|w| w.user_id == new.user_id) {
        return Err(Error::Other(format!(
            "user {} already has a worker record",
            new.user_id
        )));
    }
    state.next_worker += 1;
    let worker = Worker {
        id: WorkerId(state.next_worker),
        user_id: new.user_id,
        status_id: new.status_id,
        window_id: new.window_id,
    };
    state.workers.insert(worker.id, worker.clone());
    Ok(worker)
}

fn served_in(
    state: &State,
    id: WorkerId,
    period: ServicePeriod,
) -> impl Iterator<Item = &TicketRecord> {
    state.tickets.values().filter(move |t| {
        t.worker_id == Some(id) && t.status == TicketStatus::Served && period.contains(t.issued_at)
    })
}

#[async_trait]
impl WorkerStore for MemoryStore {
    async fn insert(&self, new: NewWorker) -> Result<Worker> {
        insert_worker(&mut self.lock(), new)
    }

    async fn select_by_id(&self, id: WorkerId) -> Result<Option<Worker>> {
        Ok(self.lock().workers.get(&id).cloned())
    }

    async fn select_by_user_id(&self, user_id: UserId) -> Result<Option<Worker>> {
        Ok(self
            .lock()
            .workers
            .values()
            .find(|w| w.user_id == user_id)
            .cloned())
    }

    async fn select(&self, filter: &WorkerFilter, page: Option<Page>) -> Result<Vec<Worker>> {
        let state = self.lock();
        let matching = state.workers.values().filter(|w| filter.matches(w)).cloned();
        Ok(match page {
            Some(page) => matching
                .skip(page.offset as usize)
                .take(page.limit as usize)
                .collect(),
            None => matching.collect(),
        })
    }

    async fn update(&self, filter: &WorkerFilter, patch: &WorkerPatch) -> Result<Vec<Worker>> {
        let mut state = self.lock();
        match state.update_budget {
            Some(0) => return Err(Error::Other("worker store rejected update".to_string())),
            Some(n) => state.update_budget = Some(n - 1),
            None => {}
        }
        if let Some(user_id) = patch.user_id {
            let taken = state
                .workers
                .values()
                .any(|w| w.user_id == user_id && !filter.matches(w));
            if taken {
                return Err(Error::Other(format!("user {user_id} already has a worker record")));
            }
        }
        let mut updated = Vec::new();
        for worker in state.workers.values_mut().filter(|w| filter.matches(w)) {
            patch.apply(worker);
            updated.push(worker.clone());
        }
        Ok(updated)
    }

    async fn delete(&self, filter: &WorkerFilter) -> Result<Vec<Worker>> {
        let mut state = self.lock();
        let doomed: Vec<WorkerId> = state
            .workers
            .values()
            .filter(|w| filter.matches(w))
            .map(|w| w.id)
            .collect();
        if let Some(id) = doomed
            .iter()
            .find(|id| state.tickets.values().any(|t| t.worker_id == Some(**id)))
        {
            return Err(Error::Other(format!(
                "worker {id} is still referenced by tickets"
            )));
        }
        Ok(doomed
            .into_iter()
            .filter_map(|id| state.workers.remove(&id))
            .collect())
    }

    async fn statuses(&self) -> Result<Vec<StatusRecord>> {
        Ok(self.lock().statuses.clone())
    }

    async fn in_progress_tickets(&self, id: WorkerId) -> Result<Vec<TicketId>> {
        Ok(self
            .lock()
            .tickets
            .values()
            .filter(|t| t.worker_id == Some(id) && t.status.is_in_progress())
            .map(|t| t.id)
            .collect())
    }

    async fn served_ticket_count(&self, id: WorkerId, period: ServicePeriod) -> Result<u64> {
        Ok(served_in(&self.lock(), id, period).count() as u64)
    }

    async fn average_service_time(
        &self,
        id: WorkerId,
        period: ServicePeriod,
    ) -> Result<Option<Duration>> {
        let state = self.lock();
        let times: Vec<Duration> = served_in(&state, id, period)
            .filter_map(|t| t.service_time)
            .collect();
        if times.is_empty() {
            return Ok(None);
        }
        let total: Duration = times.iter().sum();
        Ok(Some(total / times.len() as u32))
    }
}

#[async_trait]
impl QueueAccess for MemoryStore {
    async fn waiting_queue(&self, worker: WorkerId) -> Result<Vec<WaitingTicket>> {
        let state = self.lock();
        let mut waiting: Vec<&TicketRecord> = state
            .tickets
            .values()
            .filter(|t| t.worker_id == Some(worker) && t.status == TicketStatus::Waiting)
            .collect();
        waiting.sort_by_key(|t| (t.issued_at, t.id));
        Ok(waiting
            .into_iter()
            .map(|t| WaitingTicket {
                id: t.id,
                purpose_id: t.purpose_id,
            })
            .collect())
    }

    async fn move_ticket_to_purpose_queue(
        &self,
        ticket: TicketId,
        purpose: PurposeId,
        notify: bool,
    ) -> Result<()> {
        let delay = self.lock().requeue_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.lock();
        if state.failing_requeues.contains(&ticket) {
            return Err(Error::Other(format!("queue rejected ticket {ticket}")));
        }
        let record = state
            .tickets
            .get_mut(&ticket)
            .ok_or_else(|| Error::NotFound(format!("ticket {ticket}")))?;
        record.worker_id = None;
        record.purpose_id = purpose;
        state.requeues.push(Requeue {
            ticket,
            purpose,
            notify,
        });
        Ok(())
    }
}
