//! Worker lifecycle: claiming a window and leaving it.
//!
//! ```text
//!   Unassigned/OnBreak/OffShift --claim_window--> Working
//!   Working --go_on_break--> OnBreak
//!   Working --finish_shift--> OffShift
//! ```
//!
//! Every operation on a worker runs under that worker's lock. Preconditions
//! are checked before any write, so a refused operation leaves no trace.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{Instrument, info, warn};

use super::locks::WorkerLocks;
use super::release::{ReleasePlan, ReleaseSaga};
use super::roster::Roster;
use super::status::StatusTable;
use crate::error::{Error, Result};
use crate::model::*;
use crate::ports::{OperatingHours, QueueAccess, WorkerStore};
use crate::telemetry::metrics;
use crate::telemetry::worker::{record_state_transition, start_release_span, start_worker_span};
use opentelemetry::KeyValue;

/// Tuning for the lifecycle engine.
#[derive(Debug, Clone, Default)]
pub struct LifecycleConfig {
    /// Upper bound on a single ticket requeue. Exceeding it fails the
    /// release and triggers compensation. `None` waits indefinitely.
    pub requeue_timeout: Option<Duration>,
}

/// The lifecycle engine. Owns the per-worker lock table.
#[derive(Clone)]
pub struct WorkerLifecycle {
    store: Arc<dyn WorkerStore>,
    queue: Arc<dyn QueueAccess>,
    hours: Arc<dyn OperatingHours>,
    statuses: Arc<StatusTable>,
    locks: Arc<WorkerLocks>,
    config: LifecycleConfig,
}

impl WorkerLifecycle {
    /// Build the engine, loading the status table from `store`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if any lifecycle status is missing.
    pub async fn new(
        store: Arc<dyn WorkerStore>,
        queue: Arc<dyn QueueAccess>,
        hours: Arc<dyn OperatingHours>,
        config: LifecycleConfig,
    ) -> Result<Self> {
        let statuses = Arc::new(StatusTable::load(store.as_ref()).await?);
        Ok(Self::with_statuses(store, queue, hours, statuses, config))
    }

    pub fn with_statuses(
        store: Arc<dyn WorkerStore>,
        queue: Arc<dyn QueueAccess>,
        hours: Arc<dyn OperatingHours>,
        statuses: Arc<StatusTable>,
        config: LifecycleConfig,
    ) -> Self {
        Self {
            store,
            queue,
            hours,
            statuses,
            locks: Arc::new(WorkerLocks::new()),
            config,
        }
    }

    pub fn statuses(&self) -> &Arc<StatusTable> {
        &self.statuses
    }

    /// Record administration over the same store, serialized with this
    /// engine's operations.
    pub fn roster(&self) -> Roster {
        Roster::new(
            Arc::clone(&self.store),
            Arc::clone(&self.statuses),
            Arc::clone(&self.locks),
        )
    }

    /// Seat the worker owned by `user_id` at `window_id` in `work` status.
    pub async fn claim_window(&self, user_id: UserId, window_id: WindowId) -> Result<Worker> {
        let worker = self
            .store
            .select_by_user_id(user_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("worker for user {user_id}")))?;

        let span = start_worker_span("claim_window", worker.id);
        let started = Instant::now();
        let result = self
            .claim_locked(worker.id, user_id, window_id)
            .instrument(span)
            .await;

        record_duration("claim_window", started);
        result
    }

    async fn claim_locked(
        &self,
        worker: WorkerId,
        user_id: UserId,
        window_id: WindowId,
    ) -> Result<Worker> {
        let _guard = self.locks.lock(worker).await;

        if !self.hours.is_within_operating_hours().await? {
            reject("claim_window", "out_of_hours");
            warn!(user = %user_id, window = %window_id, "claim refused outside operating hours");
            return Err(Error::OutOfHours);
        }
        let work = self.statuses.resolve(WorkerStatus::Work)?;

        let current = self
            .store
            .select_by_id(worker)
            .await?
            .ok_or_else(|| Error::NotFound(format!("worker {worker}")))?;
        let from = self.statuses.state_of(&current);

        let seated = self
            .store
            .update(
                &WorkerFilter::by_user(user_id),
                &WorkerPatch::assign(work, Some(window_id)),
            )
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::NotFound(format!("worker for user {user_id}")))?;

        metrics::worker_transitions().add(
            1,
            &[
                KeyValue::new("from", from.to_string()),
                KeyValue::new("to", WorkerState::Working.to_string()),
            ],
        );
        record_state_transition(
            &tracing::Span::current(),
            &from.to_string(),
            &WorkerState::Working.to_string(),
        );
        info!(window = %window_id, "window claimed");
        Ok(seated)
    }

    pub async fn go_on_break(&self, worker: WorkerId) -> Result<Worker> {
        self.release(worker, ReleaseTarget::Break).await
    }

    pub async fn finish_shift(&self, worker: WorkerId) -> Result<Worker> {
        self.release(worker, ReleaseTarget::NotWork).await
    }

    /// Take a working worker off its window and requeue its waiting tickets.
    ///
    /// # Errors
    ///
    /// - [`Error::BusyWorker`] if a ticket is called or being served.
    /// - [`Error::InvalidTransition`] if the worker is not working.
    /// - [`Error::Requeue`] if a ticket could not be requeued; the worker has
    ///   been restored to `work` at its previous window by then.
    pub async fn release(&self, worker: WorkerId, target: ReleaseTarget) -> Result<Worker> {
        let operation = match target {
            ReleaseTarget::Break => "go_on_break",
            ReleaseTarget::NotWork => "finish_shift",
        };
        let span = start_worker_span(operation, worker);
        let started = Instant::now();
        let result = self
            .release_locked(worker, target, operation)
            .instrument(span.clone())
            .await;

        if let Ok(ref released) = result {
            record_state_transition(
                &span,
                &WorkerState::Working.to_string(),
                &self.statuses.state_of(released).to_string(),
            );
        }
        record_duration(operation, started);
        result
    }

    async fn release_locked(
        &self,
        worker: WorkerId,
        target: ReleaseTarget,
        operation: &'static str,
    ) -> Result<Worker> {
        let guard = self.locks.lock(worker).await;

        let waiting = self.queue.waiting_queue(worker).await?;

        let in_progress = self.store.in_progress_tickets(worker).await?;
        if !in_progress.is_empty() {
            reject(operation, "busy");
            warn!(tickets = ?in_progress, "release refused while serving");
            return Err(Error::BusyWorker {
                worker_id: worker,
                in_progress,
            });
        }

        let current = self
            .store
            .select_by_id(worker)
            .await?
            .ok_or_else(|| Error::NotFound(format!("worker {worker}")))?;
        let from = self.statuses.state_of(&current);
        if from != WorkerState::Working {
            reject(operation, "invalid_transition");
            return Err(Error::InvalidTransition {
                worker_id: worker,
                from,
                to: target.state(),
            });
        }

        let plan = ReleasePlan {
            worker,
            window: current.window_id,
            work_status: self.statuses.resolve(WorkerStatus::Work)?,
            target_status: self.statuses.resolve(target.status())?,
            target,
            waiting,
        };
        let release_id = uuid::Uuid::new_v4();
        let span = start_release_span(worker, &release_id, plan.waiting.len());
        let saga = ReleaseSaga {
            store: Arc::clone(&self.store),
            queue: Arc::clone(&self.queue),
            requeue_timeout: self.config.requeue_timeout,
            plan,
        };

        // From here on the release must finish or be compensated, even if
        // the caller goes away.
        tokio::spawn(saga.run(guard).instrument(span))
            .await
            .map_err(|e| Error::Other(format!("release task for worker {worker} aborted: {e}")))?
    }
}

fn reject(operation: &'static str, reason: &'static str) {
    metrics::worker_rejections().add(
        1,
        &[
            KeyValue::new("operation", operation),
            KeyValue::new("reason", reason),
        ],
    );
}

fn record_duration(operation: &'static str, started: Instant) {
    metrics::operation_duration_ms().record(
        started.elapsed().as_secs_f64() * 1000.0,
        &[KeyValue::new("operation", operation)],
    );
}
