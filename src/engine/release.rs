//! Release protocol: commit the worker's new status, hand its waiting tickets
//! back to their purpose queues, and restore the worker if that fails.
//!
//! Worker status and ticket queues live in separate stores with no shared
//! transaction. The status update is the forward action; restoring `work`
//! and the previous window is its compensating action. Tickets requeued
//! before a failure stay requeued.

use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use super::locks::WorkerGuard;
use crate::error::{Error, Result};
use crate::model::*;
use crate::ports::{QueueAccess, WorkerStore};
use crate::telemetry::metrics;
use opentelemetry::KeyValue;

/// Everything a release needs once its preconditions have passed.
pub(crate) struct ReleasePlan {
    pub worker: WorkerId,
    /// Window held before the release, restored on compensation.
    pub window: Option<WindowId>,
    pub work_status: StatusId,
    pub target_status: StatusId,
    pub target: ReleaseTarget,
    pub waiting: Vec<WaitingTicket>,
}

pub(crate) struct ReleaseSaga {
    pub store: Arc<dyn WorkerStore>,
    pub queue: Arc<dyn QueueAccess>,
    pub requeue_timeout: Option<Duration>,
    pub plan: ReleasePlan,
}

impl ReleaseSaga {
    /// Run the mutation phase to completion while holding the worker's lock.
    ///
    /// Callers spawn this so that dropping their future cannot stop it
    /// between the status commit and the end of requeue or compensation.
    pub async fn run(self, _guard: WorkerGuard) -> Result<Worker> {
        let released = self.commit().await?;
        metrics::worker_transitions().add(
            1,
            &[
                KeyValue::new("from", WorkerState::Working.to_string()),
                KeyValue::new("to", self.plan.target.state().to_string()),
            ],
        );

        if self.plan.waiting.is_empty() {
            info!(worker = %self.plan.worker, "released with an empty queue");
            return Ok(released);
        }

        match self.requeue_all().await {
            Ok(()) => {
                info!(
                    worker = %self.plan.worker,
                    requeued = self.plan.waiting.len(),
                    "released, waiting tickets requeued"
                );
                Ok(released)
            }
            Err(err) => {
                self.compensate(&err).await;
                Err(err)
            }
        }
    }

    async fn commit(&self) -> Result<Worker> {
        let patch = WorkerPatch::assign(self.plan.target_status, None);
        self.store
            .update(&WorkerFilter::by_id(self.plan.worker), &patch)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::NotFound(format!("worker {}", self.plan.worker)))
    }

    async fn requeue_all(&self) -> Result<()> {
        for ticket in &self.plan.waiting {
            match self.requeue(ticket).await {
                Ok(()) => {
                    metrics::tickets_requeued().add(1, &[KeyValue::new("result", "ok")]);
                }
                Err(source) => {
                    metrics::tickets_requeued().add(1, &[KeyValue::new("result", "error")]);
                    warn!(
                        worker = %self.plan.worker,
                        ticket = %ticket.id,
                        error = %source,
                        "requeue failed"
                    );
                    return Err(Error::Requeue {
                        ticket_id: ticket.id,
                        source: Box::new(source),
                    });
                }
            }
        }
        Ok(())
    }

    async fn requeue(&self, ticket: &WaitingTicket) -> Result<()> {
        let moved = self
            .queue
            .move_ticket_to_purpose_queue(ticket.id, ticket.purpose_id, false);
        match self.requeue_timeout {
            Some(limit) => tokio::time::timeout(limit, moved)
                .await
                .map_err(|_| Error::Timeout(limit))?,
            None => moved.await,
        }
    }

    /// Put the worker back to `work` at its old window. Failures here are
    /// reported but never replace `cause`.
    async fn compensate(&self, cause: &Error) {
        let patch = WorkerPatch::assign(self.plan.work_status, self.plan.window);
        let restored = self
            .store
            .update(&WorkerFilter::by_id(self.plan.worker), &patch)
            .await;

        match restored {
            Ok(rows) if !rows.is_empty() => {
                metrics::release_compensations().add(1, &[KeyValue::new("result", "restored")]);
                metrics::worker_transitions().add(
                    1,
                    &[
                        KeyValue::new("from", self.plan.target.state().to_string()),
                        KeyValue::new("to", WorkerState::Working.to_string()),
                    ],
                );
                warn!(
                    worker = %self.plan.worker,
                    window = ?self.plan.window,
                    cause = %cause,
                    "release rolled back, worker restored to work"
                );
            }
            Ok(_) => {
                metrics::release_compensations().add(1, &[KeyValue::new("result", "failed")]);
                error!(
                    worker = %self.plan.worker,
                    cause = %cause,
                    "release rollback found no worker row to restore"
                );
            }
            Err(e) => {
                metrics::release_compensations().add(1, &[KeyValue::new("result", "failed")]);
                error!(
                    worker = %self.plan.worker,
                    cause = %cause,
                    error = %e,
                    "release rollback failed, worker left in released state"
                );
            }
        }
    }
}
