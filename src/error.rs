//! Error types for servq.

use thiserror::Error;

use crate::model::{TicketId, WorkerId, WorkerState};

#[derive(Debug, Error)]
pub enum Error {
    /// The service is closed; windows cannot be claimed.
    #[error("operating hours are over, windows cannot be claimed")]
    OutOfHours,

    /// Release was attempted while the worker still has called or serving tickets.
    #[error("worker {worker_id} cannot leave while serving {} ticket(s)", .in_progress.len())]
    BusyWorker {
        worker_id: WorkerId,
        in_progress: Vec<TicketId>,
    },

    /// Missing reference data or environment. Fatal, points at the deployment.
    #[error("configuration error: {0}")]
    Config(String),

    /// A waiting ticket could not be moved back to its purpose queue.
    #[error("failed to requeue ticket {ticket_id}: {source}")]
    Requeue {
        ticket_id: TicketId,
        #[source]
        source: Box<Error>,
    },

    #[error("worker {worker_id} cannot go from {from} to {to}")]
    InvalidTransition {
        worker_id: WorkerId,
        from: WorkerState,
        to: WorkerState,
    },

    /// A record write that would bind a window without `work` status, or
    /// change status or window outside the lifecycle.
    #[error("invalid worker record: {0}")]
    InvalidRecord(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// True for failures the operator can fix by retrying later or finishing
    /// the ticket at hand, as opposed to deployment or storage faults.
    pub fn is_user_correctable(&self) -> bool {
        matches!(
            self,
            Error::OutOfHours
                | Error::BusyWorker { .. }
                | Error::InvalidTransition { .. }
                | Error::InvalidRecord(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
