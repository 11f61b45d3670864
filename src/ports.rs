//! Collaborator contracts the lifecycle engine is written against.
//!
//! Postgres (`crate::db::Db`) and in-memory (`crate::inmem::MemoryStore`)
//! backends implement these; the engine holds them as trait objects.

use async_trait::async_trait;
use std::time::Duration;

use crate::error::Result;
use crate::model::*;

/// Answers whether windows may be claimed right now.
#[async_trait]
pub trait OperatingHours: Send + Sync {
    async fn is_within_operating_hours(&self) -> Result<bool>;
}

/// Durable worker records plus the read queries the lifecycle needs.
///
/// Every write is atomic at the single-row level. Listings are ordered by id.
#[async_trait]
pub trait WorkerStore: Send + Sync {
    async fn insert(&self, new: NewWorker) -> Result<Worker>;

    async fn select_by_id(&self, id: WorkerId) -> Result<Option<Worker>>;

    async fn select_by_user_id(&self, user_id: UserId) -> Result<Option<Worker>>;

    async fn select(&self, filter: &WorkerFilter, page: Option<Page>) -> Result<Vec<Worker>>;

    /// Apply `patch` to every matching row and return the updated rows.
    async fn update(&self, filter: &WorkerFilter, patch: &WorkerPatch) -> Result<Vec<Worker>>;

    /// Delete matching rows and return what was deleted.
    async fn delete(&self, filter: &WorkerFilter) -> Result<Vec<Worker>>;

    /// All rows of the worker status reference table.
    async fn statuses(&self) -> Result<Vec<StatusRecord>>;

    /// Tickets held by the worker in `called` or `serving` status.
    async fn in_progress_tickets(&self, id: WorkerId) -> Result<Vec<TicketId>>;

    async fn served_ticket_count(&self, id: WorkerId, period: ServicePeriod) -> Result<u64>;

    /// Mean service time of served tickets, `None` when there are none.
    async fn average_service_time(
        &self,
        id: WorkerId,
        period: ServicePeriod,
    ) -> Result<Option<Duration>>;
}

/// Access to the ticket queues.
#[async_trait]
pub trait QueueAccess: Send + Sync {
    /// Tickets waiting for this worker, in queue order.
    async fn waiting_queue(&self, worker: WorkerId) -> Result<Vec<WaitingTicket>>;

    /// Detach the ticket from its worker and put it back in the queue for
    /// `purpose`, where any worker may pick it up.
    async fn move_ticket_to_purpose_queue(
        &self,
        ticket: TicketId,
        purpose: PurposeId,
        notify: bool,
    ) -> Result<()>;
}
