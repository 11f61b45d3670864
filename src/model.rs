//! Core data model.
//!
//! A worker is a person who sits at a window and serves tickets. Its status
//! and window move together: a worker holds a window exactly when its status
//! is `work`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
            sqlx::Type,
        )]
        #[serde(transparent)]
        #[sqlx(transparent)]
        pub struct $name(pub i64);

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                std::fmt::Display::fmt(&self.0, f)
            }
        }

        impl From<i64> for $name {
            fn from(raw: i64) -> Self {
                Self(raw)
            }
        }
    };
}

id_type!(
    /// Primary key of a worker record.
    WorkerId
);
id_type!(
    /// The person owning a worker record. Unique per worker.
    UserId
);
id_type!(
    /// Opaque service point identifier.
    WindowId
);
id_type!(StatusId);
id_type!(TicketId);
id_type!(PurposeId);

// ---------------------------------------------------------------------------
// Worker
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Worker {
    pub id: WorkerId,
    pub user_id: UserId,
    pub status_id: StatusId,
    /// Set only while the worker is in `work` status.
    pub window_id: Option<WindowId>,
}

/// Input for onboarding a worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewWorker {
    pub user_id: UserId,
    pub status_id: StatusId,
    #[serde(default)]
    pub window_id: Option<WindowId>,
}

/// What remains of a worker after deletion, kept for audit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemovedWorker {
    pub id: WorkerId,
    pub user_id: UserId,
}

impl From<Worker> for RemovedWorker {
    fn from(worker: Worker) -> Self {
        Self {
            id: worker.id,
            user_id: worker.user_id,
        }
    }
}

/// Partial update. `None` leaves a column untouched; `window_id: Some(None)`
/// clears the window.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerPatch {
    pub user_id: Option<UserId>,
    pub status_id: Option<StatusId>,
    pub window_id: Option<Option<WindowId>>,
}

impl WorkerPatch {
    /// Bind a window and a status in one write.
    pub fn assign(status_id: StatusId, window_id: Option<WindowId>) -> Self {
        Self {
            user_id: None,
            status_id: Some(status_id),
            window_id: Some(window_id),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.user_id.is_none() && self.status_id.is_none() && self.window_id.is_none()
    }

    pub(crate) fn apply(&self, worker: &mut Worker) {
        if let Some(user_id) = self.user_id {
            worker.user_id = user_id;
        }
        if let Some(status_id) = self.status_id {
            worker.status_id = status_id;
        }
        if let Some(window_id) = self.window_id {
            worker.window_id = window_id;
        }
    }
}

/// Equality filter over worker columns. Empty matches every worker.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerFilter {
    pub id: Option<WorkerId>,
    pub user_id: Option<UserId>,
    pub status_id: Option<StatusId>,
    pub window_id: Option<WindowId>,
}

impl WorkerFilter {
    pub fn by_id(id: WorkerId) -> Self {
        Self {
            id: Some(id),
            ..Self::default()
        }
    }

    pub fn by_user(user_id: UserId) -> Self {
        Self {
            user_id: Some(user_id),
            ..Self::default()
        }
    }

    pub fn by_status(status_id: StatusId) -> Self {
        Self {
            status_id: Some(status_id),
            ..Self::default()
        }
    }

    pub fn matches(&self, worker: &Worker) -> bool {
        self.id.is_none_or(|id| worker.id == id)
            && self.user_id.is_none_or(|u| worker.user_id == u)
            && self.status_id.is_none_or(|s| worker.status_id == s)
            && self.window_id.is_none_or(|w| worker.window_id == Some(w))
    }
}

/// Offset pagination for listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub offset: u32,
    pub limit: u32,
}

// ---------------------------------------------------------------------------
// Worker status
// ---------------------------------------------------------------------------

/// The named statuses the lifecycle depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WorkerStatus {
    #[serde(rename = "work")]
    Work,
    #[serde(rename = "break")]
    Break,
    #[serde(rename = "not work")]
    NotWork,
}

impl WorkerStatus {
    pub const ALL: [WorkerStatus; 3] = [
        WorkerStatus::Work,
        WorkerStatus::Break,
        WorkerStatus::NotWork,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            WorkerStatus::Work => "work",
            WorkerStatus::Break => "break",
            WorkerStatus::NotWork => "not work",
        }
    }
}

impl std::fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for WorkerStatus {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        WorkerStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| crate::error::Error::Config(format!("unknown worker status: {s}")))
    }
}

/// A row of the worker status reference table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct StatusRecord {
    pub id: StatusId,
    pub name: String,
}

/// Where a release sends the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReleaseTarget {
    Break,
    NotWork,
}

impl ReleaseTarget {
    pub fn status(self) -> WorkerStatus {
        match self {
            ReleaseTarget::Break => WorkerStatus::Break,
            ReleaseTarget::NotWork => WorkerStatus::NotWork,
        }
    }

    pub fn state(self) -> WorkerState {
        match self {
            ReleaseTarget::Break => WorkerState::OnBreak,
            ReleaseTarget::NotWork => WorkerState::OffShift,
        }
    }
}

/// Lifecycle position of a worker, derived from its status and window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
    /// No window and a status the lifecycle does not know.
    Unassigned,
    Working,
    OnBreak,
    OffShift,
}

impl std::fmt::Display for WorkerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            WorkerState::Unassigned => "unassigned",
            WorkerState::Working => "working",
            WorkerState::OnBreak => "on_break",
            WorkerState::OffShift => "off_shift",
        };
        write!(f, "{s}")
    }
}

// ---------------------------------------------------------------------------
// Tickets
// ---------------------------------------------------------------------------

/// Ticket statuses the core reads. Owned by the ticket subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    Waiting,
    Called,
    Serving,
    Served,
}

impl TicketStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TicketStatus::Waiting => "waiting",
            TicketStatus::Called => "called",
            TicketStatus::Serving => "serving",
            TicketStatus::Served => "served",
        }
    }

    /// Called or serving: the worker is mid-service.
    pub fn is_in_progress(self) -> bool {
        matches!(self, TicketStatus::Called | TicketStatus::Serving)
    }
}

impl std::fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A ticket in a worker's waiting queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct WaitingTicket {
    pub id: TicketId,
    pub purpose_id: PurposeId,
}

/// Issuance-date range for analytics. Both bounds are exclusive: a ticket
/// issued exactly at `start` or `end` is not counted. The Postgres queries
/// and the in-memory store agree on this, keep them in step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServicePeriod {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl ServicePeriod {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        at > self.start && at < self.end
    }
}

/// Per-worker service figures over a period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceStats {
    pub served: u64,
    /// Mean service time rounded to whole seconds. Zero when nothing was served.
    pub average_service_time: Duration,
}
