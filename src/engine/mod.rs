//! Worker engine: window claims, releases with ticket requeue, and the
//! roster of worker records.

pub mod lifecycle;
pub mod locks;
mod release;
pub mod roster;
pub mod status;

pub use lifecycle::{LifecycleConfig, WorkerLifecycle};
pub use locks::WorkerLocks;
pub use roster::Roster;
pub use status::StatusTable;
