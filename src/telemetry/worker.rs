//! Worker lifecycle span helpers.

use tracing::Span;

use crate::model::WorkerId;

/// Start a span for one lifecycle operation on a worker.
///
/// `worker.state` is declared empty and filled by [`record_state_transition`].
pub fn start_worker_span(operation: &'static str, worker: WorkerId) -> Span {
    tracing::info_span!(
        "worker.lifecycle",
        "worker.operation" = operation,
        "worker.id" = %worker,
        "worker.state" = tracing::field::Empty,
    )
}

/// Start a span for the requeue-and-compensate phase of a release.
pub fn start_release_span(worker: WorkerId, release_id: &uuid::Uuid, waiting: usize) -> Span {
    tracing::info_span!(
        "worker.release",
        "worker.id" = %worker,
        "release.id" = %release_id,
        "release.waiting" = waiting,
    )
}

/// Record a state transition on the span and emit it as an event.
pub fn record_state_transition(span: &Span, from: &str, to: &str) {
    span.record("worker.state", to);
    span.in_scope(|| {
        tracing::info!(from = from, to = to, "state_transition");
    });
}
