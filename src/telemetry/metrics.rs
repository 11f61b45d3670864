//! Metric instrument factories for servq.
//!
//! Uses the OTel Meter API with the globally-registered `MeterProvider`.
//! All instruments are created lazily from the `"servq"` meter.

use opentelemetry::metrics::{Counter, Histogram, Meter};

/// Returns the shared meter for servq instruments.
fn meter() -> Meter {
    opentelemetry::global::meter("servq")
}

/// Counter: committed worker state transitions.
/// Labels: `from`, `to`.
pub fn worker_transitions() -> Counter<u64> {
    meter()
        .u64_counter("servq.worker.transitions")
        .with_description("Number of committed worker state transitions")
        .build()
}

/// Counter: lifecycle operations rejected before any mutation.
/// Labels: `operation`, `reason` ("out_of_hours" | "busy" | "invalid_transition").
pub fn worker_rejections() -> Counter<u64> {
    meter()
        .u64_counter("servq.worker.rejections")
        .with_description("Lifecycle operations refused by a precondition")
        .build()
}

/// Counter: tickets moved back to their purpose queue on release.
/// Labels: `result` ("ok" | "error").
pub fn tickets_requeued() -> Counter<u64> {
    meter()
        .u64_counter("servq.ticket.requeued")
        .with_description("Waiting tickets handed back to purpose queues")
        .build()
}

/// Counter: release compensations (worker restored after a requeue failure).
/// Labels: `result` ("restored" | "failed").
pub fn release_compensations() -> Counter<u64> {
    meter()
        .u64_counter("servq.release.compensations")
        .with_description("Releases rolled back after a requeue failure")
        .build()
}

/// Histogram: operation duration in milliseconds.
/// Labels: `operation`.
pub fn operation_duration_ms() -> Histogram<f64> {
    meter()
        .f64_histogram("servq.operation.duration_ms")
        .with_description("Operation duration in milliseconds")
        .with_unit("ms")
        .build()
}
