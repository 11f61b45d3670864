//! # servq
//!
//! Worker lifecycle core for a service-desk ticket queue.
//!
//! Workers claim windows and serve tickets. When a worker leaves its window
//! (break or end of shift) its waiting tickets go back to their purpose
//! queues; if that fails partway the worker is put back at its window.
//! Postgres (sqlx) and in-memory backends, OpenTelemetry observability.

pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod gate;
pub mod inmem;
pub mod model;
pub mod ports;
pub mod telemetry;
