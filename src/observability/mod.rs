//! Observability subsystem.
//!
//! Structured logging via `tracing`, process-wide metrics via the `metrics`
//! facade with a Prometheus recorder. Workers share the process registry, so
//! the management `/metrics` endpoint naturally aggregates across them.

pub mod logging;
pub mod metrics;
