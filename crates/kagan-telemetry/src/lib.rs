//! Structured logging setup shared by every kagan binary.
//!
//! Human-readable output for interactive use, JSON for log aggregation,
//! both via `tracing-subscriber`. No HTTP surface exists in this daemon, so
//! the axum request-metrics middleware and OTel trace-id injection the
//! teacher carried here have no call site and were dropped.

pub mod logging;
