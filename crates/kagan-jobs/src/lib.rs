//! The job subsystem (§4.8): the asynchronous envelope around any
//! long-running task-scoped operation (`jobs.submit`/`get`/`wait`/`events`/
//! `cancel`), plus the reliability primitives the automation scheduler and
//! IPC layer lean on when driving agent subprocesses and external calls.

pub mod circuit_breaker;
pub mod job_service;
pub mod rate_limiter;
pub mod shutdown;
pub mod trace_ctx;
