//! One module per capability family (§4.6–§4.15). Each service takes
//! already-authorized `serde_json::Value` params and returns a
//! [`crate::ServiceResult`] — the dispatcher owns session binding,
//! authorization, and idempotency; these modules only own domain logic.

pub mod audit;
pub mod janitor;
pub mod jobs;
pub mod merge;
pub mod projects;
pub mod sessions;
pub mod tasks;
pub mod workspaces;
