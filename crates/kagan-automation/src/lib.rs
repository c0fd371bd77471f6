//! The Automation Scheduler (§4.9): spawns and supervises the per-task AUTO
//! coding-agent process via [`kagan_sessions`], enforcing the workspace-wide
//! concurrency cap and each task's iteration cap. Implements
//! [`kagan_ipc::services::merge::RuntimeQuiesce`] so the merge service can
//! quiesce a task's runtime before touching its worktree.

pub mod scheduler;
pub mod state_machine;

pub use scheduler::AutomationScheduler;
