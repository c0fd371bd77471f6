//! Merge Service (§4.10): the seven-step squash-merge flow, plus
//! `review.rebase`, the manual counterpart a PAIR operator can trigger
//! directly instead of waiting for the automatic pre-merge rebase.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use kagan_core::db::Db;
use kagan_core::event_bus::{Event, EventBus};
use kagan_core::types::{MergeReadiness, Task, TaskStatus};
use kagan_core::worktree_manager::{MergeResult, WorktreeManager};
use kagan_protocol::{ErrorCode, ProtocolError};
use serde_json::{json, Value};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::ServiceResult;

/// The automation scheduler's half of the quiesce handshake (§4.9): the
/// merge service asks it to stop a task's running agent and poll until it
/// is no longer marked running before touching the worktree.
#[async_trait]
pub trait RuntimeQuiesce: Send + Sync {
    async fn stop_task(&self, task_id: Uuid);
    async fn is_running(&self, task_id: Uuid) -> bool;
}

/// No automation scheduler wired in yet: every task is reported idle.
pub struct NoRuntime;

#[async_trait]
impl RuntimeQuiesce for NoRuntime {
    async fn stop_task(&self, _task_id: Uuid) {}
    async fn is_running(&self, _task_id: Uuid) -> bool {
        false
    }
}

const QUIESCE_POLL_INTERVAL: Duration = Duration::from_millis(200);
const QUIESCE_DEADLINE: Duration = Duration::from_secs(30);

pub struct MergeService {
    db: Arc<Db>,
    bus: Arc<EventBus>,
    worktrees: Arc<WorktreeManager>,
    runtime: Arc<dyn RuntimeQuiesce>,
    merge_lock: Mutex<()>,
}

impl MergeService {
    pub fn new(
        db: Arc<Db>,
        bus: Arc<EventBus>,
        worktrees: Arc<WorktreeManager>,
        runtime: Arc<dyn RuntimeQuiesce>,
    ) -> Self {
        Self {
            db,
            bus,
            worktrees,
            runtime,
            merge_lock: Mutex::new(()),
        }
    }

    /// `review.merge`: policy gate, quiesce, preemptive rebase, squash-merge,
    /// base-ahead retry once, conflict reporting.
    pub async fn merge_task(&self, params: &Value) -> ServiceResult {
        let task_id = parse_uuid(params, "task_id")?;
        let (repo, mut task) = self.repo_and_task(task_id).await?;

        if !task.review_approved {
            return Err(ProtocolError::new(
                ErrorCode::ReviewNotReady,
                "task has not been approved for merge",
            ));
        }

        let _guard = self.merge_lock.lock().await;

        self.runtime.stop_task(task_id).await;
        self.quiesce(task_id).await?;

        let base_branch = task.base_branch.clone().unwrap_or_else(|| "main".to_string());
        let workspace = self.workspace_for(&task).await?;

        let changed_here = self
            .worktrees
            .get_files_changed(&workspace, &repo, &base_branch)
            .map_err(merge_err)?;
        let changed_on_base = self
            .worktrees
            .get_files_changed_on_base(&repo, &base_branch, &workspace.branch_name)
            .map_err(merge_err)?;
        let predicted_conflict = changed_here.iter().any(|f| changed_on_base.contains(f));

        if predicted_conflict {
            match self
                .worktrees
                .rebase_onto_base(&workspace, &repo, &base_branch)
                .map_err(merge_err)?
            {
                MergeResult::Conflict(files) => {
                    let _ = self.worktrees.abort_rebase(&workspace, &repo);
                    return self.record_merge_failure(&mut task, files).await;
                }
                MergeResult::Success | MergeResult::NothingToMerge => {}
            }
        }

        let result = self
            .worktrees
            .merge_squash(&workspace, &repo, &base_branch)
            .map_err(merge_err)?;

        let result = match result {
            MergeResult::Conflict(_) => {
                // base moved again during the window above; rebase once more
                // and retry exactly one additional time per §4.10.
                match self
                    .worktrees
                    .rebase_onto_base(&workspace, &repo, &base_branch)
                    .map_err(merge_err)?
                {
                    MergeResult::Conflict(files) => {
                        let _ = self.worktrees.abort_rebase(&workspace, &repo);
                        return self.record_merge_failure(&mut task, files).await;
                    }
                    _ => self
                        .worktrees
                        .merge_squash(&workspace, &repo, &base_branch)
                        .map_err(merge_err)?,
                }
            }
            other => other,
        };

        match result {
            MergeResult::Conflict(files) => self.record_merge_failure(&mut task, files).await,
            MergeResult::Success | MergeResult::NothingToMerge => {
                task.status = TaskStatus::Done;
                task.merge_readiness = MergeReadiness::Ready;
                task.merge_failed = false;
                task.merge_error = None;
                task.touch();
                self.db.upsert_task(&task).await.map_err(internal)?;
                self.bus.publish(Event::MergeCompleted { task_id, success: true });
                self.bus.publish(Event::TaskChanged {
                    task_id,
                    project_id: task.project_id,
                    status: task.status,
                    updated_at: task.updated_at,
                });
                Ok(json!({ "merged": true, "task": task }))
            }
        }
    }

    /// `review.rebase`: the manual counterpart. On conflict the task moves
    /// back to `IN_PROGRESS`, the rebase is aborted, and the conflicting
    /// files are annotated onto the description so the next AUTO iteration
    /// (or a PAIR operator) sees them; automation for AUTO tasks is asked
    /// to resume via the quiesce handle's `stop_task`/re-spawn contract is
    /// left to the caller that drives `tasks.move` + `jobs.submit`, since
    /// this service only owns merge/rebase mechanics, not scheduling.
    pub async fn rebase_task(&self, params: &Value) -> ServiceResult {
        let task_id = parse_uuid(params, "task_id")?;
        let (repo, mut task) = self.repo_and_task(task_id).await?;
        let base_branch = task.base_branch.clone().unwrap_or_else(|| "main".to_string());
        let workspace = self.workspace_for(&task).await?;

        match self
            .worktrees
            .rebase_onto_base(&workspace, &repo, &base_branch)
            .map_err(merge_err)?
        {
            MergeResult::Success => Ok(json!({ "rebased": true, "conflicts": Vec::<String>::new() })),
            MergeResult::NothingToMerge => Ok(json!({ "rebased": true, "conflicts": Vec::<String>::new() })),
            MergeResult::Conflict(files) => {
                let _ = self.worktrees.abort_rebase(&workspace, &repo);
                task.status = TaskStatus::InProgress;
                task.append_scratchpad(&format!(
                    "Tip: rebase conflict in {} file(s): {}. Resolve conflicts, then merge again.",
                    files.len(),
                    files.join(", ")
                ));
                self.db.upsert_task(&task).await.map_err(internal)?;
                self.bus.publish(Event::TaskChanged {
                    task_id: task.id,
                    project_id: task.project_id,
                    status: task.status,
                    updated_at: task.updated_at,
                });
                Err(ProtocolError::new(
                    ErrorCode::RebaseConflict,
                    format!("rebase conflict in {} file(s)", files.len()),
                ))
            }
        }
    }

    async fn record_merge_failure(&self, task: &mut Task, files: Vec<String>) -> ServiceResult {
        let truncated = kagan_core::worktree_manager::truncate_merge_error(&files.join(", "));
        task.merge_failed = true;
        task.merge_readiness = MergeReadiness::Blocked;
        task.merge_error = Some(truncated.clone());
        task.touch();
        self.db.upsert_task(task).await.map_err(internal)?;
        self.bus.publish(Event::MergeCompleted {
            task_id: task.id,
            success: false,
        });
        Err(ProtocolError::new(
            ErrorCode::MergeFailed,
            format!("merge conflict: {truncated}"),
        ))
    }

    async fn quiesce(&self, task_id: Uuid) -> Result<(), ProtocolError> {
        let deadline = tokio::time::Instant::now() + QUIESCE_DEADLINE;
        while self.runtime.is_running(task_id).await {
            if tokio::time::Instant::now() >= deadline {
                return Err(ProtocolError::new(
                    ErrorCode::StopPending,
                    "timed out waiting for the running agent to stop",
                ));
            }
            tokio::time::sleep(QUIESCE_POLL_INTERVAL).await;
        }
        Ok(())
    }

    async fn repo_and_task(&self, task_id: Uuid) -> Result<(kagan_core::types::Repo, Task), ProtocolError> {
        let task = self
            .db
            .get_task(task_id)
            .await
            .map_err(internal)?
            .ok_or_else(|| ProtocolError::new(ErrorCode::TaskNotFound, "task not found"))?;
        let repos = self
            .db
            .list_repos_for_project(task.project_id)
            .await
            .map_err(internal)?;
        let repo = repos
            .into_iter()
            .next()
            .ok_or_else(|| ProtocolError::new(ErrorCode::WorkspaceNotFound, "project has no linked repos"))?;
        Ok((repo, task))
    }

    async fn workspace_for(&self, task: &Task) -> Result<kagan_core::types::Workspace, ProtocolError> {
        self.db
            .list_active_workspaces()
            .await
            .map_err(internal)?
            .into_iter()
            .find(|w| w.task_id == Some(task.id))
            .ok_or_else(|| ProtocolError::new(ErrorCode::WorkspaceNotFound, "no open workspace for task"))
    }
}

fn parse_uuid(params: &Value, field: &str) -> Result<Uuid, ProtocolError> {
    let raw = params
        .get(field)
        .and_then(|v| v.as_str())
        .ok_or_else(|| invalid_params(format!("missing required param '{field}'")))?;
    Uuid::parse_str(raw).map_err(|_| invalid_params(format!("{field} is not a valid uuid")))
}

fn invalid_params(message: impl Into<String>) -> ProtocolError {
    ProtocolError::new(ErrorCode::InvalidParams, message)
}

fn merge_err(err: impl std::fmt::Display) -> ProtocolError {
    ProtocolError::new(ErrorCode::MergeFailed, err.to_string())
}

fn internal(err: impl std::fmt::Display) -> ProtocolError {
    tracing::error!(error = %err, "merge service internal error");
    ProtocolError::new(ErrorCode::InternalError, "internal error")
}
