//! Workspace & Worktree operations (§4.11): opening a workspace creates one
//! git worktree per linked repo; closing releases them and marks the
//! workspace closed.

use std::sync::Arc;

use kagan_core::db::Db;
use kagan_core::event_bus::{Event, EventBus};
use kagan_core::types::{Workspace, WorkspaceRepo, WorkspaceStatus};
use kagan_core::worktree_manager::WorktreeManager;
use kagan_protocol::{ErrorCode, ProtocolError};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::ServiceResult;

pub struct WorkspaceService {
    db: Arc<Db>,
    bus: Arc<EventBus>,
    worktrees: Arc<WorktreeManager>,
}

impl WorkspaceService {
    pub fn new(db: Arc<Db>, bus: Arc<EventBus>, worktrees: Arc<WorktreeManager>) -> Self {
        Self { db, bus, worktrees }
    }

    /// Creates the workspace row plus one worktree per `repo_ids` entry that
    /// is actually linked to `project_id`.
    pub async fn open(&self, params: &Value) -> ServiceResult {
        let project_id = parse_uuid(params, "project_id")?;
        let repo_ids = params
            .get("repo_ids")
            .and_then(|v| v.as_array())
            .ok_or_else(|| invalid_params("repo_ids must be an array"))?
            .iter()
            .filter_map(|v| v.as_str())
            .filter_map(|s| Uuid::parse_str(s).ok())
            .collect::<Vec<_>>();
        if repo_ids.is_empty() {
            return Err(invalid_params("repo_ids must contain at least one repo"));
        }

        let project_repos = self
            .db
            .list_repos_for_project(project_id)
            .await
            .map_err(internal)?;
        let repos: Vec<_> = project_repos
            .into_iter()
            .filter(|r| repo_ids.contains(&r.id))
            .collect();
        if repos.len() != repo_ids.len() {
            return Err(invalid_params("one or more repo_ids are not linked to this project"));
        }

        let mut workspace = Workspace::new(project_id, "");
        if let Some(task_id) = params.get("task_id").and_then(|v| v.as_str()) {
            workspace.task_id = Some(
                Uuid::parse_str(task_id).map_err(|_| invalid_params("task_id is not a valid uuid"))?,
            );
        }

        let mut created_paths = Vec::new();
        for repo in &repos {
            let info = self
                .worktrees
                .create(&workspace, repo)
                .map_err(|e| ProtocolError::new(ErrorCode::InvalidWorktreePath, e.to_string()))?;
            workspace.path = info.path.clone();
            self.db
                .link_workspace_repo(&WorkspaceRepo {
                    workspace_id: workspace.id,
                    repo_id: repo.id,
                    worktree_path: info.path.clone(),
                })
                .await
                .map_err(internal)?;
            created_paths.push(info.path);
        }

        self.db.upsert_workspace(&workspace).await.map_err(internal)?;
        Ok(json!({ "workspace": workspace, "worktree_paths": created_paths }))
    }

    pub async fn list(&self, _params: &Value) -> ServiceResult {
        let workspaces = self.db.list_active_workspaces().await.map_err(internal)?;
        Ok(json!({ "workspaces": workspaces }))
    }

    pub async fn close(&self, params: &Value) -> ServiceResult {
        let workspace_id = parse_uuid(params, "workspace_id")?;
        let mut workspace = self
            .db
            .list_active_workspaces()
            .await
            .map_err(internal)?
            .into_iter()
            .find(|w| w.id == workspace_id)
            .ok_or_else(|| ProtocolError::new(ErrorCode::WorkspaceNotFound, "workspace not found or already closed"))?;

        let project_repos = self
            .db
            .list_repos_for_project(workspace.project_id)
            .await
            .map_err(internal)?;
        for repo in &project_repos {
            let _ = self.worktrees.release(&workspace, repo);
        }

        workspace.status = WorkspaceStatus::Closed;
        self.db.upsert_workspace(&workspace).await.map_err(internal)?;
        self.bus.publish(Event::WorkspaceClosed { workspace_id });
        Ok(json!({ "closed": true }))
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

fn internal(err: impl std::fmt::Display) -> ProtocolError {
    tracing::error!(error = %err, "workspace service internal error");
    ProtocolError::new(ErrorCode::InternalError, "internal error")
}
