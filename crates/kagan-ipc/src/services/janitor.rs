//! Janitor (§4.12): periodic sweep that prunes stale worktree metadata and
//! deletes orphaned `kagan/*` branches left behind by closed workspaces.

use std::sync::Arc;

use kagan_core::db::Db;
use kagan_core::types::Repo;
use kagan_core::worktree_manager::WorktreeManager;
use kagan_protocol::{ErrorCode, ProtocolError};
use serde::Serialize;
use serde_json::{json, Value};

use crate::ServiceResult;

#[derive(Debug, Default, Serialize)]
pub struct JanitorResult {
    pub pruned_worktrees: usize,
    pub deleted_branches: Vec<String>,
}

impl JanitorResult {
    pub fn total_cleaned(&self) -> usize {
        self.pruned_worktrees + self.deleted_branches.len()
    }
}

pub struct JanitorService {
    db: Arc<Db>,
    worktrees: Arc<WorktreeManager>,
}

impl JanitorService {
    pub fn new(db: Arc<Db>, worktrees: Arc<WorktreeManager>) -> Self {
        Self { db, worktrees }
    }

    pub async fn sweep(&self, _params: &Value) -> ServiceResult {
        let projects = self.db.list_projects().await.map_err(internal)?;
        let active = self.db.list_active_workspaces().await.map_err(internal)?;
        let live_branches: Vec<String> = active.iter().map(|w| w.branch_name.clone()).collect();

        let mut result = JanitorResult::default();
        let mut seen_repos = Vec::new();
        for project in projects {
            for repo in self
                .db
                .list_repos_for_project(project.id)
                .await
                .map_err(internal)?
            {
                if seen_repos.contains(&repo.id) {
                    continue;
                }
                seen_repos.push(repo.id);
                self.sweep_repo(&repo, &live_branches, &mut result)?;
            }
        }
        Ok(json!({
            "pruned_worktrees": result.pruned_worktrees,
            "deleted_branches": result.deleted_branches,
            "total_cleaned": result.total_cleaned(),
        }))
    }

    fn sweep_repo(
        &self,
        repo: &Repo,
        live_branches: &[String],
        result: &mut JanitorResult,
    ) -> Result<(), ProtocolError> {
        result.pruned_worktrees += self.worktrees.prune_worktrees(repo).map_err(internal)?;

        for branch in self.worktrees.list_kagan_branches(repo).map_err(internal)? {
            if live_branches.contains(&branch) {
                continue;
            }
            if self
                .worktrees
                .get_worktree_for_branch(repo, &branch)
                .map_err(internal)?
                .is_some()
            {
                continue;
            }
            self.worktrees.delete_branch(repo, &branch).map_err(internal)?;
            result.deleted_branches.push(branch);
        }
        live_branches.clear();
        Ok(())
    }
}

fn internal(err: impl std::fmt::Display) -> ProtocolError {
    tracing::error!(error = %err, "janitor service internal error");
    ProtocolError::new(ErrorCode::InternalError, "internal error")
}
