//! The Workspace Adapter (§4.11): every git worktree/branch operation the
//! merge service and automation scheduler need, built on a shelled-out
//! [`GitRunner`] so the whole write path can be driven through a mock in
//! tests the way [`crate::git_read_adapter::GitReadAdapter`] already is for
//! reads.

use std::path::PathBuf;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::git_read_adapter::{default_read_adapter, GitReadAdapter};
use crate::repo::RepoPath;
use crate::types::{Repo, Workspace};
use crate::worktree::{sanitize_name, WorktreeError, WorktreeInfo};

const CONFLICT_MESSAGE_MAX_LEN: usize = 500;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum WorktreeManagerError {
    #[error("worktree error: {0}")]
    Worktree(#[from] WorktreeError),
    #[error("git command failed: {0}")]
    GitCommand(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("worktree not found for branch: {0}")]
    NotFound(String),
}

pub type Result<T> = std::result::Result<T, WorktreeManagerError>;

// ---------------------------------------------------------------------------
// MergeResult
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MergeResult {
    Success,
    Conflict(Vec<String>),
    NothingToMerge,
}

// ---------------------------------------------------------------------------
// GitRunner (write path, mockable)
// ---------------------------------------------------------------------------

pub trait GitRunner: Send + Sync {
    fn run_git(&self, dir: &str, args: &[&str]) -> std::result::Result<GitOutput, String>;
}

#[derive(Debug, Clone)]
pub struct GitOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

pub struct RealGitRunner;

impl GitRunner for RealGitRunner {
    fn run_git(&self, dir: &str, args: &[&str]) -> std::result::Result<GitOutput, String> {
        let output = std::process::Command::new("git")
            .args(args)
            .current_dir(dir)
            .output()
            .map_err(|e| e.to_string())?;

        Ok(GitOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }
}

// ---------------------------------------------------------------------------
// Conflict message parsing (grounded on services/merges.py::_is_merge_conflict
// / _parse_conflict_files)
// ---------------------------------------------------------------------------

const GENERIC_CONFLICT_MARKERS: &[&str] = &[
    "CONFLICT",
    "Merge conflict",
    "conflict in",
    "fix conflicts",
];

pub fn is_merge_conflict_output(stderr: &str, stdout: &str) -> bool {
    let combined = format!("{stdout}\n{stderr}");
    GENERIC_CONFLICT_MARKERS
        .iter()
        .any(|marker| combined.contains(marker))
}

/// Extract file paths out of `CONFLICT (...): Merge conflict in <path>`
/// lines; falls back to any line containing a generic conflict marker.
pub fn parse_conflict_files(stderr: &str, stdout: &str) -> Vec<String> {
    let combined = format!("{stdout}\n{stderr}");
    let mut files = Vec::new();
    for line in combined.lines() {
        if let Some(idx) = line.find("Merge conflict in ") {
            let path = line[idx + "Merge conflict in ".len()..].trim();
            if !path.is_empty() {
                files.push(path.to_string());
            }
        }
    }
    files
}

/// Truncate a conflict/merge-failure message to the persisted length limit.
pub fn truncate_merge_error(message: &str) -> String {
    if message.chars().count() <= CONFLICT_MESSAGE_MAX_LEN {
        message.to_string()
    } else {
        message.chars().take(CONFLICT_MESSAGE_MAX_LEN).collect()
    }
}

// ---------------------------------------------------------------------------
// WorktreeManager
// ---------------------------------------------------------------------------

pub struct WorktreeManager {
    worktree_base: PathBuf,
    git: Box<dyn GitRunner>,
    git_read: Box<dyn GitReadAdapter>,
}

impl WorktreeManager {
    pub fn new(worktree_base: impl Into<PathBuf>) -> Self {
        Self {
            worktree_base: worktree_base.into(),
            git: Box::new(RealGitRunner),
            git_read: default_read_adapter(),
        }
    }

    pub fn with_git_runner(worktree_base: impl Into<PathBuf>, git: Box<dyn GitRunner>) -> Self {
        Self {
            worktree_base: worktree_base.into(),
            git,
            git_read: default_read_adapter(),
        }
    }

    pub fn with_adapters(
        worktree_base: impl Into<PathBuf>,
        git: Box<dyn GitRunner>,
        git_read: Box<dyn GitReadAdapter>,
    ) -> Self {
        Self {
            worktree_base: worktree_base.into(),
            git,
            git_read,
        }
    }

    /// `{worktree_base}/<workspace-id>/<repo>`.
    pub fn worktree_path(&self, workspace: &Workspace, repo: &Repo) -> PathBuf {
        self.worktree_base
            .join(workspace.id.to_string())
            .join(sanitize_name(&repo.name))
    }

    /// `git worktree add -b kagan/<workspace-id> <path> <base_branch>`,
    /// run against the repo's primary checkout (`repo.path`).
    pub fn create(&self, workspace: &Workspace, repo: &Repo) -> Result<WorktreeInfo> {
        let wt_path = self.worktree_path(workspace, repo);
        if wt_path.exists() {
            return Err(WorktreeManagerError::Worktree(WorktreeError::AlreadyExists(
                wt_path.display().to_string(),
            )));
        }
        if let Some(parent) = wt_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let base_branch = repo.default_branch.clone();
        let wt_path_str = wt_path.to_str().unwrap_or(".");

        info!(
            workspace_id = %workspace.id,
            repo = %repo.name,
            branch = %workspace.branch_name,
            "creating worktree"
        );

        let output = self.git.run_git(
            &repo.path,
            &[
                "worktree",
                "add",
                "-b",
                &workspace.branch_name,
                wt_path_str,
                &base_branch,
            ],
        );

        match output {
            Ok(o) if o.success => Ok(WorktreeInfo {
                path: wt_path.display().to_string(),
                branch: workspace.branch_name.clone(),
                base_branch,
                repo_name: repo.name.clone(),
                created_at: Utc::now(),
            }),
            Ok(o) => Err(WorktreeManagerError::GitCommand(o.stderr)),
            Err(e) => Err(WorktreeManagerError::GitCommand(e)),
        }
    }

    /// Remove the worktree directory; the branch itself is left for
    /// `delete_branch` to clean up once merge/close bookkeeping finishes.
    pub fn release(&self, workspace: &Workspace, repo: &Repo) -> Result<()> {
        let wt_path = self.worktree_path(workspace, repo);
        let wt_path_str = wt_path.to_str().unwrap_or(".");
        match self
            .git
            .run_git(&repo.path, &["worktree", "remove", "--force", wt_path_str])
        {
            Ok(o) if o.success => Ok(()),
            Ok(o) => Err(WorktreeManagerError::GitCommand(o.stderr)),
            Err(e) => Err(WorktreeManagerError::GitCommand(e)),
        }
    }

    /// Rebase the workspace branch onto the latest `base_branch`, inside the
    /// worktree. Returns `Conflict` with the offending files on failure,
    /// leaving the rebase in-progress for the caller to abort or resolve.
    pub fn rebase_onto_base(
        &self,
        workspace: &Workspace,
        repo: &Repo,
        base_branch: &str,
    ) -> Result<MergeResult> {
        let wt_path = self.worktree_path(workspace, repo);
        let wt_path_str = wt_path.to_str().unwrap_or(".");

        if let Err(e) = self.git.run_git(wt_path_str, &["fetch", "origin", base_branch]) {
            warn!(error = %e, "git fetch failed before rebase, proceeding with local state");
        }

        let remote_ref = format!("origin/{base_branch}");
        let output = self.git.run_git(wt_path_str, &["rebase", &remote_ref]);

        match output {
            Ok(o) if o.success => Ok(MergeResult::Success),
            Ok(o) if is_merge_conflict_output(&o.stderr, &o.stdout) => {
                let conflicts = self.conflict_files(wt_path_str, &o);
                warn!(branch = %workspace.branch_name, conflicts = ?conflicts, "rebase conflict");
                Ok(MergeResult::Conflict(conflicts))
            }
            Ok(o) => Err(WorktreeManagerError::GitCommand(o.stderr)),
            Err(e) => Err(WorktreeManagerError::GitCommand(e)),
        }
    }

    pub fn abort_rebase(&self, workspace: &Workspace, repo: &Repo) -> Result<()> {
        let wt_path = self.worktree_path(workspace, repo);
        let wt_path_str = wt_path.to_str().unwrap_or(".");
        match self.git.run_git(wt_path_str, &["rebase", "--abort"]) {
            Ok(_) => Ok(()),
            Err(e) => Err(WorktreeManagerError::GitCommand(e)),
        }
    }

    /// Squash-merge the workspace branch into `base_branch`, run from the
    /// repo's primary checkout. Step order mirrors §4.10: diff-stat check,
    /// `merge --squash --no-commit`, commit on success or abort-and-report
    /// conflicts on failure.
    pub fn merge_squash(
        &self,
        workspace: &Workspace,
        repo: &Repo,
        base_branch: &str,
    ) -> Result<MergeResult> {
        let repo_path = &repo.path;

        if let Err(e) = self.git.run_git(repo_path, &["fetch", "origin", base_branch]) {
            warn!(error = %e, "git fetch failed, proceeding with local state");
        }

        let diff_stdout = self.diff_stat(repo_path, base_branch, &workspace.branch_name);
        if diff_stdout.trim().is_empty() {
            info!(branch = %workspace.branch_name, "nothing to merge");
            return Ok(MergeResult::NothingToMerge);
        }

        let output = self.git.run_git(
            repo_path,
            &["merge", "--squash", "--no-commit", &workspace.branch_name],
        );

        match output {
            Ok(o) if o.success => {
                let commit_msg = format!("Merge workspace branch '{}'", workspace.branch_name);
                match self.git.run_git(repo_path, &["commit", "-m", &commit_msg]) {
                    Ok(co) if co.success => {
                        info!(branch = %workspace.branch_name, "squash merge successful");
                        Ok(MergeResult::Success)
                    }
                    Ok(co) => Err(WorktreeManagerError::GitCommand(co.stderr)),
                    Err(e) => Err(WorktreeManagerError::GitCommand(e)),
                }
            }
            Ok(o) => {
                let conflicts = self.conflict_files(repo_path, &o);
                if let Err(e) = self.git.run_git(repo_path, &["merge", "--abort"]) {
                    warn!(error = %e, "git merge --abort failed");
                }
                warn!(branch = %workspace.branch_name, conflicts = ?conflicts, "merge conflicts detected");
                Ok(MergeResult::Conflict(conflicts))
            }
            Err(e) => Err(WorktreeManagerError::GitCommand(e)),
        }
    }

    fn diff_stat(&self, dir: &str, base: &str, head: &str) -> String {
        match self.git_read.diff_stat(dir, base, head) {
            Ok(stdout) => stdout,
            Err(e) => {
                warn!(error = %e, "git read adapter failed for diff --stat; falling back to GitRunner");
                match self.git.run_git(dir, &["diff", "--stat", base, head]) {
                    Ok(o) => o.stdout,
                    Err(_) => String::new(),
                }
            }
        }
    }

    fn conflict_files(&self, dir: &str, merge_output: &GitOutput) -> Vec<String> {
        match self.git_read.conflict_files(dir) {
            Ok(files) if !files.is_empty() => files,
            _ => {
                let parsed = parse_conflict_files(&merge_output.stderr, &merge_output.stdout);
                if !parsed.is_empty() {
                    parsed
                } else {
                    merge_output
                        .stderr
                        .lines()
                        .filter(|l| l.contains("CONFLICT"))
                        .map(|l| l.to_string())
                        .collect()
                }
            }
        }
    }

    pub fn get_commit_log(
        &self,
        workspace: &Workspace,
        repo: &Repo,
        limit: u32,
    ) -> Result<Vec<String>> {
        let wt_path = self.worktree_path(workspace, repo);
        let wt_path_str = wt_path.to_str().unwrap_or(".");
        match self.git.run_git(
            wt_path_str,
            &["log", &format!("-{limit}"), "--oneline", "--no-decorate"],
        ) {
            Ok(o) if o.success => Ok(o.stdout.lines().map(ToOwned::to_owned).collect()),
            Ok(o) => Err(WorktreeManagerError::GitCommand(o.stderr)),
            Err(e) => Err(WorktreeManagerError::GitCommand(e)),
        }
    }

    pub fn get_files_changed(
        &self,
        workspace: &Workspace,
        repo: &Repo,
        base_branch: &str,
    ) -> Result<Vec<String>> {
        let wt_path = self.worktree_path(workspace, repo);
        let wt_path_str = wt_path.to_str().unwrap_or(".");
        self.files_changed_between(wt_path_str, base_branch, &workspace.branch_name)
    }

    /// Files touched on `base_branch` since it diverged from `compare_branch`
    /// — used to predict rebase conflicts before attempting one.
    pub fn get_files_changed_on_base(
        &self,
        repo: &Repo,
        base_branch: &str,
        compare_branch: &str,
    ) -> Result<Vec<String>> {
        self.files_changed_between(&repo.path, compare_branch, base_branch)
    }

    fn files_changed_between(&self, dir: &str, base: &str, head: &str) -> Result<Vec<String>> {
        match self
            .git
            .run_git(dir, &["diff", "--name-only", &format!("{base}...{head}")])
        {
            Ok(o) if o.success => Ok(o
                .stdout
                .lines()
                .filter(|l| !l.is_empty())
                .map(ToOwned::to_owned)
                .collect()),
            Ok(o) => Err(WorktreeManagerError::GitCommand(o.stderr)),
            Err(e) => Err(WorktreeManagerError::GitCommand(e)),
        }
    }

    /// Runs `git worktree prune -v` and returns how many stale worktree
    /// entries it removed, counted from its `Removing worktrees/…` lines.
    pub fn prune_worktrees(&self, repo: &Repo) -> Result<usize> {
        match self.git.run_git(&repo.path, &["worktree", "prune", "-v"]) {
            Ok(o) if o.success => Ok(o
                .stdout
                .lines()
                .filter(|l| l.trim_start().starts_with("Removing worktrees/"))
                .count()),
            Ok(o) => Err(WorktreeManagerError::GitCommand(o.stderr)),
            Err(e) => Err(WorktreeManagerError::GitCommand(e)),
        }
    }

    pub fn list_kagan_branches(&self, repo: &Repo) -> Result<Vec<String>> {
        match self.git.run_git(
            &repo.path,
            &["branch", "--list", "kagan/*", "--format=%(refname:short)"],
        ) {
            Ok(o) if o.success => Ok(o
                .stdout
                .lines()
                .filter(|l| !l.is_empty())
                .map(ToOwned::to_owned)
                .collect()),
            Ok(o) => Err(WorktreeManagerError::GitCommand(o.stderr)),
            Err(e) => Err(WorktreeManagerError::GitCommand(e)),
        }
    }

    pub fn delete_branch(&self, repo: &Repo, branch: &str) -> Result<()> {
        match self.git.run_git(&repo.path, &["branch", "-D", branch]) {
            Ok(o) if o.success => Ok(()),
            Ok(o) => Err(WorktreeManagerError::GitCommand(o.stderr)),
            Err(e) => Err(WorktreeManagerError::GitCommand(e)),
        }
    }

    pub fn get_worktree_for_branch(&self, repo: &Repo, branch: &str) -> Result<Option<PathBuf>> {
        let output = self
            .git
            .run_git(&repo.path, &["worktree", "list", "--porcelain"]);
        let o = match output {
            Ok(o) if o.success => o,
            Ok(o) => return Err(WorktreeManagerError::GitCommand(o.stderr)),
            Err(e) => return Err(WorktreeManagerError::GitCommand(e)),
        };

        let mut current_path: Option<String> = None;
        for line in o.stdout.lines() {
            if let Some(path) = line.strip_prefix("worktree ") {
                current_path = Some(path.to_string());
            } else if let Some(b) = line.strip_prefix("branch refs/heads/") {
                if b == branch {
                    return Ok(current_path.map(PathBuf::from));
                }
            } else if line.is_empty() {
                current_path = None;
            }
        }
        Ok(None)
    }

    pub fn is_branch_merged(&self, repo: &Repo, branch: &str, base_branch: &str) -> Result<bool> {
        match self
            .git
            .run_git(&repo.path, &["branch", "--merged", base_branch])
        {
            Ok(o) if o.success => Ok(o.stdout.lines().any(|l| l.trim().trim_start_matches("* ") == branch)),
            Ok(o) => Err(WorktreeManagerError::GitCommand(o.stderr)),
            Err(e) => Err(WorktreeManagerError::GitCommand(e)),
        }
    }

    /// `RepoPath` for a workspace's worktree, linking the repo's gitdir to
    /// the worktree's working directory.
    pub fn repo_path_for_worktree(&self, workspace: &Workspace, repo: &Repo) -> RepoPath {
        let gitdir = PathBuf::from(&repo.path)
            .join(".git")
            .join("worktrees")
            .join(workspace.id.to_string());
        RepoPath::new(gitdir, self.worktree_path(workspace, repo))
    }

    pub fn repo_path(&self, repo: &Repo) -> RepoPath {
        RepoPath::new(PathBuf::from(&repo.path).join(".git"), PathBuf::from(&repo.path))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git_read_adapter::GitReadError;
    use crate::types::Project;
    use std::sync::{Arc, Mutex};

    struct MockGitRunner {
        responses: Mutex<Vec<GitOutput>>,
        commands: Mutex<Vec<(String, Vec<String>)>>,
    }

    impl MockGitRunner {
        fn new(responses: Vec<GitOutput>) -> Self {
            Self {
                responses: Mutex::new(responses),
                commands: Mutex::new(Vec::new()),
            }
        }

        fn commands(&self) -> Vec<(String, Vec<String>)> {
            self.commands.lock().unwrap().clone()
        }
    }

    impl GitRunner for MockGitRunner {
        fn run_git(&self, dir: &str, args: &[&str]) -> std::result::Result<GitOutput, String> {
            self.commands.lock().unwrap().push((
                dir.to_string(),
                args.iter().map(|s| s.to_string()).collect(),
            ));
            let mut responses = self.responses.lock().unwrap();
            if responses.is_empty() {
                Ok(GitOutput {
                    success: true,
                    stdout: String::new(),
                    stderr: String::new(),
                })
            } else {
                Ok(responses.remove(0))
            }
        }
    }

    struct SharedMockGitRunner(Arc<MockGitRunner>);

    impl GitRunner for SharedMockGitRunner {
        fn run_git(&self, dir: &str, args: &[&str]) -> std::result::Result<GitOutput, String> {
            self.0.run_git(dir, args)
        }
    }

    struct MockReadAdapter {
        diff_result: std::result::Result<String, String>,
        conflict_result: std::result::Result<Vec<String>, String>,
    }

    impl GitReadAdapter for MockReadAdapter {
        fn current_branch(&self, _repo_dir: &str) -> std::result::Result<String, GitReadError> {
            Ok("main".to_string())
        }

        fn status_porcelain(&self, _repo_dir: &str) -> std::result::Result<Vec<String>, GitReadError> {
            Ok(Vec::new())
        }

        fn diff_stat(
            &self,
            _repo_dir: &str,
            _base: &str,
            _head: &str,
        ) -> std::result::Result<String, GitReadError> {
            self.diff_result
                .clone()
                .map_err(GitReadError::Command)
        }

        fn conflict_files(&self, _repo_dir: &str) -> std::result::Result<Vec<String>, GitReadError> {
            self.conflict_result
                .clone()
                .map_err(GitReadError::Command)
        }
    }

    fn make_repo(path: &str) -> Repo {
        Repo {
            id: uuid::Uuid::new_v4(),
            name: "primary".to_string(),
            path: path.to_string(),
            default_branch: "main".to_string(),
            scripts: Default::default(),
        }
    }

    fn make_workspace(repo_path: &str) -> Workspace {
        let project = Project::new("demo").unwrap();
        Workspace::new(project.id, repo_path)
    }

    #[test]
    fn parse_conflict_files_extracts_paths() {
        let stderr = "CONFLICT (content): Merge conflict in src/main.rs\nAutomatic merge failed";
        let files = parse_conflict_files(stderr, "");
        assert_eq!(files, vec!["src/main.rs".to_string()]);
    }

    #[test]
    fn truncate_merge_error_caps_at_500_chars() {
        let long = "x".repeat(600);
        let truncated = truncate_merge_error(&long);
        assert_eq!(truncated.chars().count(), 500);
    }

    #[test]
    fn create_builds_worktree_path_and_branch() {
        let tmp = std::env::temp_dir().join(format!("kagan-wm-test-{}", uuid::Uuid::new_v4()));
        let repo = make_repo(tmp.to_str().unwrap());
        let workspace = make_workspace(tmp.to_str().unwrap());

        let git = Box::new(MockGitRunner::new(vec![GitOutput {
            success: true,
            stdout: String::new(),
            stderr: String::new(),
        }]));

        let base = tmp.join("worktrees");
        let manager = WorktreeManager::with_git_runner(&base, git);
        let info = manager.create(&workspace, &repo).unwrap();

        assert!(info.path.contains(&workspace.id.to_string()));
        assert_eq!(info.branch, workspace.branch_name);
        assert_eq!(info.base_branch, "main");

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn merge_squash_success() {
        let tmp = std::env::temp_dir().join(format!("kagan-wm-test-{}", uuid::Uuid::new_v4()));
        let repo = make_repo(tmp.to_str().unwrap());
        let workspace = make_workspace(tmp.to_str().unwrap());

        let git = Box::new(MockGitRunner::new(vec![
            GitOutput { success: true, stdout: String::new(), stderr: String::new() }, // fetch
            GitOutput { success: true, stdout: "file.rs | 5 ++---\n".to_string(), stderr: String::new() }, // diff
            GitOutput { success: true, stdout: String::new(), stderr: String::new() }, // merge --squash
            GitOutput { success: true, stdout: String::new(), stderr: String::new() }, // commit
        ]));

        let manager = WorktreeManager::with_git_runner(tmp.join("worktrees"), git);
        let result = manager.merge_squash(&workspace, &repo, "main").unwrap();
        assert_eq!(result, MergeResult::Success);
    }

    #[test]
    fn merge_squash_nothing_to_merge() {
        let tmp = std::env::temp_dir().join(format!("kagan-wm-test-{}", uuid::Uuid::new_v4()));
        let repo = make_repo(tmp.to_str().unwrap());
        let workspace = make_workspace(tmp.to_str().unwrap());

        let git = Box::new(MockGitRunner::new(vec![
            GitOutput { success: true, stdout: String::new(), stderr: String::new() }, // fetch
            GitOutput { success: true, stdout: String::new(), stderr: String::new() }, // diff empty
        ]));

        let manager = WorktreeManager::with_git_runner(tmp.join("worktrees"), git);
        let result = manager.merge_squash(&workspace, &repo, "main").unwrap();
        assert_eq!(result, MergeResult::NothingToMerge);
    }

    #[test]
    fn merge_squash_conflict_via_read_adapter() {
        let tmp = std::env::temp_dir().join(format!("kagan-wm-test-{}", uuid::Uuid::new_v4()));
        let repo = make_repo(tmp.to_str().unwrap());
        let workspace = make_workspace(tmp.to_str().unwrap());

        let shared = Arc::new(MockGitRunner::new(vec![
            GitOutput { success: true, stdout: String::new(), stderr: String::new() }, // fetch
            GitOutput {
                success: false,
                stdout: String::new(),
                stderr: "CONFLICT (content): Merge conflict in file.rs\n".to_string(),
            }, // merge --squash fails
            GitOutput { success: true, stdout: String::new(), stderr: String::new() }, // merge --abort
        ]));

        let manager = WorktreeManager::with_adapters(
            tmp.join("worktrees"),
            Box::new(SharedMockGitRunner(shared.clone())),
            Box::new(MockReadAdapter {
                diff_result: Ok("file.rs | 5 ++---\n".to_string()),
                conflict_result: Ok(vec!["file.rs".to_string()]),
            }),
        );

        let result = manager.merge_squash(&workspace, &repo, "main").unwrap();
        assert_eq!(result, MergeResult::Conflict(vec!["file.rs".to_string()]));

        let commands = shared.commands();
        assert_eq!(commands.last().unwrap().1, vec!["merge".to_string(), "--abort".to_string()]);
    }

    #[test]
    fn is_branch_merged_detects_membership() {
        let tmp = std::env::temp_dir().join(format!("kagan-wm-test-{}", uuid::Uuid::new_v4()));
        let repo = make_repo(tmp.to_str().unwrap());

        let git = Box::new(MockGitRunner::new(vec![GitOutput {
            success: true,
            stdout: "  kagan/abc\n* main\n".to_string(),
            stderr: String::new(),
        }]));
        let manager = WorktreeManager::with_git_runner(tmp.join("worktrees"), git);
        assert!(manager.is_branch_merged(&repo, "kagan/abc", "main").unwrap());
        assert!(!manager.is_branch_merged(&repo, "kagan/missing", "main").unwrap());
    }

    #[test]
    fn repo_path_for_worktree_links_gitdir() {
        let tmp = std::env::temp_dir().join(format!("kagan-wm-test-{}", uuid::Uuid::new_v4()));
        let repo = make_repo(tmp.to_str().unwrap());
        let workspace = make_workspace(tmp.to_str().unwrap());
        let manager = WorktreeManager::new(tmp.join("worktrees"));

        let rp = manager.repo_path_for_worktree(&workspace, &repo);
        assert!(rp.is_worktree());
    }
}
