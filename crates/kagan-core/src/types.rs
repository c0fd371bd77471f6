//! The entities the core owns: tasks, projects, repos, workspaces,
//! executions, audit events, and jobs (§3). Status/priority/type are closed
//! enums so transitions can be checked exhaustively instead of by string
//! comparison.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Task
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Backlog,
    InProgress,
    Review,
    Done,
}

impl TaskStatus {
    /// `DONE` is terminal for scheduling purposes, not for deletion.
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Done)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskPriority {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    Auto,
    Pair,
}

/// Which coding-agent CLI an AUTO task's `agent_backend` string names.
/// Closed so the automation scheduler's adapter lookup can't silently no-op
/// on a typo — `parse` returns `None` instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CliType {
    Claude,
    Codex,
    Gemini,
    OpenCode,
}

impl CliType {
    pub fn as_str(self) -> &'static str {
        match self {
            CliType::Claude => "claude",
            CliType::Codex => "codex",
            CliType::Gemini => "gemini",
            CliType::OpenCode => "opencode",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "claude" => Some(CliType::Claude),
            "codex" => Some(CliType::Codex),
            "gemini" => Some(CliType::Gemini),
            "opencode" => Some(CliType::OpenCode),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalBackend {
    Tmux,
    Vscode,
    Cursor,
}

impl TerminalBackend {
    pub fn as_str(self) -> &'static str {
        match self {
            TerminalBackend::Tmux => "tmux",
            TerminalBackend::Vscode => "vscode",
            TerminalBackend::Cursor => "cursor",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "tmux" => Some(TerminalBackend::Tmux),
            "vscode" => Some(TerminalBackend::Vscode),
            "cursor" => Some(TerminalBackend::Cursor),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MergeReadiness {
    Ready,
    Risk,
    Blocked,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub project_id: Uuid,
    pub parent_id: Option<Uuid>,
    pub title: String,
    pub description: String,
    pub status: TaskStatus,
    pub priority: TaskPriority,
    pub task_type: TaskType,
    pub terminal_backend: Option<TerminalBackend>,
    pub agent_backend: Option<String>,
    pub acceptance_criteria: Vec<String>,
    pub base_branch: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub merge_readiness: MergeReadiness,
    pub merge_failed: bool,
    pub merge_error: Option<String>,
    pub checks_passed: Option<bool>,
    pub scratchpad: String,
    pub review_approved: bool,
}

impl Task {
    pub fn new(project_id: Uuid, title: impl Into<String>, task_type: TaskType) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            project_id,
            parent_id: None,
            title: title.into(),
            description: String::new(),
            status: TaskStatus::Backlog,
            priority: TaskPriority::Medium,
            task_type,
            terminal_backend: None,
            agent_backend: None,
            acceptance_criteria: Vec::new(),
            base_branch: None,
            created_at: now,
            updated_at: now,
            merge_readiness: MergeReadiness::Risk,
            merge_failed: false,
            merge_error: None,
            checks_passed: None,
            scratchpad: String::new(),
            review_approved: false,
        }
    }

    /// `task_type=AUTO ⇒ terminal_backend=null`.
    pub fn validate_invariants(&self) -> Result<(), String> {
        if matches!(self.task_type, TaskType::Auto) && self.terminal_backend.is_some() {
            return Err("AUTO tasks may not carry a terminal_backend".to_string());
        }
        Ok(())
    }

    /// Append to the scratchpad using `f"{old}\n{new}".strip()` semantics
    /// when the existing scratchpad is non-empty.
    pub fn append_scratchpad(&mut self, addition: &str) {
        self.scratchpad = if self.scratchpad.is_empty() {
            addition.trim().to_string()
        } else {
            format!("{}\n{}", self.scratchpad, addition).trim().to_string()
        };
        self.touch();
    }

    /// Bump `updated_at`; called by every mutation so it strictly increases
    /// and can serve as a race-safe `tasks.wait` cursor.
    pub fn touch(&mut self) {
        let now = Utc::now();
        self.updated_at = if now > self.updated_at {
            now
        } else {
            self.updated_at + chrono::Duration::microseconds(1)
        };
    }

    pub fn sync_status_from_agent_complete(&mut self, success: bool) -> bool {
        if matches!(self.status, TaskStatus::InProgress) && success {
            self.status = TaskStatus::Review;
            self.touch();
            true
        } else {
            false
        }
    }

    pub fn sync_status_from_review_pass(&mut self) -> bool {
        if matches!(self.status, TaskStatus::Review) {
            self.status = TaskStatus::Done;
            self.touch();
            true
        } else {
            false
        }
    }

    pub fn sync_status_from_review_reject(&mut self, reason: &str) -> bool {
        if matches!(self.status, TaskStatus::Review) {
            self.status = TaskStatus::InProgress;
            if !reason.is_empty() {
                self.description = format!("{}\n\n{}", self.description, reason)
                    .trim()
                    .to_string();
            }
            self.touch();
            true
        } else {
            false
        }
    }

    /// `@TASK-123`-style mentions parsed out of scratchpad/description.
    pub fn linked_task_mentions(&self) -> Vec<String> {
        let mut mentions = Vec::new();
        for text in [self.scratchpad.as_str(), self.description.as_str()] {
            let mut chars = text.char_indices().peekable();
            while let Some((i, c)) = chars.next() {
                if c != '@' {
                    continue;
                }
                let rest = &text[i + 1..];
                let end = rest
                    .find(|c: char| c.is_whitespace())
                    .unwrap_or(rest.len());
                let token = &rest[..end];
                if is_legacy_task_id(token) {
                    mentions.push(token.to_string());
                }
            }
        }
        mentions.sort();
        mentions.dedup();
        mentions
    }
}

fn is_legacy_task_id(s: &str) -> bool {
    let mut chars = s.chars();
    let mut letters = 0usize;
    for c in chars.by_ref() {
        if c == '-' {
            break;
        }
        if !c.is_ascii_uppercase() {
            return false;
        }
        letters += 1;
    }
    if letters == 0 {
        return false;
    }
    let rest: String = chars.collect();
    !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit())
}

// ---------------------------------------------------------------------------
// Project / Repo / ProjectRepo
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub last_opened_at: Option<DateTime<Utc>>,
}

impl Project {
    pub fn new(name: impl Into<String>) -> Result<Self, String> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err("project name must not be empty".to_string());
        }
        Ok(Self {
            id: Uuid::new_v4(),
            name,
            description: String::new(),
            last_opened_at: None,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Repo {
    pub id: Uuid,
    pub name: String,
    pub path: String,
    pub default_branch: String,
    pub scripts: std::collections::BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectRepo {
    pub project_id: Uuid,
    pub repo_id: Uuid,
    pub is_primary: bool,
    pub display_order: i64,
}

// ---------------------------------------------------------------------------
// Workspace / WorkspaceRepo
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkspaceStatus {
    Active,
    Closed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workspace {
    pub id: Uuid,
    pub project_id: Uuid,
    pub task_id: Option<Uuid>,
    pub branch_name: String,
    pub path: String,
    pub status: WorkspaceStatus,
}

impl Workspace {
    pub fn new(project_id: Uuid, path: impl Into<String>) -> Self {
        let id = Uuid::new_v4();
        Self {
            id,
            project_id,
            task_id: None,
            branch_name: format!("kagan/{id}"),
            path: path.into(),
            status: WorkspaceStatus::Active,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceRepo {
    pub workspace_id: Uuid,
    pub repo_id: Uuid,
    pub worktree_path: String,
}

// ---------------------------------------------------------------------------
// Execution / AuditEvent
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Execution {
    pub id: Uuid,
    pub task_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub metadata: serde_json::Value,
    pub log_path: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorType {
    User,
    Agent,
    System,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: String,
    pub occurred_at: DateTime<Utc>,
    pub actor_type: ActorType,
    pub actor_id: String,
    pub session_id: Option<String>,
    pub capability: String,
    pub command_name: String,
    pub payload_json: Option<serde_json::Value>,
    pub result_json: Option<serde_json::Value>,
    pub success: bool,
}

impl AuditEvent {
    pub fn new(
        actor_type: ActorType,
        actor_id: impl Into<String>,
        capability: impl Into<String>,
        command_name: impl Into<String>,
        success: bool,
    ) -> Self {
        Self {
            id: random_id(8),
            occurred_at: Utc::now(),
            actor_type,
            actor_id: actor_id.into(),
            session_id: None,
            capability: capability.into(),
            command_name: command_name.into(),
            payload_json: None,
            result_json: None,
            success,
        }
    }
}

fn random_id(len: usize) -> String {
    const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
    let uuid = Uuid::new_v4();
    uuid.simple()
        .to_string()
        .bytes()
        .take(len)
        .map(|b| ALPHABET[(b as usize) % ALPHABET.len()] as char)
        .collect()
}

// ---------------------------------------------------------------------------
// Job / JobEvent
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Succeeded | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    pub fn can_transition_to(self, target: JobStatus) -> bool {
        matches!(
            (self, target),
            (JobStatus::Queued, JobStatus::Running)
                | (JobStatus::Queued, JobStatus::Cancelled)
                | (JobStatus::Running, JobStatus::Succeeded)
                | (JobStatus::Running, JobStatus::Failed)
                | (JobStatus::Running, JobStatus::Cancelled)
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobEvent {
    pub status: JobStatus,
    pub timestamp: DateTime<Utc>,
    pub message: String,
    pub code: Option<String>,
    pub payload: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub job_id: Uuid,
    pub task_id: Uuid,
    pub action: String,
    pub status: JobStatus,
    pub code: Option<String>,
    pub message: String,
    pub result: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub events: Vec<JobEvent>,
}

impl Job {
    pub fn new(task_id: Uuid, action: impl Into<String>) -> Self {
        let now = Utc::now();
        let mut job = Self {
            job_id: Uuid::new_v4(),
            task_id,
            action: action.into(),
            status: JobStatus::Queued,
            code: None,
            message: String::new(),
            result: None,
            created_at: now,
            updated_at: now,
            events: Vec::new(),
        };
        job.push_event(JobStatus::Queued, "queued", None, None);
        job
    }

    pub fn push_event(
        &mut self,
        status: JobStatus,
        message: impl Into<String>,
        code: Option<String>,
        payload: Option<serde_json::Value>,
    ) {
        let message = message.into();
        self.status = status;
        self.code = code.clone();
        self.message = message.clone();
        self.updated_at = Utc::now();
        self.events.push(JobEvent {
            status,
            timestamp: self.updated_at,
            message,
            code,
            payload,
        });
    }

    pub fn try_transition(
        &mut self,
        target: JobStatus,
        message: impl Into<String>,
        code: Option<String>,
    ) -> bool {
        if !self.status.can_transition_to(target) {
            return false;
        }
        self.push_event(target, message, code, None);
        true
    }
}
