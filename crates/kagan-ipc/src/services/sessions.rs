//! Session Service (§4.13): launching a PAIR terminal backend (tmux,
//! VS Code, or Cursor) against a task's worktree, writing the handoff
//! bundle and MCP config file the launched session reads on startup.
//!
//! VS Code and Cursor launches are fire-and-forget per the spec's Open
//! Questions — we record that we asked the OS to open them, not that the
//! editor process is still alive.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;

use kagan_core::db::Db;
use kagan_core::types::{Task, TerminalBackend};
use kagan_protocol::{ErrorCode, ProtocolError};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::ServiceResult;

pub struct SessionService {
    db: Arc<Db>,
}

impl SessionService {
    pub fn new(db: Arc<Db>) -> Self {
        Self { db }
    }

    pub async fn create(&self, params: &Value) -> ServiceResult {
        let task_id = parse_uuid(params, "task_id")?;
        let task = self.fetch(task_id).await?;
        let backend = task
            .terminal_backend
            .ok_or_else(|| invalid_params("task has no terminal_backend configured"))?;

        let workdir = params
            .get("worktree_path")
            .and_then(|v| v.as_str())
            .ok_or_else(|| invalid_params("missing required param 'worktree_path'"))?;
        let workdir = PathBuf::from(workdir);

        write_handoff_bundle(&workdir, &task).map_err(io_err)?;
        write_mcp_config(&workdir, task_id).map_err(io_err)?;

        match backend {
            TerminalBackend::Tmux => launch_tmux(task_id, &workdir).map_err(launch_err)?,
            TerminalBackend::Vscode => launch_editor("code", &workdir).map_err(launch_err)?,
            TerminalBackend::Cursor => launch_editor("cursor", &workdir).map_err(launch_err)?,
        }

        Ok(json!({
            "session_id": tmux_session_name(task_id),
            "backend": backend.as_str(),
        }))
    }

    pub async fn exists(&self, params: &Value) -> ServiceResult {
        let task_id = parse_uuid(params, "task_id")?;
        let exists = session_exists(task_id);
        Ok(json!({ "exists": exists }))
    }

    pub async fn attach_command(&self, params: &Value) -> ServiceResult {
        let task_id = parse_uuid(params, "task_id")?;
        if !session_exists(task_id) {
            return Err(ProtocolError::new(
                ErrorCode::SessionCreateFailed,
                "no running session for this task",
            ));
        }
        Ok(json!({ "attach_command": format!("tmux attach -t {}", tmux_session_name(task_id)) }))
    }

    pub async fn kill(&self, params: &Value) -> ServiceResult {
        let task_id = parse_uuid(params, "task_id")?;
        let name = tmux_session_name(task_id);
        let status = Command::new("tmux").args(["kill-session", "-t", &name]).status();
        Ok(json!({ "killed": matches!(status, Ok(s) if s.success()) }))
    }

    async fn fetch(&self, task_id: Uuid) -> Result<Task, ProtocolError> {
        self.db
            .get_task(task_id)
            .await
            .map_err(internal)?
            .ok_or_else(|| ProtocolError::new(ErrorCode::TaskNotFound, "task not found"))
    }
}

fn tmux_session_name(task_id: Uuid) -> String {
    format!("kagan-{task_id}")
}

fn session_exists(task_id: Uuid) -> bool {
    Command::new("tmux")
        .args(["has-session", "-t", &tmux_session_name(task_id)])
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

fn launch_tmux(task_id: Uuid, workdir: &Path) -> std::io::Result<()> {
    Command::new("tmux")
        .args([
            "new-session",
            "-d",
            "-s",
            &tmux_session_name(task_id),
            "-c",
            &workdir.to_string_lossy(),
        ])
        .status()?;
    Ok(())
}

fn launch_editor(binary: &str, workdir: &Path) -> std::io::Result<()> {
    Command::new(binary).arg(workdir).spawn()?;
    Ok(())
}

/// `.kagan/handoff.json` in the worktree: everything a PAIR operator's
/// editor or terminal needs to orient itself without another round trip.
fn write_handoff_bundle(workdir: &Path, task: &Task) -> std::io::Result<()> {
    let dir = workdir.join(".kagan");
    std::fs::create_dir_all(&dir)?;
    let bundle = json!({
        "task_id": task.id,
        "title": task.title,
        "description": task.description,
        "acceptance_criteria": task.acceptance_criteria,
        "base_branch": task.base_branch,
        "scratchpad": task.scratchpad,
    });
    std::fs::write(dir.join("handoff.json"), serde_json::to_vec_pretty(&bundle)?)
}

/// `.kagan/mcp.json`: points an MCP-aware editor at the running daemon,
/// scoped to this task via the session namespace (`task:<id>`).
fn write_mcp_config(workdir: &Path, task_id: Uuid) -> std::io::Result<()> {
    let dir = workdir.join(".kagan");
    std::fs::create_dir_all(&dir)?;
    let config = json!({
        "mcpServers": {
            "kagan": {
                "session_id": format!("task:{task_id}"),
            }
        }
    });
    std::fs::write(dir.join("mcp.json"), serde_json::to_vec_pretty(&config)?)
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

fn io_err(err: std::io::Error) -> ProtocolError {
    ProtocolError::new(ErrorCode::SessionCreateFailed, err.to_string())
}

fn launch_err(err: std::io::Error) -> ProtocolError {
    ProtocolError::new(ErrorCode::SessionCreateFailed, format!("failed to launch backend: {err}"))
}

fn internal(err: impl std::fmt::Display) -> ProtocolError {
    tracing::error!(error = %err, "session service internal error");
    ProtocolError::new(ErrorCode::InternalError, "internal error")
}
