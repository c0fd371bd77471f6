//! Task Service (§4.6) and the `tasks.wait` long-poll primitive (§4.7).

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use kagan_core::db::Db;
use kagan_core::event_bus::{wait_for, Event, EventBus};
use kagan_core::types::{Task, TaskPriority, TaskStatus, TaskType, TerminalBackend};
use kagan_protocol::{ErrorCode, ProtocolError};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::ServiceResult;

const DEFAULT_WAIT_TIMEOUT_SECONDS: f64 = 30.0;
const MAX_WAIT_TIMEOUT_SECONDS: f64 = 300.0;

pub struct TaskService {
    db: Arc<Db>,
    bus: Arc<EventBus>,
}

impl TaskService {
    pub fn new(db: Arc<Db>, bus: Arc<EventBus>) -> Self {
        Self { db, bus }
    }

    pub async fn create(&self, params: &Value) -> ServiceResult {
        let project_id = parse_uuid(params, "project_id")?;
        let title = required_str(params, "title")?;
        let task_type = match params.get("task_type").and_then(|v| v.as_str()) {
            Some("pair") => TaskType::Pair,
            Some("auto") | None => TaskType::Auto,
            Some(other) => {
                return Err(invalid_params(format!("unknown task_type '{other}'")));
            }
        };

        let mut task = Task::new(project_id, title, task_type);
        if let Some(description) = params.get("description").and_then(|v| v.as_str()) {
            task.description = description.to_string();
        }
        if let Some(priority) = params.get("priority").and_then(|v| v.as_str()) {
            task.priority = parse_priority(priority)?;
        }
        if let Some(base_branch) = params.get("base_branch").and_then(|v| v.as_str()) {
            task.base_branch = Some(base_branch.to_string());
        }
        if let Some(parent) = params.get("parent_id").and_then(|v| v.as_str()) {
            task.parent_id = Some(
                Uuid::parse_str(parent)
                    .map_err(|_| invalid_params("parent_id is not a valid uuid"))?,
            );
        }
        if matches!(task_type, TaskType::Pair) {
            if let Some(backend) = params.get("terminal_backend").and_then(|v| v.as_str()) {
                task.terminal_backend = TerminalBackend::parse(backend);
            }
        }
        task.validate_invariants().map_err(invalid_params)?;

        self.db.upsert_task(&task).await.map_err(internal)?;
        self.bus.publish(Event::TaskCreated {
            task_id: task.id,
            project_id: task.project_id,
        });
        Ok(json!({ "task": task }))
    }

    pub async fn get(&self, params: &Value) -> ServiceResult {
        let task_id = parse_uuid(params, "task_id")?;
        let task = self.fetch(task_id).await?;
        Ok(json!({ "task": task }))
    }

    pub async fn list(&self, params: &Value) -> ServiceResult {
        let project_id = parse_uuid(params, "project_id")?;
        let tasks = self
            .db
            .list_tasks_for_project(project_id)
            .await
            .map_err(internal)?;
        Ok(json!({ "tasks": tasks }))
    }

    /// General mutator: merges the provided fields onto the stored task.
    pub async fn update_fields(&self, params: &Value) -> ServiceResult {
        let task_id = parse_uuid(params, "task_id")?;
        let mut task = self.fetch(task_id).await?;
        let fields = params
            .get("fields")
            .and_then(|v| v.as_object())
            .ok_or_else(|| invalid_params("fields must be an object"))?;

        if let Some(title) = fields.get("title").and_then(|v| v.as_str()) {
            task.title = title.to_string();
        }
        if let Some(description) = fields.get("description").and_then(|v| v.as_str()) {
            task.description = description.to_string();
        }
        if let Some(priority) = fields.get("priority").and_then(|v| v.as_str()) {
            task.priority = parse_priority(priority)?;
        }
        if let Some(criteria) = fields.get("acceptance_criteria").and_then(|v| v.as_array()) {
            task.acceptance_criteria = criteria
                .iter()
                .filter_map(|v| v.as_str().map(String::from))
                .collect();
        }
        task.validate_invariants().map_err(invalid_params)?;
        task.touch();
        self.db.upsert_task(&task).await.map_err(internal)?;
        self.bus.publish(Event::TaskChanged {
            task_id: task.id,
            project_id: task.project_id,
            status: task.status,
            updated_at: task.updated_at,
        });
        Ok(json!({ "task": task }))
    }

    /// Narrow status-move helper.
    pub async fn move_status(&self, params: &Value) -> ServiceResult {
        let task_id = parse_uuid(params, "task_id")?;
        let status = parse_status(required_str(params, "status")?)?;
        let mut task = self.fetch(task_id).await?;
        let previous_status = task.status;
        task.status = status;
        task.touch();
        self.db.upsert_task(&task).await.map_err(internal)?;
        self.bus.publish(Event::TaskChanged {
            task_id: task.id,
            project_id: task.project_id,
            status: task.status,
            updated_at: task.updated_at,
        });
        Ok(json!({
            "task": task,
            "previous_status": previous_status,
            "current_status": task.status,
        }))
    }

    pub async fn delete(&self, params: &Value) -> ServiceResult {
        let task_id = parse_uuid(params, "task_id")?;
        let task = self.fetch(task_id).await?;
        let deleted = self.db.delete_task(task_id).await.map_err(internal)?;
        if !deleted {
            return Err(ProtocolError::new(ErrorCode::TaskNotFound, "task not found"));
        }
        self.bus.publish(Event::TaskDeleted {
            task_id,
            project_id: task.project_id,
        });
        Ok(json!({ "deleted": true }))
    }

    pub async fn get_scratchpad(&self, params: &Value) -> ServiceResult {
        let task_id = parse_uuid(params, "task_id")?;
        let task = self.fetch(task_id).await?;
        Ok(json!({ "scratchpad": task.scratchpad }))
    }

    pub async fn append_scratchpad(&self, params: &Value) -> ServiceResult {
        let task_id = parse_uuid(params, "task_id")?;
        let text = required_str(params, "text")?;
        let mut task = self.fetch(task_id).await?;
        task.append_scratchpad(text);
        self.db.upsert_task(&task).await.map_err(internal)?;
        self.bus.publish(Event::TaskChanged {
            task_id: task.id,
            project_id: task.project_id,
            status: task.status,
            updated_at: task.updated_at,
        });
        Ok(json!({ "scratchpad": task.scratchpad }))
    }

    pub async fn context(&self, params: &Value) -> ServiceResult {
        let task_id = parse_uuid(params, "task_id")?;
        let task = self.fetch(task_id).await?;
        let mentions = task.linked_task_mentions();
        Ok(json!({ "task": task, "linked_task_mentions": mentions }))
    }

    /// Per-task trail: audit events whose recorded payload references this
    /// task, distinct from the global `audit.list` surface.
    pub async fn logs(&self, params: &Value) -> ServiceResult {
        let task_id = parse_uuid(params, "task_id")?;
        let events = self
            .db
            .list_audit_events(None, 500, None)
            .await
            .map_err(internal)?;
        let matching: Vec<_> = events
            .into_iter()
            .filter(|e| {
                e.payload_json
                    .as_ref()
                    .and_then(|v| v.get("task_id"))
                    .and_then(|v| v.as_str())
                    == Some(task_id.to_string().as_str())
            })
            .collect();
        Ok(json!({ "events": matching }))
    }

    // -----------------------------------------------------------------
    // Lifecycle helpers (§4.6) — each is a no-op when preconditions fail.
    // -----------------------------------------------------------------

    pub async fn sync_status_from_agent_complete(&self, task_id: Uuid, success: bool) -> ServiceResult {
        let mut task = self.fetch(task_id).await?;
        if task.sync_status_from_agent_complete(success) {
            self.db.upsert_task(&task).await.map_err(internal)?;
            self.bus.publish(Event::TaskChanged {
                task_id: task.id,
                project_id: task.project_id,
                status: task.status,
                updated_at: task.updated_at,
            });
        }
        Ok(json!({ "task": task }))
    }

    pub async fn review_request(&self, params: &Value) -> ServiceResult {
        let task_id = parse_uuid(params, "task_id")?;
        self.sync_status_from_agent_complete(task_id, true).await
    }

    pub async fn review_approve(&self, params: &Value) -> ServiceResult {
        let task_id = parse_uuid(params, "task_id")?;
        let mut task = self.fetch(task_id).await?;
        task.review_approved = true;
        let changed = task.sync_status_from_review_pass();
        self.db.upsert_task(&task).await.map_err(internal)?;
        if changed {
            self.bus.publish(Event::TaskChanged {
                task_id: task.id,
                project_id: task.project_id,
                status: task.status,
                updated_at: task.updated_at,
            });
        }
        Ok(json!({ "task": task }))
    }

    pub async fn review_reject(&self, params: &Value) -> ServiceResult {
        let task_id = parse_uuid(params, "task_id")?;
        let reason = params.get("reason").and_then(|v| v.as_str()).unwrap_or("");
        let mut task = self.fetch(task_id).await?;
        let changed = task.sync_status_from_review_reject(reason);
        self.db.upsert_task(&task).await.map_err(internal)?;
        if changed {
            self.bus.publish(Event::TaskChanged {
                task_id: task.id,
                project_id: task.project_id,
                status: task.status,
                updated_at: task.updated_at,
            });
        }
        Ok(json!({ "task": task }))
    }

    // -----------------------------------------------------------------
    // tasks.wait (§4.7)
    // -----------------------------------------------------------------

    pub async fn wait(&self, params: &Value) -> ServiceResult {
        let task_id = parse_uuid(params, "task_id")?;

        let timeout_seconds = match params.get("timeout_seconds") {
            None => DEFAULT_WAIT_TIMEOUT_SECONDS,
            Some(Value::Number(n)) => n
                .as_f64()
                .ok_or_else(|| ProtocolError::new(ErrorCode::InvalidTimeout, "timeout_seconds is not a number"))?,
            Some(_) => {
                return Err(ProtocolError::new(
                    ErrorCode::InvalidTimeout,
                    "timeout_seconds must be numeric",
                ))
            }
        };
        if !(0.0..=MAX_WAIT_TIMEOUT_SECONDS).contains(&timeout_seconds) {
            return Err(ProtocolError::new(
                ErrorCode::InvalidTimeout,
                format!("timeout_seconds must be within [0, {MAX_WAIT_TIMEOUT_SECONDS}]"),
            ));
        }

        let wait_for_status = parse_wait_for_status(params.get("wait_for_status"))?;
        let from_updated_at = match params.get("from_updated_at").and_then(|v| v.as_str()) {
            Some(raw) => Some(
                DateTime::parse_from_rfc3339(raw)
                    .map_err(|_| invalid_params("from_updated_at is not valid ISO-8601"))?
                    .with_timezone(&Utc),
            ),
            None => None,
        };

        // Step 1: resolve task.
        let task = self.fetch(task_id).await?;

        // Step 2: already at target status.
        if let Some(targets) = &wait_for_status {
            if targets.contains(&task.status) {
                return Ok(wait_outcome(true, false, "ALREADY_AT_STATUS", None, Some(task)));
            }
        }

        // Step 3: cursor staleness check.
        if let Some(cursor) = from_updated_at {
            if task.updated_at > cursor {
                return Ok(wait_outcome(true, false, "CHANGED_SINCE_CURSOR", None, Some(task)));
            }
        }

        // Step 4: subscribe, then re-check once before sleeping (race-safe).
        let previous_status = task.status;
        let refetched = self.fetch(task_id).await?;
        if refetched.status != previous_status {
            if wait_for_status
                .as_ref()
                .map(|s| s.contains(&refetched.status))
                .unwrap_or(true)
            {
                return Ok(wait_outcome(
                    true,
                    false,
                    "TASK_CHANGED",
                    Some(previous_status),
                    Some(refetched),
                ));
            }
        }

        let bus = self.bus.clone();
        let wait_for_status2 = wait_for_status.clone();
        let event = wait_for(
            &bus,
            Duration::from_secs_f64(timeout_seconds),
            |event| match event {
                Event::TaskChanged { task_id: id, status, .. } if *id == task_id => {
                    wait_for_status2.as_ref().map(|s| s.contains(status)).unwrap_or(true)
                }
                Event::TaskDeleted { task_id: id, .. } => *id == task_id,
                _ => false,
            },
        )
        .await;

        match event {
            Some(Event::TaskDeleted { .. }) => Ok(wait_outcome(true, false, "TASK_DELETED", None, None)),
            Some(Event::TaskChanged { status, .. }) => {
                let current = self.fetch(task_id).await.ok();
                Ok(wait_outcome(
                    true,
                    false,
                    "TASK_CHANGED",
                    Some(previous_status),
                    current.or(Some(Task { status, ..refetched })),
                ))
            }
            _ => Ok(wait_outcome(false, true, "WAIT_TIMEOUT", None, None)),
        }
    }

    async fn fetch(&self, task_id: Uuid) -> Result<Task, ProtocolError> {
        self.db
            .get_task(task_id)
            .await
            .map_err(internal)?
            .ok_or_else(|| ProtocolError::new(ErrorCode::TaskNotFound, "task not found"))
    }
}

fn wait_outcome(
    changed: bool,
    timed_out: bool,
    code: &str,
    previous_status: Option<TaskStatus>,
    task: Option<Task>,
) -> Value {
    json!({
        "changed": changed,
        "timed_out": timed_out,
        "code": code,
        "previous_status": previous_status,
        "current_status": task.as_ref().map(|t| t.status),
        "task": task,
    })
}

fn parse_wait_for_status(value: Option<&Value>) -> Result<Option<Vec<TaskStatus>>, ProtocolError> {
    let Some(value) = value else { return Ok(None) };
    let names: Vec<String> = match value {
        Value::String(s) => s.split(',').map(|s| s.trim().to_string()).collect(),
        Value::Array(items) => items
            .iter()
            .filter_map(|v| v.as_str().map(String::from))
            .collect(),
        Value::Null => return Ok(None),
        _ => return Err(invalid_params("wait_for_status must be a string or array")),
    };
    let mut statuses = Vec::with_capacity(names.len());
    for name in names {
        statuses.push(parse_status(&name)?);
    }
    Ok(Some(statuses))
}

fn parse_status(raw: &str) -> Result<TaskStatus, ProtocolError> {
    match raw.to_ascii_uppercase().as_str() {
        "BACKLOG" => Ok(TaskStatus::Backlog),
        "IN_PROGRESS" => Ok(TaskStatus::InProgress),
        "REVIEW" => Ok(TaskStatus::Review),
        "DONE" => Ok(TaskStatus::Done),
        other => Err(invalid_params(format!("unknown status '{other}'"))),
    }
}

fn parse_priority(raw: &str) -> Result<TaskPriority, ProtocolError> {
    match raw.to_ascii_uppercase().as_str() {
        "LOW" => Ok(TaskPriority::Low),
        "MEDIUM" => Ok(TaskPriority::Medium),
        "HIGH" => Ok(TaskPriority::High),
        other => Err(invalid_params(format!("unknown priority '{other}'"))),
    }
}

fn parse_uuid(params: &Value, field: &str) -> Result<Uuid, ProtocolError> {
    let raw = required_str(params, field)?;
    Uuid::parse_str(raw).map_err(|_| invalid_params(format!("{field} is not a valid uuid")))
}

fn required_str<'a>(params: &'a Value, field: &str) -> Result<&'a str, ProtocolError> {
    params
        .get(field)
        .and_then(|v| v.as_str())
        .ok_or_else(|| invalid_params(format!("missing required param '{field}'")))
}

fn invalid_params(message: impl Into<String>) -> ProtocolError {
    ProtocolError::new(ErrorCode::InvalidParams, message)
}

fn internal(err: impl std::fmt::Display) -> ProtocolError {
    tracing::error!(error = %err, "task service internal error");
    ProtocolError::new(ErrorCode::InternalError, "internal error")
}
