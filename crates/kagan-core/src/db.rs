//! Async SQLite persistence for the entities in [`crate::types`].
//!
//! Schema is created declaratively with `CREATE TABLE/INDEX IF NOT EXISTS`
//! on every boot; `PRAGMA user_version` tracks the revision a migration
//! would compare against. Full safe-recreate migration (copy-common-columns,
//! drop, rename) is not exercised by this table set yet — every column
//! added so far is additive — but `schema_version()`/`set_schema_version()`
//! are the hook a future migration would drive off of.

use std::path::Path;

use chrono::Utc;
use tokio_rusqlite::Connection;
use uuid::Uuid;

use crate::types::{
    ActorType, AuditEvent, Job, JobEvent, JobStatus, MergeReadiness, Project, ProjectRepo, Repo,
    Task, TaskPriority, TaskStatus, TaskType, TerminalBackend, Workspace, WorkspaceRepo,
    WorkspaceStatus,
};

pub const SCHEMA_VERSION: i64 = 1;

pub struct Db {
    conn: Connection,
}

fn enum_to_sql<T: serde::Serialize>(val: &T) -> String {
    let s = serde_json::to_string(val).expect("serialize enum");
    s.trim_matches('"').to_string()
}

fn enum_from_sql<T: serde::de::DeserializeOwned>(raw: &str) -> T {
    let quoted = format!("\"{}\"", raw);
    serde_json::from_str(&quoted).expect("deserialize enum")
}

fn parse_rfc3339(s: &str) -> chrono::DateTime<Utc> {
    chrono::DateTime::parse_from_rfc3339(s)
        .expect("valid date")
        .with_timezone(&Utc)
}

impl Db {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, tokio_rusqlite::Error> {
        let conn = Connection::open(path.as_ref()).await?;
        let db = Self { conn };
        db.init_schema().await?;
        Ok(db)
    }

    pub async fn open_in_memory() -> Result<Self, tokio_rusqlite::Error> {
        let conn = Connection::open_in_memory().await?;
        let db = Self { conn };
        db.init_schema().await?;
        Ok(db)
    }

    pub async fn schema_version(&self) -> Result<i64, tokio_rusqlite::Error> {
        self.conn
            .call(|conn| Ok(conn.query_row("PRAGMA user_version", [], |r| r.get(0))?))
            .await
    }

    async fn init_schema(&self) -> Result<(), tokio_rusqlite::Error> {
        self.conn
            .call(move |conn| {
                conn.execute_batch(&format!(
                    "
                    PRAGMA journal_mode=WAL;
                    PRAGMA synchronous=NORMAL;
                    PRAGMA foreign_keys=ON;
                    PRAGMA cache_size=-64000;
                    PRAGMA mmap_size=268435456;
                    PRAGMA temp_store=MEMORY;
                    PRAGMA busy_timeout=5000;
                    PRAGMA user_version={SCHEMA_VERSION};

                    CREATE TABLE IF NOT EXISTS projects (
                        id             TEXT PRIMARY KEY,
                        name           TEXT NOT NULL,
                        description    TEXT NOT NULL DEFAULT '',
                        last_opened_at TEXT
                    );

                    CREATE TABLE IF NOT EXISTS repos (
                        id             TEXT PRIMARY KEY,
                        name           TEXT NOT NULL,
                        path           TEXT NOT NULL,
                        default_branch TEXT NOT NULL,
                        scripts        TEXT NOT NULL DEFAULT '{{}}'
                    );

                    CREATE TABLE IF NOT EXISTS project_repos (
                        project_id    TEXT NOT NULL REFERENCES projects(id),
                        repo_id       TEXT NOT NULL REFERENCES repos(id),
                        is_primary    INTEGER NOT NULL DEFAULT 0,
                        display_order INTEGER NOT NULL DEFAULT 0,
                        PRIMARY KEY (project_id, repo_id)
                    );

                    CREATE TABLE IF NOT EXISTS tasks (
                        id                TEXT PRIMARY KEY,
                        project_id        TEXT NOT NULL REFERENCES projects(id),
                        parent_id         TEXT,
                        title             TEXT NOT NULL,
                        description       TEXT NOT NULL DEFAULT '',
                        status            TEXT NOT NULL,
                        priority          TEXT NOT NULL,
                        task_type         TEXT NOT NULL,
                        terminal_backend  TEXT,
                        agent_backend     TEXT,
                        acceptance_criteria TEXT NOT NULL DEFAULT '[]',
                        base_branch       TEXT,
                        created_at        TEXT NOT NULL,
                        updated_at        TEXT NOT NULL,
                        merge_readiness   TEXT NOT NULL,
                        merge_failed      INTEGER NOT NULL DEFAULT 0,
                        merge_error       TEXT,
                        checks_passed     INTEGER,
                        scratchpad        TEXT NOT NULL DEFAULT '',
                        review_approved   INTEGER NOT NULL DEFAULT 0
                    );

                    CREATE INDEX IF NOT EXISTS idx_tasks_project ON tasks(project_id);
                    CREATE INDEX IF NOT EXISTS idx_tasks_status  ON tasks(status);
                    CREATE INDEX IF NOT EXISTS idx_tasks_updated ON tasks(updated_at);

                    CREATE TABLE IF NOT EXISTS workspaces (
                        id          TEXT PRIMARY KEY,
                        project_id  TEXT NOT NULL REFERENCES projects(id),
                        task_id     TEXT,
                        branch_name TEXT NOT NULL,
                        path        TEXT NOT NULL,
                        status      TEXT NOT NULL
                    );

                    CREATE INDEX IF NOT EXISTS idx_workspaces_status ON workspaces(status);

                    CREATE TABLE IF NOT EXISTS workspace_repos (
                        workspace_id  TEXT NOT NULL REFERENCES workspaces(id),
                        repo_id       TEXT NOT NULL REFERENCES repos(id),
                        worktree_path TEXT NOT NULL,
                        PRIMARY KEY (workspace_id, repo_id)
                    );

                    CREATE TABLE IF NOT EXISTS executions (
                        id         TEXT PRIMARY KEY,
                        task_id    TEXT NOT NULL REFERENCES tasks(id),
                        created_at TEXT NOT NULL,
                        metadata   TEXT NOT NULL DEFAULT '{{}}',
                        log_path   TEXT NOT NULL
                    );

                    CREATE TABLE IF NOT EXISTS audit_events (
                        id           TEXT PRIMARY KEY,
                        occurred_at  TEXT NOT NULL,
                        actor_type   TEXT NOT NULL,
                        actor_id     TEXT NOT NULL,
                        session_id   TEXT,
                        capability   TEXT NOT NULL,
                        command_name TEXT NOT NULL,
                        payload_json TEXT,
                        result_json  TEXT,
                        success      INTEGER NOT NULL
                    );

                    CREATE INDEX IF NOT EXISTS idx_audit_occurred ON audit_events(occurred_at);
                    CREATE INDEX IF NOT EXISTS idx_audit_capability ON audit_events(capability);

                    CREATE TABLE IF NOT EXISTS jobs (
                        job_id     TEXT PRIMARY KEY,
                        task_id    TEXT NOT NULL REFERENCES tasks(id),
                        action     TEXT NOT NULL,
                        status     TEXT NOT NULL,
                        code       TEXT,
                        message    TEXT NOT NULL DEFAULT '',
                        result     TEXT,
                        created_at TEXT NOT NULL,
                        updated_at TEXT NOT NULL,
                        events     TEXT NOT NULL DEFAULT '[]'
                    );

                    CREATE INDEX IF NOT EXISTS idx_jobs_task ON jobs(task_id);
                    "
                ))?;
                Ok(())
            })
            .await
    }

    // -----------------------------------------------------------------------
    // Projects
    // -----------------------------------------------------------------------

    pub async fn upsert_project(&self, project: &Project) -> Result<(), tokio_rusqlite::Error> {
        let id = project.id.to_string();
        let name = project.name.clone();
        let description = project.description.clone();
        let last_opened_at = project.last_opened_at.map(|d| d.to_rfc3339());
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO projects (id, name, description, last_opened_at)
                     VALUES (?1,?2,?3,?4)
                     ON CONFLICT(id) DO UPDATE SET
                        name=excluded.name, description=excluded.description,
                        last_opened_at=excluded.last_opened_at",
                    rusqlite::params![id, name, description, last_opened_at],
                )?;
                Ok(())
            })
            .await
    }

    pub async fn get_project(&self, id: Uuid) -> Result<Option<Project>, tokio_rusqlite::Error> {
        let id_str = id.to_string();
        self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, name, description, last_opened_at FROM projects WHERE id = ?1",
                )?;
                let mut rows = stmt.query(rusqlite::params![id_str])?;
                match rows.next()? {
                    Some(row) => Ok(Some(row_to_project(row)?)),
                    None => Ok(None),
                }
            })
            .await
    }

    pub async fn list_projects(&self) -> Result<Vec<Project>, tokio_rusqlite::Error> {
        self.conn
            .call(|conn| {
                let mut stmt = conn
                    .prepare("SELECT id, name, description, last_opened_at FROM projects ORDER BY name")?;
                let mut rows = stmt.query([])?;
                let mut out = Vec::new();
                while let Some(row) = rows.next()? {
                    out.push(row_to_project(row)?);
                }
                Ok(out)
            })
            .await
    }

    // -----------------------------------------------------------------------
    // Repos / ProjectRepo
    // -----------------------------------------------------------------------

    pub async fn upsert_repo(&self, repo: &Repo) -> Result<(), tokio_rusqlite::Error> {
        let id = repo.id.to_string();
        let name = repo.name.clone();
        let path = repo.path.clone();
        let default_branch = repo.default_branch.clone();
        let scripts = serde_json::to_string(&repo.scripts).expect("serialize scripts");
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO repos (id, name, path, default_branch, scripts)
                     VALUES (?1,?2,?3,?4,?5)
                     ON CONFLICT(id) DO UPDATE SET
                        name=excluded.name, path=excluded.path,
                        default_branch=excluded.default_branch, scripts=excluded.scripts",
                    rusqlite::params![id, name, path, default_branch, scripts],
                )?;
                Ok(())
            })
            .await
    }

    pub async fn link_project_repo(&self, link: &ProjectRepo) -> Result<(), tokio_rusqlite::Error> {
        let project_id = link.project_id.to_string();
        let repo_id = link.repo_id.to_string();
        let is_primary = link.is_primary;
        let display_order = link.display_order;
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO project_repos (project_id, repo_id, is_primary, display_order)
                     VALUES (?1,?2,?3,?4)
                     ON CONFLICT(project_id, repo_id) DO UPDATE SET
                        is_primary=excluded.is_primary, display_order=excluded.display_order",
                    rusqlite::params![project_id, repo_id, is_primary, display_order],
                )?;
                Ok(())
            })
            .await
    }

    pub async fn list_repos_for_project(
        &self,
        project_id: Uuid,
    ) -> Result<Vec<Repo>, tokio_rusqlite::Error> {
        let project_id = project_id.to_string();
        self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT r.id, r.name, r.path, r.default_branch, r.scripts
                     FROM repos r JOIN project_repos pr ON pr.repo_id = r.id
                     WHERE pr.project_id = ?1 ORDER BY pr.display_order",
                )?;
                let mut rows = stmt.query(rusqlite::params![project_id])?;
                let mut out = Vec::new();
                while let Some(row) = rows.next()? {
                    out.push(row_to_repo(row)?);
                }
                Ok(out)
            })
            .await
    }

    // -----------------------------------------------------------------------
    // Tasks
    // -----------------------------------------------------------------------

    pub async fn upsert_task(&self, task: &Task) -> Result<(), tokio_rusqlite::Error> {
        let id = task.id.to_string();
        let project_id = task.project_id.to_string();
        let parent_id = task.parent_id.map(|u| u.to_string());
        let title = task.title.clone();
        let description = task.description.clone();
        let status = enum_to_sql(&task.status);
        let priority = enum_to_sql(&task.priority);
        let task_type = enum_to_sql(&task.task_type);
        let terminal_backend = task.terminal_backend.map(|t| t.as_str().to_string());
        let agent_backend = task.agent_backend.clone();
        let acceptance_criteria =
            serde_json::to_string(&task.acceptance_criteria).expect("serialize criteria");
        let base_branch = task.base_branch.clone();
        let created_at = task.created_at.to_rfc3339();
        let updated_at = task.updated_at.to_rfc3339();
        let merge_readiness = enum_to_sql(&task.merge_readiness);
        let merge_failed = task.merge_failed;
        let merge_error = task.merge_error.clone();
        let checks_passed = task.checks_passed;
        let scratchpad = task.scratchpad.clone();
        let review_approved = task.review_approved;

        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO tasks (id, project_id, parent_id, title, description, status,
                        priority, task_type, terminal_backend, agent_backend, acceptance_criteria,
                        base_branch, created_at, updated_at, merge_readiness, merge_failed,
                        merge_error, checks_passed, scratchpad, review_approved)
                     VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17,?18,?19,?20)
                     ON CONFLICT(id) DO UPDATE SET
                        project_id=excluded.project_id, parent_id=excluded.parent_id,
                        title=excluded.title, description=excluded.description,
                        status=excluded.status, priority=excluded.priority,
                        task_type=excluded.task_type, terminal_backend=excluded.terminal_backend,
                        agent_backend=excluded.agent_backend,
                        acceptance_criteria=excluded.acceptance_criteria,
                        base_branch=excluded.base_branch, updated_at=excluded.updated_at,
                        merge_readiness=excluded.merge_readiness, merge_failed=excluded.merge_failed,
                        merge_error=excluded.merge_error, checks_passed=excluded.checks_passed,
                        scratchpad=excluded.scratchpad, review_approved=excluded.review_approved",
                    rusqlite::params![
                        id, project_id, parent_id, title, description, status, priority,
                        task_type, terminal_backend, agent_backend, acceptance_criteria,
                        base_branch, created_at, updated_at, merge_readiness, merge_failed,
                        merge_error, checks_passed, scratchpad, review_approved,
                    ],
                )?;
                Ok(())
            })
            .await
    }

    pub async fn get_task(&self, id: Uuid) -> Result<Option<Task>, tokio_rusqlite::Error> {
        let id_str = id.to_string();
        self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare(TASK_SELECT_COLUMNS)?;
                let mut rows = stmt.query(rusqlite::params![id_str])?;
                match rows.next()? {
                    Some(row) => Ok(Some(row_to_task(row)?)),
                    None => Ok(None),
                }
            })
            .await
    }

    pub async fn list_tasks_for_project(
        &self,
        project_id: Uuid,
    ) -> Result<Vec<Task>, tokio_rusqlite::Error> {
        let project_id = project_id.to_string();
        self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT id, project_id, parent_id, title, description, status, priority,
                            task_type, terminal_backend, agent_backend, acceptance_criteria,
                            base_branch, created_at, updated_at, merge_readiness, merge_failed,
                            merge_error, checks_passed, scratchpad, review_approved
                     FROM tasks WHERE project_id = ?1 ORDER BY created_at"
                ))?;
                let mut rows = stmt.query(rusqlite::params![project_id])?;
                let mut out = Vec::new();
                while let Some(row) = rows.next()? {
                    out.push(row_to_task(row)?);
                }
                Ok(out)
            })
            .await
    }

    pub async fn delete_task(&self, id: Uuid) -> Result<bool, tokio_rusqlite::Error> {
        let id_str = id.to_string();
        self.conn
            .call(move |conn| {
                let changed = conn.execute("DELETE FROM tasks WHERE id = ?1", rusqlite::params![id_str])?;
                Ok(changed > 0)
            })
            .await
    }

    // -----------------------------------------------------------------------
    // Workspaces
    // -----------------------------------------------------------------------

    pub async fn upsert_workspace(&self, workspace: &Workspace) -> Result<(), tokio_rusqlite::Error> {
        let id = workspace.id.to_string();
        let project_id = workspace.project_id.to_string();
        let task_id = workspace.task_id.map(|u| u.to_string());
        let branch_name = workspace.branch_name.clone();
        let path = workspace.path.clone();
        let status = enum_to_sql(&workspace.status);
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO workspaces (id, project_id, task_id, branch_name, path, status)
                     VALUES (?1,?2,?3,?4,?5,?6)
                     ON CONFLICT(id) DO UPDATE SET
                        task_id=excluded.task_id, status=excluded.status",
                    rusqlite::params![id, project_id, task_id, branch_name, path, status],
                )?;
                Ok(())
            })
            .await
    }

    pub async fn list_active_workspaces(&self) -> Result<Vec<Workspace>, tokio_rusqlite::Error> {
        self.conn
            .call(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, project_id, task_id, branch_name, path, status
                     FROM workspaces WHERE status = 'ACTIVE'",
                )?;
                let mut rows = stmt.query([])?;
                let mut out = Vec::new();
                while let Some(row) = rows.next()? {
                    out.push(row_to_workspace(row)?);
                }
                Ok(out)
            })
            .await
    }

    pub async fn link_workspace_repo(
        &self,
        link: &WorkspaceRepo,
    ) -> Result<(), tokio_rusqlite::Error> {
        let workspace_id = link.workspace_id.to_string();
        let repo_id = link.repo_id.to_string();
        let worktree_path = link.worktree_path.clone();
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO workspace_repos (workspace_id, repo_id, worktree_path)
                     VALUES (?1,?2,?3)
                     ON CONFLICT(workspace_id, repo_id) DO UPDATE SET worktree_path=excluded.worktree_path",
                    rusqlite::params![workspace_id, repo_id, worktree_path],
                )?;
                Ok(())
            })
            .await
    }

    // -----------------------------------------------------------------------
    // Jobs
    // -----------------------------------------------------------------------

    pub async fn upsert_job(&self, job: &Job) -> Result<(), tokio_rusqlite::Error> {
        let job_id = job.job_id.to_string();
        let task_id = job.task_id.to_string();
        let action = job.action.clone();
        let status = enum_to_sql(&job.status);
        let code = job.code.clone();
        let message = job.message.clone();
        let result = job.result.as_ref().map(|v| v.to_string());
        let created_at = job.created_at.to_rfc3339();
        let updated_at = job.updated_at.to_rfc3339();
        let events = serde_json::to_string(&job.events).expect("serialize events");
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO jobs (job_id, task_id, action, status, code, message, result,
                        created_at, updated_at, events)
                     VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10)
                     ON CONFLICT(job_id) DO UPDATE SET
                        status=excluded.status, code=excluded.code, message=excluded.message,
                        result=excluded.result, updated_at=excluded.updated_at,
                        events=excluded.events",
                    rusqlite::params![
                        job_id, task_id, action, status, code, message, result, created_at,
                        updated_at, events,
                    ],
                )?;
                Ok(())
            })
            .await
    }

    pub async fn get_job(&self, job_id: Uuid) -> Result<Option<Job>, tokio_rusqlite::Error> {
        let job_id_str = job_id.to_string();
        self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT job_id, task_id, action, status, code, message, result,
                            created_at, updated_at, events
                     FROM jobs WHERE job_id = ?1",
                )?;
                let mut rows = stmt.query(rusqlite::params![job_id_str])?;
                match rows.next()? {
                    Some(row) => Ok(Some(row_to_job(row)?)),
                    None => Ok(None),
                }
            })
            .await
    }

    // -----------------------------------------------------------------------
    // Audit
    // -----------------------------------------------------------------------

    pub async fn record_audit_event(&self, event: &AuditEvent) -> Result<(), tokio_rusqlite::Error> {
        let id = event.id.clone();
        let occurred_at = event.occurred_at.to_rfc3339();
        let actor_type = enum_to_sql(&event.actor_type);
        let actor_id = event.actor_id.clone();
        let session_id = event.session_id.clone();
        let capability = event.capability.clone();
        let command_name = event.command_name.clone();
        let payload_json = event.payload_json.as_ref().map(|v| v.to_string());
        let result_json = event.result_json.as_ref().map(|v| v.to_string());
        let success = event.success;
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO audit_events (id, occurred_at, actor_type, actor_id, session_id,
                        capability, command_name, payload_json, result_json, success)
                     VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10)",
                    rusqlite::params![
                        id, occurred_at, actor_type, actor_id, session_id, capability,
                        command_name, payload_json, result_json, success,
                    ],
                )?;
                Ok(())
            })
            .await
    }

    /// Newest-first; `cursor` is the `occurred_at` of the last row the caller
    /// has already seen.
    pub async fn list_audit_events(
        &self,
        capability: Option<String>,
        limit: i64,
        cursor: Option<String>,
    ) -> Result<Vec<AuditEvent>, tokio_rusqlite::Error> {
        self.conn
            .call(move |conn| {
                let mut sql = String::from(
                    "SELECT id, occurred_at, actor_type, actor_id, session_id, capability,
                            command_name, payload_json, result_json, success
                     FROM audit_events WHERE 1=1",
                );
                if capability.is_some() {
                    sql.push_str(" AND capability = ?1");
                }
                if cursor.is_some() {
                    sql.push_str(if capability.is_some() {
                        " AND occurred_at < ?2"
                    } else {
                        " AND occurred_at < ?1"
                    });
                }
                sql.push_str(" ORDER BY occurred_at DESC LIMIT ?");
                sql = sql.replacen("LIMIT ?", &format!("LIMIT {limit}"), 1);

                let mut stmt = conn.prepare(&sql)?;
                let mut out = Vec::new();
                let rows_iter = match (&capability, &cursor) {
                    (Some(cap), Some(c)) => stmt.query(rusqlite::params![cap, c]),
                    (Some(cap), None) => stmt.query(rusqlite::params![cap]),
                    (None, Some(c)) => stmt.query(rusqlite::params![c]),
                    (None, None) => stmt.query([]),
                };
                let mut rows = rows_iter?;
                while let Some(row) = rows.next()? {
                    out.push(row_to_audit_event(row)?);
                }
                Ok(out)
            })
            .await
    }
}

const TASK_SELECT_COLUMNS: &str = "SELECT id, project_id, parent_id, title, description, status,
    priority, task_type, terminal_backend, agent_backend, acceptance_criteria, base_branch,
    created_at, updated_at, merge_readiness, merge_failed, merge_error, checks_passed,
    scratchpad, review_approved FROM tasks WHERE id = ?1";

fn row_to_project(row: &rusqlite::Row<'_>) -> rusqlite::Result<Project> {
    let id_str: String = row.get(0)?;
    let last_opened_str: Option<String> = row.get(3)?;
    Ok(Project {
        id: Uuid::parse_str(&id_str).expect("valid uuid"),
        name: row.get(1)?,
        description: row.get(2)?,
        last_opened_at: last_opened_str.map(|s| parse_rfc3339(&s)),
    })
}

fn row_to_repo(row: &rusqlite::Row<'_>) -> rusqlite::Result<Repo> {
    let id_str: String = row.get(0)?;
    let scripts_str: String = row.get(4)?;
    Ok(Repo {
        id: Uuid::parse_str(&id_str).expect("valid uuid"),
        name: row.get(1)?,
        path: row.get(2)?,
        default_branch: row.get(3)?,
        scripts: serde_json::from_str(&scripts_str).unwrap_or_default(),
    })
}

fn row_to_task(row: &rusqlite::Row<'_>) -> rusqlite::Result<Task> {
    let id_str: String = row.get(0)?;
    let project_id_str: String = row.get(1)?;
    let parent_id_str: Option<String> = row.get(2)?;
    let status_str: String = row.get(5)?;
    let priority_str: String = row.get(6)?;
    let task_type_str: String = row.get(7)?;
    let terminal_backend_str: Option<String> = row.get(8)?;
    let acceptance_criteria_str: String = row.get(10)?;
    let created_at_str: String = row.get(12)?;
    let updated_at_str: String = row.get(13)?;
    let merge_readiness_str: String = row.get(14)?;

    Ok(Task {
        id: Uuid::parse_str(&id_str).expect("valid uuid"),
        project_id: Uuid::parse_str(&project_id_str).expect("valid uuid"),
        parent_id: parent_id_str.map(|s| Uuid::parse_str(&s).expect("valid uuid")),
        title: row.get(3)?,
        description: row.get(4)?,
        status: enum_from_sql::<TaskStatus>(&status_str),
        priority: enum_from_sql::<TaskPriority>(&priority_str),
        task_type: enum_from_sql::<TaskType>(&task_type_str),
        terminal_backend: terminal_backend_str.and_then(|s| TerminalBackend::parse(&s)),
        agent_backend: row.get(9)?,
        acceptance_criteria: serde_json::from_str(&acceptance_criteria_str).unwrap_or_default(),
        base_branch: row.get(11)?,
        created_at: parse_rfc3339(&created_at_str),
        updated_at: parse_rfc3339(&updated_at_str),
        merge_readiness: enum_from_sql::<MergeReadiness>(&merge_readiness_str),
        merge_failed: row.get(15)?,
        merge_error: row.get(16)?,
        checks_passed: row.get(17)?,
        scratchpad: row.get(18)?,
        review_approved: row.get(19)?,
    })
}

fn row_to_workspace(row: &rusqlite::Row<'_>) -> rusqlite::Result<Workspace> {
    let id_str: String = row.get(0)?;
    let project_id_str: String = row.get(1)?;
    let task_id_str: Option<String> = row.get(2)?;
    let status_str: String = row.get(5)?;
    Ok(Workspace {
        id: Uuid::parse_str(&id_str).expect("valid uuid"),
        project_id: Uuid::parse_str(&project_id_str).expect("valid uuid"),
        task_id: task_id_str.map(|s| Uuid::parse_str(&s).expect("valid uuid")),
        branch_name: row.get(3)?,
        path: row.get(4)?,
        status: enum_from_sql::<WorkspaceStatus>(&status_str),
    })
}

fn row_to_job(row: &rusqlite::Row<'_>) -> rusqlite::Result<Job> {
    let job_id_str: String = row.get(0)?;
    let task_id_str: String = row.get(1)?;
    let status_str: String = row.get(3)?;
    let result_str: Option<String> = row.get(6)?;
    let created_at_str: String = row.get(7)?;
    let updated_at_str: String = row.get(8)?;
    let events_str: String = row.get(9)?;
    Ok(Job {
        job_id: Uuid::parse_str(&job_id_str).expect("valid uuid"),
        task_id: Uuid::parse_str(&task_id_str).expect("valid uuid"),
        action: row.get(2)?,
        status: enum_from_sql::<JobStatus>(&status_str),
        code: row.get(4)?,
        message: row.get(5)?,
        result: result_str.map(|s| serde_json::from_str(&s).expect("valid json")),
        created_at: parse_rfc3339(&created_at_str),
        updated_at: parse_rfc3339(&updated_at_str),
        events: serde_json::from_str::<Vec<JobEvent>>(&events_str).unwrap_or_default(),
    })
}

fn row_to_audit_event(row: &rusqlite::Row<'_>) -> rusqlite::Result<AuditEvent> {
    let occurred_at_str: String = row.get(1)?;
    let actor_type_str: String = row.get(2)?;
    let payload_str: Option<String> = row.get(7)?;
    let result_str: Option<String> = row.get(8)?;
    Ok(AuditEvent {
        id: row.get(0)?,
        occurred_at: parse_rfc3339(&occurred_at_str),
        actor_type: enum_from_sql::<ActorType>(&actor_type_str),
        actor_id: row.get(3)?,
        session_id: row.get(4)?,
        capability: row.get(5)?,
        command_name: row.get(6)?,
        payload_json: payload_str.map(|s| serde_json::from_str(&s).expect("valid json")),
        result_json: result_str.map(|s| serde_json::from_str(&s).expect("valid json")),
        success: row.get(9)?,
    })
}
