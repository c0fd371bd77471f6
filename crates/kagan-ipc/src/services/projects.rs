//! Project and repo lifecycle (§4.6 neighbour: the container tasks live
//! under). Thin CRUD over `kagan_core::db::Db`.

use std::sync::Arc;

use kagan_core::db::Db;
use kagan_core::types::{ProjectRepo, Repo, Project};
use kagan_protocol::{ErrorCode, ProtocolError};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::ServiceResult;

pub struct ProjectService {
    db: Arc<Db>,
}

impl ProjectService {
    pub fn new(db: Arc<Db>) -> Self {
        Self { db }
    }

    pub async fn create(&self, params: &Value) -> ServiceResult {
        let name = required_str(params, "name")?;
        let mut project = Project::new(name).map_err(invalid_params)?;
        if let Some(description) = params.get("description").and_then(|v| v.as_str()) {
            project.description = description.to_string();
        }
        self.db.upsert_project(&project).await.map_err(internal)?;
        Ok(json!({ "project": project }))
    }

    pub async fn get(&self, params: &Value) -> ServiceResult {
        let project_id = parse_uuid(params, "project_id")?;
        let project = self
            .db
            .get_project(project_id)
            .await
            .map_err(internal)?
            .ok_or_else(|| ProtocolError::new(ErrorCode::TaskNotFound, "project not found"))?;
        Ok(json!({ "project": project }))
    }

    pub async fn list(&self, _params: &Value) -> ServiceResult {
        let projects = self.db.list_projects().await.map_err(internal)?;
        Ok(json!({ "projects": projects }))
    }

    pub async fn add_repo(&self, params: &Value) -> ServiceResult {
        let project_id = parse_uuid(params, "project_id")?;
        let name = required_str(params, "name")?;
        let path = required_str(params, "path")?;
        let default_branch = params
            .get("default_branch")
            .and_then(|v| v.as_str())
            .unwrap_or("main");

        let repo = Repo {
            id: Uuid::new_v4(),
            name: name.to_string(),
            path: path.to_string(),
            default_branch: default_branch.to_string(),
            scripts: Default::default(),
        };
        self.db.upsert_repo(&repo).await.map_err(internal)?;
        self.db
            .link_project_repo(&ProjectRepo {
                project_id,
                repo_id: repo.id,
                is_primary: params.get("is_primary").and_then(|v| v.as_bool()).unwrap_or(false),
                display_order: params.get("display_order").and_then(|v| v.as_i64()).unwrap_or(0),
            })
            .await
            .map_err(internal)?;
        Ok(json!({ "repo": repo }))
    }

    pub async fn list_repos(&self, params: &Value) -> ServiceResult {
        let project_id = parse_uuid(params, "project_id")?;
        let repos = self
            .db
            .list_repos_for_project(project_id)
            .await
            .map_err(internal)?;
        Ok(json!({ "repos": repos }))
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
    tracing::error!(error = %err, "project service internal error");
    ProtocolError::new(ErrorCode::InternalError, "internal error")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_project_rejects_blank_name() {
        let db = Arc::new(Db::open_in_memory().await.unwrap());
        let svc = ProjectService::new(db);
        let err = svc.create(&json!({"name": "   "})).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidParams);
    }

    #[tokio::test]
    async fn add_repo_links_to_project() {
        let db = Arc::new(Db::open_in_memory().await.unwrap());
        let svc = ProjectService::new(db);
        let created = svc.create(&json!({"name": "demo"})).await.unwrap();
        let project_id = created["project"]["id"].as_str().unwrap().to_string();

        svc.add_repo(&json!({"project_id": project_id, "name": "core", "path": "/tmp/core"}))
            .await
            .unwrap();
        let repos = svc.list_repos(&json!({"project_id": project_id})).await.unwrap();
        assert_eq!(repos["repos"].as_array().unwrap().len(), 1);
    }
}
