//! Thin `Value`-in/`Value`-out adapter over `kagan_jobs::JobService` (§4.8).

use std::time::Duration;

use kagan_jobs::job_service::{JobService, JobServiceError};
use kagan_protocol::{ErrorCode, ProtocolError};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::ServiceResult;

const DEFAULT_WAIT_TIMEOUT_SECONDS: f64 = 30.0;

pub struct JobsFacade {
    inner: JobService,
}

impl JobsFacade {
    pub fn new(inner: JobService) -> Self {
        Self { inner }
    }

    pub async fn submit(&self, params: &Value) -> ServiceResult {
        let task_id = parse_uuid(params, "task_id")?;
        let action = required_str(params, "action")?;
        let job = self.inner.submit(task_id, action).await.map_err(map_err)?;
        Ok(json!({ "job": job }))
    }

    pub async fn get(&self, params: &Value) -> ServiceResult {
        let job_id = parse_uuid(params, "job_id")?;
        let job = self.inner.get(job_id).await.map_err(map_err)?;
        Ok(json!({ "job": job }))
    }

    pub async fn cancel(&self, params: &Value) -> ServiceResult {
        let job_id = parse_uuid(params, "job_id")?;
        let job = self.inner.cancel(job_id).await.map_err(map_err)?;
        Ok(json!({ "job": job }))
    }

    pub async fn wait(&self, params: &Value) -> ServiceResult {
        let job_id = parse_uuid(params, "job_id")?;
        let timeout_seconds = params
            .get("timeout_seconds")
            .and_then(|v| v.as_f64())
            .unwrap_or(DEFAULT_WAIT_TIMEOUT_SECONDS);
        let outcome = self
            .inner
            .wait(job_id, Duration::from_secs_f64(timeout_seconds))
            .await
            .map_err(map_err)?;
        Ok(json!({ "job": outcome.job, "timed_out": outcome.timed_out }))
    }

    pub async fn events(&self, params: &Value) -> ServiceResult {
        let job_id = parse_uuid(params, "job_id")?;
        let limit = params.get("limit").and_then(|v| v.as_u64()).unwrap_or(50) as usize;
        let offset = params.get("offset").and_then(|v| v.as_u64()).unwrap_or(0) as usize;
        let page = self.inner.events(job_id, limit, offset).await.map_err(map_err)?;
        Ok(json!({
            "events": page.events,
            "returned_events": page.returned_events,
            "total_events": page.total_events,
            "has_more": page.has_more,
            "next_offset": page.next_offset,
        }))
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

fn map_err(err: JobServiceError) -> ProtocolError {
    match err {
        JobServiceError::NotFound(_) => ProtocolError::new(ErrorCode::JobNotFound, err.to_string()),
        JobServiceError::InvalidTransition { .. } => {
            ProtocolError::new(ErrorCode::InvalidParams, err.to_string())
        }
        JobServiceError::Db(_) => {
            tracing::error!(error = %err, "job service internal error");
            ProtocolError::new(ErrorCode::InternalError, "internal error")
        }
    }
}
