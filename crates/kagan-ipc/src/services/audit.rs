//! Audit trail (§4.15): append-only, newest-first, capability-filterable.

use std::sync::Arc;

use kagan_core::db::Db;
use kagan_core::types::{ActorType, AuditEvent};
use kagan_protocol::{ErrorCode, ProtocolError};
use serde_json::{json, Value};

use crate::ServiceResult;

const DEFAULT_LIST_LIMIT: i64 = 100;
const MAX_LIST_LIMIT: i64 = 1000;

pub struct AuditService {
    db: Arc<Db>,
}

impl AuditService {
    pub fn new(db: Arc<Db>) -> Self {
        Self { db }
    }

    pub async fn record(
        &self,
        actor_type: ActorType,
        actor_id: &str,
        session_id: Option<String>,
        capability: &str,
        command_name: &str,
        payload: Option<Value>,
        result: Option<Value>,
        success: bool,
    ) -> Result<(), ProtocolError> {
        let mut event = AuditEvent::new(actor_type, actor_id, capability, command_name, success);
        event.session_id = session_id;
        event.payload_json = payload;
        event.result_json = result;
        self.db.record_audit_event(&event).await.map_err(internal)
    }

    pub async fn list(&self, params: &Value) -> ServiceResult {
        let capability = params
            .get("capability")
            .and_then(|v| v.as_str())
            .map(String::from);
        let cursor = params.get("cursor").and_then(|v| v.as_str()).map(String::from);
        let limit = params
            .get("limit")
            .and_then(|v| v.as_i64())
            .unwrap_or(DEFAULT_LIST_LIMIT)
            .clamp(1, MAX_LIST_LIMIT);

        let events = self
            .db
            .list_audit_events(capability, limit, cursor)
            .await
            .map_err(internal)?;
        Ok(json!({ "events": events }))
    }
}

fn internal(err: impl std::fmt::Display) -> ProtocolError {
    tracing::error!(error = %err, "audit service internal error");
    ProtocolError::new(ErrorCode::InternalError, "internal error")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn record_then_list_round_trips() {
        let db = Arc::new(Db::open_in_memory().await.unwrap());
        let svc = AuditService::new(db);
        svc.record(
            ActorType::User,
            "u1",
            Some("s1".into()),
            "tasks",
            "create",
            None,
            None,
            true,
        )
        .await
        .unwrap();

        let result = svc.list(&json!({})).await.unwrap();
        assert_eq!(result["events"].as_array().unwrap().len(), 1);
    }
}
