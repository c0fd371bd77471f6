//! A single `(capability, method)` a plugin contributes to the dispatcher,
//! plus the handler and optional policy hook invoked to serve it.

use std::sync::Arc;

use async_trait::async_trait;
use kagan_protocol::{CapabilityProfile, ProtocolError};
use serde_json::Value;

/// What actually runs when a request matches this operation's
/// `(capability, method)`.
#[async_trait]
pub trait PluginHandler: Send + Sync {
    async fn call(&self, params: Value) -> Result<Value, ProtocolError>;
}

#[async_trait]
impl<F, Fut> PluginHandler for F
where
    F: Fn(Value) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = Result<Value, ProtocolError>> + Send,
{
    async fn call(&self, params: Value) -> Result<Value, ProtocolError> {
        (self)(params).await
    }
}

/// A decision returned by a [`PolicyHook`]; `allowed = false` always carries
/// a reason so the denial can be surfaced to the caller.
#[derive(Debug, Clone)]
pub struct PolicyDecision {
    pub allowed: bool,
    pub reason: Option<String>,
}

impl PolicyDecision {
    pub fn allow() -> Self {
        Self { allowed: true, reason: None }
    }

    pub fn deny(reason: impl Into<String>) -> Self {
        Self { allowed: false, reason: Some(reason.into()) }
    }
}

/// Runs after the static profile check passes. Invoked per-operation;
/// exceptions (an `Err` return) become `PLUGIN_POLICY_ERROR` denials rather
/// than silently allowing the call through.
#[async_trait]
pub trait PolicyHook: Send + Sync {
    async fn check(&self, params: &Value) -> Result<PolicyDecision, String>;
}

pub struct PluginOperation {
    pub plugin_id: String,
    pub capability: String,
    pub method: String,
    pub handler: Arc<dyn PluginHandler>,
    pub minimum_profile: CapabilityProfile,
    pub mutating: bool,
    pub description: String,
    pub policy_hook: Option<Arc<dyn PolicyHook>>,
}

impl PluginOperation {
    pub fn key(&self) -> (String, String) {
        (self.capability.clone(), self.method.clone())
    }
}
