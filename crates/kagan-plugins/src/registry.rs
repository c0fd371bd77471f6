//! The Plugin Registry (§4.14): holds one immutable manifest and a set of
//! `(capability, method)` operations per registered plugin, and dispatches
//! requests to them after the static profile check and any per-operation
//! policy hook pass.

use std::collections::HashMap;
use std::sync::Arc;

use kagan_protocol::{CapabilityProfile, ErrorCode, ProtocolError};
use serde_json::Value;
use tracing::{info, warn};

use crate::manifest::PluginManifest;
use crate::operation::PluginOperation;
use crate::plugin::Plugin;
use crate::PluginError;

#[derive(Default)]
pub struct PluginRegistry {
    manifests: HashMap<String, PluginManifest>,
    operations: HashMap<(String, String), PluginOperation>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `plugin.register()` and commits its operations only if every
    /// check passes; otherwise nothing from this call is persisted.
    pub async fn register_plugin(&mut self, plugin: Arc<dyn Plugin>) -> Result<(), PluginError> {
        let manifest = plugin.manifest().clone();
        if self.manifests.contains_key(&manifest.id) {
            return Err(PluginError::DuplicateManifest(manifest.id));
        }

        let staged = plugin.register().await.map_err(|message| PluginError::RegistrationFailed {
            plugin_id: manifest.id.clone(),
            message,
        })?;

        if staged.is_empty() {
            return Err(PluginError::ZeroOperations { plugin_id: manifest.id });
        }

        // Check for collisions against the live table and within this
        // plugin's own batch before committing any of it.
        let mut seen_in_batch: HashMap<(String, String), ()> = HashMap::new();
        for op in &staged {
            let key = op.key();
            if let Some(existing) = self.operations.get(&key) {
                return Err(PluginError::DuplicateOperation {
                    capability: key.0,
                    method: key.1,
                    existing_plugin_id: existing.plugin_id.clone(),
                });
            }
            if seen_in_batch.insert(key.clone(), ()).is_some() {
                return Err(PluginError::DuplicateOperation {
                    capability: key.0,
                    method: key.1,
                    existing_plugin_id: manifest.id.clone(),
                });
            }
        }

        info!(plugin_id = %manifest.id, operations = staged.len(), "registered plugin");
        for op in staged {
            self.operations.insert(op.key(), op);
        }
        self.manifests.insert(manifest.id.clone(), manifest);
        Ok(())
    }

    pub fn manifest(&self, plugin_id: &str) -> Option<&PluginManifest> {
        self.manifests.get(plugin_id)
    }

    pub fn manifests(&self) -> impl Iterator<Item = &PluginManifest> {
        self.manifests.values()
    }

    pub fn operations(&self) -> impl Iterator<Item = &PluginOperation> {
        self.operations.values()
    }

    /// Serves one `(capability, method)` call: profile check, then the
    /// per-operation policy hook (if any), then the handler. Hook errors
    /// become `PLUGIN_POLICY_ERROR`, never a silent allow.
    pub async fn dispatch(
        &self,
        capability: &str,
        method: &str,
        profile: CapabilityProfile,
        params: Value,
    ) -> Result<Value, ProtocolError> {
        let op = self
            .operations
            .get(&(capability.to_string(), method.to_string()))
            .ok_or_else(|| {
                ProtocolError::new(
                    ErrorCode::UnknownMethod,
                    format!("no plugin registered for {capability}.{method}"),
                )
            })?;

        if profile.rank() < op.minimum_profile.rank() {
            return Err(ProtocolError::new(
                ErrorCode::AuthorizationDenied,
                format!("{capability}.{method} requires profile {} or higher", op.minimum_profile),
            ));
        }

        if let Some(hook) = &op.policy_hook {
            match hook.check(&params).await {
                Ok(decision) if decision.allowed => {}
                Ok(decision) => {
                    return Err(ProtocolError::new(
                        ErrorCode::PluginPolicyError,
                        decision.reason.unwrap_or_else(|| "denied by plugin policy".to_string()),
                    ));
                }
                Err(message) => {
                    warn!(plugin_id = %op.plugin_id, capability, method, error = %message, "policy hook raised");
                    return Err(ProtocolError::new(ErrorCode::PluginPolicyError, message));
                }
            }
        }

        op.handler.call(params).await
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use serde_json::json;

    use super::*;
    use crate::operation::{PolicyDecision, PolicyHook, PluginHandler};

    struct EchoPlugin {
        manifest: PluginManifest,
    }

    #[async_trait]
    impl Plugin for EchoPlugin {
        fn manifest(&self) -> &PluginManifest {
            &self.manifest
        }

        async fn register(&self) -> Result<Vec<PluginOperation>, String> {
            Ok(vec![PluginOperation {
                plugin_id: self.manifest.id.clone(),
                capability: "notify".to_string(),
                method: "ping".to_string(),
                handler: Arc::new(|params: Value| async move { Ok(params) }),
                minimum_profile: CapabilityProfile::Operator,
                mutating: false,
                description: "echoes params back".to_string(),
                policy_hook: None,
            }])
        }
    }

    struct EmptyPlugin {
        manifest: PluginManifest,
    }

    #[async_trait]
    impl Plugin for EmptyPlugin {
        fn manifest(&self) -> &PluginManifest {
            &self.manifest
        }

        async fn register(&self) -> Result<Vec<PluginOperation>, String> {
            Ok(vec![])
        }
    }

    struct DenyHook;

    #[async_trait]
    impl PolicyHook for DenyHook {
        async fn check(&self, _params: &Value) -> Result<PolicyDecision, String> {
            Ok(PolicyDecision::deny("quota exceeded"))
        }
    }

    struct RaisingHook;

    #[async_trait]
    impl PolicyHook for RaisingHook {
        async fn check(&self, _params: &Value) -> Result<PolicyDecision, String> {
            Err("upstream call failed".to_string())
        }
    }

    fn manifest(id: &str) -> PluginManifest {
        PluginManifest::new(id, id, "0.1.0", "entry").unwrap()
    }

    #[tokio::test]
    async fn registers_and_dispatches() {
        let mut registry = PluginRegistry::new();
        registry
            .register_plugin(Arc::new(EchoPlugin { manifest: manifest("echo-plugin") }))
            .await
            .unwrap();

        let result = registry
            .dispatch("notify", "ping", CapabilityProfile::Maintainer, json!({"msg": "hi"}))
            .await
            .unwrap();
        assert_eq!(result, json!({"msg": "hi"}));
    }

    #[tokio::test]
    async fn zero_operations_is_rejected_and_not_committed() {
        let mut registry = PluginRegistry::new();
        let err = registry
            .register_plugin(Arc::new(EmptyPlugin { manifest: manifest("empty-plugin") }))
            .await
            .unwrap_err();
        assert!(matches!(err, PluginError::ZeroOperations { .. }));
        assert!(registry.manifest("empty-plugin").is_none());
    }

    #[tokio::test]
    async fn duplicate_operation_across_plugins_is_rejected() {
        let mut registry = PluginRegistry::new();
        registry
            .register_plugin(Arc::new(EchoPlugin { manifest: manifest("echo-one") }))
            .await
            .unwrap();

        let err = registry
            .register_plugin(Arc::new(EchoPlugin { manifest: manifest("echo-two") }))
            .await
            .unwrap_err();
        assert!(matches!(err, PluginError::DuplicateOperation { .. }));
        assert!(registry.manifest("echo-two").is_none());
    }

    #[tokio::test]
    async fn below_minimum_profile_is_denied() {
        let mut registry = PluginRegistry::new();
        registry
            .register_plugin(Arc::new(EchoPlugin { manifest: manifest("echo-plugin") }))
            .await
            .unwrap();

        let err = registry
            .dispatch("notify", "ping", CapabilityProfile::Viewer, json!({}))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::AuthorizationDenied);
    }

    #[tokio::test]
    async fn policy_hook_denial_becomes_plugin_policy_error() {
        let mut registry = PluginRegistry::new();
        let op = PluginOperation {
            plugin_id: "gated".to_string(),
            capability: "notify".to_string(),
            method: "send".to_string(),
            handler: Arc::new(|params: Value| async move { Ok(params) }),
            minimum_profile: CapabilityProfile::Viewer,
            mutating: true,
            description: "gated send".to_string(),
            policy_hook: Some(Arc::new(DenyHook)),
        };
        struct GatedPlugin {
            manifest: PluginManifest,
            op: std::sync::Mutex<Option<PluginOperation>>,
        }
        #[async_trait]
        impl Plugin for GatedPlugin {
            fn manifest(&self) -> &PluginManifest {
                &self.manifest
            }
            async fn register(&self) -> Result<Vec<PluginOperation>, String> {
                Ok(vec![self.op.lock().unwrap().take().unwrap()])
            }
        }
        registry
            .register_plugin(Arc::new(GatedPlugin {
                manifest: manifest("gated-plugin"),
                op: std::sync::Mutex::new(Some(op)),
            }))
            .await
            .unwrap();

        let err = registry
            .dispatch("notify", "send", CapabilityProfile::Maintainer, json!({}))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::PluginPolicyError);
        assert_eq!(err.message, "quota exceeded");
    }

    #[tokio::test]
    async fn policy_hook_exception_becomes_plugin_policy_error_not_silent_allow() {
        let mut registry = PluginRegistry::new();
        let op = PluginOperation {
            plugin_id: "raising".to_string(),
            capability: "notify".to_string(),
            method: "raise".to_string(),
            handler: Arc::new(|_: Value| async move { Ok(json!({"should_not_run": true})) }),
            minimum_profile: CapabilityProfile::Viewer,
            mutating: false,
            description: "raising hook".to_string(),
            policy_hook: Some(Arc::new(RaisingHook)),
        };
        struct RaisingPlugin {
            manifest: PluginManifest,
            op: std::sync::Mutex<Option<PluginOperation>>,
        }
        #[async_trait]
        impl Plugin for RaisingPlugin {
            fn manifest(&self) -> &PluginManifest {
                &self.manifest
            }
            async fn register(&self) -> Result<Vec<PluginOperation>, String> {
                Ok(vec![self.op.lock().unwrap().take().unwrap()])
            }
        }
        registry
            .register_plugin(Arc::new(RaisingPlugin {
                manifest: manifest("raising-plugin"),
                op: std::sync::Mutex::new(Some(op)),
            }))
            .await
            .unwrap();

        let err = registry
            .dispatch("notify", "raise", CapabilityProfile::Maintainer, json!({}))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::PluginPolicyError);
    }
}
