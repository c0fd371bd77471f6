//! Wraps `kagan_protocol::session` with the registry a running daemon
//! needs: binding freeze on first request (§4.4, Testable Property 2) and
//! task-scope enforcement for the mutating methods that must agree with
//! the session's namespace.

use dashmap::DashMap;
use kagan_protocol::authz::DEFAULT_PROFILE;
use kagan_protocol::session::{
    is_task_mutation_method, parse_session_scope, SessionBinding, SessionBindingError,
};
use kagan_protocol::{CapabilityProfile, SessionNamespace, SessionOrigin};

/// Binds are keyed by `session_id`, not by connection — the same logical
/// session may be driven from more than one accepted connection.
#[derive(Default)]
pub struct SessionRegistry {
    bindings: DashMap<String, SessionBinding>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve this request's binding, freezing it on first use. A second
    /// request on the same `session_id` with a different effective
    /// profile or origin is rejected rather than silently re-bound.
    pub fn bind_or_check(
        &self,
        session_id: &str,
        requested_profile: Option<&str>,
        requested_origin: Option<&str>,
    ) -> Result<SessionBinding, SessionBindingError> {
        let origin = match requested_origin {
            Some(raw) => SessionOrigin::parse(raw).ok_or_else(|| {
                SessionBindingError::new("INVALID_ORIGIN", format!("unknown session_origin '{raw}'"))
            })?,
            None => SessionOrigin::Legacy,
        };

        let requested = match requested_profile {
            Some(raw) => CapabilityProfile::parse(raw).ok_or_else(|| {
                SessionBindingError::new("INVALID_PROFILE", format!("unknown session_profile '{raw}'"))
            })?,
            None => DEFAULT_PROFILE,
        };

        let profile = SessionBinding::effective_profile(requested, origin);
        let (namespace, scope_id) = parse_session_scope(session_id);

        if !origin.allows_namespace(namespace) {
            return Err(SessionBindingError::new(
                "SESSION_NAMESPACE_DENIED",
                format!(
                    "origin '{}' may not bind namespace '{namespace:?}'",
                    origin.as_str()
                ),
            ));
        }

        if let Some(existing) = self.bindings.get(session_id) {
            if existing.profile != profile || existing.origin != origin {
                return Err(SessionBindingError::new(
                    "SESSION_ORIGIN_MISMATCH",
                    "session profile/origin cannot change after the first request",
                ));
            }
            return Ok(existing.clone());
        }

        let binding = SessionBinding {
            profile,
            origin,
            namespace,
            scope_id,
        };
        self.bindings.insert(session_id.to_string(), binding.clone());
        Ok(binding)
    }

    /// Drop a binding once its owning connection closes. Safe to call for
    /// a session_id that never bound or that other connections still hold
    /// open — a dropped entry just re-binds fresh on the next request.
    pub fn release(&self, session_id: &str) {
        self.bindings.remove(session_id);
    }
}

/// §4.4 task-scope enforcement: a task-namespace session may only mutate
/// the task it is scoped to.
pub fn enforce_task_scope(
    binding: &SessionBinding,
    capability: &str,
    method: &str,
    params: &serde_json::Value,
) -> Result<(), SessionBindingError> {
    if !matches!(binding.namespace, SessionNamespace::Task) {
        return Ok(());
    }
    if !is_task_mutation_method(capability, method) {
        return Ok(());
    }
    let task_id = params.get("task_id").and_then(|v| v.as_str());
    match task_id {
        Some(id) if id == binding.scope_id => Ok(()),
        _ => Err(SessionBindingError::new(
            "SESSION_SCOPE_DENIED",
            format!(
                "task-scoped session '{}' may not act on a different task_id",
                binding.scope_id
            ),
        )),
    }
}
