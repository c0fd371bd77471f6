//! Session origin, namespace, and the profile-ceiling / allowed-namespace
//! tables (spec §4.4). Ported from `session_binding.py` semantics exactly.

use serde::{Deserialize, Serialize};

use crate::authz::CapabilityProfile;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionOrigin {
    Legacy,
    Kagan,
    KaganAdmin,
}

impl SessionOrigin {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "" => Some(SessionOrigin::Legacy),
            "legacy" => Some(SessionOrigin::Legacy),
            "kagan" => Some(SessionOrigin::Kagan),
            "kagan_admin" => Some(SessionOrigin::KaganAdmin),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SessionOrigin::Legacy => "legacy",
            SessionOrigin::Kagan => "kagan",
            SessionOrigin::KaganAdmin => "kagan_admin",
        }
    }

    /// The highest profile this origin may bind to; requests above the
    /// ceiling are silently clamped.
    pub fn profile_ceiling(self) -> CapabilityProfile {
        match self {
            SessionOrigin::Legacy => CapabilityProfile::Maintainer,
            SessionOrigin::Kagan => CapabilityProfile::PairWorker,
            SessionOrigin::KaganAdmin => CapabilityProfile::Maintainer,
        }
    }

    pub fn allows_namespace(self, namespace: SessionNamespace) -> bool {
        match self {
            SessionOrigin::Legacy => true,
            SessionOrigin::Kagan => !matches!(namespace, SessionNamespace::Ext),
            SessionOrigin::KaganAdmin => matches!(namespace, SessionNamespace::Ext),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionNamespace {
    Default,
    Task,
    Planner,
    Ext,
}

impl SessionNamespace {
    fn parse(value: &str) -> Option<Self> {
        match value {
            "default" => Some(SessionNamespace::Default),
            "task" => Some(SessionNamespace::Task),
            "planner" => Some(SessionNamespace::Planner),
            "ext" => Some(SessionNamespace::Ext),
            _ => None,
        }
    }

    fn is_scoped(self) -> bool {
        matches!(
            self,
            SessionNamespace::Task | SessionNamespace::Planner | SessionNamespace::Ext
        )
    }
}

/// The set of `(capability, method)` pairs that require the session's
/// `scope_id` to match `params.task_id` when the session is task-scoped.
const TASK_MUTATION_METHODS: &[(&str, &str)] = &[
    ("jobs", "submit"),
    ("jobs", "get"),
    ("jobs", "wait"),
    ("jobs", "events"),
    ("jobs", "cancel"),
    ("tasks", "update_scratchpad"),
    ("tasks", "delete"),
    ("review", "request"),
];

pub fn is_task_mutation_method(capability: &str, method: &str) -> bool {
    TASK_MUTATION_METHODS
        .iter()
        .any(|(c, m)| *c == capability && *m == method)
}

/// Parse `session_id` into `(namespace, scope_id)` per spec §4.4: a
/// `prefix:scope` form for task/planner/ext, the legacy bare `ABC-123` form
/// mapping to `task`, or `default` otherwise.
pub fn parse_session_scope(session_id: &str) -> (SessionNamespace, String) {
    if let Some((prefix, scope)) = session_id.split_once(':') {
        if let Some(ns) = SessionNamespace::parse(prefix) {
            if ns.is_scoped() && !scope.is_empty() {
                return (ns, scope.to_string());
            }
        }
    }
    if is_legacy_task_id(session_id) {
        return (SessionNamespace::Task, session_id.to_string());
    }
    (SessionNamespace::Default, session_id.to_string())
}

fn is_legacy_task_id(session_id: &str) -> bool {
    let mut chars = session_id.chars();
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

#[derive(Debug, thiserror::Error)]
#[error("{code}: {message}")]
pub struct SessionBindingError {
    pub code: &'static str,
    pub message: String,
}

impl SessionBindingError {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Resolved, frozen auth context bound to one IPC session for its lifetime.
#[derive(Debug, Clone)]
pub struct SessionBinding {
    pub profile: CapabilityProfile,
    pub origin: SessionOrigin,
    pub namespace: SessionNamespace,
    pub scope_id: String,
}

impl SessionBinding {
    /// Apply the origin's profile ceiling, silently clamping an
    /// over-privileged request rather than rejecting it.
    pub fn effective_profile(
        requested: CapabilityProfile,
        origin: SessionOrigin,
    ) -> CapabilityProfile {
        let ceiling = origin.profile_ceiling();
        if requested.rank() <= ceiling.rank() {
            requested
        } else {
            ceiling
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_task_id_maps_to_task_namespace() {
        let (ns, scope) = parse_session_scope("ABC-123");
        assert_eq!(ns, SessionNamespace::Task);
        assert_eq!(scope, "ABC-123");
    }

    #[test]
    fn prefixed_session_id_parses_namespace_and_scope() {
        let (ns, scope) = parse_session_scope("task:T-9");
        assert_eq!(ns, SessionNamespace::Task);
        assert_eq!(scope, "T-9");
    }

    #[test]
    fn unqualified_id_is_default() {
        let (ns, _) = parse_session_scope("abc123");
        assert_eq!(ns, SessionNamespace::Default);
    }

    #[test]
    fn kagan_origin_excludes_ext_namespace() {
        assert!(!SessionOrigin::Kagan.allows_namespace(SessionNamespace::Ext));
        assert!(SessionOrigin::KaganAdmin.allows_namespace(SessionNamespace::Ext));
    }

    #[test]
    fn over_privileged_request_is_clamped_not_rejected() {
        let effective = SessionBinding::effective_profile(
            CapabilityProfile::Maintainer,
            SessionOrigin::Kagan,
        );
        assert_eq!(effective, CapabilityProfile::PairWorker);
    }

    #[test]
    fn task_mutation_methods_are_recognized() {
        assert!(is_task_mutation_method("jobs", "submit"));
        assert!(!is_task_mutation_method("tasks", "list"));
    }
}
