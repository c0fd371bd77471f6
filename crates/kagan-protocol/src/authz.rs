//! Capability profiles and the static `(capability, method)` authorization
//! table (spec §4.3). The table is reproduced exactly, not derived.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::OnceLock;

/// Ordered capability profiles. `viewer < planner < pair_worker < operator <
/// maintainer`; `maintainer` is unrestricted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapabilityProfile {
    Viewer,
    Planner,
    PairWorker,
    Operator,
    Maintainer,
}

impl CapabilityProfile {
    pub fn rank(self) -> u8 {
        match self {
            CapabilityProfile::Viewer => 0,
            CapabilityProfile::Planner => 1,
            CapabilityProfile::PairWorker => 2,
            CapabilityProfile::Operator => 3,
            CapabilityProfile::Maintainer => 4,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CapabilityProfile::Viewer => "viewer",
            CapabilityProfile::Planner => "planner",
            CapabilityProfile::PairWorker => "pair_worker",
            CapabilityProfile::Operator => "operator",
            CapabilityProfile::Maintainer => "maintainer",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "viewer" => Some(CapabilityProfile::Viewer),
            "planner" => Some(CapabilityProfile::Planner),
            "pair_worker" => Some(CapabilityProfile::PairWorker),
            "operator" => Some(CapabilityProfile::Operator),
            "maintainer" => Some(CapabilityProfile::Maintainer),
            _ => None,
        }
    }
}

impl std::fmt::Display for CapabilityProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

pub const DEFAULT_PROFILE: CapabilityProfile = CapabilityProfile::Viewer;

type CapabilityMethod = (&'static str, &'static str);

const VIEWER_METHODS: &[CapabilityMethod] = &[
    ("tasks", "context"),
    ("tasks", "get"),
    ("tasks", "list"),
    ("tasks", "logs"),
    ("tasks", "scratchpad"),
    ("projects", "get"),
    ("projects", "list"),
    ("projects", "repos"),
    ("audit", "list"),
];

const PLANNER_EXTRA: &[CapabilityMethod] = &[("plan", "propose")];

const PAIR_WORKER_EXTRA: &[CapabilityMethod] = &[
    ("tasks", "update_scratchpad"),
    ("jobs", "submit"),
    ("jobs", "get"),
    ("jobs", "wait"),
    ("jobs", "events"),
    ("jobs", "cancel"),
    ("review", "request"),
    ("sessions", "create"),
    ("sessions", "attach"),
    ("sessions", "exists"),
    ("sessions", "kill"),
];

const OPERATOR_EXTRA: &[CapabilityMethod] = &[
    ("tasks", "create"),
    ("tasks", "update"),
    ("tasks", "move"),
    ("review", "approve"),
    ("review", "reject"),
];

const MAINTAINER_EXTRA: &[CapabilityMethod] = &[
    ("tasks", "delete"),
    ("review", "merge"),
    ("review", "rebase"),
    ("projects", "create"),
    ("projects", "open"),
    ("diagnostics", "instrumentation"),
    ("diagnostics", "janitor_sweep"),
    ("settings", "get"),
    ("settings", "update"),
];

fn allowed_for(profile: CapabilityProfile) -> &'static HashSet<CapabilityMethod> {
    static TABLES: OnceLock<[HashSet<CapabilityMethod>; 5]> = OnceLock::new();
    let tables = TABLES.get_or_init(|| {
        let viewer: HashSet<CapabilityMethod> = VIEWER_METHODS.iter().copied().collect();
        let mut planner = viewer.clone();
        planner.extend(PLANNER_EXTRA.iter().copied());
        let mut pair_worker = planner.clone();
        pair_worker.extend(PAIR_WORKER_EXTRA.iter().copied());
        let mut operator = pair_worker.clone();
        operator.extend(OPERATOR_EXTRA.iter().copied());
        let mut maintainer = operator.clone();
        maintainer.extend(MAINTAINER_EXTRA.iter().copied());
        [viewer, planner, pair_worker, operator, maintainer]
    });
    &tables[profile.rank() as usize]
}

/// Raised when a profile attempts a call outside its allowed set.
#[derive(Debug, thiserror::Error)]
#[error("profile '{profile}' is not authorized for {capability}.{method}")]
pub struct AuthorizationError {
    pub capability: String,
    pub method: String,
    pub profile: String,
}

/// Checks whether a profile may invoke a given `(capability, method)` pair.
#[derive(Debug, Clone, Copy)]
pub struct AuthorizationPolicy {
    profile: CapabilityProfile,
}

impl AuthorizationPolicy {
    pub fn new(profile: CapabilityProfile) -> Self {
        Self { profile }
    }

    pub fn profile(&self) -> CapabilityProfile {
        self.profile
    }

    /// `maintainer` is unrestricted and always returns `true`.
    pub fn check(&self, capability: &str, method: &str) -> bool {
        if matches!(self.profile, CapabilityProfile::Maintainer) {
            return true;
        }
        allowed_for(self.profile)
            .iter()
            .any(|(c, m)| *c == capability && *m == method)
    }

    pub fn enforce(&self, capability: &str, method: &str) -> Result<(), AuthorizationError> {
        if self.check(capability, method) {
            Ok(())
        } else {
            Err(AuthorizationError {
                capability: capability.to_string(),
                method: method.to_string(),
                profile: self.profile.as_str().to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn viewer_can_list_tasks_but_not_delete() {
        let policy = AuthorizationPolicy::new(CapabilityProfile::Viewer);
        assert!(policy.check("tasks", "list"));
        assert!(!policy.check("tasks", "delete"));
    }

    #[test]
    fn maintainer_is_unrestricted() {
        let policy = AuthorizationPolicy::new(CapabilityProfile::Maintainer);
        assert!(policy.check("anything", "goes"));
    }

    #[test]
    fn pair_worker_can_submit_jobs_but_not_create_tasks() {
        let policy = AuthorizationPolicy::new(CapabilityProfile::PairWorker);
        assert!(policy.check("jobs", "submit"));
        assert!(!policy.check("tasks", "create"));
        assert!(policy.enforce("tasks", "create").is_err());
    }

    #[test]
    fn rank_is_monotonic() {
        assert!(CapabilityProfile::Viewer.rank() < CapabilityProfile::Planner.rank());
        assert!(CapabilityProfile::Operator.rank() < CapabilityProfile::Maintainer.rank());
    }
}
