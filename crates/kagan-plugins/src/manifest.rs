//! Plugin manifests (§4.14): immutable identity a plugin registers under.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::PluginError;

fn id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[a-z][a-z0-9_.-]{2,63}$").unwrap())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginManifest {
    pub id: String,
    pub name: String,
    pub version: String,
    pub entrypoint: String,
}

impl PluginManifest {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        version: impl Into<String>,
        entrypoint: impl Into<String>,
    ) -> Result<Self, PluginError> {
        let id = id.into();
        if !id_pattern().is_match(&id) {
            return Err(PluginError::InvalidManifestId(id));
        }
        Ok(Self {
            id,
            name: name.into(),
            version: version.into(),
            entrypoint: entrypoint.into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_a_well_formed_id() {
        let m = PluginManifest::new("github-sync", "GitHub Sync", "0.1.0", "plugin::github").unwrap();
        assert_eq!(m.id, "github-sync");
    }

    #[test]
    fn rejects_ids_starting_with_a_digit() {
        assert!(PluginManifest::new("9lives", "n", "0.1.0", "e").is_err());
    }

    #[test]
    fn rejects_ids_shorter_than_three_chars() {
        assert!(PluginManifest::new("ab", "n", "0.1.0", "e").is_err());
    }

    #[test]
    fn rejects_uppercase() {
        assert!(PluginManifest::new("GitHub", "n", "0.1.0", "e").is_err());
    }
}
