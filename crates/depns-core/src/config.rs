use std::collections::BTreeMap;
use std::path::Path;

use depns_util::errors::{DepnsError, DepnsResult};
use serde::{Deserialize, Serialize};

/// Artifact profile: per-namespace artifact selections loaded from TOML.
///
/// ```toml
/// [artifacts.root]
/// spring = "org.springframework:spring:jar:2.5"
///
/// [artifacts."one:oldie"]
/// spring = "org.springframework:spring:jar:1.0"
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArtifactProfile {
    #[serde(default)]
    pub artifacts: BTreeMap<String, BTreeMap<String, ProfileValue>>,
}

/// A single profile entry: one spec (or bare version) or a group of specs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProfileValue {
    Spec(String),
    Group(Vec<String>),
}

impl ArtifactProfile {
    /// Parse a profile from TOML text.
    pub fn parse(content: &str) -> DepnsResult<Self> {
        toml::from_str(content).map_err(|e| DepnsError::Config {
            message: format!("Failed to parse artifact profile: {e}"),
        })
    }

    /// Load and parse a profile file.
    pub fn from_path(path: &Path) -> DepnsResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| DepnsError::Config {
            message: format!("Failed to read artifact profile {}: {e}", path.display()),
        })?;
        tracing::debug!("Loaded artifact profile from {}", path.display());
        Self::parse(&content)
    }

    /// Namespace names declared by this profile.
    pub fn namespaces(&self) -> impl Iterator<Item = &str> {
        self.artifacts.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.values().all(BTreeMap::is_empty)
    }
}
