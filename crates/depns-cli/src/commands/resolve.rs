use std::collections::BTreeMap;
use std::path::Path;

use miette::{IntoDiagnostic, Result};

use depns_core::config::ArtifactProfile;
use depns_core::coordinate::Artifact;
use depns_resolver::{NamespaceRegistry, ProjectScope};

pub fn exec(profile: &Path, scope: Option<&str>, json: bool, keys: &[String]) -> Result<()> {
    let profile = ArtifactProfile::from_path(profile)?;
    if profile.is_empty() {
        tracing::warn!("Artifact profile declares no artifacts");
    }

    let project = ProjectScope::new();
    let registry = NamespaceRegistry::with_scope(project.clone());
    registry.load(&profile)?;
    if let Some(scope) = scope {
        project.enter(scope);
    }
    tracing::debug!("Resolving from namespace {}", registry.current().name());

    let mut resolved: BTreeMap<String, Vec<Artifact>> = BTreeMap::new();
    for key in keys {
        let artifacts = registry.artifacts(&[key.as_str()])?;
        resolved.insert(key.clone(), artifacts);
    }

    if json {
        let out = serde_json::to_string_pretty(&resolved).into_diagnostic()?;
        println!("{out}");
        return Ok(());
    }

    for key in keys {
        let specs: Vec<String> = resolved
            .get(key)
            .map(|artifacts| artifacts.iter().map(Artifact::to_spec).collect())
            .unwrap_or_default();
        println!("{key} = {}", specs.join(", "));
    }
    Ok(())
}
