use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use depns_core::config::{ArtifactProfile, ProfileValue};
use depns_core::coordinate::{looks_like_spec, Artifact, ArtifactSpec};
use depns_util::errors::{DepnsError, DepnsResult};

use crate::artifact::with_deferred_listeners;
use crate::key::{canonical_name, NamespaceKey, ROOT_NAME};
use crate::namespace::{ArtifactNamespace, Checkpoint};
use crate::scope::{CurrentScope, RootScope};
use crate::version::Version;

pub(crate) struct RegistryShared {
    table: RefCell<HashMap<String, ArtifactNamespace>>,
    scope: Rc<dyn CurrentScope>,
}

impl RegistryShared {
    /// The memoized namespace for a canonical `name`, created on first use.
    pub(crate) fn namespace(shared: &Rc<RegistryShared>, name: &str) -> ArtifactNamespace {
        let existing = shared.table.borrow().get(name).cloned();
        if let Some(ns) = existing {
            return ns;
        }
        let ns = ArtifactNamespace::registered(name, Rc::downgrade(shared));
        shared
            .table
            .borrow_mut()
            .insert(name.to_string(), ns.clone());
        tracing::debug!("Created namespace {}", name);
        ns
    }

    pub(crate) fn current_name(&self) -> String {
        canonical_name(&self.scope.current_path().join(":"))
    }
}

/// Memoized table from canonical name to namespace, one per build
/// invocation. Clones share the table.
#[derive(Clone)]
pub struct NamespaceRegistry {
    shared: Rc<RegistryShared>,
}

impl NamespaceRegistry {
    /// A registry whose current scope is always the root.
    pub fn new() -> Self {
        Self::with_scope(RootScope)
    }

    /// A registry asking `scope` which project namespace is active.
    pub fn with_scope(scope: impl CurrentScope + 'static) -> Self {
        Self {
            shared: Rc::new(RegistryShared {
                table: RefCell::new(HashMap::new()),
                scope: Rc::new(scope),
            }),
        }
    }

    pub(crate) fn from_shared(shared: Rc<RegistryShared>) -> Self {
        Self { shared }
    }

    pub fn root(&self) -> ArtifactNamespace {
        RegistryShared::namespace(&self.shared, ROOT_NAME)
    }

    /// The one namespace for `key`'s canonical name.
    pub fn instance(&self, key: impl Into<NamespaceKey>) -> ArtifactNamespace {
        let name = self.resolve_name(&key.into());
        RegistryShared::namespace(&self.shared, &name)
    }

    /// Namespace of the active project, or the root outside any project.
    pub fn current(&self) -> ArtifactNamespace {
        self.instance(NamespaceKey::Current)
    }

    /// Canonical name `key` resolves to right now.
    pub fn resolve_name(&self, key: &NamespaceKey) -> String {
        match key {
            NamespaceKey::Root => ROOT_NAME.to_string(),
            NamespaceKey::Current => self.shared.current_name(),
            NamespaceKey::Name(name) => canonical_name(name),
            NamespaceKey::Path(parts) => canonical_name(&parts.join(":")),
        }
    }

    /// Forget every namespace. Handles held elsewhere keep their entries
    /// but are no longer returned by [`instance`](Self::instance).
    pub fn clear(&self) {
        let dropped = {
            let mut table = self.shared.table.borrow_mut();
            let count = table.len();
            table.clear();
            count
        };
        tracing::debug!("Cleared namespace registry ({} namespaces)", dropped);
    }

    pub fn len(&self) -> usize {
        self.shared.table.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.table.borrow().is_empty()
    }

    /// Apply every table of `profile` to its namespace with `use` semantics.
    /// A failing entry leaves the registry as it was before the call.
    pub fn load(&self, profile: &ArtifactProfile) -> DepnsResult<()> {
        let table_before = self.shared.table.borrow().clone();
        let mut checkpoint = Checkpoint::default();
        for ns in table_before.values() {
            checkpoint.add(ns);
        }
        with_deferred_listeners(|| {
            let result = self.apply_profile(profile);
            if result.is_err() {
                checkpoint.restore();
                *self.shared.table.borrow_mut() = table_before;
            }
            result
        })
    }

    fn apply_profile(&self, profile: &ArtifactProfile) -> DepnsResult<()> {
        for (name, table) in &profile.artifacts {
            let ns = self.instance(name);
            for (key, value) in table {
                match value {
                    ProfileValue::Spec(spec) => ns.set(key, spec)?,
                    ProfileValue::Group(specs) => ns.set(key, specs.clone())?,
                };
            }
            tracing::debug!("Loaded {} artifacts into {}", table.len(), ns.name());
        }
        Ok(())
    }

    /// Definition hook for a project: its namespace hangs under the
    /// namespace of the enclosing project, or the root for a top-level one.
    pub fn attach_project(&self, path: &[&str]) -> DepnsResult<ArtifactNamespace> {
        let ns = self.instance(path);
        if let Some((_, enclosing)) = path.split_last() {
            if !enclosing.is_empty() {
                ns.set_parent(NamespaceKey::from(enclosing))?;
            }
        }
        tracing::debug!("Attached project namespace {}", ns.name());
        Ok(ns)
    }

    /// The concrete artifact for `key`: a full spec is taken as is, anything
    /// else is looked up from the current namespace outwards.
    pub fn artifact(&self, key: &str) -> DepnsResult<Artifact> {
        let key = key.trim();
        if looks_like_spec(key) {
            if let Ok(spec) = ArtifactSpec::parse(key) {
                if let Some(version) = spec.version.as_deref().filter(|v| Version::is_valid(v)) {
                    return Ok(Artifact::new(spec.coordinate.clone(), version));
                }
            }
        }
        let current = self.current();
        match current.requirement(key) {
            Some(req) => req.artifact(),
            None => Err(DepnsError::Lookup {
                key: key.to_string(),
                message: format!("no artifact found from namespace {}", current.name()),
            }),
        }
    }

    /// Artifacts for several keys. A key naming a sub-namespace or a group
    /// contributes all of its artifacts.
    pub fn artifacts(&self, keys: &[&str]) -> DepnsResult<Vec<Artifact>> {
        let current = self.current();
        let mut out = Vec::new();
        for key in keys {
            if let Some(sub) = current.sub(key) {
                out.extend(sub.artifacts()?);
                continue;
            }
            match current.requirement(key) {
                Some(req) if req.is_group() => out.extend(req.artifacts()?),
                _ => out.push(self.artifact(key)?),
            }
        }
        Ok(out)
    }
}

impl Default for NamespaceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for NamespaceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<String> = self.shared.table.borrow().keys().cloned().collect();
        names.sort();
        f.debug_struct("NamespaceRegistry")
            .field("namespaces", &names)
            .finish()
    }
}
