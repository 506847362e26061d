//! Artifact namespaces: the scope tree where requirements are declared
//! (`need`), selected (`use`) and looked up.
//!
//! Lookups fall through to ancestors, nearest first. Writes are always
//! local: assigning an ancestor's entry stores an independent copy, only
//! [`ArtifactNamespace::alias`] shares a requirement between keys.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::{Rc, Weak};

use depns_core::coordinate::{looks_like_spec, Artifact, ArtifactSpec, Coordinate};
use depns_util::errors::{DepnsError, DepnsResult};

use crate::artifact::{with_deferred_listeners, ArtifactRequirement, RequirementSnapshot};
use crate::key::{implied_parent_name, NamespaceKey, ROOT_NAME};
use crate::registry::{NamespaceRegistry, RegistryShared};
use crate::requirement::VersionRequirement;
use crate::version::Version;

/// What a namespace key holds.
#[derive(Debug, Clone, PartialEq)]
pub enum Entry {
    Requirement(ArtifactRequirement),
    Namespace(ArtifactNamespace),
}

impl Entry {
    pub fn as_requirement(&self) -> Option<&ArtifactRequirement> {
        match self {
            Entry::Requirement(req) => Some(req),
            Entry::Namespace(_) => None,
        }
    }

    pub fn as_namespace(&self) -> Option<&ArtifactNamespace> {
        match self {
            Entry::Namespace(ns) => Some(ns),
            Entry::Requirement(_) => None,
        }
    }

    pub fn into_requirement(self) -> Option<ArtifactRequirement> {
        match self {
            Entry::Requirement(req) => Some(req),
            Entry::Namespace(_) => None,
        }
    }

    pub fn into_namespace(self) -> Option<ArtifactNamespace> {
        match self {
            Entry::Namespace(ns) => Some(ns),
            Entry::Requirement(_) => None,
        }
    }
}

/// A value assigned to a namespace key.
#[derive(Debug, Clone)]
pub enum Value {
    /// A full spec (`g:i:t[:c]:v`), a bare version, or a requirement expression.
    Spec(String),
    /// Several specs registered together under one key.
    Group(Vec<String>),
    /// Another key visible from this namespace; its entry is copied.
    Key(String),
    /// An existing requirement; it is copied.
    Requirement(ArtifactRequirement),
    /// A namespace, stored by reference.
    Namespace(ArtifactNamespace),
}

impl Value {
    pub fn key(name: &str) -> Self {
        Value::Key(name.to_string())
    }
}

impl From<&str> for Value {
    fn from(spec: &str) -> Self {
        Value::Spec(spec.to_string())
    }
}

impl From<String> for Value {
    fn from(spec: String) -> Self {
        Value::Spec(spec)
    }
}

impl From<&String> for Value {
    fn from(spec: &String) -> Self {
        Value::Spec(spec.clone())
    }
}

impl From<Vec<String>> for Value {
    fn from(specs: Vec<String>) -> Self {
        Value::Group(specs)
    }
}

impl From<Vec<&str>> for Value {
    fn from(specs: Vec<&str>) -> Self {
        Value::Group(specs.into_iter().map(str::to_string).collect())
    }
}

impl From<&[&str]> for Value {
    fn from(specs: &[&str]) -> Self {
        Value::Group(specs.iter().map(|s| s.to_string()).collect())
    }
}

impl<const N: usize> From<[&str; N]> for Value {
    fn from(specs: [&str; N]) -> Self {
        Value::Group(specs.iter().map(|s| s.to_string()).collect())
    }
}

impl From<ArtifactRequirement> for Value {
    fn from(req: ArtifactRequirement) -> Self {
        Value::Requirement(req)
    }
}

impl From<&ArtifactRequirement> for Value {
    fn from(req: &ArtifactRequirement) -> Self {
        Value::Requirement(req.clone())
    }
}

impl From<ArtifactNamespace> for Value {
    fn from(ns: ArtifactNamespace) -> Self {
        Value::Namespace(ns)
    }
}

impl From<&ArtifactNamespace> for Value {
    fn from(ns: &ArtifactNamespace) -> Self {
        Value::Namespace(ns.clone())
    }
}

/// Target of [`ArtifactNamespace::set_parent`].
#[derive(Debug, Clone)]
pub enum ParentRef {
    Key(NamespaceKey),
    Namespace(ArtifactNamespace),
}

impl From<NamespaceKey> for ParentRef {
    fn from(key: NamespaceKey) -> Self {
        ParentRef::Key(key)
    }
}

impl From<&str> for ParentRef {
    fn from(name: &str) -> Self {
        ParentRef::Key(NamespaceKey::from(name))
    }
}

impl From<ArtifactNamespace> for ParentRef {
    fn from(ns: ArtifactNamespace) -> Self {
        ParentRef::Namespace(ns)
    }
}

impl From<&ArtifactNamespace> for ParentRef {
    fn from(ns: &ArtifactNamespace) -> Self {
        ParentRef::Namespace(ns.clone())
    }
}

#[derive(Clone)]
enum ParentLink {
    /// Implied by the name: `foo:bar` hangs under `foo`, `foo` under the root.
    Derived,
    /// Whatever namespace the active scope maps to, resolved on each call.
    Current,
    Named(String),
    Handle(Weak<RefCell<NamespaceState>>),
}

struct NamespaceState {
    name: String,
    parent: ParentLink,
    entries: BTreeMap<String, Entry>,
    /// Unversioned spec to the requirement most recently registered for it.
    by_spec: BTreeMap<String, ArtifactRequirement>,
    registry: Weak<RegistryShared>,
    /// Set only for the registry's root entry.
    root: bool,
    resolving_parent: bool,
}

/// A named node in the namespace tree.
///
/// Cloning yields another handle to the same namespace; equality is identity.
#[derive(Clone)]
pub struct ArtifactNamespace {
    state: Rc<RefCell<NamespaceState>>,
}

enum VersionText {
    Plain(String),
    Constraint(VersionRequirement),
}

fn classify(text: &str) -> DepnsResult<VersionText> {
    if Version::is_valid(text) {
        Ok(VersionText::Plain(text.trim().to_string()))
    } else {
        VersionRequirement::create(text).map(VersionText::Constraint)
    }
}

fn type_mismatch(key: &str, message: &str) -> DepnsError {
    DepnsError::TypeMismatch {
        key: key.to_string(),
        message: message.to_string(),
    }
}

/// A key with a declared requirement only accepts its own coordinate.
fn check_same_artifact(declared: &ArtifactRequirement, spec: &ArtifactSpec) -> DepnsResult<()> {
    let (Some(coordinate), Some(requirement)) = (declared.coordinate(), declared.requirement())
    else {
        return Ok(());
    };
    if coordinate == spec.coordinate {
        return Ok(());
    }
    Err(DepnsError::Unsatisfied {
        name: declared.key(),
        spec: match spec.version {
            Some(ref version) => spec.coordinate.with_version(version),
            None => spec.coordinate.unversioned_spec(),
        },
        requirement: coordinate.with_version(&requirement.to_string()),
    })
}

/// Entries of a namespace subtree and the state of every requirement they
/// hold, taken before a batch of writes.
#[derive(Default)]
pub(crate) struct Checkpoint {
    namespaces: Vec<(ArtifactNamespace, NamespaceTables)>,
    requirements: Vec<RequirementSnapshot>,
}

type NamespaceTables = (BTreeMap<String, Entry>, BTreeMap<String, ArtifactRequirement>);

impl Checkpoint {
    pub(crate) fn add(&mut self, ns: &ArtifactNamespace) {
        if self.namespaces.iter().any(|(seen, _)| seen.ptr_eq(ns)) {
            return;
        }
        let (tables, subs, reqs) = {
            let state = ns.state.borrow();
            let subs: Vec<ArtifactNamespace> = state
                .entries
                .values()
                .filter_map(|entry| entry.as_namespace().cloned())
                .collect();
            let reqs: Vec<ArtifactRequirement> = state
                .entries
                .values()
                .filter_map(|entry| entry.as_requirement().cloned())
                .chain(state.by_spec.values().cloned())
                .collect();
            ((state.entries.clone(), state.by_spec.clone()), subs, reqs)
        };
        self.namespaces.push((ns.clone(), tables));
        for req in reqs {
            self.add_requirement(&req);
        }
        for sub in subs {
            self.add(&sub);
        }
    }

    fn add_requirement(&mut self, req: &ArtifactRequirement) {
        if self.requirements.iter().any(|seen| seen.holds(req)) {
            return;
        }
        self.requirements.push(req.snapshot());
        for member in req.members() {
            self.add_requirement(&member);
        }
    }

    pub(crate) fn restore(self) {
        for (ns, (entries, by_spec)) in self.namespaces {
            let mut state = ns.state.borrow_mut();
            state.entries = entries;
            state.by_spec = by_spec;
        }
        for snapshot in self.requirements {
            snapshot.restore();
        }
    }
}

/// `name? -> coordinate -> requirement?`
#[derive(Debug)]
struct NeedSpec {
    name: Option<String>,
    spec: ArtifactSpec,
    requirement: Option<String>,
}

impl NeedSpec {
    fn parse(text: &str) -> DepnsResult<Self> {
        let parts: Vec<&str> = text.split("->").map(str::trim).collect();
        let (name, coordinate, requirement) = match parts.as_slice() {
            [coordinate] => (None, *coordinate, None),
            [first, second] if looks_like_spec(first) => (None, *first, Some(*second)),
            [name, coordinate] => (Some(*name), *coordinate, None),
            [name, coordinate, requirement] => (Some(*name), *coordinate, Some(*requirement)),
            _ => {
                return Err(DepnsError::parse(
                    text,
                    0,
                    text.len(),
                    "a need spec has at most three `->` separated parts",
                ))
            }
        };
        Ok(Self {
            name: name.filter(|n| !n.is_empty()).map(str::to_string),
            spec: ArtifactSpec::parse(coordinate)?,
            requirement: requirement.filter(|r| !r.is_empty()).map(str::to_string),
        })
    }

    fn key(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| self.spec.coordinate.id.clone())
    }

    fn constraint(&self) -> DepnsResult<(Option<VersionRequirement>, Option<String>)> {
        constraint(self.spec.version.as_deref(), self.requirement.as_deref())
    }
}

/// Requirement and default version for a declaration. Without an explicit
/// requirement the version text is the requirement.
fn constraint(
    version: Option<&str>,
    requirement: Option<&str>,
) -> DepnsResult<(Option<VersionRequirement>, Option<String>)> {
    match (version, requirement) {
        (version, Some(requirement)) => {
            let requirement = VersionRequirement::create(requirement)?;
            let default = match version {
                Some(v) if Version::is_valid(v) => Some(v.trim().to_string()),
                Some(v) => VersionRequirement::create(v)?.default(),
                None => requirement.default(),
            };
            Ok((Some(requirement), default))
        }
        (Some(version), None) => {
            let requirement = VersionRequirement::create(version)?;
            let default = requirement.default();
            Ok((Some(requirement), default))
        }
        (None, None) => Ok((None, None)),
    }
}

impl ArtifactNamespace {
    pub(crate) fn registered(name: &str, registry: Weak<RegistryShared>) -> Self {
        let ns = Self::with_state(name, ParentLink::Derived, registry);
        ns.state.borrow_mut().root = name == ROOT_NAME;
        ns
    }

    /// A namespace outside any registry, e.g. the per-instance requirements
    /// of an extension. It has no parent until one is set by handle.
    pub fn detached(name: &str) -> Self {
        Self::with_state(name, ParentLink::Derived, Weak::new())
    }

    fn with_state(name: &str, parent: ParentLink, registry: Weak<RegistryShared>) -> Self {
        Self {
            state: Rc::new(RefCell::new(NamespaceState {
                name: name.to_string(),
                parent,
                entries: BTreeMap::new(),
                by_spec: BTreeMap::new(),
                registry,
                root: false,
                resolving_parent: false,
            })),
        }
    }

    pub fn name(&self) -> String {
        self.state.borrow().name.clone()
    }

    pub fn is_root(&self) -> bool {
        self.state.borrow().root
    }

    /// The registry this namespace was created through, if it is still alive.
    pub fn registry(&self) -> Option<NamespaceRegistry> {
        self.state
            .borrow()
            .registry
            .upgrade()
            .map(NamespaceRegistry::from_shared)
    }

    pub fn ptr_eq(&self, other: &ArtifactNamespace) -> bool {
        Rc::ptr_eq(&self.state, &other.state)
    }

    // ── ancestry ────────────────────────────────────────────────────────

    /// The enclosing namespace; always `None` for the root.
    pub fn parent(&self) -> Option<ArtifactNamespace> {
        if self.is_root() {
            return None;
        }
        let (link, registry, name) = {
            let state = self.state.borrow();
            (state.parent.clone(), state.registry.upgrade(), state.name.clone())
        };
        match link {
            ParentLink::Handle(weak) => weak.upgrade().map(|state| ArtifactNamespace { state }),
            ParentLink::Derived => {
                let registry = registry?;
                let parent_name = implied_parent_name(&name)?;
                Some(RegistryShared::namespace(&registry, &parent_name))
            }
            ParentLink::Named(parent_name) => {
                registry.map(|registry| RegistryShared::namespace(&registry, &parent_name))
            }
            ParentLink::Current => {
                let registry = registry?;
                if self.state.borrow().resolving_parent {
                    return None;
                }
                self.state.borrow_mut().resolving_parent = true;
                let current = RegistryShared::namespace(&registry, &registry.current_name());
                let cyclic = self.is_self_or_ancestor_of(&current);
                self.state.borrow_mut().resolving_parent = false;
                if cyclic {
                    tracing::warn!(
                        "Namespace {} follows the current scope {}, which lies inside it; treating it as parentless",
                        name,
                        current.name()
                    );
                    return None;
                }
                Some(current)
            }
        }
    }

    /// Set the enclosing namespace. [`NamespaceKey::Current`] is resolved on
    /// every later [`parent`](Self::parent) call, not now.
    pub fn set_parent(&self, parent: impl Into<ParentRef>) -> DepnsResult<()> {
        let name = self.name();
        if self.is_root() {
            return Err(DepnsError::Immutability {
                namespace: name,
                message: "the root namespace has no parent".to_string(),
            });
        }
        let link = match parent.into() {
            ParentRef::Key(NamespaceKey::Current) => ParentLink::Current,
            ParentRef::Key(key) => {
                let registry = self.registry().ok_or_else(|| DepnsError::Lookup {
                    key: name.clone(),
                    message: "a detached namespace cannot resolve its parent by name".to_string(),
                })?;
                let candidate = registry.instance(key);
                self.check_acyclic(&candidate)?;
                ParentLink::Named(candidate.name())
            }
            ParentRef::Namespace(candidate) => {
                self.check_acyclic(&candidate)?;
                ParentLink::Handle(Rc::downgrade(&candidate.state))
            }
        };
        tracing::debug!("Reparented namespace {}", name);
        self.state.borrow_mut().parent = link;
        Ok(())
    }

    fn check_acyclic(&self, candidate: &ArtifactNamespace) -> DepnsResult<()> {
        if self.is_self_or_ancestor_of(candidate) {
            return Err(DepnsError::Immutability {
                namespace: self.name(),
                message: format!("making {} its parent would create a cycle", candidate.name()),
            });
        }
        Ok(())
    }

    fn is_self_or_ancestor_of(&self, other: &ArtifactNamespace) -> bool {
        other.ptr_eq(self) || other.ancestors().iter().any(|ns| ns.ptr_eq(self))
    }

    /// Enclosing namespaces, nearest first.
    pub fn ancestors(&self) -> Vec<ArtifactNamespace> {
        let mut chain: Vec<ArtifactNamespace> = Vec::new();
        let mut next = self.parent();
        while let Some(ns) = next {
            if ns.ptr_eq(self) || chain.iter().any(|seen| seen.ptr_eq(&ns)) {
                break;
            }
            next = ns.parent();
            chain.push(ns);
        }
        chain
    }

    // ── lookup ──────────────────────────────────────────────────────────

    /// Entry held by this namespace itself. `key` may be a name, an
    /// unversioned spec, or a compound `sub_name` / `sub.name` path
    /// through sub-namespaces.
    pub fn local_entry(&self, key: &str) -> Option<Entry> {
        let key = key.trim();
        if looks_like_spec(key) {
            let spec = ArtifactSpec::parse(key).ok()?;
            let found = self.state.borrow().by_spec.get(&spec.unversioned_spec()).cloned();
            return found.map(Entry::Requirement);
        }
        let direct = self.state.borrow().entries.get(key).cloned();
        if direct.is_some() {
            return direct;
        }
        let (sub, rest) = self.compound_split(key)?;
        sub.local_entry(rest)
    }

    fn compound_split<'k>(&self, key: &'k str) -> Option<(ArtifactNamespace, &'k str)> {
        let state = self.state.borrow();
        key.char_indices()
            .filter(|(_, c)| *c == '_' || *c == '.')
            .find_map(|(at, _)| match state.entries.get(&key[..at]) {
                Some(Entry::Namespace(sub)) if at + 1 < key.len() => {
                    Some((sub.clone(), &key[at + 1..]))
                }
                _ => None,
            })
    }

    /// Entry for `key` here or in the nearest ancestor defining it.
    pub fn get(&self, key: &str) -> Option<Entry> {
        self.local_entry(key)
            .or_else(|| self.ancestors().iter().find_map(|ns| ns.local_entry(key)))
    }

    pub fn requirement(&self, key: &str) -> Option<ArtifactRequirement> {
        self.get(key).and_then(Entry::into_requirement)
    }

    pub fn sub(&self, key: &str) -> Option<ArtifactNamespace> {
        self.get(key).and_then(Entry::into_namespace)
    }

    /// Positional lookup; unknown keys yield `None`.
    pub fn get_many(&self, keys: &[&str]) -> Vec<Option<ArtifactRequirement>> {
        keys.iter().map(|key| self.requirement(key)).collect()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.local_entry(key).is_some()
    }

    /// Whether `key` is defined and selected.
    pub fn has(&self, key: &str) -> bool {
        self.requirement(key).is_some_and(|req| req.is_selected())
    }

    /// Whether `key` has both a requirement and a selection satisfying it.
    pub fn is_satisfied(&self, key: &str) -> bool {
        self.requirement(key).is_some_and(|req| req.is_satisfied())
    }

    pub fn keys(&self) -> Vec<String> {
        self.state.borrow().entries.keys().cloned().collect()
    }

    fn own_requirement(&self, key: &str) -> Option<ArtifactRequirement> {
        self.state
            .borrow()
            .entries
            .get(key)
            .and_then(|entry| entry.as_requirement().cloned())
    }

    fn holds_namespace(&self, key: &str) -> bool {
        matches!(self.state.borrow().entries.get(key), Some(Entry::Namespace(_)))
    }

    fn ensure_not_namespace(&self, key: &str) -> DepnsResult<()> {
        if self.holds_namespace(key) {
            return Err(type_mismatch(key, "is a sub-namespace; reopen it with ns()"));
        }
        Ok(())
    }

    /// Namespace and local key a write to `key` lands in.
    fn write_target(&self, key: &str) -> (ArtifactNamespace, String) {
        let key = key.trim();
        let direct = looks_like_spec(key) || self.state.borrow().entries.contains_key(key);
        if !direct {
            if let Some((sub, rest)) = self.compound_split(key) {
                return sub.write_target(rest);
            }
        }
        (self.clone(), key.to_string())
    }

    /// Map an unversioned-spec key to the name it is registered under.
    fn local_key(&self, key: &str) -> DepnsResult<String> {
        if !looks_like_spec(key) {
            return Ok(key.to_string());
        }
        match self.local_entry(key) {
            Some(Entry::Requirement(req)) => Ok(req.key()),
            _ => Err(DepnsError::Lookup {
                key: key.to_string(),
                message: format!("no artifact registered for this coordinate in {}", self.name()),
            }),
        }
    }

    fn insert(&self, key: &str, req: &ArtifactRequirement) {
        let unversioned = req.unversioned_spec();
        let mut state = self.state.borrow_mut();
        state
            .entries
            .insert(key.to_string(), Entry::Requirement(req.clone()));
        if let Some(spec) = unversioned {
            state.by_spec.insert(spec, req.clone());
        }
    }

    fn store_copy(&self, key: &str, source: &ArtifactRequirement) -> ArtifactRequirement {
        let copy = source.deep_clone_as(key);
        self.insert(key, &copy);
        copy
    }

    fn store_namespace(&self, key: &str, ns: ArtifactNamespace) -> DepnsResult<Entry> {
        if ns.ptr_eq(self) {
            return Err(type_mismatch(key, "a namespace cannot contain itself"));
        }
        if self.own_requirement(key).is_some() {
            return Err(type_mismatch(key, "holds an artifact requirement, not a sub-namespace"));
        }
        self.state
            .borrow_mut()
            .entries
            .insert(key.to_string(), Entry::Namespace(ns.clone()));
        Ok(Entry::Namespace(ns))
    }

    // ── use ─────────────────────────────────────────────────────────────

    /// Assign `value` to `key` with `use` semantics.
    ///
    /// A spec or version selects; the selection is checked against the
    /// requirement declared for the key (or inherited from an ancestor)
    /// before anything changes.
    pub fn set(&self, key: &str, value: impl Into<Value>) -> DepnsResult<Entry> {
        let (target, key) = self.write_target(key);
        target.set_local(&key, value.into())
    }

    fn set_local(&self, key: &str, value: Value) -> DepnsResult<Entry> {
        let key = self.local_key(key)?;
        let req = match value {
            Value::Namespace(ns) => return self.store_namespace(&key, ns),
            Value::Key(other) => match self.get(&other) {
                Some(Entry::Namespace(ns)) => return self.store_namespace(&key, ns),
                Some(Entry::Requirement(source)) => {
                    self.ensure_not_namespace(&key)?;
                    self.store_copy(&key, &source)
                }
                None => {
                    return Err(DepnsError::Lookup {
                        key: other,
                        message: "undefined artifact or namespace".to_string(),
                    })
                }
            },
            Value::Spec(text) => {
                self.ensure_not_namespace(&key)?;
                self.use_text(&key, &text)?
            }
            Value::Group(specs) => {
                self.ensure_not_namespace(&key)?;
                self.use_group(&key, &specs)?
            }
            Value::Requirement(source) => {
                self.ensure_not_namespace(&key)?;
                self.store_copy(&key, &source)
            }
        };
        Ok(Entry::Requirement(req))
    }

    /// Select a spec under the key inferred from its artifact id.
    ///
    /// Also accepts `name -> coordinate -> requirement`; the requirement is
    /// declared first and the coordinate's version then selected.
    pub fn use_spec(&self, spec: &str) -> DepnsResult<ArtifactRequirement> {
        self.atomically(|| self.use_spec_unchecked(spec))
    }

    fn use_spec_unchecked(&self, spec: &str) -> DepnsResult<ArtifactRequirement> {
        let need = NeedSpec::parse(spec)?;
        let (target, key) = self.write_target(&need.key());
        target.ensure_not_namespace(&key)?;
        if need.requirement.is_none() {
            return target.use_parsed(&key, need.spec);
        }
        let (requirement, default) = need.constraint()?;
        let req = target.declare_requirement(&key, need.spec.coordinate, requirement, default.clone())?;
        if let Some(version) = default {
            if !req.is_selected() {
                req.select(&version)?;
            }
        }
        Ok(req)
    }

    /// Apply several `key = value` selections in order. If any pair fails,
    /// none of them take effect.
    pub fn use_all<K, V, I>(&self, pairs: I) -> DepnsResult<Vec<Entry>>
    where
        K: AsRef<str>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        self.atomically(|| {
            pairs
                .into_iter()
                .map(|(key, value)| self.set(key.as_ref(), value))
                .collect()
        })
    }

    /// Run a batch of writes to this namespace and its sub-namespaces,
    /// rolling all of them back if it fails.
    pub(crate) fn atomically<R>(&self, f: impl FnOnce() -> DepnsResult<R>) -> DepnsResult<R> {
        let mut checkpoint = Checkpoint::default();
        checkpoint.add(self);
        with_deferred_listeners(|| {
            let result = f();
            if result.is_err() {
                checkpoint.restore();
            }
            result
        })
    }

    /// Copy the nearest ancestor's entry for `key` into this namespace.
    pub fn use_inherited(&self, key: &str) -> DepnsResult<ArtifactRequirement> {
        let key = key.trim();
        let inherited = self
            .ancestors()
            .iter()
            .find_map(|ns| ns.local_entry(key))
            .ok_or_else(|| DepnsError::Lookup {
                key: key.to_string(),
                message: format!("no namespace enclosing {} defines it", self.name()),
            })?;
        match inherited {
            Entry::Requirement(source) => {
                self.ensure_not_namespace(key)?;
                Ok(self.store_copy(key, &source))
            }
            Entry::Namespace(_) => Err(type_mismatch(key, "is a namespace in an enclosing scope")),
        }
    }

    /// Bind `new_key` to the very requirement `existing` names here. An
    /// entry only an ancestor defines is first copied into this namespace.
    pub fn alias(&self, new_key: &str, existing: &str) -> DepnsResult<ArtifactRequirement> {
        let req = match self.local_entry(existing) {
            Some(Entry::Requirement(req)) => req,
            Some(Entry::Namespace(_)) => {
                return Err(type_mismatch(existing, "is a sub-namespace and cannot be aliased"))
            }
            None if self.get(existing).is_some() => self.use_inherited(existing)?,
            None => {
                return Err(DepnsError::Lookup {
                    key: existing.to_string(),
                    message: "nothing to alias".to_string(),
                })
            }
        };
        let (target, key) = self.write_target(new_key);
        target.ensure_not_namespace(&key)?;
        target
            .state
            .borrow_mut()
            .entries
            .insert(key, Entry::Requirement(req.clone()));
        Ok(req)
    }

    fn use_text(&self, key: &str, text: &str) -> DepnsResult<ArtifactRequirement> {
        if looks_like_spec(text) {
            self.use_parsed(key, ArtifactSpec::parse(text)?)
        } else {
            self.use_version(key, text)
        }
    }

    fn use_parsed(&self, key: &str, spec: ArtifactSpec) -> DepnsResult<ArtifactRequirement> {
        let version = spec.version.as_deref().map(classify).transpose()?;
        let own = self.own_requirement(key).filter(|req| !req.is_group());
        if let Some(ref declared) = own {
            check_same_artifact(declared, &spec)?;
        }
        let target = own
            .filter(|req| req.coordinate().map_or(true, |c| c == spec.coordinate))
            .unwrap_or_else(|| {
                ArtifactRequirement::declared(key, Some(spec.coordinate.clone()), None, None)
            });
        let inherited = match target.requirement() {
            Some(_) => None,
            None => self.inherited_requirement(key, &spec.coordinate),
        };
        self.apply_selection(&target, inherited, version)?;
        target.set_coordinate(Some(spec.coordinate));
        self.insert(key, &target);
        Ok(target)
    }

    fn use_version(&self, key: &str, text: &str) -> DepnsResult<ArtifactRequirement> {
        let version = classify(text)?;
        if let Some(local) = self.own_requirement(key) {
            self.apply_selection(&local, None, Some(version))?;
            return Ok(local);
        }
        let target = match self.ancestors().iter().find_map(|ns| ns.own_requirement(key)) {
            Some(inherited) => inherited.deep_clone_as(key),
            None => ArtifactRequirement::new(key),
        };
        self.apply_selection(&target, None, Some(version))?;
        self.insert(key, &target);
        Ok(target)
    }

    /// Validate, then record, a selection on `target`.
    fn apply_selection(
        &self,
        target: &ArtifactRequirement,
        inherited: Option<VersionRequirement>,
        version: Option<VersionText>,
    ) -> DepnsResult<()> {
        let effective = target.requirement().or_else(|| inherited.clone());
        match version {
            None => {
                target.set_requirement_if_absent(inherited);
                Ok(())
            }
            Some(VersionText::Plain(version)) => {
                target.check_against(effective.as_ref(), &version)?;
                target.set_requirement_if_absent(inherited);
                target.select(&version)
            }
            Some(VersionText::Constraint(requirement)) => {
                let default = requirement.default();
                // a declared requirement is narrowed, never replaced
                let combined = match effective {
                    Some(declared) => declared.intersect(&requirement),
                    None => requirement,
                };
                match default {
                    Some(version) => {
                        target.check_against(Some(&combined), &version)?;
                        target.record_requirement(Some(combined), Some(version.clone()));
                        target.select(&version)
                    }
                    None => target.declare(Some(combined), None),
                }
            }
        }
    }

    /// Nearest ancestor requirement for the same key or coordinate.
    fn inherited_requirement(&self, key: &str, coordinate: &Coordinate) -> Option<VersionRequirement> {
        let unversioned = coordinate.unversioned_spec();
        self.ancestors().iter().find_map(|ns| {
            let by_key = ns
                .own_requirement(key)
                .filter(|req| req.coordinate().map_or(true, |c| c == *coordinate))
                .and_then(|req| req.requirement());
            by_key.or_else(|| {
                let by_spec = ns.state.borrow().by_spec.get(&unversioned).cloned();
                by_spec.and_then(|req| req.requirement())
            })
        })
    }

    fn use_group(&self, key: &str, specs: &[String]) -> DepnsResult<ArtifactRequirement> {
        if specs.is_empty() {
            return Err(type_mismatch(key, "an artifact group needs at least one spec"));
        }
        let mut members = Vec::with_capacity(specs.len());
        for text in specs {
            let spec = ArtifactSpec::parse(text)?;
            let version = spec.version.as_deref().map(classify).transpose()?;
            let id = spec.coordinate.id.clone();
            let member = ArtifactRequirement::declared(&id, Some(spec.coordinate), None, None);
            self.apply_selection(&member, None, version)?;
            members.push(member);
        }
        Ok(self.register_group(key, members, true))
    }

    fn register_group(
        &self,
        key: &str,
        members: Vec<ArtifactRequirement>,
        by_id: bool,
    ) -> ArtifactRequirement {
        let group = ArtifactRequirement::group(key, members.clone());
        let mut state = self.state.borrow_mut();
        state
            .entries
            .insert(key.to_string(), Entry::Requirement(group.clone()));
        for member in members {
            if let Some(spec) = member.unversioned_spec() {
                state.by_spec.insert(spec, member.clone());
            }
            let id = member.key();
            if by_id && !state.entries.contains_key(&id) {
                state.entries.insert(id, Entry::Requirement(member));
            }
        }
        group
    }

    // ── need ────────────────────────────────────────────────────────────

    /// Declare a requirement from `coordinate`, `name -> coordinate` or
    /// `name -> coordinate -> requirement`. Without a name the artifact id
    /// is used.
    pub fn need(&self, spec: &str) -> DepnsResult<ArtifactRequirement> {
        let need = NeedSpec::parse(spec)?;
        let (requirement, default) = need.constraint()?;
        let (target, key) = self.write_target(&need.key());
        target.declare_requirement(&key, need.spec.coordinate, requirement, default)
    }

    /// Declare a requirement under an explicit key. A spec value may be
    /// `coordinate -> requirement`; a group declares each member.
    pub fn need_as(&self, key: &str, value: impl Into<Value>) -> DepnsResult<ArtifactRequirement> {
        let (target, key) = self.write_target(key);
        match value.into() {
            Value::Spec(text) => {
                let need = NeedSpec::parse(&text)?;
                let (requirement, default) = need.constraint()?;
                target.declare_requirement(&key, need.spec.coordinate, requirement, default)
            }
            Value::Group(specs) => target.need_group(&key, &specs),
            Value::Requirement(source) => target.need_copy(&key, &source),
            Value::Key(other) => {
                let source = self.requirement(&other).ok_or_else(|| DepnsError::Lookup {
                    key: other.clone(),
                    message: "undefined artifact".to_string(),
                })?;
                target.need_copy(&key, &source)
            }
            Value::Namespace(_) => Err(type_mismatch(&key, "a namespace cannot be needed")),
        }
    }

    pub fn need_all<K, V, I>(&self, pairs: I) -> DepnsResult<Vec<ArtifactRequirement>>
    where
        K: AsRef<str>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        self.atomically(|| {
            pairs
                .into_iter()
                .map(|(key, value)| self.need_as(key.as_ref(), value))
                .collect()
        })
    }

    /// Declare `spec` under `key`: its version becomes the default and
    /// `requirement`, when given, the constraint.
    pub fn require(
        &self,
        key: &str,
        spec: &str,
        requirement: Option<&str>,
    ) -> DepnsResult<ArtifactRequirement> {
        let parsed = ArtifactSpec::parse(spec)?;
        let (requirement, default) = constraint(parsed.version.as_deref(), requirement)?;
        let (target, key) = self.write_target(key);
        target.declare_requirement(&key, parsed.coordinate, requirement, default)
    }

    fn need_copy(&self, key: &str, source: &ArtifactRequirement) -> DepnsResult<ArtifactRequirement> {
        let coordinate = source.coordinate().ok_or_else(|| DepnsError::Lookup {
            key: source.key(),
            message: "has no artifact coordinate to declare".to_string(),
        })?;
        self.declare_requirement(key, coordinate, source.requirement(), source.version())
    }

    fn need_group(&self, key: &str, specs: &[String]) -> DepnsResult<ArtifactRequirement> {
        self.ensure_not_namespace(key)?;
        if specs.is_empty() {
            return Err(type_mismatch(key, "an artifact group needs at least one spec"));
        }
        let mut members = Vec::with_capacity(specs.len());
        for text in specs {
            let need = NeedSpec::parse(text)?;
            let (requirement, default) = need.constraint()?;
            let member = ArtifactRequirement::declared(
                &need.key(),
                Some(need.spec.coordinate),
                requirement,
                default,
            );
            self.inherit_selection(&member)?;
            members.push(member);
        }
        Ok(self.register_group(key, members, false))
    }

    fn declare_requirement(
        &self,
        key: &str,
        coordinate: Coordinate,
        requirement: Option<VersionRequirement>,
        default: Option<String>,
    ) -> DepnsResult<ArtifactRequirement> {
        self.ensure_not_namespace(key)?;
        let existing = self
            .own_requirement(key)
            .filter(|req| !req.is_group() && req.coordinate().map_or(true, |c| c == coordinate));
        let target = match existing {
            Some(existing) => {
                existing.declare(requirement, default)?;
                existing.set_coordinate(Some(coordinate));
                existing
            }
            None => ArtifactRequirement::declared(key, Some(coordinate), requirement, default),
        };
        self.inherit_selection(&target)?;
        self.insert(key, &target);
        tracing::debug!("Declared {} as {} in {}", key, target.to_spec(), self.name());
        Ok(target)
    }

    /// Adopt the nearest ancestor's selection of the same coordinate when it
    /// satisfies `target`; otherwise leave `target` without a version.
    fn inherit_selection(&self, target: &ArtifactRequirement) -> DepnsResult<()> {
        if target.is_selected() {
            return Ok(());
        }
        let Some(unversioned) = target.unversioned_spec() else {
            return Ok(());
        };
        let Some(version) = self
            .ancestors()
            .iter()
            .find_map(|ns| ns.selected_version_of(&unversioned))
        else {
            return Ok(());
        };
        if target.check_selectable(&version).is_ok() {
            target.select(&version)?;
            tracing::debug!("{} inherits {} from an enclosing namespace", target.key(), version);
        } else {
            tracing::warn!(
                "{} in {} requires {}, but an enclosing namespace selected {}; select a version explicitly",
                target.key(),
                self.name(),
                target
                    .requirement()
                    .map(|req| req.to_string())
                    .unwrap_or_default(),
                version
            );
            target.clear_default();
        }
        Ok(())
    }

    fn selected_version_of(&self, unversioned: &str) -> Option<String> {
        let found = self.state.borrow().by_spec.get(unversioned).cloned();
        found.and_then(|req| req.selected_version())
    }

    // ── sub-namespaces ──────────────────────────────────────────────────

    /// Create the sub-namespace `key`, or reopen it if it already exists.
    pub fn ns(&self, key: &str) -> DepnsResult<ArtifactNamespace> {
        let key = key.trim();
        let existing = self.state.borrow().entries.get(key).cloned();
        match existing {
            Some(Entry::Namespace(sub)) => Ok(sub),
            Some(Entry::Requirement(_)) => Err(type_mismatch(
                key,
                "holds an artifact requirement, not a sub-namespace",
            )),
            None => {
                let (name, registry) = {
                    let state = self.state.borrow();
                    let name = if state.root {
                        key.to_string()
                    } else {
                        format!("{}:{key}", state.name)
                    };
                    (name, state.registry.clone())
                };
                let sub = Self::with_state(&name, ParentLink::Handle(Rc::downgrade(&self.state)), registry);
                self.state
                    .borrow_mut()
                    .entries
                    .insert(key.to_string(), Entry::Namespace(sub.clone()));
                tracing::debug!("Created sub-namespace {}", name);
                Ok(sub)
            }
        }
    }

    /// [`ns`](Self::ns), then run `f` on the sub-namespace.
    pub fn ns_with(
        &self,
        key: &str,
        f: impl FnOnce(&ArtifactNamespace) -> DepnsResult<()>,
    ) -> DepnsResult<ArtifactNamespace> {
        let sub = self.ns(key)?;
        f(&sub)?;
        Ok(sub)
    }

    // ── enumeration ─────────────────────────────────────────────────────

    /// Requirements with a coordinate held here, including those of
    /// sub-namespaces and group members. With `include_parents`, ancestors'
    /// values follow unless a nearer namespace already has the coordinate.
    pub fn values(&self, include_parents: bool) -> Vec<ArtifactRequirement> {
        let mut out = Vec::new();
        self.collect_values(&mut out, &mut vec![self.clone()]);
        if include_parents {
            for ancestor in self.ancestors() {
                let mut inherited = Vec::new();
                ancestor.collect_values(&mut inherited, &mut vec![ancestor.clone()]);
                for req in inherited {
                    let spec = req.unversioned_spec();
                    let shadowed = out
                        .iter()
                        .any(|seen| seen.ptr_eq(&req) || seen.unversioned_spec() == spec);
                    if !shadowed {
                        out.push(req);
                    }
                }
            }
        }
        out
    }

    fn collect_values(&self, out: &mut Vec<ArtifactRequirement>, visited: &mut Vec<ArtifactNamespace>) {
        let entries: Vec<Entry> = self.state.borrow().entries.values().cloned().collect();
        for entry in entries {
            match entry {
                Entry::Requirement(req) => {
                    let members = if req.is_group() { req.members() } else { vec![req] };
                    for member in members {
                        if member.coordinate().is_some() && !out.iter().any(|r| r.ptr_eq(&member)) {
                            out.push(member);
                        }
                    }
                }
                Entry::Namespace(sub) => {
                    if !visited.iter().any(|ns| ns.ptr_eq(&sub)) {
                        visited.push(sub.clone());
                        sub.collect_values(out, visited);
                    }
                }
            }
        }
    }

    /// Resolve names, unversioned specs or requirement specs
    /// (`g:i:t:>1.0`) against this namespace and its ancestors, nearest
    /// first. Unknown keys are skipped.
    pub fn values_at(&self, keys: &[&str]) -> DepnsResult<Vec<ArtifactRequirement>> {
        let mut chain = vec![self.clone()];
        chain.extend(self.ancestors());
        let mut found = Vec::new();
        for key in keys {
            let key = key.trim();
            if !looks_like_spec(key) {
                if let Some(req) = self.requirement(key) {
                    if req.is_group() {
                        found.extend(req.members());
                    } else {
                        found.push(req);
                    }
                }
                continue;
            }
            let spec = ArtifactSpec::parse(key)?;
            let unversioned = spec.unversioned_spec();
            let hit = match spec.version {
                Some(ref version) => {
                    let requirement = VersionRequirement::create(version)?;
                    chain.iter().find_map(|ns| {
                        ns.values(false).into_iter().find(|req| {
                            req.unversioned_spec().as_deref() == Some(unversioned.as_str())
                                && req
                                    .version()
                                    .is_some_and(|v| requirement.satisfied_by(&v).unwrap_or(false))
                        })
                    })
                }
                None => chain
                    .iter()
                    .find_map(|ns| ns.local_entry(&unversioned).and_then(Entry::into_requirement)),
            };
            found.extend(hit);
        }
        Ok(found)
    }

    /// Concrete artifacts of every local value that has a version.
    pub fn artifacts(&self) -> DepnsResult<Vec<Artifact>> {
        self.values(false)
            .iter()
            .filter(|req| req.version().is_some())
            .map(ArtifactRequirement::artifact)
            .collect()
    }

    /// Remove `key` together with its coordinate index and aliases.
    pub fn delete(&self, key: &str) -> Option<Entry> {
        let mut state = self.state.borrow_mut();
        let removed = state.entries.remove(key.trim())?;
        if let Entry::Requirement(ref req) = removed {
            state.by_spec.retain(|_, held| !held.ptr_eq(req));
            state
                .entries
                .retain(|_, entry| !matches!(entry, Entry::Requirement(held) if held.ptr_eq(req)));
        }
        tracing::debug!("Deleted {} from {}", key, state.name);
        Some(removed)
    }

    /// Drop every local entry. The namespace itself stays registered.
    pub fn clear(&self) {
        let mut state = self.state.borrow_mut();
        state.entries.clear();
        state.by_spec.clear();
        tracing::debug!("Cleared namespace {}", state.name);
    }
}

impl PartialEq for ArtifactNamespace {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl fmt::Debug for ArtifactNamespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("ArtifactNamespace")
            .field("name", &state.name)
            .field("keys", &state.entries.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl<'a> IntoIterator for &'a ArtifactNamespace {
    type Item = ArtifactRequirement;
    type IntoIter = std::vec::IntoIter<ArtifactRequirement>;

    fn into_iter(self) -> Self::IntoIter {
        self.values(false).into_iter()
    }
}
