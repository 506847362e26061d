//! Named artifact requirements held by namespaces.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use depns_core::coordinate::{looks_like_spec, Artifact, ArtifactSpec, Coordinate};
use depns_util::errors::{DepnsError, DepnsResult};

use crate::requirement::VersionRequirement;
use crate::version::Version;

/// Callback run after a requirement has a version selected.
pub type SelectionListener = Rc<dyn Fn(&ArtifactRequirement)>;

thread_local! {
    /// Requirements selected inside [`with_deferred_listeners`], notified once
    /// the outermost call succeeds.
    static DEFERRED: RefCell<Option<Vec<ArtifactRequirement>>> = const { RefCell::new(None) };
}

/// Run `f`, holding back selection listeners until it returns. They fire
/// when `f` succeeds and are dropped when it fails. Nested calls join the
/// outermost one.
pub(crate) fn with_deferred_listeners<R>(f: impl FnOnce() -> DepnsResult<R>) -> DepnsResult<R> {
    let outermost = DEFERRED.with(|deferred| {
        let mut deferred = deferred.borrow_mut();
        if deferred.is_some() {
            return false;
        }
        *deferred = Some(Vec::new());
        true
    });
    let result = f();
    if outermost {
        let pending = DEFERRED.with(|deferred| deferred.borrow_mut().take());
        if result.is_ok() {
            for req in pending.unwrap_or_default() {
                req.notify();
            }
        }
    }
    result
}

#[derive(Default, Clone)]
struct RequirementState {
    key: String,
    coordinate: Option<Coordinate>,
    requirement: Option<VersionRequirement>,
    /// Version implied by the declaration, used until one is selected.
    default_version: Option<String>,
    selected: Option<String>,
    members: Vec<ArtifactRequirement>,
    listeners: Vec<SelectionListener>,
}

/// A named dependency: coordinate, version requirement and selected version.
///
/// This is a shared handle. Cloning it yields another reference to the same
/// requirement (that is how aliases work); use [`ArtifactRequirement::deep_clone`]
/// for an independent copy. Equality is identity.
#[derive(Clone)]
pub struct ArtifactRequirement {
    state: Rc<RefCell<RequirementState>>,
}

impl ArtifactRequirement {
    /// An empty requirement for `key`: no coordinate, no constraint.
    pub fn new(key: &str) -> Self {
        Self::from_state(RequirementState {
            key: key.to_string(),
            ..Default::default()
        })
    }

    /// A declared requirement, not yet selected.
    pub fn declared(
        key: &str,
        coordinate: Option<Coordinate>,
        requirement: Option<VersionRequirement>,
        default_version: Option<String>,
    ) -> Self {
        Self::from_state(RequirementState {
            key: key.to_string(),
            coordinate,
            requirement,
            default_version,
            ..Default::default()
        })
    }

    /// A group whose spec enumerates its members.
    pub fn group(key: &str, members: Vec<ArtifactRequirement>) -> Self {
        Self::from_state(RequirementState {
            key: key.to_string(),
            members,
            ..Default::default()
        })
    }

    fn from_state(state: RequirementState) -> Self {
        Self {
            state: Rc::new(RefCell::new(state)),
        }
    }

    pub fn key(&self) -> String {
        self.state.borrow().key.clone()
    }

    pub fn coordinate(&self) -> Option<Coordinate> {
        self.state.borrow().coordinate.clone()
    }

    pub fn unversioned_spec(&self) -> Option<String> {
        self.state
            .borrow()
            .coordinate
            .as_ref()
            .map(Coordinate::unversioned_spec)
    }

    /// The artifact id, e.g. `bar` for `foo:bar:jar:1.0`.
    pub fn id(&self) -> Option<String> {
        self.state.borrow().coordinate.as_ref().map(|c| c.id.clone())
    }

    pub fn requirement(&self) -> Option<VersionRequirement> {
        self.state.borrow().requirement.clone()
    }

    /// The selected version, or the declared default while unselected.
    pub fn version(&self) -> Option<String> {
        let state = self.state.borrow();
        state
            .selected
            .clone()
            .or_else(|| state.default_version.clone())
    }

    pub fn selected_version(&self) -> Option<String> {
        self.state.borrow().selected.clone()
    }

    pub fn is_selected(&self) -> bool {
        let state = self.state.borrow();
        if state.members.is_empty() {
            state.selected.is_some()
        } else {
            state.members.iter().all(ArtifactRequirement::is_selected)
        }
    }

    pub fn is_group(&self) -> bool {
        !self.state.borrow().members.is_empty()
    }

    pub fn members(&self) -> Vec<ArtifactRequirement> {
        self.state.borrow().members.clone()
    }

    /// True when both a requirement and a selection exist and agree.
    pub fn is_satisfied(&self) -> bool {
        let state = self.state.borrow();
        match (&state.requirement, &state.selected) {
            (Some(req), Some(selected)) => req.satisfied_by(selected).unwrap_or(false),
            _ => false,
        }
    }

    /// Whether `spec_or_version` is acceptable: a bare version or a full
    /// spec whose coordinate must match this one.
    pub fn satisfied_by(&self, spec_or_version: &str) -> DepnsResult<bool> {
        let state = self.state.borrow();
        let Some(ref requirement) = state.requirement else {
            return Ok(true);
        };
        if !looks_like_spec(spec_or_version) {
            return requirement.satisfied_by(spec_or_version);
        }
        let candidate = ArtifactSpec::parse(spec_or_version)?;
        if let Some(ref coordinate) = state.coordinate {
            if *coordinate != candidate.coordinate {
                return Ok(false);
            }
        }
        match candidate.version {
            Some(ref version) => requirement.satisfied_by(version),
            None => Ok(false),
        }
    }

    /// Check that `version` could be selected, without selecting it.
    pub fn check_selectable(&self, version: &str) -> DepnsResult<()> {
        let requirement = self.requirement();
        self.check_against(requirement.as_ref(), version)
    }

    pub(crate) fn check_against(
        &self,
        requirement: Option<&VersionRequirement>,
        version: &str,
    ) -> DepnsResult<()> {
        let parsed = Version::parse(version)?;
        match requirement {
            Some(req) if !req.matches(&parsed) => Err(DepnsError::Unsatisfied {
                name: self.key(),
                spec: self.spec_with(version),
                requirement: req.to_string(),
            }),
            _ => Ok(()),
        }
    }

    /// Select `version`, enforcing the declared requirement.
    pub fn select(&self, version: &str) -> DepnsResult<()> {
        self.check_selectable(version)?;
        let version = version.trim().to_string();
        {
            let mut state = self.state.borrow_mut();
            tracing::debug!("Selected {} = {}", state.key, version);
            state.selected = Some(version);
        }
        let deferred = DEFERRED.with(|deferred| match deferred.borrow_mut().as_mut() {
            Some(pending) => {
                pending.push(self.clone());
                true
            }
            None => false,
        });
        if !deferred {
            self.notify();
        }
        Ok(())
    }

    fn notify(&self) {
        let listeners = self.state.borrow().listeners.clone();
        for listener in listeners {
            listener(self);
        }
    }

    /// Set the requirement (and its default version) without selecting.
    ///
    /// Fails when an existing selection would violate the new requirement.
    pub fn declare(
        &self,
        requirement: Option<VersionRequirement>,
        default_version: Option<String>,
    ) -> DepnsResult<()> {
        if let (Some(req), Some(selected)) = (requirement.as_ref(), self.selected_version()) {
            self.check_against(Some(req), &selected)?;
        }
        let mut state = self.state.borrow_mut();
        state.requirement = requirement;
        state.default_version = default_version;
        Ok(())
    }

    /// Replace the requirement and default without checking the current
    /// selection; the caller selects a version that satisfies it next.
    pub(crate) fn record_requirement(
        &self,
        requirement: Option<VersionRequirement>,
        default_version: Option<String>,
    ) {
        let mut state = self.state.borrow_mut();
        state.requirement = requirement;
        state.default_version = default_version;
    }

    pub(crate) fn snapshot(&self) -> RequirementSnapshot {
        RequirementSnapshot {
            target: self.clone(),
            state: self.state.borrow().clone(),
        }
    }

    pub(crate) fn set_coordinate(&self, coordinate: Option<Coordinate>) {
        self.state.borrow_mut().coordinate = coordinate;
    }

    pub(crate) fn set_requirement_if_absent(&self, requirement: Option<VersionRequirement>) {
        let mut state = self.state.borrow_mut();
        if state.requirement.is_none() {
            state.requirement = requirement;
        }
    }

    pub(crate) fn clear_default(&self) {
        self.state.borrow_mut().default_version = None;
    }

    /// Register a callback run after every successful [`select`](Self::select).
    pub fn add_listener(&self, listener: impl Fn(&ArtifactRequirement) + 'static) {
        self.state.borrow_mut().listeners.push(Rc::new(listener));
    }

    /// The spec for this requirement: `group:id:type[:classifier][:version]`,
    /// or the comma-separated member specs for a group.
    pub fn to_spec(&self) -> String {
        if self.is_group() {
            return self.to_specs().join(",");
        }
        match self.version() {
            Some(version) => self.spec_with(&version),
            None => self
                .unversioned_spec()
                .unwrap_or_else(|| self.key()),
        }
    }

    /// Member specs for a group, or this requirement's single spec.
    pub fn to_specs(&self) -> Vec<String> {
        let members = self.members();
        if members.is_empty() {
            vec![self.to_spec()]
        } else {
            members.iter().map(ArtifactRequirement::to_spec).collect()
        }
    }

    fn spec_with(&self, version: &str) -> String {
        match self.state.borrow().coordinate {
            Some(ref coordinate) => coordinate.with_version(version),
            None => version.to_string(),
        }
    }

    /// The concrete artifact, when both a coordinate and a version are known.
    pub fn artifact(&self) -> DepnsResult<Artifact> {
        let state = self.state.borrow();
        let lookup = |message: &str| DepnsError::Lookup {
            key: state.key.clone(),
            message: message.to_string(),
        };
        if !state.members.is_empty() {
            return Err(lookup("a group names several artifacts"));
        }
        let coordinate = state
            .coordinate
            .clone()
            .ok_or_else(|| lookup("no artifact coordinate declared"))?;
        let version = state
            .selected
            .clone()
            .or_else(|| state.default_version.clone())
            .ok_or_else(|| lookup("no version selected"))?;
        Ok(Artifact::new(coordinate, &version))
    }

    /// Concrete artifacts of a group's members, or of this requirement.
    pub fn artifacts(&self) -> DepnsResult<Vec<Artifact>> {
        let members = self.members();
        if members.is_empty() {
            return Ok(vec![self.artifact()?]);
        }
        members.iter().map(ArtifactRequirement::artifact).collect()
    }

    /// A structurally equal but independent copy. Listeners are not copied.
    pub fn deep_clone(&self) -> Self {
        let key = self.key();
        self.deep_clone_as(&key)
    }

    /// Like [`deep_clone`](Self::deep_clone), stored under another key.
    pub fn deep_clone_as(&self, key: &str) -> Self {
        let state = self.state.borrow();
        Self::from_state(RequirementState {
            key: key.to_string(),
            coordinate: state.coordinate.clone(),
            requirement: state.requirement.clone(),
            default_version: state.default_version.clone(),
            selected: state.selected.clone(),
            members: state.members.iter().map(ArtifactRequirement::deep_clone).collect(),
            listeners: Vec::new(),
        })
    }

    pub fn ptr_eq(&self, other: &ArtifactRequirement) -> bool {
        Rc::ptr_eq(&self.state, &other.state)
    }
}

impl PartialEq for ArtifactRequirement {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl fmt::Debug for ArtifactRequirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("ArtifactRequirement")
            .field("key", &state.key)
            .field("coordinate", &state.coordinate)
            .field("requirement", &state.requirement.as_ref().map(|r| r.to_string()))
            .field("default_version", &state.default_version)
            .field("selected", &state.selected)
            .field("members", &state.members)
            .finish()
    }
}

impl fmt::Display for ArtifactRequirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_spec())
    }
}

/// Saved state of one requirement, restored when a batch fails.
pub(crate) struct RequirementSnapshot {
    target: ArtifactRequirement,
    state: RequirementState,
}

impl RequirementSnapshot {
    pub(crate) fn holds(&self, req: &ArtifactRequirement) -> bool {
        self.target.ptr_eq(req)
    }

    pub(crate) fn restore(self) {
        *self.target.state.borrow_mut() = self.state;
    }
}
