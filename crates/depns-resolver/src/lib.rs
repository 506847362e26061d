//! Dependency namespaces: which version string a named dependency resolves
//! to across a tree of nested project scopes, and whether that choice
//! satisfies every declared requirement.

pub mod artifact;
pub mod key;
pub mod namespace;
pub mod registry;
pub mod requirement;
pub mod scope;
pub mod version;

pub use artifact::ArtifactRequirement;
pub use key::NamespaceKey;
pub use namespace::{ArtifactNamespace, Entry, ParentRef, Value};
pub use registry::NamespaceRegistry;
pub use requirement::VersionRequirement;
pub use scope::{CurrentScope, ProjectScope, RootScope};
pub use version::Version;
