//! Namespace keys and their canonical names.

/// Name of the root namespace.
pub const ROOT_NAME: &str = "root";

/// Anything that can name a namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NamespaceKey {
    /// The singleton root namespace.
    Root,
    /// Whatever namespace the active project scope maps to.
    Current,
    /// A name such as `foo`, `foo:bar` or a module path `A::B::C`.
    Name(String),
    /// Name parts, joined with `:`.
    Path(Vec<String>),
}

impl NamespaceKey {
    /// Key for a Rust type, named after its module path.
    ///
    /// `my_addon::XmlBeans` maps to the namespace `my_addon:XmlBeans`.
    pub fn of<T: ?Sized>() -> Self {
        NamespaceKey::Name(std::any::type_name::<T>().to_string())
    }
}

impl From<&str> for NamespaceKey {
    fn from(name: &str) -> Self {
        match name.trim() {
            "" | ROOT_NAME => NamespaceKey::Root,
            other => NamespaceKey::Name(other.to_string()),
        }
    }
}

impl From<String> for NamespaceKey {
    fn from(name: String) -> Self {
        NamespaceKey::from(name.as_str())
    }
}

impl From<&String> for NamespaceKey {
    fn from(name: &String) -> Self {
        NamespaceKey::from(name.as_str())
    }
}

impl From<Vec<String>> for NamespaceKey {
    fn from(parts: Vec<String>) -> Self {
        NamespaceKey::Path(parts)
    }
}

impl From<&[&str]> for NamespaceKey {
    fn from(parts: &[&str]) -> Self {
        NamespaceKey::Path(parts.iter().map(|p| p.to_string()).collect())
    }
}

impl<const N: usize> From<[&str; N]> for NamespaceKey {
    fn from(parts: [&str; N]) -> Self {
        NamespaceKey::Path(parts.iter().map(|p| p.to_string()).collect())
    }
}

/// Normalize a raw name: runs of two or more colons collapse to one
/// (`A::B::C` becomes `A:B:C`) and a blank name is the root.
pub fn canonical_name(raw: &str) -> String {
    let parts: Vec<&str> = raw
        .trim()
        .split(':')
        .filter(|part| !part.is_empty())
        .collect();
    if parts.is_empty() {
        ROOT_NAME.to_string()
    } else {
        parts.join(":")
    }
}

/// Canonical name of the parent implied by a namespace name.
///
/// `foo:bar:baz` implies `foo:bar`, a single-part name implies the root.
pub fn implied_parent_name(name: &str) -> Option<String> {
    if name == ROOT_NAME {
        return None;
    }
    match name.rsplit_once(':') {
        Some((prefix, _)) => Some(canonical_name(prefix)),
        None => Some(ROOT_NAME.to_string()),
    }
}
