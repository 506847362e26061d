use std::fmt;

use depns_util::errors::{DepnsError, DepnsResult};
use serde::Serialize;

/// An artifact coordinate without its version: `group:id:type[:classifier]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Coordinate {
    pub group: String,
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub classifier: Option<String>,
}

impl Coordinate {
    pub fn new(group: &str, id: &str, kind: &str) -> Self {
        Self {
            group: group.to_string(),
            id: id.to_string(),
            kind: kind.to_string(),
            classifier: None,
        }
    }

    pub fn with_classifier(mut self, classifier: &str) -> Self {
        self.classifier = Some(classifier.to_string());
        self
    }

    /// The unversioned spec, e.g. `org.example:lib:jar`.
    pub fn unversioned_spec(&self) -> String {
        self.to_string()
    }

    /// Render this coordinate with a version appended.
    pub fn with_version(&self, version: &str) -> String {
        format!("{self}:{version}")
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.group, self.id, self.kind)?;
        if let Some(ref classifier) = self.classifier {
            write!(f, ":{classifier}")?;
        }
        Ok(())
    }
}

/// A coordinate plus the raw text of its version part.
///
/// The version part is kept verbatim: it may be a concrete version, a
/// requirement expression (`>=1.0 <2`), or absent (`g:i:t`, `g:i:t:-`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactSpec {
    pub coordinate: Coordinate,
    pub version: Option<String>,
}

impl ArtifactSpec {
    /// Parse `group:id:type`, `group:id:type:version` or
    /// `group:id:type:classifier:version`.
    pub fn parse(spec: &str) -> DepnsResult<Self> {
        let trimmed = spec.trim();
        let parts: Vec<&str> = trimmed.split(':').collect();
        let (group, id, kind, classifier, version) = match parts.as_slice() {
            [g, i, t] => (*g, *i, *t, None, None),
            [g, i, t, v] => (*g, *i, *t, None, Some(*v)),
            [g, i, t, c, v] => (*g, *i, *t, Some(*c), Some(*v)),
            _ => {
                return Err(DepnsError::parse(
                    spec,
                    0,
                    spec.len(),
                    format!("expected group:id:type[:classifier][:version], got {trimmed:?}"),
                ))
            }
        };

        for (label, value) in [("group", group), ("id", id), ("type", kind)] {
            if value.trim().is_empty() {
                return Err(DepnsError::parse(
                    spec,
                    0,
                    spec.len(),
                    format!("artifact spec {trimmed:?} has an empty {label}"),
                ));
            }
        }

        let mut coordinate = Coordinate::new(group.trim(), id.trim(), kind.trim());
        if let Some(c) = classifier.map(str::trim).filter(|c| !c.is_empty()) {
            coordinate = coordinate.with_classifier(c);
        }
        let version = version
            .map(str::trim)
            .filter(|v| !v.is_empty() && *v != "-")
            .map(str::to_string);

        Ok(Self {
            coordinate,
            version,
        })
    }

    pub fn unversioned_spec(&self) -> String {
        self.coordinate.unversioned_spec()
    }
}

impl fmt::Display for ArtifactSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.version {
            Some(ref v) => write!(f, "{}:{v}", self.coordinate),
            None => write!(f, "{}", self.coordinate),
        }
    }
}

/// Returns true when `s` is shaped like an artifact spec (at least
/// `group:id:type`), as opposed to a plain entry name or version.
pub fn looks_like_spec(s: &str) -> bool {
    s.matches(':').count() >= 2
}

/// A fully concrete artifact: coordinate plus an exact version.
///
/// This is the handle handed to packaging and compile tasks; fetching bytes
/// for it is the repository layer's business.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Artifact {
    #[serde(flatten)]
    pub coordinate: Coordinate,
    pub version: String,
}

impl Artifact {
    pub fn new(coordinate: Coordinate, version: &str) -> Self {
        Self {
            coordinate,
            version: version.to_string(),
        }
    }

    /// Parse a concrete spec; fails when the version part is missing.
    pub fn parse(spec: &str) -> DepnsResult<Self> {
        let parsed = ArtifactSpec::parse(spec)?;
        match parsed.version {
            Some(version) => Ok(Self::new(parsed.coordinate, &version)),
            None => Err(DepnsError::parse(
                spec,
                0,
                spec.len(),
                format!("artifact spec {:?} has no version", spec.trim()),
            )),
        }
    }

    pub fn to_spec(&self) -> String {
        self.coordinate.with_version(&self.version)
    }

    pub fn unversioned_spec(&self) -> String {
        self.coordinate.unversioned_spec()
    }
}

impl fmt::Display for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_spec())
    }
}
