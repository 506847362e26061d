//! Version parsing and ordering.
//!
//! Versions are free-form strings over `[A-Za-z0-9.-]` containing at least
//! one digit. They are split into parts on `.`, `-` and digit/letter
//! boundaries (`1.0rc3` is `1`, `0`, `rc`, `3`) and compared part by part.
//! Parts rank as: pre-release stages (`alpha` < `beta` < `milestone` <
//! `rc` < `snapshot`), then any other word, then `release`/`ga`/`final`,
//! then `sp`, then numbers. Numbers of any length compare by value, and a
//! missing trailing part counts as `0`, so `1.0 == 1.0.0`.

use std::cmp::Ordering;
use std::fmt;

use depns_util::errors::{DepnsError, DepnsResult};

/// A parsed, comparable version.
#[derive(Debug, Clone)]
pub struct Version {
    original: String,
    parts: Vec<Part>,
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

/// One comparable piece of a version.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Part {
    /// Digits with leading zeros stripped; zero is the empty string.
    Number(String),
    Stage(Stage),
    /// Lowercased text that is not a known stage.
    Word(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Stage {
    Alpha,
    Beta,
    Milestone,
    Rc,
    Snapshot,
    Release,
    ServicePack,
}

impl Part {
    fn new(token: &str) -> Self {
        if token.bytes().all(|b| b.is_ascii_digit()) {
            return Part::Number(token.trim_start_matches('0').to_string());
        }
        let word = token.to_ascii_lowercase();
        let stage = match word.as_str() {
            "alpha" | "a" => Some(Stage::Alpha),
            "beta" | "b" => Some(Stage::Beta),
            "milestone" | "m" => Some(Stage::Milestone),
            "rc" | "cr" => Some(Stage::Rc),
            "snapshot" => Some(Stage::Snapshot),
            "release" | "ga" | "final" => Some(Stage::Release),
            "sp" => Some(Stage::ServicePack),
            _ => None,
        };
        stage.map_or(Part::Word(word), Part::Stage)
    }

    fn tier(&self) -> u8 {
        match self {
            Part::Stage(stage) if *stage < Stage::Release => 0,
            Part::Word(_) => 1,
            Part::Stage(_) => 2,
            Part::Number(_) => 3,
        }
    }

    /// How this part compares with a part the other version lacks.
    fn against_missing(&self) -> Ordering {
        match self {
            Part::Number(digits) if digits.is_empty() => Ordering::Equal,
            Part::Number(_) => Ordering::Greater,
            Part::Stage(stage) => stage.cmp(&Stage::Release),
            Part::Word(_) => Ordering::Less,
        }
    }
}

impl Ord for Part {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Part::Number(a), Part::Number(b)) => a.len().cmp(&b.len()).then_with(|| a.cmp(b)),
            (Part::Stage(a), Part::Stage(b)) => a.cmp(b),
            (Part::Word(a), Part::Word(b)) => a.cmp(b),
            _ => self.tier().cmp(&other.tier()),
        }
    }
}

impl PartialOrd for Part {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

fn compare_parts(a: Option<&Part>, b: Option<&Part>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.cmp(b),
        (Some(a), None) => a.against_missing(),
        (None, Some(b)) => b.against_missing().reverse(),
        (None, None) => Ordering::Equal,
    }
}

fn split_parts(version: &str) -> Vec<Part> {
    let mut parts = Vec::new();
    for chunk in version.split(|c: char| c == '.' || c == '-') {
        let mut rest = chunk;
        while let Some(first) = rest.chars().next() {
            let digits = first.is_ascii_digit();
            let end = rest
                .find(|c: char| c.is_ascii_digit() != digits)
                .unwrap_or(rest.len());
            parts.push(Part::new(&rest[..end]));
            rest = &rest[end..];
        }
    }
    parts
}

impl Version {
    /// Parse a version, failing when [`Version::is_valid`] does not hold.
    pub fn parse(version: &str) -> DepnsResult<Self> {
        let trimmed = version.trim();
        if let Some((offset, ch)) = version
            .char_indices()
            .skip_while(|(_, c)| c.is_whitespace())
            .find(|(i, c)| !is_version_char(*c) && *i < version.trim_end().len())
        {
            return Err(DepnsError::parse(
                version,
                offset,
                ch.len_utf8(),
                format!("invalid character {ch:?} in version {trimmed:?}"),
            ));
        }
        if !Self::is_valid(trimmed) {
            let offset = version.len() - version.trim_start().len();
            return Err(DepnsError::parse(
                version,
                offset,
                trimmed.len(),
                format!("invalid version {trimmed:?}: a version needs at least one digit"),
            ));
        }
        Ok(Self {
            original: trimmed.to_string(),
            parts: split_parts(trimmed),
        })
    }

    /// True when `version`, once trimmed, only uses `[A-Za-z0-9.-]` and
    /// contains at least one digit.
    pub fn is_valid(version: &str) -> bool {
        let trimmed = version.trim();
        !trimmed.is_empty()
            && trimmed.chars().all(is_version_char)
            && trimmed.chars().any(|c| c.is_ascii_digit())
    }

    pub fn as_str(&self) -> &str {
        &self.original
    }

    pub fn part_count(&self) -> usize {
        self.parts.len()
    }

    /// Pessimistic match (`~>`): `self` agrees with every part of `base`
    /// except the last and is not lower than `base`.
    ///
    /// `~>1.2.3` accepts `1.2.3`, `1.2.9` and `1.2.3.4` but not `1.3`.
    pub fn is_pessimistic_match(&self, base: &Version) -> bool {
        let prefix = base.parts.len().saturating_sub(1);
        let shares_prefix = (0..prefix)
            .all(|i| compare_parts(self.parts.get(i), base.parts.get(i)) == Ordering::Equal);
        shares_prefix && self >= base
    }
}

fn is_version_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '.' || c == '-'
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.original)
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.parts.len().max(other.parts.len());
        (0..len)
            .map(|i| compare_parts(self.parts.get(i), other.parts.get(i)))
            .find(|ord| ord.is_ne())
            .unwrap_or(Ordering::Equal)
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
