use miette::{Diagnostic, SourceSpan};
use thiserror::Error;

/// Unified error type for all depns operations.
#[derive(Debug, Error, Diagnostic)]
pub enum DepnsError {
    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed version, requirement or coordinate text.
    #[error("Parse error: {message}")]
    #[diagnostic(help("Requirements look like `>=1.0 & <2.0 | 3.0`; versions use [A-Za-z0-9.-] and need a digit"))]
    Parse {
        message: String,
        #[source_code]
        input: String,
        #[label("here")]
        span: SourceSpan,
    },

    /// A selected version conflicts with a declared requirement.
    #[error("Unsatisfied requirement for {name}: {spec} does not satisfy {requirement}")]
    Unsatisfied {
        name: String,
        spec: String,
        requirement: String,
    },

    /// An entry already holds a value of a different kind.
    #[error("Type mismatch for {key}: {message}")]
    TypeMismatch { key: String, message: String },

    /// Nothing could be found for a key.
    #[error("Lookup failed for {key}: {message}")]
    Lookup { key: String, message: String },

    /// Attempt to rewire the namespace tree in a forbidden way.
    #[error("Cannot set parent of {namespace}: {message}")]
    Immutability { namespace: String, message: String },

    /// Invalid or unreadable artifact profile.
    #[error("Config error: {message}")]
    #[diagnostic(help("Check the [artifacts.<namespace>] tables of your profile"))]
    Config { message: String },
}

impl DepnsError {
    /// Build a parse error pointing at `len` bytes starting at `offset` of `input`.
    pub fn parse(
        input: impl Into<String>,
        offset: usize,
        len: usize,
        message: impl Into<String>,
    ) -> Self {
        DepnsError::Parse {
            message: message.into(),
            input: input.into(),
            span: (offset, len).into(),
        }
    }
}

/// Convenience alias used by the library crates.
pub type DepnsResult<T> = Result<T, DepnsError>;
