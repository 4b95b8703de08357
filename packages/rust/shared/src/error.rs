//! Error types for the harvester.
//!
//! Library crates use [`HarvesterError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all harvester operations.
#[derive(Debug, thiserror::Error)]
pub enum HarvesterError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Malformed RDF or CSV input.
    #[error("parse error in {path:?}: {message}")]
    Parse { path: PathBuf, message: String },

    /// An asset description violates a schema invariant (resource count,
    /// missing mandatory property). The message is reproduced verbatim.
    #[error("{message}")]
    InvalidModel { message: String },

    /// Transport or protocol failure talking to the triple store or index.
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    /// The source repository could not be cloned.
    #[error("failed to clone {repo_url}: {message}")]
    Clone { repo_url: String, message: String },

    /// A controlled vocabulary description has no paired data file.
    #[error("no data file found for controlled vocabulary {ttl_path:?}")]
    MissingDataFile { ttl_path: PathBuf },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Input validation error (bad graph IRI, bad repository URL, ...).
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, HarvesterError>;

impl HarvesterError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error for the given source file.
    pub fn parse(path: impl Into<PathBuf>, msg: impl Into<String>) -> Self {
        Self::Parse {
            path: path.into(),
            message: msg.into(),
        }
    }

    /// Create a schema-invariant violation.
    pub fn invalid_model(msg: impl Into<String>) -> Self {
        Self::InvalidModel {
            message: msg.into(),
        }
    }

    /// Create a store-unavailable error from any displayable message.
    pub fn store(msg: impl Into<String>) -> Self {
        Self::StoreUnavailable(msg.into())
    }

    /// Create a clone failure for `repo_url`.
    pub fn clone_failed(repo_url: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Clone {
            repo_url: repo_url.into(),
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = HarvesterError::config("missing endpoint");
        assert_eq!(err.to_string(), "config error: missing endpoint");

        let err = HarvesterError::invalid_model("No statement for a node");
        assert_eq!(err.to_string(), "No statement for a node");

        let err = HarvesterError::parse("onto.ttl", "unexpected end of file");
        assert!(err.to_string().contains("onto.ttl"));
        assert!(err.to_string().contains("unexpected end of file"));
    }

    #[test]
    fn missing_data_file_names_the_description() {
        let err = HarvesterError::MissingDataFile {
            ttl_path: "assets/controlled-vocabularies/cities/cities.ttl".into(),
        };
        assert!(err.to_string().contains("cities.ttl"));
    }
}
