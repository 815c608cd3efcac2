//! Error types for Marginalia.
//!
//! Library crates use [`MarginaliaError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all Marginalia operations.
#[derive(Debug, thiserror::Error)]
pub enum MarginaliaError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Transport failure reaching the catalog service.
    #[error("network error: {0}")]
    Network(String),

    /// The catalog service answered with an application-level error list.
    #[error("catalog API error: {}", .messages.join("; "))]
    Api { messages: Vec<String> },

    /// The catalog service answered with a non-success HTTP status.
    #[error("catalog returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// Response or file parsing error.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Extraction database error.
    #[error("source error: {0}")]
    Source(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (unknown record id, bad argument, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, MarginaliaError>;

impl MarginaliaError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
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

    /// Whether this error aborts a whole run rather than a single record.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Config { .. })
    }
}
