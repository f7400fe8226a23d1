//! Error types for contentmirror.
//!
//! Library crates use [`ContentMirrorError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all contentmirror operations.
#[derive(Debug, thiserror::Error)]
pub enum ContentMirrorError {
    /// Configuration loading or validation error, including an
    /// unregistered repository or an unresolvable release ID.
    #[error("config error: {message}")]
    Config { message: String },

    /// Network/API failure while querying the remote repository.
    #[error("transport error: {0}")]
    Transport(String),

    /// Database or storage layer error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Data validation error (malformed payload, bad response shape, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, ContentMirrorError>;

impl ContentMirrorError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
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
