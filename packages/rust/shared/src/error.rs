//! Error types for LiveCourses.
//!
//! Library crates use [`LiveCoursesError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all LiveCourses operations.
#[derive(Debug, thiserror::Error)]
pub enum LiveCoursesError {
    /// Configuration loading or validation error (including a missing credential).
    #[error("config error: {message}")]
    Config { message: String },

    /// Transport-level failure talking to the scrape provider.
    #[error("network error: {0}")]
    Network(String),

    /// The provider answered with a non-2xx status.
    #[error("HTTP {status} from {endpoint}")]
    Http { status: u16, endpoint: String },

    /// Response body could not be parsed or did not have the expected shape.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Every attempt of a retried request failed.
    #[error("request to {endpoint} failed after {attempts} attempt(s): {last_error}")]
    RetriesExhausted {
        endpoint: String,
        attempts: u32,
        last_error: String,
    },

    /// The provider did not pass the health check.
    #[error("scrape provider unavailable: {0}")]
    Unavailable(String),

    /// The pipeline exceeded its wall-clock budget.
    #[error("timed out after {elapsed_ms}ms")]
    Timeout { elapsed_ms: u64 },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (bad request body, invalid URL template, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, LiveCoursesError>;

impl LiveCoursesError {
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
}
