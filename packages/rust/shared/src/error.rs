//! Error types for LeadPipe.
//!
//! Library crates use [`LeadPipeError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all LeadPipe operations.
#[derive(Debug, thiserror::Error)]
pub enum LeadPipeError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Network/HTTP error outside of a specific sink (e.g. client construction).
    #[error("network error: {0}")]
    Network(String),

    /// Backup store or database error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Malformed raw lead or other input validation failure.
    #[error("validation error: {message}")]
    Validation { message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// JSON encoding/decoding error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A single sink's delivery attempt failed.
    #[error("delivery to {sink} failed: {message}")]
    Delivery { sink: String, message: String },

    /// Every sink failed for one attempt of a lead.
    #[error("all sinks failed for {lead_id} (attempt {attempt})")]
    AllSinksFailed { lead_id: String, attempt: u32 },

    /// A lead used up its retry budget.
    #[error("retries exhausted for {lead_id} after {attempts} attempts")]
    RetriesExhausted { lead_id: String, attempts: u32 },

    /// The pending queue is at capacity.
    #[error("lead queue is full ({capacity} pending)")]
    QueueFull { capacity: usize },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, LeadPipeError>;

impl LeadPipeError {
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

    /// Create a delivery error for the named sink.
    pub fn delivery(sink: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Delivery {
            sink: sink.into(),
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

impl From<serde_json::Error> for LeadPipeError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}
