//! Error types for pull sessions and the backend facade.

use thiserror::Error;

use crate::progress::ProgressEvent;

/// Message surfaced when the initiating request or the transport fails without
/// an explicit error payload from the server.
pub const GENERIC_PULL_FAILURE: &str = "Error pulling model";

/// Errors returned synchronously by the registry and the backend facade
#[derive(Debug, Error)]
pub enum PullError {
    #[error("A pull for '{0}' is already active")]
    AlreadyActive(String),

    #[error("Pull request rejected{}: {message}", status.map(|s| format!(" with status {}", s)).unwrap_or_default())]
    TransportRejected {
        status: Option<u16>,
        message: String,
    },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Configuration error: {0}")]
    Config(String),

    /// A pull that started but ended in `Failed`
    #[error("Pull of '{key}' failed: {message}")]
    PullFailed { key: String, message: String },

    #[error("Pull of '{0}' was aborted")]
    Aborted(String),
}

impl PullError {
    /// The terminal event a UI should show for this error, if it represents a
    /// failed pull rather than a caller mistake.
    pub fn as_failed_event(&self) -> Option<ProgressEvent> {
        match self {
            PullError::TransportRejected { .. } | PullError::Transport(_) => {
                Some(ProgressEvent::Failed {
                    message: GENERIC_PULL_FAILURE.to_string(),
                })
            }
            _ => None,
        }
    }
}

impl From<config::ConfigError> for PullError {
    fn from(err: config::ConfigError) -> Self {
        PullError::Config(err.to_string())
    }
}

/// A single malformed byte-stream record. Never fatal to the stream.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Malformed record ({reason}): {line}")]
pub struct DecodeError {
    pub line: String,
    pub reason: String,
}
