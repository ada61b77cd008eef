//! CLI output: error mapping from domain errors to stable CLI surface.

use crate::error::PullError;

/// Map domain errors to a string for CLI output.
pub fn map_error(e: &PullError) -> String {
    match e {
        PullError::TransportRejected { .. } | PullError::Transport(_) => match e.as_failed_event() {
            Some(crate::progress::ProgressEvent::Failed { message }) => {
                format!("{} ({})", message, e)
            }
            _ => e.to_string(),
        },
        _ => e.to_string(),
    }
}
