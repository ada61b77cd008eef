//! Normalized progress events shared by every transport.

use serde::{Deserialize, Serialize};

/// One step of a pull, independent of the wire format it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProgressEvent {
    Started,
    Downloading {
        completed_bytes: u64,
        #[serde(skip_serializing_if = "Option::is_none")]
        total_bytes: Option<u64>,
        status_text: String,
    },
    Verifying {
        status_text: String,
    },
    Completed,
    Failed {
        message: String,
    },
    Aborted,
}

impl ProgressEvent {
    /// Build a `Downloading` event, clamping `completed` to `total` when the
    /// wire over-reports.
    pub fn downloading(completed: u64, total: Option<u64>, status_text: impl Into<String>) -> Self {
        let completed_bytes = match total {
            Some(total) => completed.min(total),
            None => completed,
        };
        ProgressEvent::Downloading {
            completed_bytes,
            total_bytes: total,
            status_text: status_text.into(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ProgressEvent::Completed | ProgressEvent::Failed { .. } | ProgressEvent::Aborted
        )
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ProgressEvent::Started => "started",
            ProgressEvent::Downloading { .. } => "downloading",
            ProgressEvent::Verifying { .. } => "verifying",
            ProgressEvent::Completed => "completed",
            ProgressEvent::Failed { .. } => "failed",
            ProgressEvent::Aborted => "aborted",
        }
    }

    /// Completion percentage, when both byte counts are known.
    pub fn percent(&self) -> Option<f64> {
        match self {
            ProgressEvent::Downloading {
                completed_bytes,
                total_bytes: Some(total),
                ..
            } if *total > 0 => Some(*completed_bytes as f64 / *total as f64 * 100.0),
            ProgressEvent::Completed => Some(100.0),
            _ => None,
        }
    }
}

/// Lifecycle of a pull session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "event", rename_all = "snake_case")]
pub enum SessionState {
    Pending,
    Active,
    Terminal(ProgressEvent),
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Terminal(_))
    }
}

/// An event as seen by registry observers, tagged with its origin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullUpdate {
    pub ts: String,
    pub key: String,
    pub session_id: u64,
    pub event: ProgressEvent,
}

impl PullUpdate {
    pub fn with_now(key: impl Into<String>, session_id: u64, event: ProgressEvent) -> Self {
        Self {
            ts: chrono::Utc::now().timestamp_millis().to_string(),
            key: key.into(),
            session_id,
            event,
        }
    }
}

/// Human-readable size using binary (1024) units, e.g. `1.5 KB`.
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["Bytes", "KB", "MB", "GB", "TB"];
    if bytes == 0 {
        return "0 Bytes".to_string();
    }
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    let rounded = (value * 100.0).round() / 100.0;
    format!("{} {}", rounded, UNITS[unit])
}
