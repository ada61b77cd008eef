//! Mapping from both wire formats to [`ProgressEvent`].
//!
//! Numeric fields are read leniently (numbers or numeric strings) so one badly
//! typed field never hides the rest of a record, in particular its `error`.

use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use crate::error::GENERIC_PULL_FAILURE;
use crate::progress::event::ProgressEvent;
use crate::progress::transport::PushEvent;

/// Byte-stream records report sizes in decimal megabytes.
pub const BYTES_PER_MB: f64 = 1_000_000.0;

/// One mapped wire message.
#[derive(Debug, Clone, PartialEq)]
pub enum WireUpdate {
    Event(ProgressEvent),
    /// A status-only update such as `pulling manifest` or `writing manifest`.
    /// The session turns the first one into `Started` and later ones into a
    /// `Downloading` that keeps the last known byte counts.
    Status(String),
}

#[derive(Debug, Default, Deserialize)]
struct PushPayload {
    #[serde(default)]
    status: Option<Value>,
    #[serde(default)]
    completed: Option<Value>,
    #[serde(default)]
    total: Option<Value>,
    #[serde(default)]
    error: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
struct StreamRecord {
    #[serde(default)]
    status: Option<Value>,
    #[serde(default)]
    completed_mb: Option<Value>,
    #[serde(default)]
    total_mb: Option<Value>,
    #[serde(default)]
    progress: Option<Value>,
}

/// Map a named push-channel event. Unknown names and payloads that are not
/// JSON objects yield `None`.
pub fn map_push_event(event: &PushEvent) -> Option<WireUpdate> {
    match event.name.as_str() {
        "progress" => {
            let payload: PushPayload = match serde_json::from_str(&event.data) {
                Ok(payload) => payload,
                Err(err) => {
                    warn!(error = %err, data = %event.data, "Unparseable progress payload");
                    return None;
                }
            };
            Some(map_push_progress(payload))
        }
        "error" => {
            let message = serde_json::from_str::<PushPayload>(&event.data)
                .ok()
                .and_then(|p| error_message(p.error.as_ref()))
                .unwrap_or_else(|| GENERIC_PULL_FAILURE.to_string());
            Some(WireUpdate::Event(ProgressEvent::Failed { message }))
        }
        "done" => Some(WireUpdate::Event(ProgressEvent::Completed)),
        _ => None,
    }
}

fn map_push_progress(payload: PushPayload) -> WireUpdate {
    let status = text(payload.status.as_ref());
    if let Some(completed) = number(payload.completed.as_ref()) {
        return WireUpdate::Event(ProgressEvent::downloading(
            to_bytes(completed, 1.0),
            number(payload.total.as_ref()).map(|t| to_bytes(t, 1.0)),
            status.unwrap_or_else(|| "downloading".to_string()),
        ));
    }
    match status {
        Some(status) if status.to_ascii_lowercase().contains("verif") => {
            WireUpdate::Event(ProgressEvent::Verifying { status_text: status })
        }
        status => WireUpdate::Status(status.unwrap_or_default()),
    }
}

/// Map one decoded byte-stream record. A truthy `error` field wins over
/// everything else in the record.
pub fn map_stream_record(value: Value) -> Option<WireUpdate> {
    if let Some(message) = error_message(value.get("error")) {
        return Some(WireUpdate::Event(ProgressEvent::Failed { message }));
    }

    let record: StreamRecord = match serde_json::from_value(value) {
        Ok(record) => record,
        Err(err) => {
            warn!(error = %err, "Byte-stream record is not an object");
            return None;
        }
    };

    let status = text(record.status.as_ref());
    Some(match status.as_deref() {
        Some("downloading") => {
            let completed_mb = number(record.completed_mb.as_ref()).unwrap_or(0.0);
            let total_mb = number(record.total_mb.as_ref());
            let status_text =
                downloading_text(completed_mb, total_mb, number(record.progress.as_ref()));
            WireUpdate::Event(ProgressEvent::downloading(
                to_bytes(completed_mb, BYTES_PER_MB),
                total_mb.map(|t| to_bytes(t, BYTES_PER_MB)),
                status_text,
            ))
        }
        Some("verifying") => WireUpdate::Event(ProgressEvent::Verifying {
            status_text: "Verifying download...".to_string(),
        }),
        Some("success") | Some("done") => WireUpdate::Event(ProgressEvent::Completed),
        _ => WireUpdate::Status(status.unwrap_or_default()),
    })
}

/// The failure message for an `error` field, or `None` when the field is
/// absent or falsy (`null`, `false`, `0`, `""`).
fn error_message(error: Option<&Value>) -> Option<String> {
    match error? {
        Value::Null | Value::Bool(false) => None,
        Value::String(s) if s.trim().is_empty() => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) if n.as_f64() == Some(0.0) => None,
        Value::Bool(true) => Some(GENERIC_PULL_FAILURE.to_string()),
        other => Some(other.to_string()),
    }
}

fn number(value: Option<&Value>) -> Option<f64> {
    let parsed = match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|n| n.is_finite())
}

fn text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        _ => None,
    }
}

fn downloading_text(completed_mb: f64, total_mb: Option<f64>, percent: Option<f64>) -> String {
    let mut text = match total_mb {
        Some(total) => format!("Downloading: {}MB / {}MB", completed_mb, total),
        None => format!("Downloading: {}MB", completed_mb),
    };
    if let Some(percent) = percent {
        text.push_str(&format!(" ({}%)", percent));
    }
    text
}

fn to_bytes(value: f64, factor: f64) -> u64 {
    if !value.is_finite() || value <= 0.0 {
        return 0;
    }
    (value * factor).round() as u64
}
