//! CLI presentation: progress lines, model tables, status text/json.

use comfy_table::presets::UTF8_BORDERS_ONLY;
use comfy_table::Table;
use owo_colors::OwoColorize;
use serde_json::json;

use crate::backend::{BackendStatus, LibraryModel, LocalModel};
use crate::progress::{format_bytes, ProgressEvent, PullUpdate};

/// One line per progress event. `color` should be false when stdout is not a terminal.
pub fn format_event_text(model: &str, event: &ProgressEvent, color: bool) -> String {
    let body = match event {
        ProgressEvent::Started => "Starting pull...".to_string(),
        ProgressEvent::Downloading {
            completed_bytes,
            total_bytes,
            status_text,
        } => match (total_bytes, event.percent()) {
            (Some(total), Some(pct)) => format!(
                "{} {} / {} ({:.1}%)",
                status_text,
                format_bytes(*completed_bytes),
                format_bytes(*total),
                pct
            ),
            _ => format!("{} {}", status_text, format_bytes(*completed_bytes)),
        },
        ProgressEvent::Verifying { status_text } => status_text.clone(),
        ProgressEvent::Completed => "Pull complete".to_string(),
        ProgressEvent::Failed { message } => format!("Pull failed: {}", message),
        ProgressEvent::Aborted => "Pull aborted".to_string(),
    };
    if !color {
        return format!("[{}] {}", model, body);
    }
    let body = match event {
        ProgressEvent::Completed => body.green().bold().to_string(),
        ProgressEvent::Failed { .. } => body.red().bold().to_string(),
        ProgressEvent::Aborted => body.yellow().to_string(),
        ProgressEvent::Verifying { .. } => body.cyan().to_string(),
        _ => body,
    };
    format!("[{}] {}", model.bold(), body)
}

/// One JSON object per line, for piping into other tools.
pub fn format_event_json(update: &PullUpdate) -> String {
    serde_json::to_string(update).unwrap_or_else(|_| "{}".to_string())
}

pub fn format_local_models_text(models: &[LocalModel]) -> String {
    if models.is_empty() {
        return "No models installed.\n\nUse 'pullstream pull <model>' to install one.".to_string();
    }
    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.set_header(vec!["Name", "Size", "Modified"]);
    for model in models {
        table.add_row(vec![
            model.name.clone(),
            model.display_size(),
            model.modified_at.clone().unwrap_or_else(|| "-".to_string()),
        ]);
    }
    format!("{}\n\nTotal: {} model(s)", table, models.len())
}

pub fn format_local_models_json(models: &[LocalModel]) -> String {
    let out = json!({ "models": models, "total": models.len() });
    serde_json::to_string_pretty(&out).unwrap_or_else(|_| "{}".to_string())
}

pub fn format_library_models_text(models: &[LibraryModel]) -> String {
    if models.is_empty() {
        return "The library offered no models.".to_string();
    }
    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.set_header(vec!["Name", "Description"]);
    for model in models {
        table.add_row(vec![
            model.name.clone(),
            model.description.clone().unwrap_or_default(),
        ]);
    }
    format!("{}\n\nTotal: {} model(s)", table, models.len())
}

pub fn format_library_models_json(models: &[LibraryModel]) -> String {
    let out = json!({ "models": models, "total": models.len() });
    serde_json::to_string_pretty(&out).unwrap_or_else(|_| "{}".to_string())
}

pub fn format_status_text(base_url: &str, status: &BackendStatus, color: bool) -> String {
    let state = match (status.running, color) {
        (true, true) => "running".green().to_string(),
        (true, false) => "running".to_string(),
        (false, true) => "not running".red().to_string(),
        (false, false) => "not running".to_string(),
    };
    format!("Backend {}: {}", base_url, state)
}

pub fn format_status_json(base_url: &str, status: &BackendStatus) -> String {
    let out = json!({ "base_url": base_url, "running": status.running });
    serde_json::to_string_pretty(&out).unwrap_or_else(|_| "{}".to_string())
}
