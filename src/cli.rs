//! CLI domain: parse, route, output, and presentation only.
//! Pull orchestration lives in the registry; the route table only drives it.

mod output;
mod parse;
mod presentation;
mod route;

pub use output::map_error;
pub use parse::{Cli, Commands, OutputFormat};
pub use presentation::{
    format_event_json, format_event_text, format_library_models_json,
    format_library_models_text, format_local_models_json, format_local_models_text,
    format_status_json, format_status_text,
};
pub use route::RunContext;
