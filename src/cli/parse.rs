//! CLI parse: clap types for Pullstream. No behavior; definitions only.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::progress::TransportKind;

/// Pullstream CLI - Pull models from a model-hosting backend and follow their progress
#[derive(Parser)]
#[command(name = "pullstream")]
#[command(about = "Pull models from a model-hosting backend and follow their progress")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Workspace root directory (for config/config.toml)
    #[arg(long, default_value = ".")]
    pub workspace: PathBuf,

    /// Configuration file path (overrides default config loading)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Backend base URL (overrides config)
    #[arg(long)]
    pub backend_url: Option<String>,

    /// Disable logging
    #[arg(long, short)]
    pub quiet: bool,

    /// Enable verbose logging
    #[arg(long, short)]
    pub verbose: bool,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long)]
    pub log_format: Option<String>,

    /// Log output (stdout, stderr, file)
    #[arg(long)]
    pub log_output: Option<String>,

    /// Log file path (if output is "file")
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Pull a model and follow its progress until it finishes
    Pull {
        /// Model name, e.g. llama2 or llama2:13b
        model: String,
        /// Progress transport (push or stream); defaults to the configured one
        #[arg(long, value_enum)]
        transport: Option<TransportKind>,
        /// Output format
        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },
    /// List models installed on the backend
    Models {
        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },
    /// List models the library offers for pulling
    Library {
        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },
    /// Check whether the backend is running
    Status {
        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },
    /// Print the effective configuration as TOML
    Config,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}
