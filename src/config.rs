//! Configuration System
//!
//! Layered configuration for the pull engine: built-in defaults, then the
//! global config file, then workspace config files, then `PULLSTREAM__*`
//! environment variables.

use serde::{Deserialize, Serialize};

use crate::logging::LoggingConfig;
use crate::progress::TransportKind;

mod facade;
mod merge;
mod sources;

pub use facade::ConfigLoader;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PullstreamConfig {
    /// Backend connection settings
    #[serde(default)]
    pub backend: BackendConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Where the backend lives and how pulls talk to it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// Applies to one-shot requests only, never to a pull's progress stream
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_transport")]
    pub default_transport: TransportKind,

    /// Fail a pull after this long without any progress frame (unset: wait forever)
    #[serde(default)]
    pub stall_timeout_secs: Option<u64>,
}

fn default_base_url() -> String {
    "http://localhost:5001".to_string()
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_transport() -> TransportKind {
    TransportKind::ByteStream
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            connect_timeout_secs: default_connect_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            default_transport: default_transport(),
            stall_timeout_secs: None,
        }
    }
}

impl BackendConfig {
    pub fn validate(&self) -> Result<(), String> {
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(format!(
                "base_url must be an http(s) URL, got '{}'",
                self.base_url
            ));
        }
        if self.connect_timeout_secs == 0 || self.request_timeout_secs == 0 {
            return Err("Timeouts must be greater than zero".to_string());
        }
        if self.stall_timeout_secs == Some(0) {
            return Err("stall_timeout_secs must be greater than zero when set".to_string());
        }
        Ok(())
    }

    pub fn stall_timeout(&self) -> Option<std::time::Duration> {
        self.stall_timeout_secs.map(std::time::Duration::from_secs)
    }
}

/// Configuration validation errors
#[derive(Debug, Clone)]
pub enum ValidationError {
    Backend(String),
    Logging(String),
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::Backend(msg) => write!(f, "Backend: {}", msg),
            ValidationError::Logging(msg) => write!(f, "Logging: {}", msg),
        }
    }
}

impl std::error::Error for ValidationError {}

impl PullstreamConfig {
    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if let Err(e) = self.backend.validate() {
            errors.push(ValidationError::Backend(e));
        }
        if let Err(e) = self.logging.validate() {
            errors.push(ValidationError::Logging(e));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
