//! Merge rules: defaults, override order, conflict handling.

use config::Config;
use config::ConfigBuilder;
use config::ConfigError;

/// Create a Config builder with merge policy defaults applied.
pub fn builder_with_defaults() -> Result<ConfigBuilder<config::builder::DefaultState>, ConfigError>
{
    Config::builder()
        .set_default("backend.base_url", "http://localhost:5001")?
        .set_default("backend.connect_timeout_secs", 10)?
        .set_default("backend.request_timeout_secs", 30)?
        .set_default("backend.default_transport", "byte_stream")?
        .set_default("logging.level", "info")?
        .set_default("logging.format", "text")
}
