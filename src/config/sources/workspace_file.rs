//! Workspace config sources, lowest to highest: `pullstream.toml` at the
//! workspace root, `config/config.toml`, then `config/{PULLSTREAM_ENV}.toml`.

use config::builder::DefaultState;
use config::ConfigBuilder;
use config::ConfigError;
use config::File;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Selects the environment file under `config/`.
pub const ENV_VAR: &str = "PULLSTREAM_ENV";
const DEFAULT_ENV: &str = "development";

/// Project file checked in next to the code that pulls models.
pub const PROJECT_FILE: &str = "pullstream.toml";

/// Candidate files for `env_name`, in precedence order. The name must be a
/// plain file stem so it cannot point outside `config/`.
pub fn workspace_config_paths(
    workspace_root: &Path,
    env_name: &str,
) -> Result<Vec<PathBuf>, ConfigError> {
    let plain = !env_name.is_empty()
        && env_name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if !plain {
        return Err(ConfigError::Message(format!(
            "{} must be a plain name, got {:?}",
            ENV_VAR, env_name
        )));
    }
    let config_dir = workspace_root.join("config");
    Ok(vec![
        workspace_root.join(PROJECT_FILE),
        config_dir.join("config.toml"),
        config_dir.join(format!("{}.toml", env_name)),
    ])
}

/// Add the workspace files that exist to builder.
pub fn add_to_builder(
    mut builder: ConfigBuilder<DefaultState>,
    workspace_root: &Path,
) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    let env_name = std::env::var(ENV_VAR).unwrap_or_else(|_| DEFAULT_ENV.to_string());
    for path in workspace_config_paths(workspace_root, &env_name)? {
        if path.is_file() {
            debug!(config_path = %path.display(), "Loading workspace configuration");
            builder = builder.add_source(File::from(path).required(true));
        }
    }
    Ok(builder)
}
