//! Config loader: assembles the layered sources and deserializes the result.

use std::path::{Path, PathBuf};

use config::{ConfigError, Environment, File};

use super::merge::merge_policy;
use super::sources::{global_file, workspace_file};
use super::PullstreamConfig;

/// Environment overrides use a double underscore between path segments,
/// e.g. `PULLSTREAM__BACKEND__BASE_URL`.
const ENV_PREFIX: &str = "PULLSTREAM";

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration for a workspace.
    /// Precedence (lowest to highest): defaults, global file, workspace files, environment.
    pub fn load(workspace_root: &Path) -> Result<PullstreamConfig, ConfigError> {
        let builder = merge_policy::builder_with_defaults()?;
        let builder = global_file::add_to_builder(builder)?;
        let builder = workspace_file::add_to_builder(builder, workspace_root)?;
        builder
            .add_source(env_source())
            .build()?
            .try_deserialize()
    }

    /// Load configuration from one explicit file; environment still overrides it.
    pub fn load_from_file(path: &Path) -> Result<PullstreamConfig, ConfigError> {
        merge_policy::builder_with_defaults()?
            .add_source(File::from(path.to_path_buf()).required(true))
            .add_source(env_source())
            .build()?
            .try_deserialize()
    }

    /// Path of the user-level config file, whether or not it exists.
    pub fn global_config_path() -> Option<PathBuf> {
        global_file::global_config_path()
    }
}

fn env_source() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .separator("__")
        .try_parsing(true)
}
