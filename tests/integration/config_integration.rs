use std::fs;

use pullstream::config::ConfigLoader;
use pullstream::progress::TransportKind;
use tempfile::TempDir;

use crate::integration::test_utils::with_env;

fn write(path: &std::path::Path, contents: &str) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, contents).unwrap();
}

#[test]
fn layers_apply_in_precedence_order() {
    let temp = TempDir::new().unwrap();
    let xdg = temp.path().join("xdg");
    let workspace = temp.path().join("workspace");

    write(
        &xdg.join("pullstream").join("config.toml"),
        "[backend]\nbase_url = \"http://global:5001\"\nrequest_timeout_secs = 11\nconnect_timeout_secs = 3\n",
    );
    write(
        &workspace.join("config").join("config.toml"),
        "[backend]\nbase_url = \"http://workspace:5001\"\nrequest_timeout_secs = 12\n",
    );
    write(
        &workspace.join("config").join("production.toml"),
        "[backend]\ndefault_transport = \"push_channel\"\n",
    );

    let xdg_str = xdg.to_string_lossy().to_string();
    let config = with_env(
        &[
            ("XDG_CONFIG_HOME", xdg_str.as_str()),
            ("PULLSTREAM_ENV", "production"),
            ("PULLSTREAM__BACKEND__REQUEST_TIMEOUT_SECS", "13"),
        ],
        || ConfigLoader::load(&workspace).unwrap(),
    );

    assert_eq!(config.backend.connect_timeout_secs, 3, "global file applies");
    assert_eq!(config.backend.base_url, "http://workspace:5001", "workspace beats global");
    assert_eq!(config.backend.default_transport, TransportKind::PushChannel);
    assert_eq!(config.backend.request_timeout_secs, 13, "environment wins");
}

#[test]
fn env_enables_stall_timeout() {
    let temp = TempDir::new().unwrap();
    let xdg = temp.path().join("xdg");
    let xdg_str = xdg.to_string_lossy().to_string();

    let config = with_env(
        &[
            ("XDG_CONFIG_HOME", xdg_str.as_str()),
            ("PULLSTREAM__BACKEND__STALL_TIMEOUT_SECS", "45"),
        ],
        || ConfigLoader::load(temp.path()).unwrap(),
    );
    assert_eq!(
        config.backend.stall_timeout(),
        Some(std::time::Duration::from_secs(45))
    );
    assert!(config.validate().is_ok());
}

#[test]
fn missing_explicit_file_is_an_error() {
    let temp = TempDir::new().unwrap();
    assert!(ConfigLoader::load_from_file(&temp.path().join("absent.toml")).is_err());
}
