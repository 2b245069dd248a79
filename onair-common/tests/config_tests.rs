//! Unit tests for configuration loading and graceful degradation
//!
//! Covers:
//! - Missing TOML files fall back to defaults without failing startup
//! - Malformed TOML files are reported as configuration errors
//! - Priority order for root folder resolution
//!
//! Tests that manipulate ONAIR_ROOT_FOLDER are marked with #[serial] so they
//! never run in parallel with each other.

use onair_common::config::{
    load_toml_file, CompiledDefaults, LoggingConfig, RootFolderResolver, ROOT_FOLDER_ENV,
};
use onair_common::Error;
use serde::Deserialize;
use serial_test::serial;
use std::env;
use std::path::PathBuf;
use tempfile::TempDir;

#[derive(Debug, Default, Deserialize, PartialEq)]
#[serde(default)]
struct SampleConfig {
    port: u16,
    root_folder: Option<PathBuf>,
    logging: LoggingConfig,
}

#[test]
fn test_compiled_defaults_for_current_platform() {
    let defaults = CompiledDefaults::for_current_platform();

    assert!(!defaults.root_folder.as_os_str().is_empty());
    assert!(defaults.root_folder.to_string_lossy().contains("onair"));
}

#[test]
#[serial]
fn test_resolver_with_no_overrides_uses_default() {
    env::remove_var(ROOT_FOLDER_ENV);

    let root_folder = RootFolderResolver::new("test-module").resolve();

    assert_eq!(root_folder, CompiledDefaults::for_current_platform().root_folder);
}

#[test]
#[serial]
fn test_resolver_cli_beats_env_and_toml() {
    env::set_var(ROOT_FOLDER_ENV, "/tmp/onair-env");

    let root_folder = RootFolderResolver::new("test-module")
        .with_cli_arg(Some(PathBuf::from("/tmp/onair-cli")))
        .with_toml_root(Some(PathBuf::from("/tmp/onair-toml")))
        .resolve();

    env::remove_var(ROOT_FOLDER_ENV);
    assert_eq!(root_folder, PathBuf::from("/tmp/onair-cli"));
}

#[test]
#[serial]
fn test_resolver_env_beats_toml() {
    env::set_var(ROOT_FOLDER_ENV, "/tmp/onair-env");

    let root_folder = RootFolderResolver::new("test-module")
        .with_toml_root(Some(PathBuf::from("/tmp/onair-toml")))
        .resolve();

    env::remove_var(ROOT_FOLDER_ENV);
    assert_eq!(root_folder, PathBuf::from("/tmp/onair-env"));
}

#[test]
#[serial]
fn test_resolver_uses_toml_when_no_cli_or_env() {
    env::remove_var(ROOT_FOLDER_ENV);

    let root_folder = RootFolderResolver::new("test-module")
        .with_toml_root(Some(PathBuf::from("/tmp/onair-toml")))
        .resolve();

    assert_eq!(root_folder, PathBuf::from("/tmp/onair-toml"));
}

#[test]
fn test_missing_toml_file_yields_defaults() {
    let temp_dir = TempDir::new().unwrap();
    let missing = temp_dir.path().join("absent.toml");

    let config: SampleConfig = load_toml_file(&missing).unwrap();

    assert_eq!(config, SampleConfig::default());
}

#[test]
fn test_partial_toml_file_keeps_defaults_for_missing_keys() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("radio.toml");
    std::fs::write(&path, "port = 4100\n").unwrap();

    let config: SampleConfig = load_toml_file(&path).unwrap();

    assert_eq!(config.port, 4100);
    assert!(config.root_folder.is_none());
    assert_eq!(config.logging.level, "info");
}

#[test]
fn test_malformed_toml_file_is_config_error() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("broken.toml");
    std::fs::write(&path, "port = [not valid").unwrap();

    let result: Result<SampleConfig, Error> = load_toml_file(&path);

    match result {
        Err(Error::Config(message)) => assert!(message.contains("broken.toml")),
        other => panic!("Expected Config error, got {:?}", other),
    }
}
