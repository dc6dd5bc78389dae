//! Unit tests for configuration and graceful degradation
//!
//! Tests that manipulate VITALS_ROOT_FOLDER / VITALS_ROOT or secret
//! environment variables are marked `#[serial]` so they never race.

use serial_test::serial;
use std::env;
use std::path::PathBuf;
use tempfile::TempDir;
use vitals_common::config::{
    load_toml_config, load_toml_config_or_default, resolve_secret, write_toml_config,
    CompiledDefaults, DispatchBackend, RootFolderInitializer, RootFolderResolver, TomlConfig,
    MAX_NARRATIVE_TIMEOUT_SECONDS, MAX_WINDOW_MINUTES,
};
use vitals_common::Error;

fn clear_root_env() {
    env::remove_var("VITALS_ROOT_FOLDER");
    env::remove_var("VITALS_ROOT");
}

#[test]
#[serial]
fn test_resolver_with_no_overrides_uses_default() {
    clear_root_env();

    let root_folder = RootFolderResolver::new("test-module").resolve();
    assert_eq!(root_folder, CompiledDefaults::for_current_platform().root_folder);
}

#[test]
#[serial]
fn test_resolver_cli_arg_beats_environment() {
    clear_root_env();
    env::set_var("VITALS_ROOT_FOLDER", "/tmp/vitals-env");

    let root_folder = RootFolderResolver::new("test-module")
        .with_cli_arg(Some(PathBuf::from("/tmp/vitals-cli")))
        .resolve();
    assert_eq!(root_folder, PathBuf::from("/tmp/vitals-cli"));

    clear_root_env();
}

#[test]
#[serial]
fn test_resolver_environment_beats_toml() {
    clear_root_env();
    env::set_var("VITALS_ROOT", "/tmp/vitals-env-alt");

    let config = TomlConfig {
        root_folder: Some(PathBuf::from("/tmp/vitals-toml")),
        ..TomlConfig::default()
    };
    let root_folder = RootFolderResolver::new("test-module")
        .with_toml_config(&config)
        .resolve();
    assert_eq!(root_folder, PathBuf::from("/tmp/vitals-env-alt"));

    clear_root_env();
}

#[test]
#[serial]
fn test_resolver_primary_env_var_takes_precedence() {
    clear_root_env();
    env::set_var("VITALS_ROOT_FOLDER", "/tmp/vitals-priority-1");
    env::set_var("VITALS_ROOT", "/tmp/vitals-priority-2");

    let root_folder = RootFolderResolver::new("test-module").resolve();
    assert_eq!(root_folder, PathBuf::from("/tmp/vitals-priority-1"));

    clear_root_env();
}

#[test]
#[serial]
fn test_resolver_falls_back_to_toml_root() {
    clear_root_env();

    let config = TomlConfig {
        root_folder: Some(PathBuf::from("/tmp/vitals-toml-root")),
        ..TomlConfig::default()
    };
    let root_folder = RootFolderResolver::new("test-module")
        .with_toml_config(&config)
        .resolve();
    assert_eq!(root_folder, PathBuf::from("/tmp/vitals-toml-root"));
}

#[test]
fn test_initializer_creates_directory_idempotently() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path().join("vitals-root");

    let initializer = RootFolderInitializer::new(root.clone());
    assert!(initializer.ensure_directory_exists().is_ok());
    assert!(initializer.ensure_directory_exists().is_ok());
    assert!(root.is_dir());
    assert!(!initializer.database_exists());
}

#[test]
fn test_write_then_load_toml_config() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("conf").join("vitals-agent.toml");

    let mut config = TomlConfig::default();
    config.cooldown.window_minutes = 15;
    config.cooldown.per_kind.insert("emergency_call".to_string(), 60);
    config.dispatch.backend = DispatchBackend::Twilio;
    config.dispatch.to_number = Some("+15550100".to_string());

    write_toml_config(&config, &path).unwrap();
    let loaded = load_toml_config(&path).unwrap();
    assert_eq!(loaded, config);
}

#[test]
fn test_missing_config_file_uses_defaults() {
    let temp_dir = TempDir::new().unwrap();
    let missing = temp_dir.path().join("does-not-exist.toml");

    let config = load_toml_config_or_default("test-module", Some(&missing));
    assert_eq!(config, TomlConfig::default());
}

#[test]
fn test_malformed_config_file_uses_defaults() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("broken.toml");
    std::fs::write(&path, "[cooldown\nwindow_minutes = ").unwrap();

    assert!(load_toml_config(&path).is_err());
    let config = load_toml_config_or_default("test-module", Some(&path));
    assert_eq!(config, TomlConfig::default());
}

#[test]
fn test_out_of_range_durations_are_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("extreme.toml");
    std::fs::write(&path, "[cooldown]\nwindow_minutes = 9223372036854775807\n").unwrap();

    match load_toml_config(&path) {
        Err(Error::Config(message)) => assert!(message.contains("cooldown.window_minutes")),
        other => panic!("expected config error, got {:?}", other),
    }
    let config = load_toml_config_or_default("test-module", Some(&path));
    assert_eq!(config, TomlConfig::default());

    let mut config = TomlConfig::default();
    config.windows.trend_days = u64::MAX / 2;
    assert!(config.validate().is_err());

    let mut config = TomlConfig::default();
    config.cooldown.per_kind.insert("emergency_sms".to_string(), MAX_WINDOW_MINUTES + 1);
    assert!(config.validate().is_err());

    let mut config = TomlConfig::default();
    config.narrative.timeout_seconds = MAX_NARRATIVE_TIMEOUT_SECONDS + 1;
    assert!(config.validate().is_err());

    assert!(TomlConfig::default().validate().is_ok());
}

#[test]
#[serial]
fn test_resolve_secret_prefers_environment() {
    env::set_var("VITALS_TEST_SECRET", "from-env");
    assert_eq!(
        resolve_secret("VITALS_TEST_SECRET", Some("from-toml")),
        Some("from-env".to_string())
    );
    env::remove_var("VITALS_TEST_SECRET");
}

#[test]
#[serial]
fn test_resolve_secret_ignores_blank_values() {
    env::set_var("VITALS_TEST_SECRET", "   ");
    assert_eq!(
        resolve_secret("VITALS_TEST_SECRET", Some("from-toml")),
        Some("from-toml".to_string())
    );
    assert_eq!(resolve_secret("VITALS_TEST_SECRET", Some("")), None);
    env::remove_var("VITALS_TEST_SECRET");
}
