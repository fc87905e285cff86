//! Edge case and error scenario tests

use chaptercast_config::{Config, ConfigError, ConfigManager, CONFIG_VERSION};
use std::fs;
use tempfile::TempDir;

fn setup_test_manager() -> (TempDir, ConfigManager) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let manager = ConfigManager::with_directory(temp_dir.path());
    (temp_dir, manager)
}

#[test]
fn test_corrupted_config_uses_defaults() {
    let (_temp_dir, manager) = setup_test_manager();
    fs::write(manager.config_path(), "this is not valid TOML {{{").unwrap();

    assert!(matches!(manager.load(), Err(ConfigError::ParseError { .. })));
    assert_eq!(manager.load_or_default(), Config::default());
}

#[test]
fn test_save_creates_parent_directories() {
    let temp_dir = TempDir::new().unwrap();
    let nested = temp_dir.path().join("a").join("b").join("c");
    let manager = ConfigManager::with_directory(&nested);

    manager.save(&Config::default()).unwrap();
    assert!(nested.join("config.toml").exists());
}

#[test]
fn test_boundary_values_validation() {
    let mut config = Config::default();

    config.player.default_volume = 0;
    config.player.progress_interval_ms = 100;
    assert!(config.validate().is_ok());

    config.player.default_volume = 100;
    config.player.progress_interval_ms = 5000;
    assert!(config.validate().is_ok());

    config.player.progress_interval_ms = 5001;
    assert!(config.validate().is_err());
}

#[test]
fn test_all_validation_errors_collected() {
    let mut config = Config::default();
    config.player.default_volume = 200;
    config.player.progress_interval_ms = 0;
    config.storage.database_path = String::new();

    assert_eq!(config.validate().unwrap_err().len(), 3);
}

#[test]
fn test_empty_config_file() {
    let (_temp_dir, manager) = setup_test_manager();
    fs::write(manager.config_path(), "").unwrap();

    assert!(matches!(manager.load(), Err(ConfigError::EmptyFile { .. })));
}

#[test]
fn test_newer_version_is_rejected() {
    let (_temp_dir, manager) = setup_test_manager();
    fs::write(
        manager.config_path(),
        format!("version = {}\n", CONFIG_VERSION + 1),
    )
    .unwrap();

    assert!(matches!(
        manager.load(),
        Err(ConfigError::ValidationError(_))
    ));
}

#[test]
fn test_unknown_log_level_is_parse_error() {
    let (_temp_dir, manager) = setup_test_manager();
    fs::write(manager.config_path(), "[app]\nlog_level = \"verbose\"\n").unwrap();

    assert!(matches!(manager.load(), Err(ConfigError::ParseError { .. })));
}

#[test]
fn test_partial_config_toml() {
    let (_temp_dir, manager) = setup_test_manager();
    fs::write(manager.config_path(), "[player]\nstart_muted = true\n").unwrap();

    let config = manager.load().unwrap();
    assert!(config.player.start_muted);
    assert_eq!(config.player.default_volume, 80);
    assert_eq!(config.storage.database_path, "chaptercast.db");
}

#[test]
fn test_rapid_saves() {
    let (_temp_dir, manager) = setup_test_manager();

    for volume in 0..20u8 {
        manager
            .update(|config| config.player.default_volume = volume)
            .unwrap();
    }

    assert_eq!(manager.load().unwrap().player.default_volume, 19);
}

#[test]
fn test_config_file_deleted_during_operation() {
    let (_temp_dir, manager) = setup_test_manager();
    manager.initialize().unwrap();
    fs::remove_file(manager.config_path()).unwrap();

    assert_eq!(manager.load().unwrap(), Config::default());
}
