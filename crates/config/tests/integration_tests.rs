//! Integration tests for the configuration system

use chaptercast_config::{
    AppConfig, Config, ConfigManager, ConfigSection, LogLevel, PlayerConfig, StorageConfig,
    CONFIG_VERSION,
};
use tempfile::TempDir;

fn setup_test_manager() -> (TempDir, ConfigManager) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let manager = ConfigManager::with_directory(temp_dir.path());
    (temp_dir, manager)
}

#[test]
fn test_full_lifecycle() -> Result<(), Box<dyn std::error::Error>> {
    let (_temp_dir, manager) = setup_test_manager();

    assert!(manager.initialize()?);

    let config = manager.load()?;
    assert_eq!(config.version, CONFIG_VERSION);

    let mut modified = config.clone();
    modified.player.default_volume = 60;
    modified.player.default_rate = 1.25;
    modified.app.log_level = LogLevel::Debug;
    manager.save(&modified)?;

    let reloaded = manager.load()?;
    assert_eq!(reloaded, modified);

    manager.reset()?;
    assert_eq!(manager.load()?, Config::default());

    Ok(())
}

#[test]
fn test_all_sections_default_are_valid() {
    assert!(AppConfig::default().validate().is_ok());
    assert!(PlayerConfig::default().validate().is_ok());
    assert!(StorageConfig::default().validate().is_ok());
    assert!(Config::default().validate().is_ok());
}

#[test]
fn test_section_names() {
    assert_eq!(AppConfig::default().section_name(), "app");
    assert_eq!(PlayerConfig::default().section_name(), "player");
    assert_eq!(StorageConfig::default().section_name(), "storage");
}

#[test]
fn test_serialization_roundtrip() -> Result<(), Box<dyn std::error::Error>> {
    let original = Config::default();
    let toml_string = toml::to_string(&original)?;
    let deserialized: Config = toml::from_str(&toml_string)?;
    assert_eq!(original, deserialized);
    Ok(())
}

#[test]
fn test_written_file_is_readable_toml() -> Result<(), Box<dyn std::error::Error>> {
    let (_temp_dir, manager) = setup_test_manager();
    manager.initialize()?;

    let contents = std::fs::read_to_string(manager.config_path())?;
    assert!(contents.contains("[player]"));
    assert!(contents.contains("default_volume = 80"));
    assert!(contents.contains("[storage]"));
    Ok(())
}

#[test]
fn test_custom_rates_round_trip() -> Result<(), Box<dyn std::error::Error>> {
    let (_temp_dir, manager) = setup_test_manager();

    manager.update(|config| {
        config.player.allowed_rates = vec![1.0, 3.0];
        config.player.default_rate = 3.0;
    })?;

    let loaded = manager.load()?;
    assert_eq!(loaded.player.allowed_rates, vec![1.0, 3.0]);
    assert_eq!(loaded.player.default_rate, 3.0);
    Ok(())
}
