// SPDX-License-Identifier: GPL-3.0-only

//! Integration tests for configuration loading and its effect on backends

use mediadriver::backends;
use mediadriver::config::Config;
use mediadriver::constants::test_pattern::{CAMERA_LABEL, MICROPHONE_LABEL};
use mediadriver::{ConfigError, DeviceManager, DeviceType, Priority};

#[test]
fn test_missing_file_gives_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config::load_from(&dir.path().join("absent.json")).unwrap();
    assert_eq!(config, Config::default());
}

#[test]
fn test_save_and_reload() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("config.json");

    let mut config = Config::default();
    config.backends.pipewire = false;
    config.test_pattern.width = 320;
    config.test_pattern.height = 240;
    config.log_filter = Some("mediadriver=debug".into());
    config
        .priority_overrides
        .insert(CAMERA_LABEL.to_string(), Priority::High);

    config.save_to(&path).unwrap();
    let loaded = Config::load_from(&path).unwrap();
    assert_eq!(loaded, config);
}

#[test]
fn test_invalid_json_reports_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(&path, "{ not json").unwrap();

    match Config::load_from(&path) {
        Err(ConfigError::Parse { path: reported, .. }) => assert_eq!(reported, path),
        other => panic!("expected parse error, got {:?}", other),
    }
}

#[test]
fn test_backend_switches_and_overrides() {
    let mut config = Config::default();
    config
        .priority_overrides
        .insert(MICROPHONE_LABEL.to_string(), Priority::High);

    let manager = DeviceManager::new();
    assert!(backends::register_all(&manager, &config) >= 2);
    let camera = manager.get(CAMERA_LABEL).unwrap();
    assert_eq!(camera.priority(), Priority::Low);
    assert_eq!(
        manager.get(MICROPHONE_LABEL).unwrap().priority(),
        Priority::High
    );
    assert_eq!(
        manager
            .default_device(DeviceType::Microphone)
            .unwrap()
            .label(),
        MICROPHONE_LABEL
    );

    config.backends.test_pattern = false;
    config.backends.v4l2 = false;
    config.backends.pipewire = false;
    let empty = DeviceManager::new();
    assert_eq!(backends::register_all(&empty, &config), 0);
}
