//! Configuration loading tests: files, resolution and environment overrides.

#[path = "common/mod.rs"]
mod common;

use common::assert_json_contains;
use comm_port_engine::config::{Config, ConfigError, ConfigLoader, LogFormat};
use comm_port_engine::engine::{CommEngine, OpenMode, PortEngine};
use comm_port_engine::device::MockCommServer;
use comm_port_engine::settings::{FlowControl, NativeSettings, Parity};
use pretty_assertions::assert_eq;
use serde_json::json;
use serial_test::serial;
use std::env;
use std::fs;

const SAMPLE: &str = r#"
[port]
location = "IRCOMM::0"
restore_settings_on_close = false
rate = 38400
data_bits = 7
parity = "even"
stop_bits = 2
flow_control = "software"

[readiness]
default_timeout_ms = 250

[logging]
level = "debug"
format = "compact"
"#;

#[test]
#[serial]
fn test_load_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("comm-engine.toml");
    fs::write(&path, SAMPLE).unwrap();

    let loader = ConfigLoader::load_from(&path).unwrap();
    let config = loader.config();
    assert_eq!(loader.config_path.as_deref(), Some(path.as_path()));
    assert_eq!(config.port.location, "IRCOMM::0");
    assert!(!config.port.restore_settings_on_close);
    assert_eq!(config.port.parity, Parity::Even);
    assert_eq!(config.port.flow_control, FlowControl::Software);
    assert_eq!(config.logging.format, LogFormat::Compact);
    config.validate().unwrap();

    let line = serde_json::to_value(config.port.configuration().unwrap()).unwrap();
    assert_json_contains(
        &line,
        &json!({
            "input_rate": 38400,
            "output_rate": 38400,
            "data_bits": "seven",
            "stop_bits": "two",
        }),
    );
}

#[test]
#[serial]
fn test_missing_explicit_file() {
    let dir = tempfile::tempdir().unwrap();
    let err = ConfigLoader::load_from(dir.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err, ConfigError::NotFound(_)));
}

#[test]
#[serial]
fn test_config_env_var_resolution() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("custom.toml");
    fs::write(&path, SAMPLE).unwrap();

    env::set_var("COMM_ENGINE_CONFIG", &path);
    let loaded = ConfigLoader::load();
    env::set_var("COMM_ENGINE_CONFIG", dir.path().join("nowhere.toml"));
    let missing = ConfigLoader::load();
    env::remove_var("COMM_ENGINE_CONFIG");

    let loader = loaded.unwrap();
    assert_eq!(loader.config().port.rate, 38400);
    assert!(matches!(missing.unwrap_err(), ConfigError::NotFound(_)));
}

#[test]
#[serial]
fn test_env_overrides_file_values() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("comm-engine.toml");
    fs::write(&path, SAMPLE).unwrap();

    env::set_var("COMM_ENGINE_PORT_RATE", "115200");
    env::set_var("COMM_ENGINE_READINESS_DEFAULT_TIMEOUT_MS", "-1");
    let loaded = ConfigLoader::load_from(&path);
    env::remove_var("COMM_ENGINE_PORT_RATE");
    env::remove_var("COMM_ENGINE_READINESS_DEFAULT_TIMEOUT_MS");

    let config = loaded.unwrap().into_config();
    assert_eq!(config.port.rate, 115200);
    assert_eq!(config.readiness.default_timeout_ms, -1);
    // Untouched keys keep their file values
    assert_eq!(config.port.data_bits, 7);
}

#[test]
#[serial]
fn test_invalid_env_override() {
    env::set_var("COMM_ENGINE_PORT_RATE", "fast");
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("comm-engine.toml");
    fs::write(&path, SAMPLE).unwrap();
    let result = ConfigLoader::load_from(&path);
    env::remove_var("COMM_ENGINE_PORT_RATE");

    match result.unwrap_err() {
        ConfigError::EnvOverride { var, value, .. } => {
            assert_eq!(var, "COMM_ENGINE_PORT_RATE");
            assert_eq!(value, "fast");
        }
        other => panic!("expected an override error, got {other:?}"),
    }
}

#[test]
#[serial]
fn test_parse_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.toml");
    fs::write(&path, "[port\nrate = ").unwrap();
    let err = ConfigLoader::load_from(&path).unwrap_err();
    assert!(matches!(err, ConfigError::Parse { path: ref p, .. } if *p == path));
}

#[test]
#[serial]
fn test_save_and_reload() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("comm-engine.toml");

    let mut loader = ConfigLoader::with_defaults();
    loader.config_mut().port.location = "ACM::1".to_string();
    loader.save_to(&path).unwrap();

    let mut reloaded = ConfigLoader::load_from(&path).unwrap();
    assert_eq!(reloaded.config().port.location, "ACM::1");

    fs::write(&path, SAMPLE).unwrap();
    reloaded.reload().unwrap();
    assert_eq!(reloaded.config().port.location, "IRCOMM::0");
}

#[test]
#[serial]
fn test_configured_engine_opens_and_applies() {
    let config: Config = toml::from_str(SAMPLE).unwrap();
    let server = MockCommServer::new();
    let device = server.add_device(&config.port.location, NativeSettings::default());

    let mut engine = CommEngine::with_mock(&server, config.port.port_options());
    engine.open(&config.port.location, OpenMode::ReadWrite).unwrap();
    engine
        .apply_configuration(&config.port.configuration().unwrap())
        .unwrap();
    engine.close();

    // restore_settings_on_close = false leaves the configured settings behind
    assert_ne!(device.config(), NativeSettings::default());
}
