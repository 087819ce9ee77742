#![allow(clippy::unwrap_used)]

use std::path::PathBuf;
use std::time::Duration;

use ipmilink_api::{AuthType, Protocol};
use ipmilink_config::{Config, ConfigError, ConnectionProfile, load_config_from, save_config_to};
use pretty_assertions::assert_eq;

const SAMPLE: &str = r#"
[defaults]
cache_dir = "/var/lib/ipmilink"
protocol = "lan_2.0"
reconnect_cooldown_secs = 90

[connections.crate1]
hostname = "mch-crate1.example"
username = "operator"
password = "secret"
auth_type = "plain"

[connections.crate2]
hostname = "10.0.0.12"
protocol = "lan"
session_timeout_ms = 5000
"#;

fn write(contents: &str) -> (tempfile::TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, contents).unwrap();
    (dir, path)
}

#[test]
fn missing_file_yields_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let config = load_config_from(&dir.path().join("absent.toml")).unwrap();
    assert!(config.connections.is_empty());
    assert_eq!(config.defaults.auth_type, "none");
    assert_eq!(config.defaults.session_timeout_ms, 20_000);
}

#[test]
fn file_values_layer_over_defaults() {
    let (_dir, path) = write(SAMPLE);
    let config = load_config_from(&path).unwrap();

    assert_eq!(config.defaults.reconnect_cooldown_secs, 90);
    assert_eq!(config.defaults.privilege, "operator");
    assert_eq!(
        config.connections.keys().collect::<Vec<_>>(),
        ["crate1", "crate2"]
    );

    let all = config.connection_configs().unwrap();
    assert_eq!(all[0].session.auth_type, AuthType::Plain);
    assert_eq!(all[0].session.protocol, Protocol::Lan20);
    assert_eq!(all[0].reconnect_cooldown, Duration::from_secs(90));
    assert_eq!(
        all[0].cache_path(),
        PathBuf::from("/var/lib/ipmilink/crate1.mch-crate1.example.cache")
    );

    assert_eq!(all[1].session.protocol, Protocol::Lan);
    assert_eq!(all[1].session.auth_type, AuthType::None);
    assert_eq!(all[1].session.session_timeout, Duration::from_secs(5));
}

#[test]
fn malformed_file_is_a_figment_error() {
    let (_dir, path) = write("connections = 5\n");
    let err = load_config_from(&path).unwrap_err();
    assert!(matches!(err, ConfigError::Figment(_)));
}

#[test]
fn saved_config_loads_back() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("config.toml");
    let mut config = Config::default();
    config.connections.insert(
        "lab".into(),
        ConnectionProfile {
            hostname: "mch-lab".into(),
            password_env: Some("LAB_MCH_PASSWORD".into()),
            ..ConnectionProfile::default()
        },
    );
    save_config_to(&config, &path).unwrap();

    let loaded = load_config_from(&path).unwrap();
    let lab = &loaded.connections["lab"];
    assert_eq!(lab.hostname, "mch-lab");
    assert_eq!(lab.password_env.as_deref(), Some("LAB_MCH_PASSWORD"));
    assert_eq!(loaded.connection("lab").unwrap().id, "lab");
}
