//! Unit tests for configuration loading and validation

use std::io::Write;

use sensor_dashboard::{load_config, Config, DashboardError};

#[test]
fn test_defaults_are_incomplete() {
    // A default configuration has no project and must not start a session.
    let config = Config::default();
    assert!(matches!(
        config.validate(),
        Err(DashboardError::MissingConfiguration)
    ));
}

#[test]
fn test_load_config_from_file() {
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    write!(
        file,
        r#"{{
            "backend": {{"host": "gateway.example", "port": 9000, "project_id": "plants"}},
            "auth": {{"credential_token": "tok-abc"}},
            "query": {{"collection": "greenhouseReadings", "limit": 5}}
        }}"#
    )
    .expect("write config");

    let config = load_config(&file.path().to_path_buf()).expect("config should load");
    assert_eq!(config.backend.host, "gateway.example");
    assert_eq!(config.backend.port, 9000);
    assert_eq!(config.backend.project_id, "plants");
    assert_eq!(config.auth.credential_token.as_deref(), Some("tok-abc"));
    assert_eq!(config.query.collection, "greenhouseReadings");
    assert_eq!(config.query.limit, 5);
    assert!(config.validate().is_ok());
}

#[test]
fn test_load_config_applies_defaults() {
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    write!(file, r#"{{"backend": {{"project_id": "plants"}}}}"#).expect("write config");

    let config = load_config(&file.path().to_path_buf()).expect("config should load");
    assert_eq!(config.backend.host, "localhost");
    assert_eq!(config.backend.port, 4800);
    assert_eq!(config.backend.connection_timeout_seconds, 10);
    assert_eq!(config.backend.request_timeout_seconds, 30);
    assert!(config.auth.credential_token.is_none());
    assert_eq!(config.query.collection, "sensorReadings");
    assert_eq!(config.query.limit, 10);
}

#[test]
fn test_load_config_rejects_invalid_json() {
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    write!(file, "not json").expect("write config");
    assert!(load_config(&file.path().to_path_buf()).is_err());
}

#[test]
fn test_load_config_missing_file() {
    assert!(load_config(&"/nonexistent/dashboard.json".into()).is_err());
}

#[test]
fn test_config_round_trip() {
    let mut config = Config::default();
    config.backend.project_id = "plants".to_string();
    config.auth.credential_token = Some("tok".to_string());

    let json = serde_json::to_string(&config).expect("serializes");
    let parsed: Config = serde_json::from_str(&json).expect("parses");
    assert_eq!(parsed.backend.project_id, "plants");
    assert_eq!(parsed.auth.credential_token.as_deref(), Some("tok"));
}
