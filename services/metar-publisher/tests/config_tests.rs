//! Configuration file parsing, environment overrides and validation.

use std::collections::HashMap;
use std::io::Write;
use std::time::Duration;

use metar_publisher::config::PublisherConfig;
use metar_publisher::error::ConfigError;

fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |name| map.get(name).cloned()
}

const SAMPLE: &str = r#"
lattice:
  url: "${LATTICE_HOST:-lattice.example.com}"
  environment_token: "${TOKEN}"
  sandboxes_token: "${SANDBOX:-}"

integration:
  update_interval_minutes: 15
  entity_expiry_hours: 3
  include_forecast: false

weather:
  batch_size: 10

retry:
  max_attempts: 5
  initial_delay_ms: 500

logging:
  level: debug

airports:
  include_only: [KBOS, KBDL, KXYZ]
  exclude: [KBDL]
"#;

fn write_config(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[test]
fn test_load_file_with_substitution() {
    let file = write_config(SAMPLE);
    let config = PublisherConfig::from_file(file.path(), env(&[("TOKEN", "env-token")])).unwrap();

    assert_eq!(config.lattice.url.as_deref(), Some("lattice.example.com"));
    assert_eq!(config.lattice.environment_token.as_deref(), Some("env-token"));
    assert_eq!(config.update_interval(), Duration::from_secs(15 * 60));
    assert_eq!(config.entity_ttl(), chrono::Duration::hours(3));
    assert!(!config.integration.include_forecast);
    assert_eq!(config.weather.batch_size, 10);
    // Unset sections and keys keep their defaults
    assert_eq!(config.weather.min_request_interval_ms, 1000);
    assert_eq!(config.integration.publish_concurrency, 4);

    let policy = config.retry_policy();
    assert_eq!(policy.max_attempts, 5);
    assert_eq!(policy.initial_delay, Duration::from_millis(500));
    assert_eq!(policy.max_delay, Duration::from_secs(30));

    let creds = config.credentials().unwrap();
    assert_eq!(creds.sandboxes_token, None);
}

#[test]
fn test_missing_substitution_variable() {
    let file = write_config(SAMPLE);
    let err = PublisherConfig::from_file(file.path(), env(&[])).unwrap_err();
    assert!(matches!(err, ConfigError::MissingVariable(ref name) if name == "TOKEN"));
}

#[test]
fn test_missing_file_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = PublisherConfig::from_file(&dir.path().join("absent.yaml"), env(&[])).unwrap_err();
    assert!(matches!(err, ConfigError::Io { .. }));
}

#[test]
fn test_malformed_yaml_is_parse_error() {
    let err = PublisherConfig::from_yaml_str("integration: [not, a, map").unwrap_err();
    assert!(matches!(err, ConfigError::Parse(_)));
}

#[test]
fn test_environment_takes_precedence() {
    let file = write_config(SAMPLE);
    let mut config = PublisherConfig::from_file(file.path(), env(&[("TOKEN", "file-token")])).unwrap();

    config
        .apply_env_overrides(env(&[
            ("LATTICE_URL", "https://override.example.com"),
            ("ENVIRONMENT_TOKEN", "override-token"),
            ("SANDBOXES_TOKEN", "sandbox"),
            ("UPDATE_INTERVAL_MINUTES", "5"),
            ("ENTITY_EXPIRY_HOURS", "1"),
            ("AIRPORTS_INCLUDE", "KPWM, KBTV"),
            ("AIRPORTS_EXCLUDE", ""),
            ("LOG_LEVEL", "warn"),
            ("WEATHER_API_URL", "http://localhost:9000"),
        ]))
        .unwrap();

    let creds = config.credentials().unwrap();
    assert_eq!(creds.url, "https://override.example.com");
    assert_eq!(creds.environment_token, "override-token");
    assert_eq!(creds.sandboxes_token.as_deref(), Some("sandbox"));
    assert_eq!(config.integration.update_interval_minutes, 5);
    assert_eq!(config.integration.entity_expiry_hours, 1);
    assert_eq!(config.airports.include_only, vec!["KPWM", "KBTV"]);
    // Empty variables leave the file value alone
    assert_eq!(config.airports.exclude, vec!["KBDL"]);
    assert_eq!(config.logging.level, "warn");
    assert_eq!(config.weather.base_url, "http://localhost:9000");
}

#[test]
fn test_non_numeric_override_rejected() {
    let mut config = PublisherConfig::default();
    let err = config
        .apply_env_overrides(env(&[("UPDATE_INTERVAL_MINUTES", "soon")]))
        .unwrap_err();
    assert!(matches!(err, ConfigError::Invalid(_)));
}

#[test]
fn test_missing_credentials_are_fatal() {
    let config = PublisherConfig::default();
    assert!(matches!(
        config.validate(),
        Err(ConfigError::MissingCredential("LATTICE_URL"))
    ));

    let mut config = PublisherConfig::default();
    config.apply_env_overrides(env(&[("LATTICE_URL", "lattice.example.com")])).unwrap();
    assert!(matches!(
        config.validate(),
        Err(ConfigError::MissingCredential("ENVIRONMENT_TOKEN"))
    ));

    config.apply_env_overrides(env(&[("ENVIRONMENT_TOKEN", "  ")])).unwrap();
    tokio_test::assert_err!(config.validate());

    config.apply_env_overrides(env(&[("ENVIRONMENT_TOKEN", "t")])).unwrap();
    tokio_test::assert_ok!(config.validate());
}

#[test]
fn test_zero_interval_rejected() {
    let mut config = PublisherConfig::default();
    config
        .apply_env_overrides(env(&[
            ("LATTICE_URL", "lattice.example.com"),
            ("ENVIRONMENT_TOKEN", "t"),
            ("UPDATE_INTERVAL_MINUTES", "0"),
        ]))
        .unwrap();
    assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
}

#[test]
fn test_airport_filter_from_config() {
    let file = write_config(SAMPLE);
    let config = PublisherConfig::from_file(file.path(), env(&[("TOKEN", "t")])).unwrap();
    let filter = config.airports.filter();

    assert!(filter.allows("KBOS"));
    assert!(!filter.allows("KBDL"));
    assert!(!filter.allows("KPWM"));

    let catalog = metar_common::AirportCatalog::new_england();
    assert_eq!(catalog.filtered(&filter).ids(), vec!["KBOS"]);
    assert_eq!(catalog.unknown_codes(&filter), vec!["KXYZ"]);
}

#[test]
fn test_shipped_config_loads() {
    let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("../../config/metar-publisher.yaml");
    let mut config = PublisherConfig::from_file(
        &path,
        env(&[("LATTICE_URL", "lattice.example.com"), ("ENVIRONMENT_TOKEN", "t")]),
    )
    .unwrap();
    config.apply_env_overrides(env(&[])).unwrap();

    tokio_test::assert_ok!(config.validate());
    assert_eq!(config.update_interval(), Duration::from_secs(30 * 60));
    assert_eq!(config.entity_ttl(), chrono::Duration::hours(2));
    assert!(config.airports.filter().is_empty());
}

#[test]
fn test_shipped_config_needs_only_documented_variables() {
    let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("../../config/metar-publisher.yaml");

    let config = tokio_test::assert_ok!(PublisherConfig::from_file(
        &path,
        env(&[("LATTICE_URL", "lattice.example.com"), ("ENVIRONMENT_TOKEN", "env-token")]),
    ));
    assert_eq!(config.lattice.url.as_deref(), Some("lattice.example.com"));
    assert_eq!(config.lattice.environment_token.as_deref(), Some("env-token"));

    let err = tokio_test::assert_err!(PublisherConfig::from_file(
        &path,
        env(&[("LATTICE_URL", "lattice.example.com")]),
    ));
    assert!(matches!(err, ConfigError::MissingVariable(name) if name == "ENVIRONMENT_TOKEN"));
}
