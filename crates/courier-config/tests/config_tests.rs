// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests for the Courier configuration system.

use courier_config::diagnostic::ConfigError;
use courier_config::model::{CourierConfig, StorageBackend};
use courier_config::{load_and_validate_str, load_config_from_str};

/// Valid TOML with every section deserializes successfully.
#[test]
fn valid_toml_deserializes_into_courier_config() {
    let toml = r#"
[app]
name = "legal-chat"
log_level = "debug"

[queue]
max_queue_size = 20
max_retries = 5
trim_to = 5

[storage]
backend = "memory"
quota_limit_bytes = 1048576
min_free_bytes = 1024

[sync]
inner_max_retries = 1
send_timeout_secs = 10

[circuit_breaker]
threshold = 3
reset_timeout_secs = 5

[lifecycle]
purge_delay_secs = 60
maintenance_interval_secs = 0

[remote]
endpoint = "https://api.example.com/messages"
auth_token = "secret"
"#;

    let config = load_config_from_str(toml).expect("valid TOML should deserialize");
    assert_eq!(config.app.name, "legal-chat");
    assert_eq!(config.app.log_level, "debug");
    assert_eq!(config.queue.max_queue_size, 20);
    assert_eq!(config.queue.max_retries, 5);
    assert_eq!(config.storage.backend, StorageBackend::Memory);
    assert_eq!(config.storage.quota_limit_bytes, 1_048_576);
    assert_eq!(config.sync.inner_max_retries, 1);
    assert_eq!(config.sync.send_timeout().as_secs(), 10);
    assert_eq!(config.circuit_breaker.threshold, 3);
    assert_eq!(config.lifecycle.purge_delay().as_secs(), 60);
    assert!(config.lifecycle.maintenance_interval().is_none());
    assert_eq!(
        config.remote.endpoint.as_deref(),
        Some("https://api.example.com/messages")
    );
}

/// Unknown field in [queue] is rejected with a suggestion.
#[test]
fn unknown_field_in_queue_suggests_correction() {
    let toml = r#"
[queue]
max_retires = 4
"#;

    let errors = load_and_validate_str(toml).expect_err("should reject unknown field");
    let suggestion = errors.iter().find_map(|e| match e {
        ConfigError::UnknownKey { suggestion, .. } => suggestion.clone(),
        _ => None,
    });
    assert_eq!(suggestion.as_deref(), Some("max_retries"));
}

/// Empty TOML falls back to the documented defaults.
#[test]
fn missing_sections_use_defaults() {
    let config = load_config_from_str("").expect("empty TOML should use defaults");

    assert_eq!(config.app.name, "courier");
    assert_eq!(config.queue.max_queue_size, 50);
    assert_eq!(config.queue.max_retries, 3);
    assert_eq!(config.queue.trim_to, 10);
    assert_eq!(config.storage.backend, StorageBackend::Sqlite);
    assert!(config.storage.database_path.ends_with("courier.db"));
    assert_eq!(config.storage.quota_limit_bytes, 50 * 1024 * 1024);
    assert_eq!(config.storage.min_free_bytes, 5 * 1024 * 1024);
    assert_eq!(config.storage.quota_cache_ttl().as_secs(), 60);
    assert_eq!(config.storage.high_priority_protection().as_secs(), 24 * 3600);
    assert_eq!(config.sync.inner_max_retries, 2);
    assert_eq!(config.sync.send_timeout().as_secs(), 30);
    assert_eq!(config.sync.followup_max_delay().as_secs(), 60);
    assert_eq!(config.circuit_breaker.threshold, 5);
    assert_eq!(config.circuit_breaker.timeout().as_secs(), 60);
    assert_eq!(config.circuit_breaker.reset_timeout().as_secs(), 30);
    assert_eq!(config.lifecycle.purge_delay().as_secs(), 300);
    assert_eq!(config.lifecycle.refresh_threshold().as_secs(), 1800);
    assert_eq!(config.lifecycle.reconnect_debounce().as_millis(), 2000);
    assert_eq!(config.lifecycle.background_task_budget().as_secs(), 30);
    assert_eq!(config.lifecycle.cleanup_max_age().as_secs(), 7 * 24 * 3600);
    assert!(config.remote.endpoint.is_none());
}

/// Dotted overrides (what the env provider produces) land in the right section.
#[test]
fn dotted_override_sets_nested_key() {
    use figment::{providers::Serialized, Figment};

    let config: CourierConfig = Figment::new()
        .merge(Serialized::defaults(CourierConfig::default()))
        .merge(("circuit_breaker.reset_timeout_secs", 5))
        .merge(("remote.endpoint", "http://localhost:8080/send"))
        .extract()
        .expect("should merge dotted overrides");

    assert_eq!(config.circuit_breaker.reset_timeout_secs, 5);
    assert_eq!(
        config.remote.endpoint.as_deref(),
        Some("http://localhost:8080/send")
    );
}

/// Missing config files are silently skipped.
#[test]
fn missing_config_files_silently_skipped() {
    use figment::{
        providers::{Format, Serialized, Toml},
        Figment,
    };

    let config: CourierConfig = Figment::new()
        .merge(Serialized::defaults(CourierConfig::default()))
        .merge(Toml::file("/nonexistent/path/courier.toml"))
        .extract()
        .expect("missing file should be silently skipped");

    assert_eq!(config.app.name, "courier");
}

/// Wrong value types surface as InvalidType diagnostics.
#[test]
fn wrong_type_is_reported() {
    let toml = r#"
[queue]
max_queue_size = "lots"
"#;
    let errors = load_and_validate_str(toml).expect_err("should reject string for integer");
    assert!(errors
        .iter()
        .any(|e| matches!(e, ConfigError::InvalidType { key, .. } if key.contains("max_queue_size"))));
}

/// Semantic validation runs after a successful parse.
#[test]
fn semantic_validation_runs_after_parse() {
    let toml = r#"
[queue]
max_queue_size = 5
trim_to = 10
"#;
    let errors = load_and_validate_str(toml).expect_err("trim_to above capacity");
    assert!(errors
        .iter()
        .any(|e| matches!(e, ConfigError::Validation { message } if message.contains("trim_to"))));
}
