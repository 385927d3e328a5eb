// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.

use crate::diagnostic::ConfigError;
use crate::model::{CourierConfig, StorageBackend};

/// Validate a deserialized configuration for semantic correctness.
///
/// Collects every failure instead of stopping at the first.
pub fn validate_config(config: &CourierConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();
    let mut fail = |message: String| errors.push(ConfigError::Validation { message });

    if config.queue.max_queue_size == 0 {
        fail("queue.max_queue_size must be at least 1".to_string());
    }

    if config.queue.trim_to == 0 || config.queue.trim_to > config.queue.max_queue_size {
        fail(format!(
            "queue.trim_to must be between 1 and queue.max_queue_size ({}), got {}",
            config.queue.max_queue_size, config.queue.trim_to
        ));
    }

    if config.storage.backend == StorageBackend::Sqlite
        && config.storage.database_path.trim().is_empty()
    {
        fail("storage.database_path must not be empty".to_string());
    }

    if config.storage.min_free_bytes >= config.storage.quota_limit_bytes {
        fail(format!(
            "storage.min_free_bytes ({}) must be smaller than storage.quota_limit_bytes ({})",
            config.storage.min_free_bytes, config.storage.quota_limit_bytes
        ));
    }

    if !(config.sync.backoff_multiplier >= 1.0) {
        fail(format!(
            "sync.backoff_multiplier must be at least 1.0, got {}",
            config.sync.backoff_multiplier
        ));
    }

    if config.sync.initial_delay_ms > config.sync.max_delay_ms {
        fail(format!(
            "sync.initial_delay_ms ({}) must not exceed sync.max_delay_ms ({})",
            config.sync.initial_delay_ms, config.sync.max_delay_ms
        ));
    }

    if config.sync.send_timeout_secs == 0 {
        fail("sync.send_timeout_secs must be at least 1".to_string());
    }

    if config.circuit_breaker.threshold == 0 {
        fail("circuit_breaker.threshold must be at least 1".to_string());
    }

    if let Some(endpoint) = &config.remote.endpoint
        && !(endpoint.starts_with("http://") || endpoint.starts_with("https://"))
    {
        fail(format!(
            "remote.endpoint must be an http(s) URL, got `{endpoint}`"
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn has_error(errors: &[ConfigError], needle: &str) -> bool {
        errors
            .iter()
            .any(|e| matches!(e, ConfigError::Validation { message } if message.contains(needle)))
    }

    #[test]
    fn default_config_validates() {
        assert!(validate_config(&CourierConfig::default()).is_ok());
    }

    #[test]
    fn trim_larger_than_capacity_fails() {
        let mut config = CourierConfig::default();
        config.queue.trim_to = 60;
        let errors = validate_config(&config).unwrap_err();
        assert!(has_error(&errors, "queue.trim_to"));
    }

    #[test]
    fn free_margin_must_fit_in_budget() {
        let mut config = CourierConfig::default();
        config.storage.quota_limit_bytes = 1024;
        config.storage.min_free_bytes = 4096;
        let errors = validate_config(&config).unwrap_err();
        assert!(has_error(&errors, "min_free_bytes"));
    }

    #[test]
    fn shrinking_backoff_fails() {
        let mut config = CourierConfig::default();
        config.sync.backoff_multiplier = 0.5;
        let errors = validate_config(&config).unwrap_err();
        assert!(has_error(&errors, "backoff_multiplier"));
    }

    #[test]
    fn collects_every_error() {
        let mut config = CourierConfig::default();
        config.queue.max_queue_size = 0;
        config.circuit_breaker.threshold = 0;
        config.remote.endpoint = Some("ftp://example.com".into());
        let errors = validate_config(&config).unwrap_err();
        assert!(errors.len() >= 3);
        assert!(has_error(&errors, "remote.endpoint"));
    }

    #[test]
    fn memory_backend_ignores_empty_path() {
        let mut config = CourierConfig::default();
        config.storage.backend = StorageBackend::Memory;
        config.storage.database_path = String::new();
        assert!(validate_config(&config).is_ok());
    }
}
