// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Courier offline sync subsystem.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level Courier configuration.
///
/// All sections are optional and default to the values a mobile client ships with.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CourierConfig {
    /// Process identity and logging.
    #[serde(default)]
    pub app: AppConfig,

    /// Message queue capacity and retry budget.
    #[serde(default)]
    pub queue: QueueConfig,

    /// Key-value backend and storage quota.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Sync engine send and backoff settings.
    #[serde(default)]
    pub sync: SyncConfig,

    /// Circuit breaker around the remote endpoint.
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerConfig,

    /// Foreground/background and maintenance timing.
    #[serde(default)]
    pub lifecycle: LifecycleConfig,

    /// Remote send endpoint.
    #[serde(default)]
    pub remote: RemoteConfig,
}

/// Process identity and logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    #[serde(default = "default_app_name")]
    pub name: String,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            name: default_app_name(),
            log_level: default_log_level(),
        }
    }
}

fn default_app_name() -> String {
    "courier".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Message queue configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct QueueConfig {
    /// Hard cap on queued messages; enqueue fails with `QueueFull` at this length.
    #[serde(default = "default_max_queue_size")]
    pub max_queue_size: usize,

    /// Per-message retry budget before a message is marked `failed`.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Number of most recent messages kept when a quota failure forces a trim.
    #[serde(default = "default_trim_to")]
    pub trim_to: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_queue_size: default_max_queue_size(),
            max_retries: default_max_retries(),
            trim_to: default_trim_to(),
        }
    }
}

fn default_max_queue_size() -> usize {
    50
}

fn default_max_retries() -> u32 {
    3
}

fn default_trim_to() -> usize {
    10
}

/// Which key-value backend to open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Sqlite,
    Memory,
}

/// Storage backend and quota configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,

    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Byte budget for quota-tracked items.
    #[serde(default = "default_quota_limit_bytes")]
    pub quota_limit_bytes: u64,

    /// Safety margin that must remain free after every admitted write.
    #[serde(default = "default_min_free_bytes")]
    pub min_free_bytes: u64,

    /// How long a computed quota may be served from cache.
    #[serde(default = "default_quota_cache_secs")]
    pub quota_cache_secs: u64,

    /// `high` items younger than this are never evicted under pressure.
    #[serde(default = "default_high_priority_protection_hours")]
    pub high_priority_protection_hours: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            database_path: default_database_path(),
            quota_limit_bytes: default_quota_limit_bytes(),
            min_free_bytes: default_min_free_bytes(),
            quota_cache_secs: default_quota_cache_secs(),
            high_priority_protection_hours: default_high_priority_protection_hours(),
        }
    }
}

impl StorageConfig {
    pub fn quota_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.quota_cache_secs)
    }

    pub fn high_priority_protection(&self) -> Duration {
        Duration::from_secs(self.high_priority_protection_hours * 3600)
    }
}

fn default_database_path() -> String {
    dirs::data_dir()
        .map(|p| p.join("courier").join("courier.db"))
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "courier.db".to_string())
}

fn default_quota_limit_bytes() -> u64 {
    50 * 1024 * 1024
}

fn default_min_free_bytes() -> u64 {
    5 * 1024 * 1024
}

fn default_quota_cache_secs() -> u64 {
    60
}

fn default_high_priority_protection_hours() -> u64 {
    24
}

/// Sync engine configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SyncConfig {
    /// Inline retries per send inside one cycle, independent of `retry_count`.
    #[serde(default = "default_inner_max_retries")]
    pub inner_max_retries: u32,

    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Timeout applied to each remote send, distinct from backoff delays.
    #[serde(default = "default_send_timeout_secs")]
    pub send_timeout_secs: u64,

    /// Base delay of the follow-up cycle scheduled when messages remain pending.
    #[serde(default = "default_followup_base_delay_ms")]
    pub followup_base_delay_ms: u64,

    #[serde(default = "default_followup_max_delay_secs")]
    pub followup_max_delay_secs: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            inner_max_retries: default_inner_max_retries(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            send_timeout_secs: default_send_timeout_secs(),
            followup_base_delay_ms: default_followup_base_delay_ms(),
            followup_max_delay_secs: default_followup_max_delay_secs(),
        }
    }
}

impl SyncConfig {
    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_secs(self.send_timeout_secs)
    }

    pub fn followup_base_delay(&self) -> Duration {
        Duration::from_millis(self.followup_base_delay_ms)
    }

    pub fn followup_max_delay(&self) -> Duration {
        Duration::from_secs(self.followup_max_delay_secs)
    }
}

fn default_inner_max_retries() -> u32 {
    2
}

fn default_initial_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    10_000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_send_timeout_secs() -> u64 {
    30
}

fn default_followup_base_delay_ms() -> u64 {
    1000
}

fn default_followup_max_delay_secs() -> u64 {
    60
}

/// Circuit breaker configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the circuit.
    #[serde(default = "default_cb_threshold")]
    pub threshold: u32,

    /// Upper bound on a single call made through the breaker; overruns count as failures.
    #[serde(default = "default_cb_timeout_secs")]
    pub timeout_secs: u64,

    /// Time the circuit stays open before a half-open probe is allowed.
    #[serde(default = "default_cb_reset_timeout_secs")]
    pub reset_timeout_secs: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            threshold: default_cb_threshold(),
            timeout_secs: default_cb_timeout_secs(),
            reset_timeout_secs: default_cb_reset_timeout_secs(),
        }
    }
}

impl CircuitBreakerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn reset_timeout(&self) -> Duration {
        Duration::from_secs(self.reset_timeout_secs)
    }
}

fn default_cb_threshold() -> u32 {
    5
}

fn default_cb_timeout_secs() -> u64 {
    60
}

fn default_cb_reset_timeout_secs() -> u64 {
    30
}

/// Lifecycle coordinator configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LifecycleConfig {
    /// Delay after backgrounding before non-essential data is purged.
    #[serde(default = "default_purge_delay_secs")]
    pub purge_delay_secs: u64,

    /// Time away after which resuming requests a broader refresh.
    #[serde(default = "default_refresh_threshold_secs")]
    pub refresh_threshold_secs: u64,

    /// Settle time after reconnecting before a drain is triggered.
    #[serde(default = "default_reconnect_debounce_ms")]
    pub reconnect_debounce_ms: u64,

    /// Time budget for the sync part of background tasks.
    #[serde(default = "default_background_task_budget_secs")]
    pub background_task_budget_secs: u64,

    /// Age past which non-`high` items are removed by maintenance.
    #[serde(default = "default_cleanup_max_age_days")]
    pub cleanup_max_age_days: u64,

    /// Interval of the periodic maintenance pass; 0 disables it.
    #[serde(default = "default_maintenance_interval_secs")]
    pub maintenance_interval_secs: u64,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            purge_delay_secs: default_purge_delay_secs(),
            refresh_threshold_secs: default_refresh_threshold_secs(),
            reconnect_debounce_ms: default_reconnect_debounce_ms(),
            background_task_budget_secs: default_background_task_budget_secs(),
            cleanup_max_age_days: default_cleanup_max_age_days(),
            maintenance_interval_secs: default_maintenance_interval_secs(),
        }
    }
}

impl LifecycleConfig {
    pub fn purge_delay(&self) -> Duration {
        Duration::from_secs(self.purge_delay_secs)
    }

    pub fn refresh_threshold(&self) -> Duration {
        Duration::from_secs(self.refresh_threshold_secs)
    }

    pub fn reconnect_debounce(&self) -> Duration {
        Duration::from_millis(self.reconnect_debounce_ms)
    }

    pub fn background_task_budget(&self) -> Duration {
        Duration::from_secs(self.background_task_budget_secs)
    }

    pub fn cleanup_max_age(&self) -> Duration {
        Duration::from_secs(self.cleanup_max_age_days * 24 * 3600)
    }

    pub fn maintenance_interval(&self) -> Option<Duration> {
        (self.maintenance_interval_secs > 0)
            .then(|| Duration::from_secs(self.maintenance_interval_secs))
    }
}

fn default_purge_delay_secs() -> u64 {
    300
}

fn default_refresh_threshold_secs() -> u64 {
    1800
}

fn default_reconnect_debounce_ms() -> u64 {
    2000
}

fn default_background_task_budget_secs() -> u64 {
    30
}

fn default_cleanup_max_age_days() -> u64 {
    7
}

fn default_maintenance_interval_secs() -> u64 {
    900
}

/// Remote send endpoint configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RemoteConfig {
    /// URL messages are POSTed to. `None` leaves the CLI offline-only.
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Bearer token sent with every request.
    #[serde(default)]
    pub auth_token: Option<String>,

    /// URL probed to decide reachability. Defaults to the endpoint when unset.
    #[serde(default)]
    pub probe_url: Option<String>,

    #[serde(default = "default_probe_interval_secs")]
    pub probe_interval_secs: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            auth_token: None,
            probe_url: None,
            probe_interval_secs: default_probe_interval_secs(),
        }
    }
}

impl RemoteConfig {
    pub fn probe_interval(&self) -> Duration {
        Duration::from_secs(self.probe_interval_secs)
    }
}

fn default_probe_interval_secs() -> u64 {
    15
}
