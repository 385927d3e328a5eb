// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports `./courier.toml` > `~/.config/courier/courier.toml` > `/etc/courier/courier.toml`
//! with environment variable overrides via the `COURIER_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::{Path, PathBuf};

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};

use crate::model::CourierConfig;

/// Sections recognised in `COURIER_<SECTION>_<KEY>` variables.
const ENV_SECTIONS: [&str; 7] = [
    "app",
    "queue",
    "storage",
    "sync",
    "circuit_breaker",
    "lifecycle",
    "remote",
];

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/courier/courier.toml`
/// 3. `~/.config/courier/courier.toml`
/// 4. `./courier.toml`
/// 5. `COURIER_*` environment variables
pub fn load_config() -> Result<CourierConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string only (no files, no env).
pub fn load_config_from_str(toml_content: &str) -> Result<CourierConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(CourierConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<CourierConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(CourierConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Config files in merge order, lowest precedence first. Missing files are
/// skipped by figment.
pub fn config_files() -> Vec<PathBuf> {
    let mut files = vec![PathBuf::from("/etc/courier/courier.toml")];
    if let Some(dir) = dirs::config_dir() {
        files.push(dir.join("courier").join("courier.toml"));
    }
    files.push(PathBuf::from("courier.toml"));
    files
}

/// Build the Figment used for config loading, before extraction.
pub fn build_figment() -> Figment {
    config_files()
        .into_iter()
        .fold(
            Figment::new().merge(Serialized::defaults(CourierConfig::default())),
            |figment, file| figment.merge(Toml::file(file)),
        )
        .merge(env_provider())
}

/// Environment provider mapping `COURIER_SYNC_SEND_TIMEOUT_SECS` to
/// `sync.send_timeout_secs`.
///
/// Uses `Env::map()` rather than `Env::split("_")` because both section and
/// key names contain underscores.
fn env_provider() -> Env {
    Env::prefixed("COURIER_").map(|key| map_env_key(key.as_str()).into())
}

/// Maps a lowercased, prefix-stripped env var name to a dotted config path.
pub fn map_env_key(key: &str) -> String {
    // Longest section names first so `circuit_breaker_` wins over shorter prefixes.
    let mut sections = ENV_SECTIONS;
    sections.sort_by_key(|s| std::cmp::Reverse(s.len()));
    for section in sections {
        if let Some(rest) = key.strip_prefix(section).and_then(|r| r.strip_prefix('_')) {
            return format!("{section}.{rest}");
        }
    }
    key.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_keys_map_to_sections() {
        assert_eq!(map_env_key("remote_endpoint"), "remote.endpoint");
        assert_eq!(
            map_env_key("sync_send_timeout_secs"),
            "sync.send_timeout_secs"
        );
        assert_eq!(
            map_env_key("circuit_breaker_reset_timeout_secs"),
            "circuit_breaker.reset_timeout_secs"
        );
        assert_eq!(map_env_key("app_log_level"), "app.log_level");
    }

    #[test]
    fn unknown_env_section_is_left_alone() {
        assert_eq!(map_env_key("mystery"), "mystery");
    }
}
