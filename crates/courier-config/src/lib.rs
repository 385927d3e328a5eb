// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration system for the Courier offline sync subsystem.
//!
//! Provides TOML configuration parsing with strict validation (`deny_unknown_fields`),
//! XDG file hierarchy lookup, `COURIER_*` environment variable overrides, and
//! miette diagnostics with typo suggestions.
//!
//! # Usage
//!
//! ```no_run
//! use courier_config::load_and_validate;
//!
//! let config = load_and_validate().expect("config errors");
//! println!("queue capacity: {}", config.queue.max_queue_size);
//! ```

pub mod diagnostic;
pub mod loader;
pub mod model;
pub mod validation;

pub use diagnostic::{render_errors, ConfigError};
pub use loader::{load_config, load_config_from_path, load_config_from_str};
pub use model::CourierConfig;

use std::path::Path;

/// Load from the standard file hierarchy plus `COURIER_*` overrides, then
/// validate.
pub fn load_and_validate() -> Result<CourierConfig, Vec<ConfigError>> {
    finish(loader::load_config(), || {
        loader::config_files().iter().filter_map(|p| read_source(p)).collect()
    })
}

/// Same as [`load_and_validate`] with a single explicit file.
pub fn load_and_validate_path(path: &Path) -> Result<CourierConfig, Vec<ConfigError>> {
    finish(loader::load_config_from_path(path), || {
        read_source(path).into_iter().collect()
    })
}

/// Parse and validate TOML text; no files or environment are consulted.
pub fn load_and_validate_str(toml: &str) -> Result<CourierConfig, Vec<ConfigError>> {
    finish(loader::load_config_from_str(toml), || {
        vec![("<inline>".to_string(), toml.to_string())]
    })
}

/// Validate an extracted config, or translate the figment error. Sources are
/// only read on failure, to resolve key spans.
fn finish(
    extracted: Result<CourierConfig, figment::Error>,
    sources: impl FnOnce() -> Vec<(String, String)>,
) -> Result<CourierConfig, Vec<ConfigError>> {
    match extracted {
        Ok(config) => validation::validate_config(&config).map(|()| config),
        Err(err) => Err(diagnostic::figment_to_config_errors(err, &sources())),
    }
}

/// Figment records relative files by their resolved absolute path, so the
/// source name must match that.
fn read_source(path: &Path) -> Option<(String, String)> {
    let content = std::fs::read_to_string(path).ok()?;
    let name = match std::env::current_dir() {
        Ok(cwd) if path.is_relative() => cwd.join(path),
        _ => path.to_path_buf(),
    };
    Some((name.display().to_string(), content))
}
