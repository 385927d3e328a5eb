// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Turns figment errors into miette diagnostics pointing into `courier.toml`.

#![allow(unused_assignments)] // miette derive assigns fields it never reads

use miette::{Diagnostic, GraphicalReportHandler, NamedSource, SourceSpan};
use thiserror::Error;

/// Jaro-Winkler score a known key must beat to be offered as a correction.
const MIN_SIMILARITY: f64 = 0.75;

#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("`{key}` is not a courier setting")]
    #[diagnostic(
        code(courier::config::unknown_key),
        help("{}", unknown_key_help(suggestion.as_deref(), known))
    )]
    UnknownKey {
        key: String,
        suggestion: Option<String>,
        known: String,
        #[label("unknown key")]
        span: Option<SourceSpan>,
        #[source_code]
        src: Option<NamedSource<String>>,
    },

    #[error("`{key}` has the wrong type: {detail}")]
    #[diagnostic(code(courier::config::invalid_type))]
    InvalidType { key: String, detail: String },

    #[error("`{key}` must be set")]
    #[diagnostic(code(courier::config::missing_key))]
    MissingKey { key: String },

    /// Values that parse but break a cross-field rule.
    #[error("{message}")]
    #[diagnostic(code(courier::config::validation))]
    Validation { message: String },

    #[error("{0}")]
    #[diagnostic(code(courier::config::other))]
    Other(String),
}

fn unknown_key_help(suggestion: Option<&str>, known: &str) -> String {
    let mut help = String::new();
    if let Some(s) = suggestion {
        help.push_str(&format!("perhaps `{s}`? "));
    }
    help.push_str("expected one of: ");
    help.push_str(known);
    help
}

/// Map every error figment collected to a [`ConfigError`]. `sources` holds
/// `(name, toml)` pairs for the files that fed the figment, used to attach
/// source snippets to unknown-key errors.
pub fn figment_to_config_errors(
    err: figment::Error,
    sources: &[(String, String)],
) -> Vec<ConfigError> {
    use figment::error::Kind;

    err.into_iter()
        .map(|error| {
            let dotted = error.path.join(".");
            match &error.kind {
                Kind::UnknownField(field, expected) => {
                    let (span, src) = match snippet_for(&error, field, sources) {
                        Some((span, src)) => (Some(span), Some(src)),
                        None => (None, None),
                    };
                    ConfigError::UnknownKey {
                        key: field.clone(),
                        suggestion: suggest_key(field, *expected),
                        known: expected.join(", "),
                        span,
                        src,
                    }
                }
                Kind::MissingField(field) => ConfigError::MissingKey {
                    key: qualify(&dotted, field),
                },
                Kind::InvalidType(actual, expected) => ConfigError::InvalidType {
                    key: dotted,
                    detail: format!("expected {expected}, found {actual}"),
                },
                _ => ConfigError::Other(error.to_string()),
            }
        })
        .collect()
}

fn qualify(section: &str, field: &str) -> String {
    if section.is_empty() {
        field.to_string()
    } else {
        format!("{section}.{field}")
    }
}

fn snippet_for(
    error: &figment::error::Error,
    field: &str,
    sources: &[(String, String)],
) -> Option<(SourceSpan, NamedSource<String>)> {
    let file = error.metadata.as_ref().and_then(|m| match m.source.as_ref()? {
        figment::Source::File(path) => Some(path.display().to_string()),
        _ => None,
    });
    let (name, toml) = match file {
        Some(file) => sources.iter().find(|(name, _)| *name == file)?,
        // String-sourced figments carry no path; only guess when unambiguous.
        None if sources.len() == 1 => &sources[0],
        None => return None,
    };
    let offset = locate_key(toml, &error.path, field)?;
    Some((
        SourceSpan::new(offset.into(), field.len()),
        NamedSource::new(name, toml.clone()),
    ))
}

/// Byte offset of `field` inside the table named by `section` (empty for the
/// root table). Walks the document line by line so a key with the same name
/// in another table is never matched.
pub fn locate_key(toml: &str, section: &[String], field: &str) -> Option<usize> {
    let wanted = section.join(".");
    let mut current = String::new();
    let mut offset = 0;

    for line in toml.split_inclusive('\n') {
        let trimmed = line.trim_start();
        let indent = line.len() - trimmed.len();
        let content = trimmed.trim_end();

        if let Some(header) = content.strip_prefix('[').and_then(|h| h.strip_suffix(']')) {
            current = header.trim().to_string();
        } else if current == wanted
            && let Some(rest) = content.strip_prefix(field)
            && rest.trim_start().starts_with('=')
        {
            return Some(offset + indent);
        }
        offset += line.len();
    }
    None
}

/// Closest known key to `unknown`, if any scores above [`MIN_SIMILARITY`].
pub fn suggest_key<S: AsRef<str>>(unknown: &str, known: &[S]) -> Option<String> {
    known
        .iter()
        .map(|k| (strsim::jaro_winkler(unknown, k.as_ref()), k.as_ref()))
        .filter(|(score, _)| *score > MIN_SIMILARITY)
        .max_by(|a, b| a.0.total_cmp(&b.0))
        .map(|(_, k)| k.to_string())
}

/// Print each error to stderr as a graphical miette report.
pub fn render_errors(errors: &[ConfigError]) {
    let handler = GraphicalReportHandler::new();
    for error in errors {
        let mut out = String::new();
        match handler.render_report(&mut out, error as &dyn Diagnostic) {
            Ok(()) => eprint!("{out}"),
            Err(_) => eprintln!("config error: {error}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn section(name: &str) -> Vec<String> {
        vec![name.to_string()]
    }

    #[test]
    fn close_typo_gets_a_suggestion() {
        let known = ["max_queue_size", "max_retries", "trim_to"];
        assert_eq!(suggest_key("max_retires", &known).as_deref(), Some("max_retries"));
    }

    #[test]
    fn unrelated_key_gets_none() {
        let known = ["threshold", "timeout_secs", "reset_timeout_secs"];
        assert_eq!(suggest_key("zzzzzz", &known), None);
    }

    #[test]
    fn key_is_found_in_its_own_table() {
        let toml = "[app]\nmax_retires = 1\n\n[queue]\n  max_retires = 4\n";
        let at = locate_key(toml, &section("queue"), "max_retires").unwrap();
        assert_eq!(&toml[at..at + 11], "max_retires");
        assert!(at > toml.find("[queue]").unwrap());
    }

    #[test]
    fn longer_key_with_same_prefix_is_skipped() {
        let toml = "[sync]\nmax_delay_ms_extra = 1\n";
        assert!(locate_key(toml, &section("sync"), "max_delay_ms").is_none());
    }

    #[test]
    fn root_keys_stop_at_first_header() {
        let toml = "stray = 1\n[app]\nstray = 2\n";
        assert_eq!(locate_key(toml, &[], "stray"), Some(0));
        assert_eq!(locate_key(toml, &section("app"), "stray"), Some(16));
    }

    #[test]
    fn help_lists_known_keys() {
        let help = unknown_key_help(Some("trim_to"), "trim_to, max_retries");
        assert_eq!(help, "perhaps `trim_to`? expected one of: trim_to, max_retries");
    }
}
