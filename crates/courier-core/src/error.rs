// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Courier offline sync subsystem.

use std::time::Duration;

use thiserror::Error;

/// HTTP statuses the default retry policy treats as transient.
pub const RETRYABLE_STATUSES: [u16; 6] = [408, 429, 500, 502, 503, 504];

/// The primary error type used across all Courier traits and core operations.
#[derive(Debug, Error)]
pub enum CourierError {
    /// Configuration errors (invalid values, missing endpoint, bad headers).
    #[error("configuration error: {0}")]
    Config(String),

    /// Key-value store failures (connection, query, I/O).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A persisted record could not be encoded or decoded.
    #[error("serialization error: {source}")]
    Serialization {
        #[from]
        source: serde_json::Error,
    },

    /// Enqueue rejected because the queue is at capacity.
    #[error("queue is full ({capacity} messages); try again after queued messages are sent")]
    QueueFull { capacity: usize },

    /// A write could not be admitted even after eviction.
    #[error("storage quota exceeded writing `{key}`: need {required} bytes, {available} available")]
    QuotaExceeded {
        key: String,
        required: u64,
        available: u64,
    },

    /// The device is offline. Expected; sync simply defers.
    #[error("network unavailable")]
    NetworkUnavailable,

    /// The remote endpoint rejected the message (4xx other than 408/429).
    #[error("remote rejected message with status {status}: {message}")]
    RemoteRejected { status: u16, message: String },

    /// The remote endpoint is temporarily unavailable (5xx, 429, 408, or a
    /// transport failure when `status` is `None`).
    #[error("remote unavailable{}: {message}", status_suffix(.status))]
    RemoteUnavailable {
        status: Option<u16>,
        message: String,
    },

    /// The circuit breaker is open; the call was not attempted.
    #[error("circuit open after {failures} consecutive failures, retry in {retry_after:?}")]
    CircuitOpen { failures: u32, retry_after: Duration },

    /// The caller cancelled an in-flight operation.
    #[error("operation cancelled")]
    Cancelled,

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: Duration },

    /// No queued message with the given id.
    #[error("message not found: {id}")]
    NotFound { id: String },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

fn status_suffix(status: &Option<u16>) -> String {
    match status {
        Some(s) => format!(" (status {s})"),
        None => String::new(),
    }
}

impl CourierError {
    /// Wraps any storage backend error.
    pub fn storage<E>(err: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::Storage { source: err.into() }
    }

    /// Classifies a non-success HTTP status from the remote endpoint.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        if RETRYABLE_STATUSES.contains(&status) || status >= 500 {
            Self::RemoteUnavailable {
                status: Some(status),
                message,
            }
        } else {
            Self::RemoteRejected { status, message }
        }
    }

    /// Default retry classification.
    ///
    /// Transport failures, timeouts and the statuses in [`RETRYABLE_STATUSES`]
    /// are retryable. Client rejections, cancellation and an open circuit are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::RemoteUnavailable { status: None, .. } => true,
            Self::RemoteUnavailable {
                status: Some(status),
                ..
            } => RETRYABLE_STATUSES.contains(status),
            Self::Timeout { .. } | Self::NetworkUnavailable => true,
            _ => false,
        }
    }

    /// Terminal failures end a message's retry lifecycle immediately.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::RemoteRejected { .. })
    }

    /// HTTP-like status attached to a remote failure, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::RemoteRejected { status, .. } => Some(*status),
            Self::RemoteUnavailable { status, .. } => *status,
            _ => None,
        }
    }
}
