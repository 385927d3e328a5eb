// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types shared by the queue, quota manager, sync engine and lifecycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Default per-message retry budget.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Unique identifier for a queued message, generated at enqueue time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub String);

impl MessageId {
    /// Generate a fresh random identifier.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MessageId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Delivery status of a queued message.
///
/// Confirmed delivery removes the record, so there is no `Sent` status.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum MessageStatus {
    /// Waiting for the next sync cycle.
    Pending,
    /// Held by the active sync cycle.
    Sending,
    /// Retry budget exhausted or rejected by the remote; needs user action.
    Failed,
}

/// A chat message awaiting delivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuedMessage {
    pub id: MessageId,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<String>,
    pub timestamp: DateTime<Utc>,
    pub status: MessageStatus,
    pub retry_count: u32,
    pub max_retries: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl QueuedMessage {
    /// Create a new pending message.
    pub fn new(
        content: impl Into<String>,
        conversation_id: Option<String>,
        attachments: Vec<String>,
        max_retries: u32,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: MessageId::generate(),
            content: content.into(),
            conversation_id,
            attachments,
            timestamp,
            status: MessageStatus::Pending,
            retry_count: 0,
            max_retries,
            error: None,
        }
    }

    /// True once the message has used its whole retry budget.
    pub fn retries_exhausted(&self) -> bool {
        self.retry_count >= self.max_retries
    }

    /// Builds the request handed to the remote endpoint.
    pub fn to_request(&self) -> SendRequest {
        SendRequest {
            message_id: self.id.clone(),
            content: self.content.clone(),
            conversation_id: self.conversation_id.clone(),
            attachments: self.attachments.clone(),
        }
    }
}

/// Eviction tier of a stored item. Ordered so that `Low < Medium < High`.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Display,
    EnumString,
    Serialize,
    Deserialize,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
}

/// Metadata record kept next to every quota-tracked key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageItem {
    pub key: String,
    /// Approximate footprint in bytes.
    pub size: u64,
    pub timestamp: DateTime<Utc>,
    pub priority: Priority,
}

/// Computed storage usage. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StorageQuota {
    pub used: u64,
    pub limit: u64,
    pub available: u64,
    pub percentage: f64,
}

impl StorageQuota {
    pub fn new(used: u64, limit: u64) -> Self {
        let available = limit.saturating_sub(used);
        let percentage = if limit == 0 {
            100.0
        } else {
            (used as f64 / limit as f64) * 100.0
        };
        Self {
            used,
            limit,
            available,
            percentage,
        }
    }
}

/// How the device is connected.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Display,
    EnumString,
    Serialize,
    Deserialize,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ConnectionType {
    Wifi,
    Cellular,
    Ethernet,
    None,
    #[default]
    Unknown,
}

/// Last observed connectivity. Transient; the live monitor is authoritative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkStatus {
    pub is_connected: bool,
    pub connection_type: ConnectionType,
    /// `None` while reachability has not been probed yet.
    pub is_internet_reachable: Option<bool>,
}

impl NetworkStatus {
    pub fn online(connection_type: ConnectionType) -> Self {
        Self {
            is_connected: true,
            connection_type,
            is_internet_reachable: Some(true),
        }
    }

    pub fn offline() -> Self {
        Self {
            is_connected: false,
            connection_type: ConnectionType::None,
            is_internet_reachable: Some(false),
        }
    }

    /// Connected, and not known to be unreachable.
    pub fn is_online(&self) -> bool {
        self.is_connected && self.is_internet_reachable != Some(false)
    }
}

/// Host application foreground state.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum AppState {
    #[default]
    Active,
    Inactive,
    Background,
}

/// Payload handed to the remote send endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendRequest {
    /// Doubles as the idempotency key.
    pub message_id: MessageId,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<String>,
}

/// Successful response from the remote send endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SendReceipt {
    pub status: u16,
    #[serde(default)]
    pub conversation_id: Option<String>,
}

/// Health status reported by adapter health checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Adapter is fully operational.
    Healthy,
    /// Adapter is operational but experiencing issues.
    Degraded(String),
    /// Adapter is not operational.
    Unhealthy(String),
}

/// Identifies the collaborator role of an adapter.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum AdapterType {
    KeyValueStore,
    NetworkMonitor,
    RemoteSender,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn queued_message_serializes_camel_case() {
        let msg = QueuedMessage::new(
            "hello",
            Some("conv-1".into()),
            vec![],
            DEFAULT_MAX_RETRIES,
            Utc::now(),
        );
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["status"], "pending");
        assert_eq!(json["retryCount"], 0);
        assert_eq!(json["maxRetries"], 3);
        assert_eq!(json["conversationId"], "conv-1");
        assert!(json.get("attachments").is_none());
        assert!(json.get("error").is_none());
    }

    #[test]
    fn priority_orders_low_first() {
        let mut tiers = vec![Priority::High, Priority::Low, Priority::Medium];
        tiers.sort();
        assert_eq!(tiers, vec![Priority::Low, Priority::Medium, Priority::High]);
        assert_eq!(Priority::from_str("medium").unwrap(), Priority::Medium);
    }

    #[test]
    fn quota_percentage_and_available() {
        let quota = StorageQuota::new(25, 100);
        assert_eq!(quota.available, 75);
        assert!((quota.percentage - 25.0).abs() < f64::EPSILON);

        let over = StorageQuota::new(150, 100);
        assert_eq!(over.available, 0);
    }

    #[test]
    fn unknown_reachability_counts_as_online() {
        let status = NetworkStatus {
            is_connected: true,
            connection_type: ConnectionType::Wifi,
            is_internet_reachable: None,
        };
        assert!(status.is_online());
        assert!(!NetworkStatus::offline().is_online());
    }

    #[test]
    fn retries_exhausted_at_budget() {
        let mut msg = QueuedMessage::new("x", None, vec![], 2, Utc::now());
        assert!(!msg.retries_exhausted());
        msg.retry_count = 2;
        assert!(msg.retries_exhausted());
    }
}
