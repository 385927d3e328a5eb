// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! reqwest-backed remote send endpoint.
//!
//! Every request carries the message id as an `Idempotency-Key` header so a
//! backend that honours it can drop duplicates after a crash mid-send.

use std::time::Duration;

use async_trait::async_trait;
use courier_config::model::RemoteConfig;
use courier_core::{
    Adapter, AdapterType, CourierError, RemoteSender, SendReceipt, SendRequest,
};
use reqwest::header::{HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

pub const IDEMPOTENCY_HEADER: &str = "idempotency-key";

/// Response bodies longer than this are cut in error messages.
const MAX_ERROR_BODY: usize = 512;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireMessage<'a> {
    content: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    conversation_id: Option<&'a str>,
    #[serde(skip_serializing_if = "no_attachments")]
    attachments: &'a [String],
}

fn no_attachments(attachments: &&[String]) -> bool {
    attachments.is_empty()
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireReceipt {
    #[serde(default)]
    conversation_id: Option<String>,
}

/// POSTs messages as JSON to a single endpoint.
#[derive(Debug, Clone)]
pub struct HttpSender {
    client: reqwest::Client,
    endpoint: String,
    timeout: Duration,
}

impl HttpSender {
    pub fn new(
        endpoint: impl Into<String>,
        auth_token: Option<&str>,
        timeout: Duration,
    ) -> Result<Self, CourierError> {
        let mut headers = HeaderMap::new();
        headers.insert("content-type", HeaderValue::from_static("application/json"));
        if let Some(token) = auth_token {
            let mut value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|e| CourierError::Config(format!("invalid auth token header value: {e}")))?;
            value.set_sensitive(true);
            headers.insert("authorization", value);
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| CourierError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
            timeout,
        })
    }

    /// Build from the `[remote]` section. Fails when no endpoint is configured.
    pub fn from_config(remote: &RemoteConfig, timeout: Duration) -> Result<Self, CourierError> {
        let endpoint = remote
            .endpoint
            .as_deref()
            .ok_or_else(|| CourierError::Config("remote.endpoint is not set".into()))?;
        Self::new(endpoint, remote.auth_token.as_deref(), timeout)
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn transport_error(&self, err: reqwest::Error) -> CourierError {
        if err.is_timeout() {
            CourierError::Timeout {
                duration: self.timeout,
            }
        } else {
            CourierError::RemoteUnavailable {
                status: None,
                message: format!("HTTP request failed: {err}"),
            }
        }
    }
}

#[async_trait]
impl Adapter for HttpSender {
    fn name(&self) -> &str {
        "http"
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::RemoteSender
    }
}

#[async_trait]
impl RemoteSender for HttpSender {
    async fn send(&self, request: &SendRequest) -> Result<SendReceipt, CourierError> {
        let body = WireMessage {
            content: &request.content,
            conversation_id: request.conversation_id.as_deref(),
            attachments: &request.attachments,
        };
        let key = HeaderValue::from_str(request.message_id.as_str()).map_err(|e| {
            CourierError::Internal(format!("message id is not a valid header value: {e}"))
        })?;

        let response = self
            .client
            .post(&self.endpoint)
            .header(IDEMPOTENCY_HEADER, key)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        debug!(message_id = %request.message_id, status = status.as_u16(), "send response received");

        if status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let receipt: WireReceipt = serde_json::from_str(&text).unwrap_or_default();
            return Ok(SendReceipt {
                status: status.as_u16(),
                conversation_id: receipt
                    .conversation_id
                    .or_else(|| request.conversation_id.clone()),
            });
        }

        let mut text = response.text().await.unwrap_or_default();
        if text.len() > MAX_ERROR_BODY {
            let mut cut = MAX_ERROR_BODY;
            while !text.is_char_boundary(cut) {
                cut -= 1;
            }
            text.truncate(cut);
        }
        let err = CourierError::from_status(status.as_u16(), format!("endpoint returned {status}: {text}"));
        if err.is_terminal() {
            warn!(message_id = %request.message_id, status = status.as_u16(), "message rejected by endpoint");
        }
        Err(err)
    }
}
