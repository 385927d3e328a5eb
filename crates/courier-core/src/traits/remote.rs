// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The opaque remote send-message endpoint.

use async_trait::async_trait;

use crate::error::CourierError;
use crate::traits::adapter::Adapter;
use crate::types::{SendReceipt, SendRequest};

/// Delivers one message to the backend.
///
/// Failures must be classified: [`CourierError::RemoteRejected`] for terminal
/// client errors, [`CourierError::RemoteUnavailable`] for transient ones.
#[async_trait]
pub trait RemoteSender: Adapter {
    async fn send(&self, request: &SendRequest) -> Result<SendReceipt, CourierError>;
}
