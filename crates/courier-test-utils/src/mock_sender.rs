// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock remote send endpoint for deterministic testing.
//!
//! Outcomes are popped from a FIFO script. When the script is empty the
//! fallback outcome (delivery, unless changed) is used.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use courier_core::{
    Adapter, AdapterType, CourierError, HealthStatus, RemoteSender, SendReceipt, SendRequest,
};

/// What the next `send` call does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockOutcome {
    /// Accept with status 200.
    Deliver,
    /// Answer with this HTTP status.
    Status(u16),
    /// Fail before any response (connection reset).
    Transport,
    /// Wait, then apply the inner outcome.
    Delayed(Duration, Box<MockOutcome>),
    /// Never answer. Only a timeout or cancellation ends the call.
    Hang,
}

#[derive(Debug)]
struct State {
    script: VecDeque<MockOutcome>,
    fallback: MockOutcome,
    attempts: Vec<SendRequest>,
    delivered: Vec<SendRequest>,
}

/// Scripted [`RemoteSender`] that records every attempt.
#[derive(Debug)]
pub struct MockSender {
    state: Mutex<State>,
}

impl MockSender {
    pub fn new() -> Self {
        Self::with_script(Vec::new())
    }

    pub fn with_script(script: Vec<MockOutcome>) -> Self {
        Self {
            state: Mutex::new(State {
                script: script.into(),
                fallback: MockOutcome::Deliver,
                attempts: Vec::new(),
                delivered: Vec::new(),
            }),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn push(&self, outcome: MockOutcome) {
        self.state().script.push_back(outcome);
    }

    /// Outcome used once the script runs out.
    pub fn set_fallback(&self, outcome: MockOutcome) {
        self.state().fallback = outcome;
    }

    /// Every request received, including failed attempts.
    pub fn attempts(&self) -> Vec<SendRequest> {
        self.state().attempts.clone()
    }

    /// Requests that were accepted, in order.
    pub fn delivered(&self) -> Vec<SendRequest> {
        self.state().delivered.clone()
    }

    pub fn delivered_contents(&self) -> Vec<String> {
        self.state()
            .delivered
            .iter()
            .map(|r| r.content.clone())
            .collect()
    }

    fn next_outcome(&self, request: &SendRequest) -> MockOutcome {
        let mut state = self.state();
        state.attempts.push(request.clone());
        let fallback = state.fallback.clone();
        state.script.pop_front().unwrap_or(fallback)
    }

    fn record_delivery(&self, request: &SendRequest) {
        self.state().delivered.push(request.clone());
    }
}

impl Default for MockSender {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Adapter for MockSender {
    fn name(&self) -> &str {
        "mock-sender"
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::RemoteSender
    }

    async fn health_check(&self) -> Result<HealthStatus, CourierError> {
        Ok(HealthStatus::Healthy)
    }
}

#[async_trait]
impl RemoteSender for MockSender {
    async fn send(&self, request: &SendRequest) -> Result<SendReceipt, CourierError> {
        let mut outcome = self.next_outcome(request);
        loop {
            match outcome {
                MockOutcome::Deliver => {
                    self.record_delivery(request);
                    return Ok(SendReceipt {
                        status: 200,
                        conversation_id: request.conversation_id.clone(),
                    });
                }
                MockOutcome::Status(status) if (200..300).contains(&status) => {
                    self.record_delivery(request);
                    return Ok(SendReceipt {
                        status,
                        conversation_id: request.conversation_id.clone(),
                    });
                }
                MockOutcome::Status(status) => {
                    return Err(CourierError::from_status(status, format!("mock status {status}")));
                }
                MockOutcome::Transport => {
                    return Err(CourierError::RemoteUnavailable {
                        status: None,
                        message: "connection reset".into(),
                    });
                }
                MockOutcome::Delayed(delay, inner) => {
                    tokio::time::sleep(delay).await;
                    outcome = *inner;
                }
                MockOutcome::Hang => return std::future::pending().await,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_core::MessageId;

    fn request(content: &str) -> SendRequest {
        SendRequest {
            message_id: MessageId::from(content),
            content: content.into(),
            conversation_id: None,
            attachments: vec![],
        }
    }

    #[tokio::test]
    async fn script_then_fallback() {
        let sender = MockSender::with_script(vec![MockOutcome::Status(503), MockOutcome::Transport]);

        let err = sender.send(&request("a")).await.unwrap_err();
        assert_eq!(err.status(), Some(503));
        assert!(sender.send(&request("a")).await.is_err());
        assert_eq!(sender.send(&request("a")).await.unwrap().status, 200);

        assert_eq!(sender.attempts().len(), 3);
        assert_eq!(sender.delivered_contents(), vec!["a"]);
    }

    #[tokio::test(start_paused = true)]
    async fn delayed_outcome_waits() {
        let sender = MockSender::with_script(vec![MockOutcome::Delayed(
            Duration::from_secs(2),
            Box::new(MockOutcome::Deliver),
        )]);
        let start = tokio::time::Instant::now();
        sender.send(&request("slow")).await.unwrap();
        assert_eq!(start.elapsed(), Duration::from_secs(2));
    }
}
