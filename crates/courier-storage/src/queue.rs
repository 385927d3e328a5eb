// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Durable queue of not-yet-delivered messages.
//!
//! The whole queue is one JSON array written through the
//! [`StorageQuotaManager`] at `high` priority. Every mutation takes the
//! in-memory snapshot lock, applies the change, and overwrites the stored
//! record before releasing the lock, so writes are strictly serialized.
//! If the write is refused for quota reasons the queue is trimmed to its
//! most recent `trim_to` messages and written once more.

use std::sync::Arc;

use courier_core::{Clock, CourierError, MessageId, MessageStatus, Priority, QueuedMessage};
use tokio::sync::{Mutex, broadcast};
use tracing::{debug, error, info, warn};

use crate::keys::QUEUE_KEY;
use crate::quota::StorageQuotaManager;

const EVENT_CAPACITY: usize = 256;

/// Queue limits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueSettings {
    /// Hard cap; enqueue is rejected at or above this length.
    pub max_queue_size: usize,
    /// Retry budget stamped on new messages.
    pub max_retries: u32,
    /// Messages kept by the lossy quota fallback.
    pub trim_to: usize,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            max_queue_size: 50,
            max_retries: courier_core::types::DEFAULT_MAX_RETRIES,
            trim_to: 10,
        }
    }
}

/// Observable queue state changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueEvent {
    Enqueued { id: MessageId },
    Sending { id: MessageId },
    Delivered { id: MessageId },
    /// Back to `pending`, either after a retryable failure or a manual retry.
    Retrying {
        id: MessageId,
        retry_count: u32,
        error: Option<String>,
    },
    /// Terminal; the message stays until the caller removes or retries it.
    Failed { id: MessageId, error: String },
    Removed { id: MessageId },
    Cleared { count: usize },
    /// Quota fallback dropped the oldest messages.
    Trimmed { dropped: usize, kept: usize },
    /// Messages found in `sending` at load time were reset to `pending`.
    Recovered { count: usize },
}

/// Non-fatal condition reported alongside a successful write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueWarning {
    Trimmed { dropped: usize, kept: usize },
}

impl std::fmt::Display for QueueWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Trimmed { dropped, kept } => write!(
                f,
                "storage is full: dropped {dropped} oldest queued message(s), kept the latest {kept}"
            ),
        }
    }
}

/// Result of a successful enqueue.
#[derive(Debug, Clone)]
pub struct Enqueued {
    pub message: QueuedMessage,
    pub warning: Option<QueueWarning>,
}

pub struct MessageQueueStore {
    quota: Arc<StorageQuotaManager>,
    clock: Arc<dyn Clock>,
    settings: QueueSettings,
    messages: Mutex<Vec<QueuedMessage>>,
    events: broadcast::Sender<QueueEvent>,
}

impl MessageQueueStore {
    /// Load the persisted queue, resetting interrupted `sending` messages.
    pub async fn open(
        quota: Arc<StorageQuotaManager>,
        clock: Arc<dyn Clock>,
        settings: QueueSettings,
    ) -> Result<Self, CourierError> {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let store = Self {
            quota,
            clock,
            settings,
            messages: Mutex::new(Vec::new()),
            events,
        };
        store.load().await?;
        Ok(store)
    }

    async fn load(&self) -> Result<(), CourierError> {
        let mut messages = self.messages.lock().await;
        *messages = match self.quota.get_item(QUEUE_KEY).await? {
            Some(raw) => match serde_json::from_str::<Vec<QueuedMessage>>(&raw) {
                Ok(list) => list,
                Err(e) => {
                    error!(error = %e, "persisted queue is unreadable, starting empty");
                    Vec::new()
                }
            },
            None => Vec::new(),
        };

        let mut recovered = 0;
        for msg in messages.iter_mut() {
            if msg.status == MessageStatus::Sending {
                msg.status = MessageStatus::Pending;
                recovered += 1;
            }
        }
        if recovered > 0 {
            warn!(recovered, "reset interrupted sends to pending");
            self.persist(&mut messages).await?;
            self.emit(QueueEvent::Recovered { count: recovered });
        }
        info!(queued = messages.len(), "message queue loaded");
        Ok(())
    }

    pub fn settings(&self) -> &QueueSettings {
        &self.settings
    }

    pub fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: QueueEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    /// Append a new `pending` message and persist.
    pub async fn enqueue(
        &self,
        content: impl Into<String>,
        conversation_id: Option<String>,
        attachments: Vec<String>,
    ) -> Result<Enqueued, CourierError> {
        let mut messages = self.messages.lock().await;
        if messages.len() >= self.settings.max_queue_size {
            warn!(capacity = self.settings.max_queue_size, "queue full, rejecting enqueue");
            return Err(CourierError::QueueFull {
                capacity: self.settings.max_queue_size,
            });
        }

        let message = QueuedMessage::new(
            content,
            conversation_id,
            attachments,
            self.settings.max_retries,
            self.clock.now(),
        );
        messages.push(message.clone());

        let warning = match self.persist(&mut messages).await {
            Ok(warning) => warning,
            Err(e) => {
                messages.pop();
                return Err(e);
            }
        };

        info!(message_id = %message.id, queued = messages.len(), "message enqueued");
        self.emit(QueueEvent::Enqueued {
            id: message.id.clone(),
        });
        Ok(Enqueued { message, warning })
    }

    /// Snapshot in enqueue order.
    pub async fn list(&self) -> Vec<QueuedMessage> {
        self.messages.lock().await.clone()
    }

    pub async fn get(&self, id: &MessageId) -> Option<QueuedMessage> {
        self.messages.lock().await.iter().find(|m| &m.id == id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.messages.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.messages.lock().await.is_empty()
    }

    /// Ids of `pending` messages in enqueue order.
    pub async fn pending_ids(&self) -> Vec<MessageId> {
        self.messages
            .lock()
            .await
            .iter()
            .filter(|m| m.status == MessageStatus::Pending)
            .map(|m| m.id.clone())
            .collect()
    }

    /// Delete a message regardless of status.
    pub async fn remove(&self, id: &MessageId) -> Result<QueuedMessage, CourierError> {
        let mut messages = self.messages.lock().await;
        let index = messages
            .iter()
            .position(|m| &m.id == id)
            .ok_or_else(|| CourierError::NotFound { id: id.to_string() })?;

        let removed = messages.remove(index);
        if let Err(e) = self.persist(&mut messages).await {
            messages.insert(index, removed);
            return Err(e);
        }
        debug!(message_id = %id, "message removed");
        self.emit(QueueEvent::Removed { id: id.clone() });
        Ok(removed)
    }

    /// Empty the queue. Returns how many messages were dropped.
    pub async fn clear(&self) -> Result<usize, CourierError> {
        let mut messages = self.messages.lock().await;
        let previous = std::mem::take(&mut *messages);
        if let Err(e) = self.persist(&mut messages).await {
            *messages = previous;
            return Err(e);
        }
        info!(count = previous.len(), "queue cleared");
        self.emit(QueueEvent::Cleared {
            count: previous.len(),
        });
        Ok(previous.len())
    }

    /// Reset a `failed` message to `pending` with a fresh retry budget.
    pub async fn retry(&self, id: &MessageId) -> Result<QueuedMessage, CourierError> {
        let updated = self
            .update(id, |msg| {
                if msg.status == MessageStatus::Failed {
                    msg.status = MessageStatus::Pending;
                    msg.retry_count = 0;
                    msg.error = None;
                }
            })
            .await?
            .ok_or_else(|| CourierError::NotFound { id: id.to_string() })?;

        if updated.status == MessageStatus::Pending {
            self.emit(QueueEvent::Retrying {
                id: id.clone(),
                retry_count: 0,
                error: None,
            });
        }
        Ok(updated)
    }

    /// Claim a `pending` message for the active sync cycle.
    ///
    /// Returns `None` if the message is gone or no longer pending.
    pub async fn mark_sending(
        &self,
        id: &MessageId,
    ) -> Result<Option<QueuedMessage>, CourierError> {
        let mut claimed = false;
        let updated = self
            .update(id, |msg| {
                if msg.status == MessageStatus::Pending {
                    msg.status = MessageStatus::Sending;
                    claimed = true;
                }
            })
            .await?;
        if !claimed {
            return Ok(None);
        }
        self.emit(QueueEvent::Sending { id: id.clone() });
        Ok(updated)
    }

    /// Terminal failure: `failed` without consuming a retry.
    pub async fn mark_failed(
        &self,
        id: &MessageId,
        reason: &str,
    ) -> Result<Option<QueuedMessage>, CourierError> {
        let updated = self
            .update(id, |msg| {
                msg.status = MessageStatus::Failed;
                msg.error = Some(reason.to_string());
            })
            .await?;
        if updated.is_some() {
            warn!(message_id = %id, reason, "message rejected, marked failed");
            self.emit(QueueEvent::Failed {
                id: id.clone(),
                error: reason.to_string(),
            });
        }
        Ok(updated)
    }

    /// Retryable failure: consume one retry; `failed` once the budget is spent.
    pub async fn record_failure(
        &self,
        id: &MessageId,
        reason: &str,
    ) -> Result<Option<QueuedMessage>, CourierError> {
        let updated = self
            .update(id, |msg| {
                msg.retry_count += 1;
                msg.error = Some(reason.to_string());
                msg.status = if msg.retries_exhausted() {
                    MessageStatus::Failed
                } else {
                    MessageStatus::Pending
                };
            })
            .await?;

        if let Some(msg) = &updated {
            if msg.status == MessageStatus::Failed {
                warn!(message_id = %id, retry_count = msg.retry_count, reason, "retry budget exhausted");
                self.emit(QueueEvent::Failed {
                    id: id.clone(),
                    error: reason.to_string(),
                });
            } else {
                debug!(message_id = %id, retry_count = msg.retry_count, reason, "message will be retried");
                self.emit(QueueEvent::Retrying {
                    id: id.clone(),
                    retry_count: msg.retry_count,
                    error: Some(reason.to_string()),
                });
            }
        }
        Ok(updated)
    }

    /// Return a `sending` message to `pending` without consuming a retry.
    pub async fn requeue(&self, id: &MessageId) -> Result<Option<QueuedMessage>, CourierError> {
        self.update(id, |msg| {
            if msg.status == MessageStatus::Sending {
                msg.status = MessageStatus::Pending;
            }
        })
        .await
    }

    /// Remove delivered messages in one write.
    pub async fn remove_delivered(&self, ids: &[MessageId]) -> Result<usize, CourierError> {
        if ids.is_empty() {
            return Ok(0);
        }
        let mut messages = self.messages.lock().await;
        let previous = messages.clone();
        messages.retain(|m| !ids.contains(&m.id));
        let removed = previous.len() - messages.len();

        if let Err(e) = self.persist(&mut messages).await {
            *messages = previous;
            return Err(e);
        }
        for id in ids {
            self.emit(QueueEvent::Delivered { id: id.clone() });
        }
        debug!(removed, "delivered messages removed");
        Ok(removed)
    }

    /// Reset every `sending` message to `pending`. Used when a cycle is cut short.
    pub async fn requeue_in_flight(&self) -> Result<usize, CourierError> {
        let mut messages = self.messages.lock().await;
        let previous = messages.clone();
        let mut count = 0;
        for msg in messages.iter_mut() {
            if msg.status == MessageStatus::Sending {
                msg.status = MessageStatus::Pending;
                count += 1;
            }
        }
        if count == 0 {
            return Ok(0);
        }
        if let Err(e) = self.persist(&mut messages).await {
            *messages = previous;
            return Err(e);
        }
        info!(count, "requeued in-flight messages");
        Ok(count)
    }

    /// Apply `f` to one message and persist, rolling back on write failure.
    async fn update<F>(&self, id: &MessageId, f: F) -> Result<Option<QueuedMessage>, CourierError>
    where
        F: FnOnce(&mut QueuedMessage),
    {
        let mut messages = self.messages.lock().await;
        let Some(index) = messages.iter().position(|m| &m.id == id) else {
            return Ok(None);
        };

        let original = messages[index].clone();
        f(&mut messages[index]);
        if messages[index] == original {
            return Ok(Some(original));
        }

        if let Err(e) = self.persist(&mut messages).await {
            messages[index] = original;
            return Err(e);
        }
        // Trimming may have dropped the message.
        Ok(messages.iter().find(|m| &m.id == id).cloned())
    }

    /// Overwrite the stored record with `messages`, trimming once on quota refusal.
    async fn persist(
        &self,
        messages: &mut Vec<QueuedMessage>,
    ) -> Result<Option<QueueWarning>, CourierError> {
        let raw = serde_json::to_string(&*messages)?;
        match self.quota.set_item(QUEUE_KEY, &raw, Priority::High).await {
            Ok(()) => Ok(None),
            Err(CourierError::QuotaExceeded { .. }) if messages.len() > self.settings.trim_to => {
                let dropped = messages.len() - self.settings.trim_to;
                let trimmed = messages[dropped..].to_vec();
                warn!(
                    dropped,
                    kept = trimmed.len(),
                    "queue write refused by quota, trimming oldest messages"
                );

                let raw = serde_json::to_string(&trimmed)?;
                self.quota.set_item(QUEUE_KEY, &raw, Priority::High).await?;

                let kept = trimmed.len();
                *messages = trimmed;
                self.emit(QueueEvent::Trimmed { dropped, kept });
                Ok(Some(QueueWarning::Trimmed { dropped, kept }))
            }
            Err(e) => Err(e),
        }
    }
}
