// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Durable device-local key-value storage.

use async_trait::async_trait;

use crate::error::CourierError;
use crate::traits::adapter::Adapter;

/// String-keyed, string-valued store with no transactions.
///
/// Implementations must tolerate concurrent callers but need not order
/// writes from different tasks; the queue store serializes its own writes.
#[async_trait]
pub trait KeyValueStore: Adapter {
    /// Returns the stored value, or `None` if the key is absent.
    async fn get(&self, key: &str) -> Result<Option<String>, CourierError>;

    /// Inserts or overwrites a value.
    async fn set(&self, key: &str, value: &str) -> Result<(), CourierError>;

    /// Removes a key. Removing an absent key is not an error.
    async fn remove(&self, key: &str) -> Result<(), CourierError>;

    /// Removes several keys.
    async fn multi_remove(&self, keys: &[String]) -> Result<(), CourierError> {
        for key in keys {
            self.remove(key).await?;
        }
        Ok(())
    }

    /// Lists every stored key.
    async fn get_all_keys(&self) -> Result<Vec<String>, CourierError>;
}
