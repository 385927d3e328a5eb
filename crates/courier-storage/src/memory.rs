// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Process-local key-value store.

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use courier_core::{Adapter, AdapterType, CourierError, KeyValueStore};

/// In-memory [`KeyValueStore`]. Contents are lost when dropped.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, String>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }
}

#[async_trait]
impl Adapter for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::KeyValueStore
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, CourierError> {
        Ok(self.entries().get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), CourierError> {
        self.entries().insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), CourierError> {
        self.entries().remove(key);
        Ok(())
    }

    async fn multi_remove(&self, keys: &[String]) -> Result<(), CourierError> {
        let mut entries = self.entries();
        for key in keys {
            entries.remove(key);
        }
        Ok(())
    }

    async fn get_all_keys(&self) -> Result<Vec<String>, CourierError> {
        Ok(self.entries().keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_get_remove() {
        let store = MemoryStore::new();
        assert_eq!(store.get("a").await.unwrap(), None);

        store.set("a", "1").await.unwrap();
        store.set("a", "2").await.unwrap();
        assert_eq!(store.get("a").await.unwrap().as_deref(), Some("2"));

        store.remove("a").await.unwrap();
        store.remove("a").await.unwrap();
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn multi_remove_and_key_listing() {
        let store = MemoryStore::new();
        for key in ["b", "a", "c"] {
            store.set(key, "x").await.unwrap();
        }
        assert_eq!(store.get_all_keys().await.unwrap(), vec!["a", "b", "c"]);

        store
            .multi_remove(&["a".to_string(), "c".to_string(), "zz".to_string()])
            .await
            .unwrap();
        assert_eq!(store.get_all_keys().await.unwrap(), vec!["b"]);
    }
}
