// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Key-value store wrapper that can be told to fail.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use courier_core::{Adapter, AdapterType, CourierError, HealthStatus, KeyValueStore};

/// Delegates to `inner` unless writes are switched off.
pub struct FlakyStore<S> {
    inner: S,
    fail_writes: AtomicBool,
    writes: AtomicUsize,
}

impl<S: KeyValueStore> FlakyStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            fail_writes: AtomicBool::new(false),
            writes: AtomicUsize::new(0),
        }
    }

    /// When `true`, `set`, `remove` and `multi_remove` return a storage error.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Successful writes so far.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    fn check_write(&self) -> Result<(), CourierError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(CourierError::storage("injected write failure"));
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl<S: KeyValueStore> Adapter for FlakyStore<S> {
    fn name(&self) -> &str {
        "flaky"
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::KeyValueStore
    }

    async fn health_check(&self) -> Result<HealthStatus, CourierError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Ok(HealthStatus::Degraded("writes failing".into()));
        }
        self.inner.health_check().await
    }
}

#[async_trait]
impl<S: KeyValueStore> KeyValueStore for FlakyStore<S> {
    async fn get(&self, key: &str) -> Result<Option<String>, CourierError> {
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), CourierError> {
        self.check_write()?;
        self.inner.set(key, value).await
    }

    async fn remove(&self, key: &str) -> Result<(), CourierError> {
        self.check_write()?;
        self.inner.remove(key).await
    }

    async fn multi_remove(&self, keys: &[String]) -> Result<(), CourierError> {
        self.check_write()?;
        self.inner.multi_remove(keys).await
    }

    async fn get_all_keys(&self) -> Result<Vec<String>, CourierError> {
        self.inner.get_all_keys().await
    }
}
