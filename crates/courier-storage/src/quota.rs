// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Storage quota accounting and eviction.
//!
//! Every quota-tracked data key has a sibling [`StorageItem`] record under
//! [`META_PREFIX`](crate::keys::META_PREFIX). Usage is the sum of recorded
//! sizes, where a value costs two bytes per UTF-16 code unit. This manager
//! is the only component allowed to evict.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use courier_core::{Clock, CourierError, KeyValueStore, Priority, StorageItem, StorageQuota};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::keys::{is_meta_key, meta_key};

/// Quota tuning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuotaSettings {
    pub limit_bytes: u64,
    /// Safety margin that must stay free after every admitted write.
    pub min_free_bytes: u64,
    pub cache_ttl: Duration,
    /// `high` items younger than this are never evicted by [`StorageQuotaManager::free_space`].
    pub high_priority_protection: Duration,
}

impl Default for QuotaSettings {
    fn default() -> Self {
        Self {
            limit_bytes: 50 * 1024 * 1024,
            min_free_bytes: 5 * 1024 * 1024,
            cache_ttl: Duration::from_secs(60),
            high_priority_protection: Duration::from_secs(24 * 60 * 60),
        }
    }
}

/// Observability snapshot returned by [`StorageQuotaManager::get_stats`].
#[derive(Debug, Clone, PartialEq)]
pub struct StorageStats {
    pub quota: StorageQuota,
    pub item_count: usize,
    pub oldest_item_age: Option<Duration>,
    pub largest_item: Option<StorageItem>,
}

/// Approximate footprint of a stored string.
pub fn item_size(value: &str) -> u64 {
    value.encode_utf16().count() as u64 * 2
}

/// Tracks byte usage against a budget and evicts by priority and age.
pub struct StorageQuotaManager {
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    settings: QuotaSettings,
    cache: Mutex<Option<(Instant, StorageQuota)>>,
}

impl StorageQuotaManager {
    pub fn new(store: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>, settings: QuotaSettings) -> Self {
        Self {
            store,
            clock,
            settings,
            cache: Mutex::new(None),
        }
    }

    pub fn settings(&self) -> &QuotaSettings {
        &self.settings
    }

    pub fn store(&self) -> &Arc<dyn KeyValueStore> {
        &self.store
    }

    fn cache(&self) -> std::sync::MutexGuard<'_, Option<(Instant, StorageQuota)>> {
        self.cache.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Drop the cached quota so the next read rescans.
    pub fn invalidate_cache(&self) {
        *self.cache() = None;
    }

    /// Current usage. Served from cache for up to `cache_ttl`.
    pub async fn get_quota(&self) -> Result<StorageQuota, CourierError> {
        if let Some((computed_at, quota)) = *self.cache()
            && computed_at.elapsed() < self.settings.cache_ttl
        {
            return Ok(quota);
        }

        let used: u64 = self.load_items().await?.iter().map(|item| item.size).sum();
        let quota = StorageQuota::new(used, self.settings.limit_bytes);
        *self.cache() = Some((Instant::now(), quota));
        Ok(quota)
    }

    /// True iff writing `bytes` more would still leave the safety margin free.
    pub async fn has_space(&self, bytes: u64) -> Result<bool, CourierError> {
        let quota = self.get_quota().await?;
        Ok(self.fits(quota.available, bytes))
    }

    fn fits(&self, available: u64, bytes: u64) -> bool {
        available
            .checked_sub(bytes)
            .is_some_and(|left| left >= self.settings.min_free_bytes)
    }

    /// Write `value` under `key` with a metadata record, evicting if needed.
    ///
    /// Overwriting a key credits its previous size back before admission.
    /// Fails with [`CourierError::QuotaExceeded`] when eviction cannot make room.
    pub async fn set_item(
        &self,
        key: &str,
        value: &str,
        priority: Priority,
    ) -> Result<(), CourierError> {
        let size = item_size(value);
        let previous = self.read_meta(key).await?.map_or(0, |item| item.size);

        let quota = self.get_quota().await?;
        let mut available = quota.available.saturating_add(previous);
        if !self.fits(available, size) {
            let needed = (size + self.settings.min_free_bytes).saturating_sub(available);
            debug!(key, size, needed, "insufficient space, evicting");
            self.free_space_excluding(needed, Some(key)).await?;

            let quota = self.get_quota().await?;
            available = quota.available.saturating_add(previous);
            if !self.fits(available, size) {
                warn!(key, size, available, "storage quota exceeded");
                return Err(CourierError::QuotaExceeded {
                    key: key.to_string(),
                    required: size,
                    available: available.saturating_sub(self.settings.min_free_bytes),
                });
            }
        }

        let item = StorageItem {
            key: key.to_string(),
            size,
            timestamp: self.clock.now(),
            priority,
        };
        self.store.set(key, value).await?;
        self.store
            .set(&meta_key(key), &serde_json::to_string(&item)?)
            .await?;
        self.invalidate_cache();
        Ok(())
    }

    pub async fn get_item(&self, key: &str) -> Result<Option<String>, CourierError> {
        self.store.get(key).await
    }

    /// Remove a key together with its metadata record.
    pub async fn remove_item(&self, key: &str) -> Result<(), CourierError> {
        self.remove_keys(&[key.to_string()]).await
    }

    /// Remove several keys together with their metadata records.
    pub async fn remove_keys(&self, keys: &[String]) -> Result<(), CourierError> {
        if keys.is_empty() {
            return Ok(());
        }
        let mut all = Vec::with_capacity(keys.len() * 2);
        for key in keys {
            all.push(key.clone());
            all.push(meta_key(key));
        }
        self.store.multi_remove(&all).await?;
        self.invalidate_cache();
        Ok(())
    }

    /// Every stored data key (metadata records excluded), tracked or not.
    pub async fn data_keys(&self) -> Result<Vec<String>, CourierError> {
        Ok(self
            .store
            .get_all_keys()
            .await?
            .into_iter()
            .filter(|key| !is_meta_key(key))
            .collect())
    }

    /// Evict items in `(priority, timestamp)` order until `required_bytes`
    /// have been freed or no eligible item is left. Returns the bytes freed.
    pub async fn free_space(&self, required_bytes: u64) -> Result<u64, CourierError> {
        self.free_space_excluding(required_bytes, None).await
    }

    async fn free_space_excluding(
        &self,
        required_bytes: u64,
        exclude: Option<&str>,
    ) -> Result<u64, CourierError> {
        let now = self.clock.now();
        let mut candidates: Vec<StorageItem> = self
            .load_items()
            .await?
            .into_iter()
            .filter(|item| Some(item.key.as_str()) != exclude)
            .filter(|item| !self.is_protected(item, now))
            .collect();
        candidates.sort_by(|a, b| (a.priority, a.timestamp).cmp(&(b.priority, b.timestamp)));

        let mut freed = 0u64;
        let mut victims = Vec::new();
        for item in candidates {
            if freed >= required_bytes {
                break;
            }
            debug!(key = %item.key, size = item.size, priority = %item.priority, "evicting");
            freed += item.size;
            victims.push(item.key);
        }

        if !victims.is_empty() {
            self.remove_keys(&victims).await?;
            info!(
                evicted = victims.len(),
                freed,
                required = required_bytes,
                "freed storage space"
            );
        }
        Ok(freed)
    }

    fn is_protected(&self, item: &StorageItem, now: DateTime<Utc>) -> bool {
        item.priority == Priority::High && age(item, now) < self.settings.high_priority_protection
    }

    /// Remove every non-`high` item older than `max_age`. Returns the count removed.
    pub async fn cleanup_old_items(&self, max_age: Duration) -> Result<usize, CourierError> {
        let now = self.clock.now();
        let stale: Vec<String> = self
            .load_items()
            .await?
            .into_iter()
            .filter(|item| item.priority != Priority::High && age(item, now) > max_age)
            .map(|item| item.key)
            .collect();

        if !stale.is_empty() {
            self.remove_keys(&stale).await?;
            info!(removed = stale.len(), max_age_secs = max_age.as_secs(), "cleaned up old items");
        }
        Ok(stale.len())
    }

    pub async fn get_stats(&self) -> Result<StorageStats, CourierError> {
        let now = self.clock.now();
        let items = self.load_items().await?;
        let quota = self.get_quota().await?;

        Ok(StorageStats {
            quota,
            item_count: items.len(),
            oldest_item_age: items.iter().map(|item| age(item, now)).max(),
            largest_item: items.into_iter().max_by_key(|item| item.size),
        })
    }

    async fn read_meta(&self, key: &str) -> Result<Option<StorageItem>, CourierError> {
        match self.store.get(&meta_key(key)).await? {
            Some(raw) => Ok(serde_json::from_str(&raw).ok()),
            None => Ok(None),
        }
    }

    async fn load_items(&self) -> Result<Vec<StorageItem>, CourierError> {
        let mut items = Vec::new();
        for key in self.store.get_all_keys().await? {
            if !is_meta_key(&key) {
                continue;
            }
            let Some(raw) = self.store.get(&key).await? else {
                continue;
            };
            match serde_json::from_str::<StorageItem>(&raw) {
                Ok(item) => items.push(item),
                Err(e) => warn!(key, error = %e, "skipping unreadable metadata record"),
            }
        }
        Ok(items)
    }
}

fn age(item: &StorageItem, now: DateTime<Utc>) -> Duration {
    (now - item.timestamp).to_std().unwrap_or(Duration::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryStore;
    use courier_test_utils::ManualClock;
    use proptest::prelude::*;

    const KIB: u64 = 1024;

    fn manager(limit: u64, min_free: u64) -> (StorageQuotaManager, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::default());
        let settings = QuotaSettings {
            limit_bytes: limit,
            min_free_bytes: min_free,
            ..QuotaSettings::default()
        };
        let mgr = StorageQuotaManager::new(Arc::new(MemoryStore::new()), clock.clone(), settings);
        (mgr, clock)
    }

    /// A value whose accounted size is exactly `bytes` (even).
    fn value_of(bytes: u64) -> String {
        "x".repeat((bytes / 2) as usize)
    }

    #[test]
    fn size_counts_utf16_units() {
        assert_eq!(item_size("abc"), 6);
        assert_eq!(item_size("é"), 2);
        assert_eq!(item_size("😀"), 4);
    }

    #[tokio::test]
    async fn set_item_writes_value_and_metadata() {
        let (mgr, _) = manager(100 * KIB, 10 * KIB);
        mgr.set_item("draft", "hello", Priority::Medium).await.unwrap();

        assert_eq!(mgr.get_item("draft").await.unwrap().as_deref(), Some("hello"));
        let meta = mgr.read_meta("draft").await.unwrap().unwrap();
        assert_eq!(meta.size, 10);
        assert_eq!(meta.priority, Priority::Medium);
        assert_eq!(mgr.get_quota().await.unwrap().used, 10);
    }

    #[tokio::test]
    async fn has_space_respects_safety_margin() {
        let (mgr, _) = manager(100 * KIB, 10 * KIB);
        assert!(mgr.has_space(90 * KIB).await.unwrap());
        assert!(!mgr.has_space(90 * KIB + 2).await.unwrap());
    }

    #[tokio::test]
    async fn overwrite_credits_previous_size() {
        let (mgr, _) = manager(100 * KIB, 10 * KIB);
        mgr.set_item("big", &value_of(80 * KIB), Priority::High).await.unwrap();
        // Replacing 80 KiB with 85 KiB fits only if the old value is credited.
        mgr.set_item("big", &value_of(85 * KIB), Priority::High).await.unwrap();
        assert_eq!(mgr.get_quota().await.unwrap().used, 85 * KIB);
    }

    #[tokio::test]
    async fn eviction_prefers_low_priority_then_oldest() {
        let (mgr, clock) = manager(100 * KIB, 10 * KIB);
        mgr.set_item("low-old", &value_of(20 * KIB), Priority::Low).await.unwrap();
        clock.advance(chrono::Duration::minutes(1));
        mgr.set_item("medium", &value_of(20 * KIB), Priority::Medium).await.unwrap();
        clock.advance(chrono::Duration::minutes(1));
        mgr.set_item("low-new", &value_of(20 * KIB), Priority::Low).await.unwrap();
        clock.advance(chrono::Duration::minutes(1));
        mgr.set_item("high", &value_of(20 * KIB), Priority::High).await.unwrap();

        let freed = mgr.free_space(30 * KIB).await.unwrap();
        assert_eq!(freed, 40 * KIB);
        assert_eq!(mgr.get_item("low-old").await.unwrap(), None);
        assert_eq!(mgr.get_item("low-new").await.unwrap(), None);
        assert!(mgr.get_item("medium").await.unwrap().is_some());
        assert!(mgr.get_item("high").await.unwrap().is_some());
        assert_eq!(mgr.read_meta("low-old").await.unwrap(), None);
    }

    #[tokio::test]
    async fn recent_high_priority_items_are_never_evicted() {
        let (mgr, clock) = manager(100 * KIB, 10 * KIB);
        mgr.set_item("queue", &value_of(40 * KIB), Priority::High).await.unwrap();
        clock.advance(chrono::Duration::hours(1));

        assert_eq!(mgr.free_space(40 * KIB).await.unwrap(), 0);
        assert!(mgr.get_item("queue").await.unwrap().is_some());

        clock.advance(chrono::Duration::hours(24));
        assert_eq!(mgr.free_space(40 * KIB).await.unwrap(), 40 * KIB);
    }

    #[tokio::test]
    async fn quota_exceeded_when_eviction_cannot_help() {
        let (mgr, _) = manager(100 * KIB, 10 * KIB);
        mgr.set_item("queue", &value_of(60 * KIB), Priority::High).await.unwrap();

        let err = mgr
            .set_item("blob", &value_of(40 * KIB), Priority::Low)
            .await
            .unwrap_err();
        match err {
            CourierError::QuotaExceeded { key, required, .. } => {
                assert_eq!(key, "blob");
                assert_eq!(required, 40 * KIB);
            }
            other => panic!("expected QuotaExceeded, got {other:?}"),
        }
        assert_eq!(mgr.get_item("blob").await.unwrap(), None);
    }

    #[tokio::test]
    async fn cleanup_spares_high_priority_and_fresh_items() {
        let (mgr, clock) = manager(100 * KIB, 10 * KIB);
        mgr.set_item("old-low", "a", Priority::Low).await.unwrap();
        mgr.set_item("old-high", "b", Priority::High).await.unwrap();
        clock.advance(chrono::Duration::days(8));
        mgr.set_item("fresh-low", "c", Priority::Low).await.unwrap();

        let removed = mgr.cleanup_old_items(Duration::from_secs(7 * 86_400)).await.unwrap();
        assert_eq!(removed, 1);
        assert_eq!(mgr.get_item("old-low").await.unwrap(), None);
        assert!(mgr.get_item("old-high").await.unwrap().is_some());
        assert!(mgr.get_item("fresh-low").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn stats_report_oldest_and_largest() {
        let (mgr, clock) = manager(100 * KIB, 10 * KIB);
        mgr.set_item("small", "ab", Priority::Low).await.unwrap();
        clock.advance(chrono::Duration::seconds(90));
        mgr.set_item("large", &value_of(KIB), Priority::Medium).await.unwrap();

        let stats = mgr.get_stats().await.unwrap();
        assert_eq!(stats.item_count, 2);
        assert_eq!(stats.oldest_item_age, Some(Duration::from_secs(90)));
        assert_eq!(stats.largest_item.map(|i| i.key).as_deref(), Some("large"));
        assert_eq!(stats.quota.used, KIB + 4);
    }

    #[tokio::test(start_paused = true)]
    async fn quota_is_cached_until_invalidated() {
        let (mgr, _) = manager(100 * KIB, 10 * KIB);
        assert_eq!(mgr.get_quota().await.unwrap().used, 0);

        // A write outside the manager is not seen until the cache expires.
        let external = StorageItem {
            key: "external".into(),
            size: 100,
            timestamp: Utc::now(),
            priority: Priority::Low,
        };
        mgr.store()
            .set(&meta_key("external"), &serde_json::to_string(&external).unwrap())
            .await
            .unwrap();
        assert_eq!(mgr.get_quota().await.unwrap().used, 0);

        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(mgr.get_quota().await.unwrap().used, 100);
    }

    #[tokio::test]
    async fn remove_item_drops_metadata_too() {
        let (mgr, _) = manager(100 * KIB, 10 * KIB);
        mgr.set_item("k", "v", Priority::Low).await.unwrap();
        mgr.remove_item("k").await.unwrap();
        assert!(mgr.store().get_all_keys().await.unwrap().is_empty());
        assert_eq!(mgr.get_quota().await.unwrap().used, 0);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn writes_stay_in_budget_and_spare_recent_high_items(
            writes in proptest::collection::vec((0usize..6, 1u64..40, 0u8..3), 1..30)
        ) {
            let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
            rt.block_on(async {
                let (mgr, clock) = manager(100 * KIB, 10 * KIB);
                // Writes are a second apart, so every high key here is under 24h old.
                let mut high = std::collections::BTreeSet::<String>::new();
                for (slot, kib, tier) in writes {
                    let key = format!("k{slot}");
                    let priority = match tier {
                        0 => Priority::Low,
                        1 => Priority::Medium,
                        _ => Priority::High,
                    };
                    let written = mgr.set_item(&key, &value_of(kib * KIB), priority).await.is_ok();
                    clock.advance(chrono::Duration::seconds(1));

                    for protected in high.iter().filter(|k| **k != key) {
                        assert!(
                            mgr.get_item(protected).await.unwrap().is_some(),
                            "{protected} evicted while writing {key}"
                        );
                    }
                    if written {
                        if priority == Priority::High {
                            high.insert(key);
                        } else {
                            high.remove(&key);
                        }
                    }

                    let quota = mgr.get_quota().await.unwrap();
                    assert!(quota.used <= quota.limit, "used {} > limit {}", quota.used, quota.limit);
                }
            });
        }
    }
}
