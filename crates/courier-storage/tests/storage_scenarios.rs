// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Storage scenarios across the quota manager, queue store and SQLite backend.

use std::sync::Arc;

use courier_core::{Clock, CourierError, KeyValueStore, MessageStatus, Priority};
use courier_storage::keys::{QUEUE_KEY, meta_key};
use courier_storage::{
    MemoryStore, MessageQueueStore, QueueSettings, QuotaSettings, SqliteStore, StorageQuotaManager,
};
use courier_test_utils::{FlakyStore, ManualClock};

const KIB: u64 = 1024;

fn value_of(bytes: u64) -> String {
    "v".repeat((bytes / 2) as usize)
}

/// Small quota filled with low-priority items; one more write evicts the oldest.
#[tokio::test]
async fn quota_pressure_evicts_oldest_low_priority() {
    let clock = Arc::new(ManualClock::default());
    let mgr = StorageQuotaManager::new(
        Arc::new(MemoryStore::new()),
        clock.clone(),
        QuotaSettings {
            limit_bytes: 64 * KIB,
            min_free_bytes: 4 * KIB,
            ..QuotaSettings::default()
        },
    );

    for i in 0..6 {
        mgr.set_item(&format!("cache/{i}"), &value_of(10 * KIB), Priority::Low)
            .await
            .unwrap();
        clock.advance(chrono::Duration::seconds(10));
    }
    assert!(!mgr.has_space(10 * KIB).await.unwrap());

    mgr.set_item("fresh", &value_of(10 * KIB), Priority::Low)
        .await
        .unwrap();

    assert_eq!(mgr.get_item("cache/0").await.unwrap(), None);
    assert!(mgr.get_item("cache/1").await.unwrap().is_some());
    assert!(mgr.get_item("fresh").await.unwrap().is_some());
    let quota = mgr.get_quota().await.unwrap();
    assert!(quota.used <= quota.limit);
}

/// The queue record lands in SQLite with a `high` metadata record.
#[tokio::test]
async fn queue_persists_through_sqlite() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("courier.db");
    let path = path.to_str().unwrap();
    let clock: Arc<dyn Clock> = Arc::new(ManualClock::default());

    let kv: Arc<dyn KeyValueStore> = Arc::new(SqliteStore::open(path).await.unwrap());
    let quota = Arc::new(StorageQuotaManager::new(
        kv.clone(),
        clock.clone(),
        QuotaSettings::default(),
    ));
    let queue = MessageQueueStore::open(quota, clock.clone(), QueueSettings::default())
        .await
        .unwrap();
    let id = queue
        .enqueue("durable", Some("conv-9".into()), vec![])
        .await
        .unwrap()
        .message
        .id;

    let raw = kv.get(QUEUE_KEY).await.unwrap().unwrap();
    assert!(raw.contains("durable"));
    let meta = kv.get(&meta_key(QUEUE_KEY)).await.unwrap().unwrap();
    assert!(meta.contains("\"high\""));
    drop(queue);
    drop(kv);

    let kv: Arc<dyn KeyValueStore> = Arc::new(SqliteStore::open(path).await.unwrap());
    let quota = Arc::new(StorageQuotaManager::new(kv, clock.clone(), QuotaSettings::default()));
    let queue = MessageQueueStore::open(quota, clock, QueueSettings::default())
        .await
        .unwrap();
    let msg = queue.get(&id).await.unwrap();
    assert_eq!(msg.conversation_id.as_deref(), Some("conv-9"));
    assert_eq!(msg.status, MessageStatus::Pending);
}

/// A failed write leaves the in-memory queue unchanged.
#[tokio::test]
async fn failed_write_rolls_back() {
    let flaky = Arc::new(FlakyStore::new(MemoryStore::new()));
    let clock: Arc<dyn Clock> = Arc::new(ManualClock::default());
    let quota = Arc::new(StorageQuotaManager::new(
        flaky.clone(),
        clock.clone(),
        QuotaSettings::default(),
    ));
    let queue = MessageQueueStore::open(quota, clock, QueueSettings::default())
        .await
        .unwrap();
    let id = queue.enqueue("kept", None, vec![]).await.unwrap().message.id;

    flaky.fail_writes(true);
    let err = queue.enqueue("lost", None, vec![]).await.unwrap_err();
    assert!(matches!(err, CourierError::Storage { .. }));
    assert!(queue.mark_sending(&id).await.is_err());

    let list = queue.list().await;
    assert_eq!(list.len(), 1);
    assert_eq!(list[0].status, MessageStatus::Pending);

    flaky.fail_writes(false);
    assert!(queue.mark_sending(&id).await.unwrap().is_some());
}
