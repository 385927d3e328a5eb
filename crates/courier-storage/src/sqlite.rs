// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite implementation of the KeyValueStore trait.

use async_trait::async_trait;
use rusqlite::{OptionalExtension, params};
use tracing::debug;

use courier_core::{Adapter, AdapterType, CourierError, HealthStatus, KeyValueStore};

use crate::database::{Database, map_tr_err};

/// Durable key-value store backed by the `kv_store` table.
pub struct SqliteStore {
    db: Database,
}

impl SqliteStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Open the database at `path` and wrap it.
    pub async fn open(path: &str) -> Result<Self, CourierError> {
        Ok(Self::new(Database::open(path).await?))
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Checkpoint and close the underlying database.
    pub async fn close(self) -> Result<(), CourierError> {
        self.db.close().await
    }
}

#[async_trait]
impl Adapter for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::KeyValueStore
    }

    async fn health_check(&self) -> Result<HealthStatus, CourierError> {
        let result = self
            .db
            .connection()
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("SELECT 1;")?;
                Ok(())
            })
            .await;
        Ok(match result {
            Ok(()) => HealthStatus::Healthy,
            Err(e) => HealthStatus::Unhealthy(format!("sqlite: {e}")),
        })
    }
}

#[async_trait]
impl KeyValueStore for SqliteStore {
    async fn get(&self, key: &str) -> Result<Option<String>, CourierError> {
        let key = key.to_string();
        self.db
            .connection()
            .call(move |conn| -> Result<Option<String>, rusqlite::Error> {
                conn.query_row(
                    "SELECT value FROM kv_store WHERE key = ?1",
                    params![key],
                    |row| row.get(0),
                )
                .optional()
            })
            .await
            .map_err(map_tr_err)
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), CourierError> {
        let key = key.to_string();
        let value = value.to_string();
        self.db
            .connection()
            .call(move |conn| -> Result<(), rusqlite::Error> {
                conn.execute(
                    "INSERT INTO kv_store (key, value) VALUES (?1, ?2)
                     ON CONFLICT(key) DO UPDATE SET
                        value = excluded.value,
                        updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')",
                    params![key, value],
                )?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)
    }

    async fn remove(&self, key: &str) -> Result<(), CourierError> {
        let key = key.to_string();
        self.db
            .connection()
            .call(move |conn| -> Result<(), rusqlite::Error> {
                conn.execute("DELETE FROM kv_store WHERE key = ?1", params![key])?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)
    }

    async fn multi_remove(&self, keys: &[String]) -> Result<(), CourierError> {
        if keys.is_empty() {
            return Ok(());
        }
        let keys = keys.to_vec();
        let removed = self
            .db
            .connection()
            .call(move |conn| -> Result<usize, rusqlite::Error> {
                let tx = conn.transaction()?;
                let mut removed = 0;
                {
                    let mut stmt = tx.prepare("DELETE FROM kv_store WHERE key = ?1")?;
                    for key in &keys {
                        removed += stmt.execute(params![key])?;
                    }
                }
                tx.commit()?;
                Ok(removed)
            })
            .await
            .map_err(map_tr_err)?;
        debug!(removed, "multi_remove committed");
        Ok(())
    }

    async fn get_all_keys(&self) -> Result<Vec<String>, CourierError> {
        self.db
            .connection()
            .call(|conn| -> Result<Vec<String>, rusqlite::Error> {
                let mut stmt = conn.prepare("SELECT key FROM kv_store ORDER BY key")?;
                let keys = stmt
                    .query_map([], |row| row.get(0))?
                    .collect::<Result<Vec<String>, _>>()?;
                Ok(keys)
            })
            .await
            .map_err(map_tr_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    async fn setup() -> (SqliteStore, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("kv.db");
        let store = SqliteStore::open(path.to_str().unwrap()).await.unwrap();
        (store, dir)
    }

    #[tokio::test]
    async fn upsert_overwrites_value() {
        let (store, _dir) = setup().await;
        store.set("k", "one").await.unwrap();
        store.set("k", "two").await.unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("two"));
        assert_eq!(store.get_all_keys().await.unwrap(), vec!["k"]);
        store.close().await.unwrap();
    }

    #[tokio::test]
    async fn multi_remove_is_transactional_and_ignores_missing() {
        let (store, _dir) = setup().await;
        for key in ["a", "b", "c"] {
            store.set(key, key).await.unwrap();
        }
        store
            .multi_remove(&["a".into(), "missing".into(), "c".into()])
            .await
            .unwrap();
        assert_eq!(store.get_all_keys().await.unwrap(), vec!["b"]);
        assert_eq!(store.get("a").await.unwrap(), None);
    }

    #[tokio::test]
    async fn values_survive_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("kv.db");
        let path = path.to_str().unwrap();

        let store = SqliteStore::open(path).await.unwrap();
        store.set("@courier/queue", "[]").await.unwrap();
        store.close().await.unwrap();

        let store = SqliteStore::open(path).await.unwrap();
        assert_eq!(
            store.get("@courier/queue").await.unwrap().as_deref(),
            Some("[]")
        );
    }

    #[tokio::test]
    async fn health_check_reports_healthy() {
        let (store, _dir) = setup().await;
        assert_eq!(store.health_check().await.unwrap(), HealthStatus::Healthy);
    }
}
