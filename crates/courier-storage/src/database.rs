// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Database connection management with PRAGMA setup, WAL mode, and lifecycle.
//!
//! All writes are serialized through tokio-rusqlite's single background thread.
//! Do NOT create additional Connection instances for writes.

use std::path::Path;

use courier_core::CourierError;
use tracing::{debug, info};

use crate::migrations;

const PRAGMAS: &str = "PRAGMA busy_timeout = 5000;
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;";

/// Single-writer handle to the Courier SQLite database.
pub struct Database {
    conn: tokio_rusqlite::Connection,
}

impl Database {
    /// Open (creating if needed) the database at `path` and run migrations.
    pub async fn open(path: &str) -> Result<Self, CourierError> {
        if let Some(parent) = Path::new(path).parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(CourierError::storage)?;
        }

        let conn = tokio_rusqlite::Connection::open(path)
            .await
            .map_err(CourierError::storage)?;
        let db = Self { conn };
        db.initialize().await?;
        info!(path, "database opened");
        Ok(db)
    }

    /// Open a private in-memory database. Used by tests and `backend = "memory"` diagnostics.
    pub async fn open_in_memory() -> Result<Self, CourierError> {
        let conn = tokio_rusqlite::Connection::open_in_memory()
            .await
            .map_err(CourierError::storage)?;
        let db = Self { conn };
        db.initialize().await?;
        Ok(db)
    }

    async fn initialize(&self) -> Result<(), CourierError> {
        self.conn
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch(PRAGMAS)?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)?;

        let migrated = self
            .conn
            .call(|conn| -> Result<Result<(), String>, rusqlite::Error> {
                Ok(migrations::run_migrations(conn))
            })
            .await
            .map_err(map_tr_err)?;
        migrated.map_err(CourierError::storage)?;
        debug!("migrations applied");
        Ok(())
    }

    pub fn connection(&self) -> &tokio_rusqlite::Connection {
        &self.conn
    }

    /// Checkpoint the WAL and close the connection.
    pub async fn close(self) -> Result<(), CourierError> {
        self.conn
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)?;
        self.conn.close().await.map_err(CourierError::storage)
    }
}

/// Convert a tokio-rusqlite error into [`CourierError::Storage`].
pub(crate) fn map_tr_err(e: tokio_rusqlite::Error<rusqlite::Error>) -> CourierError {
    CourierError::storage(e)
}
