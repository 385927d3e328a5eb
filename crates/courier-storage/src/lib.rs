// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Persistence layer for the Courier offline sync subsystem.
//!
//! Provides two [`KeyValueStore`](courier_core::KeyValueStore) backends
//! (in-memory and WAL-mode SQLite with embedded migrations), the
//! [`StorageQuotaManager`] that owns byte accounting and eviction, and the
//! [`MessageQueueStore`] holding not-yet-delivered messages.

pub mod database;
pub mod keys;
pub mod memory;
pub mod migrations;
pub mod queue;
pub mod quota;
pub mod sqlite;

pub use database::Database;
pub use memory::MemoryStore;
pub use queue::{Enqueued, MessageQueueStore, QueueEvent, QueueSettings, QueueWarning};
pub use quota::{QuotaSettings, StorageQuotaManager, StorageStats};
pub use sqlite::SqliteStore;
