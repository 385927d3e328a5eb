// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Embedded database migrations using refinery.
//!
//! SQL files under `migrations/` are compiled into the binary via
//! `embed_migrations!` and applied on every [`Database::open`](crate::Database::open).

mod embedded {
    use refinery::embed_migrations;
    embed_migrations!("migrations");
}

/// Run all pending migrations against the given connection.
///
/// The error is flattened to a string so it can cross the tokio-rusqlite
/// worker boundary.
pub fn run_migrations(conn: &mut rusqlite::Connection) -> Result<(), String> {
    embedded::migrations::runner()
        .run(conn)
        .map(|_| ())
        .map_err(|e| format!("migration failed: {e}"))
}
