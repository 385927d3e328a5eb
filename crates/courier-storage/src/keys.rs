// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Persisted key layout.

/// Serialized queue array.
pub const QUEUE_KEY: &str = "@courier/queue";

/// Prefix of per-key [`StorageItem`](courier_core::StorageItem) records.
pub const META_PREFIX: &str = "@courier/meta/";

/// Last observed network status, for diagnostics only.
pub const NETWORK_STATUS_KEY: &str = "@courier/network_status";

/// Lifecycle session bookkeeping.
pub const LIFECYCLE_KEY: &str = "@courier/lifecycle";

/// Host session data; never purged.
pub const SESSION_PREFIX: &str = "@courier/session/";

pub fn meta_key(key: &str) -> String {
    format!("{META_PREFIX}{key}")
}

pub fn is_meta_key(key: &str) -> bool {
    key.starts_with(META_PREFIX)
}

/// Keys the sensitive-data purge must keep.
pub fn is_essential(key: &str) -> bool {
    key == QUEUE_KEY
        || key == LIFECYCLE_KEY
        || key == NETWORK_STATUS_KEY
        || key.starts_with(SESSION_PREFIX)
}
