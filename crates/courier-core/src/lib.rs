// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Courier offline message sync subsystem.
//!
//! This crate provides the error taxonomy, the domain types shared by every
//! layer, and the collaborator traits (key-value storage, connectivity, the
//! remote send endpoint, and the wall clock) that the storage and sync crates
//! are written against.

pub mod error;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::CourierError;
pub use types::{
    AdapterType, AppState, ConnectionType, HealthStatus, MessageId, MessageStatus,
    NetworkStatus, Priority, QueuedMessage, SendReceipt, SendRequest, StorageItem,
    StorageQuota,
};

pub use traits::{Adapter, Clock, KeyValueStore, NetworkMonitor, RemoteSender, SystemClock};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn courier_error_has_taxonomy_variants() {
        let _full = CourierError::QueueFull { capacity: 50 };
        let _quota = CourierError::QuotaExceeded {
            key: "k".into(),
            required: 10,
            available: 0,
        };
        let _offline = CourierError::NetworkUnavailable;
        let _rejected = CourierError::RemoteRejected {
            status: 404,
            message: "gone".into(),
        };
        let _unavailable = CourierError::RemoteUnavailable {
            status: Some(503),
            message: "busy".into(),
        };
        let _open = CourierError::CircuitOpen {
            failures: 5,
            retry_after: std::time::Duration::from_secs(30),
        };
        let _storage = CourierError::storage(std::io::Error::other("disk"));
    }

    #[test]
    fn adapter_type_round_trips_through_strings() {
        use std::str::FromStr;

        for variant in [
            AdapterType::KeyValueStore,
            AdapterType::NetworkMonitor,
            AdapterType::RemoteSender,
        ] {
            let parsed = AdapterType::from_str(&variant.to_string()).expect("should parse back");
            assert_eq!(variant, parsed);
        }
    }

    #[test]
    fn all_traits_are_exported() {
        fn _assert_kv<T: KeyValueStore>() {}
        fn _assert_network<T: NetworkMonitor>() {}
        fn _assert_remote<T: RemoteSender>() {}
        fn _assert_clock<T: Clock>() {}
        _assert_clock::<SystemClock>();
    }
}
