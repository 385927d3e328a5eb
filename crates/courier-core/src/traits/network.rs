// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Connectivity monitoring.

use tokio::sync::watch;

use crate::traits::adapter::Adapter;
use crate::types::NetworkStatus;

/// Reports current connectivity and publishes every change.
pub trait NetworkMonitor: Adapter {
    /// Latest known status.
    fn current(&self) -> NetworkStatus;

    /// Receiver that observes every status change.
    fn subscribe(&self) -> watch::Receiver<NetworkStatus>;

    /// Shorthand for `current().is_online()`.
    fn is_online(&self) -> bool {
        self.current().is_online()
    }
}
