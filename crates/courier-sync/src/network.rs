// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Network monitor fed by the host platform.

use async_trait::async_trait;
use courier_core::{Adapter, AdapterType, ConnectionType, NetworkMonitor, NetworkStatus};
use tokio::sync::watch;
use tracing::debug;

/// [`NetworkMonitor`] whose status is pushed in by the embedding application
/// (or a test) and fanned out through a `watch` channel.
#[derive(Debug)]
pub struct WatchNetworkMonitor {
    tx: watch::Sender<NetworkStatus>,
}

impl WatchNetworkMonitor {
    pub fn new(initial: NetworkStatus) -> Self {
        let (tx, _) = watch::channel(initial);
        Self { tx }
    }

    pub fn online() -> Self {
        Self::new(NetworkStatus::online(ConnectionType::Wifi))
    }

    pub fn offline() -> Self {
        Self::new(NetworkStatus::offline())
    }

    /// Publish a new status. Subscribers are only woken on an actual change.
    pub fn set(&self, status: NetworkStatus) {
        let changed = self.tx.send_if_modified(|current| {
            if *current == status {
                false
            } else {
                *current = status;
                true
            }
        });
        if changed {
            debug!(
                connected = status.is_connected,
                connection_type = %status.connection_type,
                reachable = ?status.is_internet_reachable,
                "network status changed"
            );
        }
    }

    pub fn set_online(&self, connection_type: ConnectionType) {
        self.set(NetworkStatus::online(connection_type));
    }

    pub fn set_offline(&self) {
        self.set(NetworkStatus::offline());
    }
}

#[async_trait]
impl Adapter for WatchNetworkMonitor {
    fn name(&self) -> &str {
        "watch"
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::NetworkMonitor
    }
}

impl NetworkMonitor for WatchNetworkMonitor {
    fn current(&self) -> NetworkStatus {
        *self.tx.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<NetworkStatus> {
        self.tx.subscribe()
    }
}
