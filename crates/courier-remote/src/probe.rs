// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Connectivity by HTTP probing, for hosts without a platform network API.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use courier_core::{
    Adapter, AdapterType, ConnectionType, CourierError, HealthStatus, NetworkMonitor, NetworkStatus,
};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Periodically GETs a URL. Any HTTP response means reachable; a transport
/// failure or timeout means offline.
#[derive(Debug)]
pub struct ReachabilityProbe {
    client: reqwest::Client,
    url: String,
    interval: Duration,
    tx: watch::Sender<NetworkStatus>,
}

impl ReachabilityProbe {
    /// The status starts as not connected with unknown reachability until
    /// the first probe completes.
    pub fn new(
        url: impl Into<String>,
        interval: Duration,
        timeout: Duration,
    ) -> Result<Self, CourierError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CourierError::Config(format!("failed to build HTTP client: {e}")))?;
        let (tx, _) = watch::channel(NetworkStatus::default());
        Ok(Self {
            client,
            url: url.into(),
            interval,
            tx,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Probe once and publish the result.
    pub async fn probe_once(&self) -> NetworkStatus {
        let status = match self.client.get(&self.url).send().await {
            Ok(response) => {
                debug!(url = %self.url, status = response.status().as_u16(), "probe answered");
                NetworkStatus {
                    is_connected: true,
                    connection_type: ConnectionType::Unknown,
                    is_internet_reachable: Some(true),
                }
            }
            Err(e) => {
                debug!(url = %self.url, error = %e, "probe failed");
                NetworkStatus::offline()
            }
        };
        self.publish(status);
        status
    }

    fn publish(&self, status: NetworkStatus) {
        let changed = self.tx.send_if_modified(|current| {
            if *current == status {
                false
            } else {
                *current = status;
                true
            }
        });
        if changed {
            info!(url = %self.url, online = status.is_online(), "reachability changed");
        }
    }

    /// Probe every `interval` until `shutdown` is cancelled. The first probe
    /// runs immediately.
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    self.probe_once().await;
                }
            }
        }
        debug!("reachability probe stopped");
    }
}

#[async_trait]
impl Adapter for ReachabilityProbe {
    fn name(&self) -> &str {
        "http-probe"
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::NetworkMonitor
    }

    async fn health_check(&self) -> Result<HealthStatus, CourierError> {
        let status = self.current();
        Ok(match status.is_internet_reachable {
            Some(true) => HealthStatus::Healthy,
            Some(false) => HealthStatus::Degraded(format!("{} unreachable", self.url)),
            None => HealthStatus::Degraded("not probed yet".into()),
        })
    }
}

impl NetworkMonitor for ReachabilityProbe {
    fn current(&self) -> NetworkStatus {
        *self.tx.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<NetworkStatus> {
        self.tx.subscribe()
    }
}
