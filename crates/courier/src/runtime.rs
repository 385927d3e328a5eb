// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Builds an [`OfflineService`] from configuration.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use courier_config::CourierConfig;
use courier_config::model::StorageBackend;
use courier_core::{
    Adapter, AdapterType, CourierError, HealthStatus, KeyValueStore, NetworkMonitor, RemoteSender,
    SendReceipt, SendRequest, SystemClock,
};
use courier_remote::{HttpSender, ReachabilityProbe};
use courier_storage::{MemoryStore, SqliteStore};
use courier_sync::{OfflineService, ServiceSettings, WatchNetworkMonitor};
use tracing::{debug, info};

const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Stand-in sender when `remote.endpoint` is unset. The paired network
/// monitor stays offline, so the engine never calls it.
#[derive(Debug, Default)]
pub struct UnconfiguredSender;

#[async_trait]
impl Adapter for UnconfiguredSender {
    fn name(&self) -> &str {
        "unconfigured"
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::RemoteSender
    }

    async fn health_check(&self) -> Result<HealthStatus, CourierError> {
        Ok(HealthStatus::Unhealthy("remote.endpoint is not set".into()))
    }
}

#[async_trait]
impl RemoteSender for UnconfiguredSender {
    async fn send(&self, _request: &SendRequest) -> Result<SendReceipt, CourierError> {
        Err(CourierError::NetworkUnavailable)
    }
}

/// A wired service plus the probe feeding its network status, if any.
pub struct Runtime {
    pub service: Arc<OfflineService>,
    pub probe: Option<Arc<ReachabilityProbe>>,
}

pub async fn open_store(config: &CourierConfig) -> Result<Arc<dyn KeyValueStore>, CourierError> {
    match config.storage.backend {
        StorageBackend::Sqlite => {
            debug!(path = %config.storage.database_path, "opening sqlite store");
            Ok(Arc::new(SqliteStore::open(&config.storage.database_path).await?))
        }
        StorageBackend::Memory => Ok(Arc::new(MemoryStore::new())),
    }
}

pub fn build_sender(config: &CourierConfig) -> Result<Arc<dyn RemoteSender>, CourierError> {
    if config.remote.endpoint.is_none() {
        return Ok(Arc::new(UnconfiguredSender));
    }
    Ok(Arc::new(HttpSender::from_config(
        &config.remote,
        config.sync.send_timeout(),
    )?))
}

/// Probe the configured probe URL, falling back to the endpoint.
pub fn build_probe(config: &CourierConfig) -> Result<Option<Arc<ReachabilityProbe>>, CourierError> {
    let Some(url) = config
        .remote
        .probe_url
        .as_deref()
        .or(config.remote.endpoint.as_deref())
    else {
        return Ok(None);
    };
    let probe = ReachabilityProbe::new(url, config.remote.probe_interval(), PROBE_TIMEOUT)?;
    Ok(Some(Arc::new(probe)))
}

/// Open storage, probe reachability once, and assemble the service.
pub async fn open(config: &CourierConfig) -> Result<Runtime, CourierError> {
    let store = open_store(config).await?;
    let sender = build_sender(config)?;
    let probe = build_probe(config)?;

    let network: Arc<dyn NetworkMonitor> = match &probe {
        Some(probe) => {
            let status = probe.probe_once().await;
            info!(url = probe.url(), online = status.is_online(), "initial reachability");
            probe.clone()
        }
        None => Arc::new(WatchNetworkMonitor::offline()),
    };

    let service = OfflineService::open(
        ServiceSettings::from_config(config),
        store,
        sender,
        network,
        Arc::new(SystemClock),
    )
    .await?;

    Ok(Runtime { service, probe })
}
