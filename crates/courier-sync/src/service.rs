// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Caller-facing facade over the queue, sync engine and lifecycle coordinator.
//!
//! An [`OfflineService`] is an explicitly constructed instance. Several can
//! coexist in one process, each with its own store and shutdown token.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use courier_config::CourierConfig;
use courier_core::{
    AdapterType, AppState, Clock, CourierError, HealthStatus, KeyValueStore, MessageId,
    NetworkMonitor, NetworkStatus, QueuedMessage, RemoteSender,
};
use courier_resilience::{BackoffPolicy, BreakerSettings, BreakerSnapshot, CircuitBreaker};
use courier_storage::{
    Enqueued, MessageQueueStore, QueueEvent, QueueSettings, QuotaSettings, StorageQuotaManager,
    StorageStats,
};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::engine::{SyncEngine, SyncOutcome, SyncSettings};
use crate::lifecycle::{LifecycleCoordinator, LifecycleEvent, LifecycleSettings, MaintenanceReport};

/// Everything needed to assemble a service.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ServiceSettings {
    pub quota: QuotaSettings,
    pub queue: QueueSettings,
    pub sync: SyncSettings,
    pub breaker: BreakerSettings,
    pub lifecycle: LifecycleSettings,
}

impl ServiceSettings {
    pub fn from_config(config: &CourierConfig) -> Self {
        let storage = &config.storage;
        let sync = &config.sync;
        let cb = &config.circuit_breaker;
        let lifecycle = &config.lifecycle;

        Self {
            quota: QuotaSettings {
                limit_bytes: storage.quota_limit_bytes,
                min_free_bytes: storage.min_free_bytes,
                cache_ttl: storage.quota_cache_ttl(),
                high_priority_protection: storage.high_priority_protection(),
            },
            queue: QueueSettings {
                max_queue_size: config.queue.max_queue_size,
                max_retries: config.queue.max_retries,
                trim_to: config.queue.trim_to,
            },
            sync: SyncSettings {
                backoff: BackoffPolicy::new(
                    sync.inner_max_retries,
                    sync.initial_delay(),
                    sync.max_delay(),
                )
                .with_multiplier(sync.backoff_multiplier),
                send_timeout: sync.send_timeout(),
                followup_base_delay: sync.followup_base_delay(),
                followup_max_delay: sync.followup_max_delay(),
            },
            breaker: BreakerSettings {
                threshold: cb.threshold,
                call_timeout: cb.timeout(),
                reset_timeout: cb.reset_timeout(),
            },
            lifecycle: LifecycleSettings {
                purge_delay: lifecycle.purge_delay(),
                refresh_threshold: lifecycle.refresh_threshold(),
                reconnect_debounce: lifecycle.reconnect_debounce(),
                background_task_budget: lifecycle.background_task_budget(),
                cleanup_max_age: lifecycle.cleanup_max_age(),
                maintenance_interval: lifecycle.maintenance_interval(),
            },
        }
    }
}

/// Health of one collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterHealth {
    pub name: String,
    pub adapter_type: AdapterType,
    pub status: HealthStatus,
}

pub struct OfflineService {
    store: Arc<dyn KeyValueStore>,
    sender: Arc<dyn RemoteSender>,
    network: Arc<dyn NetworkMonitor>,
    quota: Arc<StorageQuotaManager>,
    queue: Arc<MessageQueueStore>,
    engine: Arc<SyncEngine>,
    lifecycle: Arc<LifecycleCoordinator>,
    shutdown: CancellationToken,
    run_handle: Mutex<Option<JoinHandle<()>>>,
}

impl OfflineService {
    /// Load persisted state and wire the components together.
    ///
    /// Must be called from within a Tokio runtime. Call [`start`](Self::start)
    /// to begin reacting to connectivity changes.
    pub async fn open(
        settings: ServiceSettings,
        store: Arc<dyn KeyValueStore>,
        sender: Arc<dyn RemoteSender>,
        network: Arc<dyn NetworkMonitor>,
        clock: Arc<dyn Clock>,
    ) -> Result<Arc<Self>, CourierError> {
        let shutdown = CancellationToken::new();
        let quota = Arc::new(StorageQuotaManager::new(
            store.clone(),
            clock.clone(),
            settings.quota,
        ));
        let queue =
            Arc::new(MessageQueueStore::open(quota.clone(), clock.clone(), settings.queue).await?);
        let breaker = Arc::new(CircuitBreaker::new(settings.breaker));
        let engine = SyncEngine::new(
            queue.clone(),
            sender.clone(),
            network.clone(),
            breaker,
            settings.sync,
            shutdown.clone(),
        );
        let lifecycle = LifecycleCoordinator::new(
            engine.clone(),
            quota.clone(),
            network.clone(),
            clock,
            settings.lifecycle,
            shutdown.clone(),
        );
        lifecycle.start_session().await?;

        info!(
            store = store.name(),
            sender = sender.name(),
            network = network.name(),
            queued = queue.len().await,
            "offline service opened"
        );

        Ok(Arc::new(Self {
            store,
            sender,
            network,
            quota,
            queue,
            engine,
            lifecycle,
            shutdown,
            run_handle: Mutex::new(None),
        }))
    }

    fn lock_run_handle(&self) -> std::sync::MutexGuard<'_, Option<JoinHandle<()>>> {
        self.run_handle.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Spawn the lifecycle loop. Calling it twice is a no-op.
    pub fn start(&self) {
        let mut handle = self.lock_run_handle();
        if handle.is_some() {
            debug!("offline service already started");
            return;
        }
        *handle = Some(tokio::spawn(self.lifecycle.clone().run()));
        if self.network.is_online() {
            self.engine.trigger();
        }
    }

    /// Stop timers, cancel the in-flight send and wait for the loop to exit.
    pub async fn shutdown(&self) {
        info!("offline service shutting down");
        self.shutdown.cancel();
        self.engine.cancel_in_flight();
        self.engine.cancel_followup();
        let handle = self.lock_run_handle().take();
        if let Some(handle) = handle
            && let Err(e) = handle.await
        {
            warn!(error = %e, "lifecycle loop ended abnormally");
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Queue a message and, when online, start draining right away.
    pub async fn enqueue_message(
        &self,
        content: &str,
        conversation_id: Option<String>,
        attachments: Vec<String>,
    ) -> Result<Enqueued, CourierError> {
        let enqueued = self.queue.enqueue(content, conversation_id, attachments).await?;
        if let Some(warning) = &enqueued.warning {
            warn!(%warning, "queue trimmed to fit storage");
        }
        self.trigger_if_online();
        Ok(enqueued)
    }

    pub async fn list_queued(&self) -> Vec<QueuedMessage> {
        self.queue.list().await
    }

    pub async fn remove_from_queue(&self, id: &MessageId) -> Result<QueuedMessage, CourierError> {
        self.queue.remove(id).await
    }

    /// Reset a failed message to `pending` with a fresh retry budget.
    pub async fn retry_message(&self, id: &MessageId) -> Result<QueuedMessage, CourierError> {
        let message = self.queue.retry(id).await?;
        self.trigger_if_online();
        Ok(message)
    }

    pub async fn clear_queue(&self) -> Result<usize, CourierError> {
        self.queue.clear().await
    }

    pub fn network_status(&self) -> NetworkStatus {
        self.network.current()
    }

    pub fn subscribe_to_network_status(&self) -> watch::Receiver<NetworkStatus> {
        self.network.subscribe()
    }

    pub fn subscribe_queue(&self) -> broadcast::Receiver<QueueEvent> {
        self.queue.subscribe()
    }

    pub fn subscribe_lifecycle(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.lifecycle.subscribe()
    }

    /// Manual trigger; waits for the cycle to finish.
    pub async fn sync_messages(&self) -> SyncOutcome {
        self.engine.sync().await
    }

    /// Manual trigger bounded by `budget`.
    pub async fn sync_messages_within(&self, budget: Duration) -> SyncOutcome {
        self.engine.sync_within(budget).await
    }

    pub fn cancel_in_flight(&self) -> bool {
        self.engine.cancel_in_flight()
    }

    pub async fn storage_stats(&self) -> Result<StorageStats, CourierError> {
        self.quota.get_stats().await
    }

    pub fn breaker_snapshot(&self) -> BreakerSnapshot {
        self.engine.breaker().snapshot()
    }

    pub async fn handle_app_state(&self, state: AppState) {
        self.lifecycle.handle_app_state(state).await;
    }

    pub async fn perform_background_tasks(&self) -> MaintenanceReport {
        self.lifecycle.perform_background_tasks().await
    }

    /// Health of the store, the sender and the network monitor.
    pub async fn health(&self) -> Vec<AdapterHealth> {
        let mut report = Vec::with_capacity(3);
        report.push(
            probe(self.store.name(), self.store.adapter_type(), self.store.health_check().await),
        );
        report.push(probe(
            self.sender.name(),
            self.sender.adapter_type(),
            self.sender.health_check().await,
        ));
        report.push(probe(
            self.network.name(),
            self.network.adapter_type(),
            self.network.health_check().await,
        ));
        report
    }

    fn trigger_if_online(&self) {
        if self.network.is_online() && !self.shutdown.is_cancelled() {
            self.engine.trigger();
        }
    }
}

fn probe(
    name: &str,
    adapter_type: AdapterType,
    result: Result<HealthStatus, CourierError>,
) -> AdapterHealth {
    AdapterHealth {
        name: name.to_string(),
        adapter_type,
        status: result.unwrap_or_else(|e| HealthStatus::Unhealthy(e.to_string())),
    }
}
