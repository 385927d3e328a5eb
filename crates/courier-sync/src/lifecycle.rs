// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Foreground/background and connectivity driven scheduling.
//!
//! - Entering background persists the last-active time, flushes the queue
//!   once, and arms a deferred purge of non-essential stored data.
//! - Returning to the foreground cancels the purge, asks for a broader
//!   refresh when the app was away longer than the refresh threshold, and
//!   always triggers a sync.
//! - An offline to online transition triggers a sync after a short debounce.
//! - Periodic maintenance runs a time-bounded sync plus old-item cleanup.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use courier_core::{AppState, Clock, CourierError, NetworkMonitor, NetworkStatus, Priority};
use courier_storage::StorageQuotaManager;
use courier_storage::keys::{LIFECYCLE_KEY, NETWORK_STATUS_KEY, is_essential};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::engine::{SyncEngine, SyncOutcome, sleep_until_opt};

const EVENT_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleSettings {
    pub purge_delay: Duration,
    pub refresh_threshold: Duration,
    pub reconnect_debounce: Duration,
    pub background_task_budget: Duration,
    pub cleanup_max_age: Duration,
    /// `None` disables periodic maintenance.
    pub maintenance_interval: Option<Duration>,
}

impl Default for LifecycleSettings {
    fn default() -> Self {
        Self {
            purge_delay: Duration::from_secs(5 * 60),
            refresh_threshold: Duration::from_secs(30 * 60),
            reconnect_debounce: Duration::from_secs(2),
            background_task_budget: Duration::from_secs(30),
            cleanup_max_age: Duration::from_secs(7 * 24 * 60 * 60),
            maintenance_interval: Some(Duration::from_secs(15 * 60)),
        }
    }
}

/// Persisted lifecycle bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LifecycleSession {
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub last_active_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub foreground_count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaintenanceReport {
    pub sync: SyncOutcome,
    pub cleaned: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    Backgrounded,
    Foregrounded { away: Duration },
    /// Away longer than the refresh threshold; hosts should reload remote data.
    RefreshRequested { away: Duration },
    SensitiveDataPurged { removed: usize },
    Reconnected,
    MaintenanceCompleted(MaintenanceReport),
}

#[derive(Debug)]
struct AppTracking {
    state: AppState,
    backgrounded: bool,
}

pub struct LifecycleCoordinator {
    engine: Arc<SyncEngine>,
    quota: Arc<StorageQuotaManager>,
    network: Arc<dyn NetworkMonitor>,
    clock: Arc<dyn Clock>,
    settings: LifecycleSettings,
    app: Mutex<AppTracking>,
    session: tokio::sync::Mutex<Option<LifecycleSession>>,
    purge_timer: Mutex<Option<CancellationToken>>,
    events: broadcast::Sender<LifecycleEvent>,
    shutdown: CancellationToken,
}

impl LifecycleCoordinator {
    pub fn new(
        engine: Arc<SyncEngine>,
        quota: Arc<StorageQuotaManager>,
        network: Arc<dyn NetworkMonitor>,
        clock: Arc<dyn Clock>,
        settings: LifecycleSettings,
        shutdown: CancellationToken,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Arc::new(Self {
            engine,
            quota,
            network,
            clock,
            settings,
            app: Mutex::new(AppTracking {
                state: AppState::Active,
                backgrounded: false,
            }),
            session: tokio::sync::Mutex::new(None),
            purge_timer: Mutex::new(None),
            events,
            shutdown,
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.events.subscribe()
    }

    pub fn app_state(&self) -> AppState {
        self.lock_app().state
    }

    pub fn purge_pending(&self) -> bool {
        self.lock_purge().is_some()
    }

    fn lock_app(&self) -> std::sync::MutexGuard<'_, AppTracking> {
        self.app.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn lock_purge(&self) -> std::sync::MutexGuard<'_, Option<CancellationToken>> {
        self.purge_timer.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn emit(&self, event: LifecycleEvent) {
        let _ = self.events.send(event);
    }

    /// Begin a session: `started_at` is reset, the previous last-active time
    /// and foreground count carry over.
    pub async fn start_session(&self) -> Result<LifecycleSession, CourierError> {
        let previous = self.load_session().await;
        let session = LifecycleSession {
            started_at: self.clock.now(),
            last_active_at: previous.as_ref().and_then(|s| s.last_active_at),
            foreground_count: previous.map_or(0, |s| s.foreground_count),
        };
        self.save_session(&session).await?;
        *self.session.lock().await = Some(session.clone());
        Ok(session)
    }

    pub async fn session(&self) -> Option<LifecycleSession> {
        self.session.lock().await.clone()
    }

    /// Feed a host app-state change.
    pub async fn handle_app_state(self: &Arc<Self>, next: AppState) {
        let transition = {
            let mut app = self.lock_app();
            let previous = std::mem::replace(&mut app.state, next);
            if previous == next {
                None
            } else if next == AppState::Background && !app.backgrounded {
                app.backgrounded = true;
                Some(AppState::Background)
            } else if next == AppState::Active && app.backgrounded {
                app.backgrounded = false;
                Some(AppState::Active)
            } else {
                None
            }
        };

        match transition {
            Some(AppState::Background) => self.on_background().await,
            Some(AppState::Active) => self.on_foreground().await,
            _ => debug!(state = %next, "app state change ignored"),
        }
    }

    async fn on_background(self: &Arc<Self>) {
        info!("app moved to background");
        let now = self.clock.now();
        if let Err(e) = self.update_session(|s| s.last_active_at = Some(now)).await {
            warn!(error = %e, "failed to persist last-active time");
        }
        self.engine.trigger();
        self.arm_purge_timer();
        self.emit(LifecycleEvent::Backgrounded);
    }

    async fn on_foreground(self: &Arc<Self>) {
        self.cancel_purge_timer();

        let now = self.clock.now();
        let last_active = self.session().await.and_then(|s| s.last_active_at);
        let away = last_active
            .and_then(|at| (now - at).to_std().ok())
            .unwrap_or(Duration::ZERO);
        if let Err(e) = self.update_session(|s| s.foreground_count += 1).await {
            warn!(error = %e, "failed to persist foreground count");
        }

        info!(away_secs = away.as_secs(), "app returned to foreground");
        if away > self.settings.refresh_threshold {
            info!("away past refresh threshold, requesting refresh");
            self.emit(LifecycleEvent::RefreshRequested { away });
        }
        self.emit(LifecycleEvent::Foregrounded { away });
        self.engine.trigger();
    }

    fn arm_purge_timer(self: &Arc<Self>) {
        let token = self.shutdown.child_token();
        if let Some(previous) = self.lock_purge().replace(token.clone()) {
            previous.cancel();
        }

        let coordinator = Arc::clone(self);
        let delay = self.settings.purge_delay;
        debug!(delay_secs = delay.as_secs(), "sensitive-data purge armed");
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {
                    debug!("sensitive-data purge cancelled");
                }
                _ = tokio::time::sleep(delay) => {
                    coordinator.lock_purge().take();
                    if let Err(e) = coordinator.purge_sensitive_data().await {
                        error!(error = %e, "sensitive-data purge failed");
                    }
                }
            }
        });
    }

    fn cancel_purge_timer(&self) {
        if let Some(token) = self.lock_purge().take() {
            token.cancel();
        }
    }

    /// Remove every stored key except the queue, lifecycle, network status
    /// and session keys. Returns how many keys were removed.
    pub async fn purge_sensitive_data(&self) -> Result<usize, CourierError> {
        let doomed: Vec<String> = self
            .quota
            .data_keys()
            .await?
            .into_iter()
            .filter(|key| !is_essential(key))
            .collect();
        self.quota.remove_keys(&doomed).await?;
        info!(removed = doomed.len(), "purged sensitive data");
        self.emit(LifecycleEvent::SensitiveDataPurged {
            removed: doomed.len(),
        });
        Ok(doomed.len())
    }

    /// One time-bounded sync plus old-item cleanup.
    pub async fn perform_background_tasks(&self) -> MaintenanceReport {
        let sync = self
            .engine
            .sync_within(self.settings.background_task_budget)
            .await;
        let cleaned = match self.quota.cleanup_old_items(self.settings.cleanup_max_age).await {
            Ok(count) => count,
            Err(e) => {
                error!(error = %e, "storage cleanup failed");
                0
            }
        };
        let report = MaintenanceReport { sync, cleaned };
        debug!(?report, "background tasks completed");
        self.emit(LifecycleEvent::MaintenanceCompleted(report.clone()));
        report
    }

    /// Watch connectivity and run periodic maintenance until shutdown.
    pub async fn run(self: Arc<Self>) {
        let mut rx = self.network.subscribe();
        let initial = *rx.borrow_and_update();
        let mut was_online = initial.is_online();
        self.record_network_status(initial).await;

        let mut reconnect_at: Option<Instant> = None;
        let mut maintenance = self.settings.maintenance_interval.map(|period| {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            interval
        });

        info!(online = was_online, "lifecycle coordinator running");
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                changed = rx.changed() => {
                    if changed.is_err() {
                        warn!("network monitor dropped, lifecycle loop exiting");
                        break;
                    }
                    let status = *rx.borrow_and_update();
                    self.record_network_status(status).await;
                    let online = status.is_online();
                    if online && !was_online {
                        debug!(debounce_ms = self.settings.reconnect_debounce.as_millis() as u64, "network back, debouncing");
                        reconnect_at = Some(Instant::now() + self.settings.reconnect_debounce);
                    } else if !online {
                        reconnect_at = None;
                    }
                    was_online = online;
                }
                _ = sleep_until_opt(reconnect_at) => {
                    reconnect_at = None;
                    info!("network reconnected, triggering sync");
                    self.emit(LifecycleEvent::Reconnected);
                    self.engine.trigger();
                }
                _ = async {
                    match maintenance.as_mut() {
                        Some(interval) => { interval.tick().await; }
                        None => std::future::pending::<()>().await,
                    }
                } => {
                    self.perform_background_tasks().await;
                }
            }
        }

        self.cancel_purge_timer();
        info!("lifecycle coordinator stopped");
    }

    async fn record_network_status(&self, status: NetworkStatus) {
        let raw = match serde_json::to_string(&status) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, "failed to encode network status");
                return;
            }
        };
        if let Err(e) = self.quota.set_item(NETWORK_STATUS_KEY, &raw, Priority::Low).await {
            warn!(error = %e, "failed to persist network status");
        }
    }

    async fn load_session(&self) -> Option<LifecycleSession> {
        match self.quota.get_item(LIFECYCLE_KEY).await {
            Ok(Some(raw)) => serde_json::from_str(&raw)
                .inspect_err(|e| warn!(error = %e, "unreadable lifecycle session"))
                .ok(),
            Ok(None) => None,
            Err(e) => {
                warn!(error = %e, "failed to read lifecycle session");
                None
            }
        }
    }

    async fn save_session(&self, session: &LifecycleSession) -> Result<(), CourierError> {
        let raw = serde_json::to_string(session)?;
        self.quota.set_item(LIFECYCLE_KEY, &raw, Priority::High).await
    }

    async fn update_session<F>(&self, f: F) -> Result<(), CourierError>
    where
        F: FnOnce(&mut LifecycleSession),
    {
        let mut guard = self.session.lock().await;
        let session = guard.get_or_insert_with(|| LifecycleSession {
            started_at: self.clock.now(),
            last_active_at: None,
            foreground_count: 0,
        });
        f(session);
        let snapshot = session.clone();
        drop(guard);
        self.save_session(&snapshot).await
    }
}
