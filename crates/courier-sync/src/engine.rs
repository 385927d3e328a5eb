// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Queue drain cycles against the remote send endpoint.
//!
//! A cycle claims every `pending` message in enqueue order and sends them
//! one at a time. Each send goes through the circuit breaker, a per-call
//! timeout, and a short inner backoff loop. Outcomes:
//!
//! | Result                              | Message                          |
//! |-------------------------------------|----------------------------------|
//! | success                             | removed (batched at cycle end)   |
//! | `RemoteRejected` (4xx)              | `failed`, retry count unchanged  |
//! | `Cancelled`, `CircuitOpen`          | `pending`, retry count unchanged |
//! | anything else                       | retry count + 1, `failed` at max |
//!
//! Only one cycle runs at a time. A trigger that arrives while a cycle is
//! running is dropped; leftover work is picked up by a single follow-up
//! cycle scheduled with exponential delay.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use courier_core::{
    CourierError, MessageId, MessageStatus, NetworkMonitor, QueuedMessage, RemoteSender,
    SendReceipt,
};
use courier_resilience::{BackoffPolicy, CircuitBreaker, RetryAttempt, retry_with};
use courier_storage::MessageQueueStore;
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Sync tuning.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncSettings {
    /// Inner per-send backoff, independent of the message retry budget.
    pub backoff: BackoffPolicy,
    pub send_timeout: Duration,
    pub followup_base_delay: Duration,
    pub followup_max_delay: Duration,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            backoff: BackoffPolicy::new(2, Duration::from_secs(1), Duration::from_secs(10)),
            send_timeout: Duration::from_secs(30),
            followup_base_delay: Duration::from_secs(1),
            followup_max_delay: Duration::from_secs(60),
        }
    }
}

/// Why a cycle did not run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    InProgress,
    Offline,
    NothingPending,
    ShuttingDown,
}

/// Tally of one completed cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub attempted: usize,
    pub delivered: usize,
    /// Back to `pending` with one more retry consumed.
    pub retrying: usize,
    /// Moved to `failed` (rejected or out of retries).
    pub failed: usize,
    /// Back to `pending` without consuming a retry (cancelled, circuit open, budget).
    pub deferred: usize,
    /// The cycle stopped before visiting every pending message.
    pub interrupted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    Skipped(SkipReason),
    Completed(SyncReport),
}

impl SyncOutcome {
    pub fn report(&self) -> Option<&SyncReport> {
        match self {
            Self::Completed(report) => Some(report),
            Self::Skipped(_) => None,
        }
    }

    pub fn delivered(&self) -> usize {
        self.report().map_or(0, |r| r.delivered)
    }
}

/// How a failed send affects the message.
enum Disposition {
    Reject,
    Defer,
    Retry,
}

fn disposition(err: &CourierError) -> Disposition {
    match err {
        CourierError::RemoteRejected { .. } => Disposition::Reject,
        CourierError::Cancelled | CourierError::CircuitOpen { .. } => Disposition::Defer,
        _ => Disposition::Retry,
    }
}

/// Releases the single-flight flag on every exit path.
struct CycleGuard<'a>(&'a AtomicBool);

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct SyncEngine {
    queue: Arc<MessageQueueStore>,
    sender: Arc<dyn RemoteSender>,
    network: Arc<dyn NetworkMonitor>,
    breaker: Arc<CircuitBreaker>,
    settings: SyncSettings,
    in_progress: AtomicBool,
    in_flight: Mutex<Option<CancellationToken>>,
    followup: watch::Sender<Option<Instant>>,
    shutdown: CancellationToken,
}

impl SyncEngine {
    /// Build the engine and spawn its follow-up worker.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(
        queue: Arc<MessageQueueStore>,
        sender: Arc<dyn RemoteSender>,
        network: Arc<dyn NetworkMonitor>,
        breaker: Arc<CircuitBreaker>,
        settings: SyncSettings,
        shutdown: CancellationToken,
    ) -> Arc<Self> {
        let (followup, _) = watch::channel(None);
        let engine = Arc::new(Self {
            queue,
            sender,
            network,
            breaker,
            settings,
            in_progress: AtomicBool::new(false),
            in_flight: Mutex::new(None),
            followup,
            shutdown,
        });
        engine.spawn_followup_worker();
        engine
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    pub fn is_syncing(&self) -> bool {
        self.in_progress.load(Ordering::Acquire)
    }

    /// When the next follow-up cycle is due, if one is scheduled.
    pub fn followup_due(&self) -> Option<Instant> {
        *self.followup.borrow()
    }

    /// Start a cycle in the background without waiting for it.
    pub fn trigger(self: &Arc<Self>) {
        let engine = Arc::clone(self);
        tokio::spawn(async move {
            engine.sync().await;
        });
    }

    /// Run one drain cycle now.
    pub async fn sync(&self) -> SyncOutcome {
        self.run_cycle(None).await
    }

    /// Run one drain cycle that stops after `budget`. A send still in flight
    /// when the budget runs out is cancelled and its message returns to
    /// `pending` without consuming a retry.
    pub async fn sync_within(&self, budget: Duration) -> SyncOutcome {
        self.run_cycle(Some(Instant::now() + budget)).await
    }

    /// Cancel the send currently in flight, if any.
    pub fn cancel_in_flight(&self) -> bool {
        match self.lock_in_flight().as_ref() {
            Some(token) => {
                info!("cancelling in-flight send");
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Drop any scheduled follow-up cycle.
    pub fn cancel_followup(&self) {
        self.followup.send_replace(None);
    }

    fn lock_in_flight(&self) -> std::sync::MutexGuard<'_, Option<CancellationToken>> {
        self.in_flight.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn try_begin(&self) -> Option<CycleGuard<'_>> {
        self.in_progress
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| CycleGuard(&self.in_progress))
    }

    async fn run_cycle(&self, deadline: Option<Instant>) -> SyncOutcome {
        let Some(_guard) = self.try_begin() else {
            debug!("sync already running, skipping trigger");
            return SyncOutcome::Skipped(SkipReason::InProgress);
        };
        if self.shutdown.is_cancelled() {
            return SyncOutcome::Skipped(SkipReason::ShuttingDown);
        }
        if !self.network.is_online() {
            debug!("offline, deferring sync");
            return SyncOutcome::Skipped(SkipReason::Offline);
        }
        let pending = self.queue.pending_ids().await;
        if pending.is_empty() {
            return SyncOutcome::Skipped(SkipReason::NothingPending);
        }

        // This cycle supersedes any scheduled follow-up.
        self.followup.send_replace(None);
        info!(pending = pending.len(), "sync cycle started");

        let mut report = SyncReport::default();
        let mut delivered = Vec::new();
        let mut circuit_wait = None;

        for id in &pending {
            if self.shutdown.is_cancelled() || deadline.is_some_and(|d| Instant::now() >= d) {
                report.interrupted = true;
                break;
            }

            let message = match self.queue.mark_sending(id).await {
                Ok(Some(message)) => message,
                Ok(None) => continue,
                Err(e) => {
                    error!(message_id = %id, error = %e, "failed to claim message, leaving it pending");
                    continue;
                }
            };
            report.attempted += 1;

            match self.send_one(&message, deadline).await {
                Ok(receipt) => {
                    debug!(message_id = %id, status = receipt.status, "message delivered");
                    delivered.push(id.clone());
                }
                Err(err) => {
                    if let CourierError::CircuitOpen { retry_after, .. } = &err {
                        circuit_wait = Some(*retry_after);
                    }
                    let stop = self.settle_failure(id, &err, &mut report).await;
                    if stop {
                        report.interrupted = true;
                        break;
                    }
                }
            }
        }

        if !delivered.is_empty() {
            match self.queue.remove_delivered(&delivered).await {
                Ok(removed) => report.delivered = removed,
                Err(e) => error!(error = %e, count = delivered.len(), "failed to remove delivered messages"),
            }
        }
        // Anything still `sending` belongs to this cycle and must not stay claimed.
        if let Err(e) = self.queue.requeue_in_flight().await {
            error!(error = %e, "failed to release in-flight messages");
        }

        info!(
            attempted = report.attempted,
            delivered = report.delivered,
            retrying = report.retrying,
            failed = report.failed,
            deferred = report.deferred,
            interrupted = report.interrupted,
            "sync cycle finished"
        );

        self.schedule_followup(circuit_wait).await;
        SyncOutcome::Completed(report)
    }

    /// Apply the failure to the message. Returns `true` when the cycle should stop.
    async fn settle_failure(
        &self,
        id: &MessageId,
        err: &CourierError,
        report: &mut SyncReport,
    ) -> bool {
        let reason = err.to_string();
        match disposition(err) {
            Disposition::Reject => {
                report.failed += 1;
                if let Err(e) = self.queue.mark_failed(id, &reason).await {
                    error!(message_id = %id, error = %e, "failed to persist rejection");
                }
                false
            }
            Disposition::Defer => {
                report.deferred += 1;
                debug!(message_id = %id, reason, "send deferred");
                if let Err(e) = self.queue.requeue(id).await {
                    error!(message_id = %id, error = %e, "failed to requeue message");
                }
                // Cancellation of one send only skips that message, unless the
                // whole cycle is being torn down.
                matches!(err, CourierError::CircuitOpen { .. }) || self.shutdown.is_cancelled()
            }
            Disposition::Retry => {
                match self.queue.record_failure(id, &reason).await {
                    Ok(Some(msg)) if msg.status == MessageStatus::Failed => report.failed += 1,
                    Ok(_) => report.retrying += 1,
                    Err(e) => {
                        report.retrying += 1;
                        error!(message_id = %id, error = %e, "failed to persist send failure");
                    }
                }
                false
            }
        }
    }

    /// Send one message through the breaker, the timeout and inner backoff,
    /// racing the in-flight cancellation token and the cycle deadline.
    async fn send_one(
        &self,
        message: &QueuedMessage,
        deadline: Option<Instant>,
    ) -> Result<SendReceipt, CourierError> {
        let token = self.shutdown.child_token();
        *self.lock_in_flight() = Some(token.clone());

        let request = message.to_request();
        let send_timeout = self.settings.send_timeout;
        let attempts = retry_with(
            &self.settings.backoff,
            |attempt| {
                let request = &request;
                async move {
                    debug!(message_id = %request.message_id, attempt, "sending message");
                    self.breaker
                        .call(|| async {
                            match tokio::time::timeout(send_timeout, self.sender.send(request)).await
                            {
                                Ok(result) => result,
                                Err(_) => Err(CourierError::Timeout {
                                    duration: send_timeout,
                                }),
                            }
                        })
                        .await
                }
            },
            |err: &CourierError, _| err.is_retryable(),
            |retry: &RetryAttempt<'_>| {
                warn!(
                    message_id = %message.id,
                    attempt = retry.attempt,
                    delay_ms = retry.delay.as_millis() as u64,
                    error = %retry.error,
                    "send failed, backing off"
                );
            },
        );

        let result = tokio::select! {
            biased;
            _ = token.cancelled() => Err(CourierError::Cancelled),
            _ = sleep_until_opt(deadline) => {
                warn!(message_id = %message.id, "sync budget exhausted mid-send");
                Err(CourierError::Cancelled)
            }
            result = attempts => result,
        };

        *self.lock_in_flight() = None;
        result
    }

    /// Schedule exactly one follow-up if pending work remains and we are online.
    async fn schedule_followup(&self, circuit_wait: Option<Duration>) {
        if self.shutdown.is_cancelled() || !self.network.is_online() {
            return;
        }
        let queue = self.queue.list().await;
        let mut pending = queue.iter().filter(|m| m.status == MessageStatus::Pending);
        let Some(first) = pending
            .clone()
            .find(|m| m.error.is_some())
            .or_else(|| pending.next())
        else {
            return;
        };

        let mut delay = followup_delay(
            self.settings.followup_base_delay,
            self.settings.followup_max_delay,
            first.retry_count,
        );
        if let Some(wait) = circuit_wait {
            delay = delay.max(wait);
        }
        info!(delay_ms = delay.as_millis() as u64, "follow-up sync scheduled");
        self.followup.send_replace(Some(Instant::now() + delay));
    }

    fn spawn_followup_worker(self: &Arc<Self>) {
        let weak: Weak<Self> = Arc::downgrade(self);
        let mut rx = self.followup.subscribe();
        let shutdown = self.shutdown.clone();

        tokio::spawn(async move {
            loop {
                let due = *rx.borrow_and_update();
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    changed = rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                    _ = sleep_until_opt(due) => {
                        let Some(engine) = weak.upgrade() else { break };
                        engine.followup.send_replace(None);
                        debug!("running follow-up sync");
                        engine.sync().await;
                    }
                }
            }
            debug!("follow-up worker stopped");
        });
    }
}

/// `min(base * 2^retry_count, max)`.
pub fn followup_delay(base: Duration, max: Duration, retry_count: u32) -> Duration {
    let factor = 2u32.checked_pow(retry_count).unwrap_or(u32::MAX);
    base.checked_mul(factor).map_or(max, |d| d.min(max))
}

/// Sleeps until `deadline`, or forever when there is none.
pub(crate) fn sleep_until_opt(deadline: Option<Instant>) -> impl Future<Output = ()> {
    async move {
        match deadline {
            Some(at) => tokio::time::sleep_until(at).await,
            None => std::future::pending().await,
        }
    }
}
