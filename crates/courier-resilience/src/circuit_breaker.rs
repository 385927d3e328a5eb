// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Circuit breaker guarding calls to the remote endpoint.
//!
//! ```text
//! Closed --(threshold consecutive failures)--> Open
//! Open   --(reset_timeout elapsed, next call)--> HalfOpen
//! HalfOpen --(probe succeeds)--> Closed
//! HalfOpen --(probe fails)-----> Open
//! ```
//!
//! Only failures that indicate the backend is unhealthy are counted
//! (transport errors, 5xx, 408/429, call timeouts). A 4xx rejection proves
//! the backend is answering and counts as a success. Cancellation is neutral.

use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

use courier_core::CourierError;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => f.write_str("closed"),
            Self::Open => f.write_str("open"),
            Self::HalfOpen => f.write_str("half_open"),
        }
    }
}

/// Breaker tuning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakerSettings {
    /// Consecutive failures that open the circuit.
    pub threshold: u32,
    /// Upper bound on a single guarded call; overruns count as failures.
    pub call_timeout: Duration,
    /// Time spent open before a half-open probe is allowed.
    pub reset_timeout: Duration,
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self {
            threshold: 5,
            call_timeout: Duration::from_secs(60),
            reset_timeout: Duration::from_secs(30),
        }
    }
}

/// Point-in-time view of the breaker, for stats and status output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakerSnapshot {
    pub state: CircuitState,
    pub failures: u32,
    pub since_last_failure: Option<Duration>,
}

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    failures: u32,
    last_failure: Option<Instant>,
    probe_in_flight: bool,
}

/// Consecutive-failure circuit breaker.
#[derive(Debug)]
pub struct CircuitBreaker {
    settings: BreakerSettings,
    inner: Mutex<Inner>,
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(BreakerSettings::default())
    }
}

impl CircuitBreaker {
    pub fn new(settings: BreakerSettings) -> Self {
        Self {
            settings,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                failures: 0,
                last_failure: None,
                probe_in_flight: false,
            }),
        }
    }

    pub fn settings(&self) -> &BreakerSettings {
        &self.settings
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    pub fn failures(&self) -> u32 {
        self.lock().failures
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        let inner = self.lock();
        BreakerSnapshot {
            state: inner.state,
            failures: inner.failures,
            since_last_failure: inner.last_failure.map(|at| at.elapsed()),
        }
    }

    /// Admission check. Moves Open to HalfOpen once `reset_timeout` has
    /// elapsed since the last failure; only one half-open probe runs at a time.
    pub fn try_acquire(&self) -> Result<(), CourierError> {
        self.acquire().map(|_| ())
    }

    /// Like [`try_acquire`](Self::try_acquire), returning whether the caller
    /// now holds the half-open probe slot.
    fn acquire(&self) -> Result<bool, CourierError> {
        let mut inner = self.lock();
        match inner.state {
            CircuitState::Closed => Ok(false),
            CircuitState::Open => {
                let elapsed = inner
                    .last_failure
                    .map(|at| at.elapsed())
                    .unwrap_or(self.settings.reset_timeout);
                if elapsed >= self.settings.reset_timeout {
                    info!(failures = inner.failures, "circuit half-open, probing remote");
                    inner.state = CircuitState::HalfOpen;
                    inner.probe_in_flight = true;
                    Ok(true)
                } else {
                    Err(CourierError::CircuitOpen {
                        failures: inner.failures,
                        retry_after: self.settings.reset_timeout - elapsed,
                    })
                }
            }
            CircuitState::HalfOpen if inner.probe_in_flight => Err(CourierError::CircuitOpen {
                failures: inner.failures,
                retry_after: Duration::ZERO,
            }),
            CircuitState::HalfOpen => {
                inner.probe_in_flight = true;
                Ok(true)
            }
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.lock();
        if inner.state != CircuitState::Closed {
            info!(previous = %inner.state, "circuit closed");
        }
        inner.state = CircuitState::Closed;
        inner.failures = 0;
        inner.probe_in_flight = false;
    }

    pub fn record_failure(&self) {
        let mut inner = self.lock();
        inner.failures = inner.failures.saturating_add(1);
        inner.last_failure = Some(Instant::now());
        inner.probe_in_flight = false;

        let reopen = inner.state == CircuitState::HalfOpen;
        if reopen || (inner.state == CircuitState::Closed && inner.failures >= self.settings.threshold)
        {
            warn!(
                failures = inner.failures,
                reset_timeout_secs = self.settings.reset_timeout.as_secs(),
                "circuit opened"
            );
            inner.state = CircuitState::Open;
        }
    }

    /// Releases a half-open probe slot without judging the backend.
    fn record_neutral(&self) {
        self.lock().probe_in_flight = false;
    }

    /// Run `operation` through the breaker, bounded by `call_timeout`.
    pub async fn call<T, F, Fut>(&self, operation: F) -> Result<T, CourierError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, CourierError>>,
    {
        let holds_probe = self.acquire()?;
        let mut slot = ProbeSlot {
            breaker: self,
            held: holds_probe,
        };

        let outcome = match tokio::time::timeout(self.settings.call_timeout, operation()).await {
            Ok(result) => result,
            Err(_) => Err(CourierError::Timeout {
                duration: self.settings.call_timeout,
            }),
        };

        slot.held = false;
        match &outcome {
            Ok(_) => self.record_success(),
            Err(err) if counts_against_remote(err) => self.record_failure(),
            Err(CourierError::RemoteRejected { .. }) => self.record_success(),
            Err(_) => self.record_neutral(),
        }
        outcome
    }
}

/// Frees the half-open slot if `call` is dropped before an outcome is
/// recorded.
struct ProbeSlot<'a> {
    breaker: &'a CircuitBreaker,
    held: bool,
}

impl Drop for ProbeSlot<'_> {
    fn drop(&mut self) {
        if self.held {
            debug!("half-open probe abandoned");
            self.breaker.record_neutral();
        }
    }
}

fn counts_against_remote(err: &CourierError) -> bool {
    matches!(
        err,
        CourierError::RemoteUnavailable { .. }
            | CourierError::Timeout { .. }
            | CourierError::NetworkUnavailable
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(threshold: u32) -> CircuitBreaker {
        CircuitBreaker::new(BreakerSettings {
            threshold,
            call_timeout: Duration::from_secs(5),
            reset_timeout: Duration::from_secs(30),
        })
    }

    async fn fail(cb: &CircuitBreaker) -> Result<(), CourierError> {
        cb.call(|| async { Err(CourierError::from_status(503, "down")) })
            .await
    }

    async fn succeed(cb: &CircuitBreaker) -> Result<(), CourierError> {
        cb.call(|| async { Ok(()) }).await
    }

    #[tokio::test(start_paused = true)]
    async fn opens_after_threshold_consecutive_failures() {
        let cb = breaker(3);
        for _ in 0..2 {
            let _ = fail(&cb).await;
        }
        assert_eq!(cb.state(), CircuitState::Closed);
        let _ = fail(&cb).await;
        assert_eq!(cb.state(), CircuitState::Open);
        assert_eq!(cb.failures(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn open_circuit_fails_fast_without_calling() {
        let cb = breaker(1);
        let _ = fail(&cb).await;

        let mut invoked = false;
        let result: Result<(), _> = cb
            .call(|| {
                invoked = true;
                async { Ok(()) }
            })
            .await;

        assert!(!invoked);
        match result {
            Err(CourierError::CircuitOpen { retry_after, .. }) => {
                assert!(retry_after <= Duration::from_secs(30));
            }
            other => panic!("expected CircuitOpen, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn half_open_probe_success_closes() {
        let cb = breaker(2);
        let _ = fail(&cb).await;
        let _ = fail(&cb).await;
        assert_eq!(cb.state(), CircuitState::Open);

        tokio::time::advance(Duration::from_secs(30)).await;
        succeed(&cb).await.unwrap();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.failures(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn half_open_probe_failure_reopens() {
        let cb = breaker(2);
        let _ = fail(&cb).await;
        let _ = fail(&cb).await;

        tokio::time::advance(Duration::from_secs(31)).await;
        let _ = fail(&cb).await;
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(matches!(
            succeed(&cb).await,
            Err(CourierError::CircuitOpen { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn success_resets_consecutive_count() {
        let cb = breaker(3);
        let _ = fail(&cb).await;
        let _ = fail(&cb).await;
        succeed(&cb).await.unwrap();
        let _ = fail(&cb).await;
        let _ = fail(&cb).await;
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn client_rejection_does_not_trip() {
        let cb = breaker(1);
        let result: Result<(), _> = cb
            .call(|| async { Err(CourierError::from_status(404, "gone")) })
            .await;
        assert!(result.is_err());
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.failures(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_call_times_out_and_counts() {
        let cb = breaker(1);
        let result: Result<(), _> = cb
            .call(|| async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok(())
            })
            .await;
        assert!(matches!(result, Err(CourierError::Timeout { .. })));
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_is_neutral() {
        let cb = breaker(1);
        let result: Result<(), _> = cb.call(|| async { Err(CourierError::Cancelled) }).await;
        assert!(matches!(result, Err(CourierError::Cancelled)));
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.failures(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn abandoned_half_open_call_frees_the_slot() {
        let cb = breaker(1);
        let _ = fail(&cb).await;
        tokio::time::advance(Duration::from_secs(31)).await;

        let stalled = cb.call(|| async {
            tokio::time::sleep(Duration::from_secs(3)).await;
            Ok::<(), CourierError>(())
        });
        let raced = tokio::time::timeout(Duration::from_secs(1), stalled).await;
        assert!(raced.is_err());
        assert_eq!(cb.state(), CircuitState::HalfOpen);

        let mut invoked = false;
        cb.call(|| {
            invoked = true;
            async { Ok(()) }
        })
        .await
        .unwrap();
        assert!(invoked);
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn abandoned_closed_call_leaves_probe_alone() {
        let cb = breaker(1);
        let mut pending = Box::pin(cb.call(|| async {
            tokio::time::sleep(Duration::from_secs(3)).await;
            Ok::<(), CourierError>(())
        }));
        assert!(
            tokio::time::timeout(Duration::from_millis(1), &mut pending)
                .await
                .is_err()
        );
        let _ = fail(&cb).await;
        tokio::time::advance(Duration::from_secs(31)).await;
        cb.try_acquire().unwrap();
        assert_eq!(cb.state(), CircuitState::HalfOpen);

        drop(pending);
        assert!(matches!(
            cb.try_acquire(),
            Err(CourierError::CircuitOpen { .. })
        ));
    }
}
