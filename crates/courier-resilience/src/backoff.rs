// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Exponential backoff executor.
//!
//! # Schedule (defaults: 1s initial, x2, 10s cap, 30% jitter)
//!
//! | Retry | Nominal delay | Slept          |
//! |-------|---------------|----------------|
//! | 0     | 1s            | 1.0s - 1.3s    |
//! | 1     | 2s            | 2.0s - 2.6s    |
//! | 2     | 4s            | 4.0s - 5.2s    |
//! | 3     | 8s            | 8.0s - 10.4s   |
//! | 4     | 10s (capped)  | 10.0s - 13.0s  |

use std::future::Future;
use std::time::Duration;

use courier_core::CourierError;
use rand::Rng;
use tracing::debug;

/// Upper bound of the additive jitter, as a fraction of the nominal delay.
pub const DEFAULT_JITTER_RATIO: f64 = 0.3;

/// Backoff parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffPolicy {
    /// Retries after the first attempt; total attempts are `max_retries + 1`.
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    pub jitter_ratio: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            backoff_multiplier: 2.0,
            jitter_ratio: DEFAULT_JITTER_RATIO,
        }
    }
}

impl BackoffPolicy {
    pub fn new(max_retries: u32, initial_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_retries,
            initial_delay,
            max_delay,
            ..Self::default()
        }
    }

    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    pub fn with_jitter_ratio(mut self, ratio: f64) -> Self {
        self.jitter_ratio = ratio.clamp(0.0, 1.0);
        self
    }

    /// Pre-jitter delay before retry number `retry` (0-indexed):
    /// `min(initial_delay * multiplier^retry, max_delay)`.
    pub fn nominal_delay(&self, retry: u32) -> Duration {
        let exponent = i32::try_from(retry).unwrap_or(i32::MAX);
        let scaled = self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        let cap = self.max_delay.as_secs_f64();
        if !scaled.is_finite() || scaled >= cap {
            self.max_delay
        } else {
            Duration::from_secs_f64(scaled.max(0.0))
        }
    }

    /// Adds uniform jitter in `[0, jitter_ratio * nominal]`.
    pub fn jittered(&self, nominal: Duration) -> Duration {
        if self.jitter_ratio <= 0.0 || nominal.is_zero() {
            return nominal;
        }
        let factor = rand::thread_rng().gen_range(0.0..=self.jitter_ratio);
        nominal + nominal.mul_f64(factor)
    }
}

/// Details handed to the `on_retry` observer before each backoff sleep.
#[derive(Debug)]
pub struct RetryAttempt<'a> {
    /// The attempt that just failed (0-indexed).
    pub attempt: u32,
    /// Jittered delay about to be slept.
    pub delay: Duration,
    pub error: &'a CourierError,
}

/// Run `operation` with exponential backoff using the default classifier
/// ([`CourierError::is_retryable`]).
pub async fn retry_with_backoff<T, F, Fut>(
    policy: &BackoffPolicy,
    operation: F,
) -> Result<T, CourierError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, CourierError>>,
{
    retry_with(
        policy,
        operation,
        |err: &CourierError, _attempt| err.is_retryable(),
        |_: &RetryAttempt<'_>| {},
    )
    .await
}

/// Run `operation` with exponential backoff.
///
/// The operation receives the 0-indexed attempt number. A failure is
/// propagated immediately when the retry budget is spent or `should_retry`
/// declines it; otherwise `on_retry` is invoked and the executor sleeps for
/// the jittered delay before trying again.
pub async fn retry_with<T, F, Fut, S, R>(
    policy: &BackoffPolicy,
    mut operation: F,
    should_retry: S,
    mut on_retry: R,
) -> Result<T, CourierError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, CourierError>>,
    S: Fn(&CourierError, u32) -> bool,
    R: FnMut(&RetryAttempt<'_>),
{
    let mut attempt = 0;
    loop {
        let error = match operation(attempt).await {
            Ok(value) => return Ok(value),
            Err(error) => error,
        };

        if attempt >= policy.max_retries || !should_retry(&error, attempt) {
            return Err(error);
        }

        let delay = policy.jittered(policy.nominal_delay(attempt));
        on_retry(&RetryAttempt {
            attempt,
            delay,
            error: &error,
        });
        debug!(
            attempt,
            delay_ms = delay.as_millis() as u64,
            error = %error,
            "retrying after backoff"
        );
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn unavailable() -> CourierError {
        CourierError::from_status(503, "busy")
    }

    fn no_jitter(max_retries: u32) -> BackoffPolicy {
        BackoffPolicy::new(
            max_retries,
            Duration::from_millis(100),
            Duration::from_secs(1),
        )
        .with_jitter_ratio(0.0)
    }

    #[test]
    fn nominal_delay_doubles_then_caps() {
        let policy = no_jitter(10);
        assert_eq!(policy.nominal_delay(0), Duration::from_millis(100));
        assert_eq!(policy.nominal_delay(1), Duration::from_millis(200));
        assert_eq!(policy.nominal_delay(3), Duration::from_millis(800));
        assert_eq!(policy.nominal_delay(4), Duration::from_secs(1));
        assert_eq!(policy.nominal_delay(u32::MAX), Duration::from_secs(1));
    }

    #[test]
    fn jitter_stays_within_thirty_percent() {
        let policy = BackoffPolicy::default();
        let nominal = Duration::from_secs(2);
        for _ in 0..200 {
            let d = policy.jittered(nominal);
            assert!(d >= nominal);
            assert!(d <= nominal.mul_f64(1.3));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let mut retries = Vec::new();

        let result = retry_with(
            &no_jitter(3),
            |_| {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 3 {
                        Err(unavailable())
                    } else {
                        Ok("sent")
                    }
                }
            },
            |err: &CourierError, _| err.is_retryable(),
            |attempt: &RetryAttempt<'_>| retries.push(attempt.delay),
        )
        .await;

        assert_eq!(result.unwrap(), "sent");
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(
            retries,
            vec![
                Duration::from_millis(100),
                Duration::from_millis(200),
                Duration::from_millis(400),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn terminal_error_is_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = retry_with_backoff(&no_jitter(5), |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(CourierError::from_status(404, "missing")) }
        })
        .await;

        assert!(matches!(
            result,
            Err(CourierError::RemoteRejected { status: 404, .. })
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausting_budget_returns_last_error() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = retry_with_backoff(&no_jitter(2), |attempt| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                Err(CourierError::RemoteUnavailable {
                    status: None,
                    message: format!("attempt {attempt}"),
                })
            }
        })
        .await;

        let err = result.unwrap_err();
        assert!(err.to_string().contains("attempt 2"), "got: {err}");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn sleeps_for_the_backoff_delay() {
        let start = tokio::time::Instant::now();
        let _: Result<(), _> =
            retry_with_backoff(&no_jitter(2), |_| async { Err(unavailable()) }).await;
        assert_eq!(start.elapsed(), Duration::from_millis(300));
    }

    proptest! {
        #[test]
        fn nominal_delay_is_monotonic_and_capped(
            initial_ms in 1u64..5_000,
            max_ms in 1u64..120_000,
            multiplier in 1.0f64..4.0,
            retry in 0u32..64,
        ) {
            let policy = BackoffPolicy::new(64, Duration::from_millis(initial_ms), Duration::from_millis(max_ms))
                .with_multiplier(multiplier);
            let current = policy.nominal_delay(retry);
            let next = policy.nominal_delay(retry + 1);
            prop_assert!(next >= current);
            prop_assert!(next <= policy.max_delay);
        }
    }
}
