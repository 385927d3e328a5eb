// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Retry engine for the Courier sync subsystem.
//!
//! Two independent primitives:
//! - [`retry_with_backoff`]: exponential backoff with up to 30% additive
//!   jitter, driven by a retry classifier.
//! - [`CircuitBreaker`]: closed/open/half-open breaker that fails fast while
//!   the backend is failing broadly.

pub mod backoff;
pub mod circuit_breaker;

pub use backoff::{retry_with, retry_with_backoff, BackoffPolicy, RetryAttempt};
pub use circuit_breaker::{BreakerSettings, BreakerSnapshot, CircuitBreaker, CircuitState};
