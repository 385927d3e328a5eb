// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Courier integration tests.
//!
//! Provides deterministic collaborators so sync and storage behaviour can be
//! exercised without a backend or a real clock.
//!
//! # Components
//!
//! - [`MockSender`] - scripted remote endpoint that records every request
//! - [`ManualClock`] - wall clock that only moves when told to
//! - [`FlakyStore`] - key-value store wrapper with switchable write failures

pub mod clock;
pub mod flaky_store;
pub mod mock_sender;

pub use clock::ManualClock;
pub use flaky_store::FlakyStore;
pub use mock_sender::{MockOutcome, MockSender};
