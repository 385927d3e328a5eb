// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP collaborators for the Courier offline sync subsystem.
//!
//! - [`HttpSender`] POSTs queued messages to the remote send endpoint and
//!   classifies responses into retryable and terminal failures.
//! - [`ReachabilityProbe`] is a [`NetworkMonitor`](courier_core::NetworkMonitor)
//!   that decides connectivity by periodically probing a URL.

pub mod http;
pub mod probe;

pub use http::HttpSender;
pub use probe::ReachabilityProbe;
