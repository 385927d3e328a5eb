// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Collaborator traits for the offline sync subsystem.
//!
//! Storage, connectivity and delivery are external to the subsystem. Each is
//! modelled as a trait extending [`Adapter`] and uses `#[async_trait]` for
//! dynamic dispatch compatibility.

pub mod adapter;
pub mod clock;
pub mod kv;
pub mod network;
pub mod remote;

pub use adapter::Adapter;
pub use clock::{Clock, SystemClock};
pub use kv::KeyValueStore;
pub use network::NetworkMonitor;
pub use remote::RemoteSender;
