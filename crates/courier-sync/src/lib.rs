// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Delivery and scheduling for the Courier offline sync subsystem.
//!
//! - [`SyncEngine`] drains the message queue against the remote endpoint,
//!   one cycle at a time.
//! - [`LifecycleCoordinator`] reacts to foreground/background and
//!   connectivity transitions and runs periodic maintenance.
//! - [`OfflineService`] is the caller-facing facade wiring both together.

pub mod engine;
pub mod lifecycle;
pub mod network;
pub mod service;

pub use engine::{SkipReason, SyncEngine, SyncOutcome, SyncReport, SyncSettings};
pub use lifecycle::{
    LifecycleCoordinator, LifecycleEvent, LifecycleSession, LifecycleSettings, MaintenanceReport,
};
pub use network::WatchNetworkMonitor;
pub use service::{AdapterHealth, OfflineService, ServiceSettings};
