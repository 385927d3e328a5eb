// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Subcommand implementations.

use std::time::Duration;

use courier_config::CourierConfig;
use courier_core::{CourierError, HealthStatus, MessageId, QueuedMessage};
use courier_sync::{OfflineService, SyncOutcome};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::runtime::Runtime;
use crate::shutdown;

/// Structured `stats` output for `--json` mode.
#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub used_bytes: u64,
    pub limit_bytes: u64,
    pub available_bytes: u64,
    pub percentage: f64,
    pub item_count: usize,
    pub oldest_item_age_secs: Option<u64>,
    pub largest_item: Option<String>,
    pub queued: usize,
}

/// Structured `status` output for `--json` mode.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub online: bool,
    pub connection_type: String,
    pub circuit: String,
    pub circuit_failures: u32,
    pub adapters: Vec<AdapterStatus>,
}

#[derive(Debug, Serialize)]
pub struct AdapterStatus {
    pub name: String,
    pub kind: String,
    pub health: String,
}

/// Format bytes as a short human-readable size.
pub fn format_bytes(bytes: u64) -> String {
    const KIB: f64 = 1024.0;
    let b = bytes as f64;
    if b >= KIB * KIB {
        format!("{:.1} MiB", b / (KIB * KIB))
    } else if b >= KIB {
        format!("{:.1} KiB", b / KIB)
    } else {
        format!("{bytes} B")
    }
}

fn format_health(status: &HealthStatus) -> String {
    match status {
        HealthStatus::Healthy => "healthy".to_string(),
        HealthStatus::Degraded(reason) => format!("degraded ({reason})"),
        HealthStatus::Unhealthy(reason) => format!("unhealthy ({reason})"),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<(), CourierError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_message(msg: &QueuedMessage) {
    let conversation = msg.conversation_id.as_deref().unwrap_or("-");
    print!(
        "{}  {:<8} retries {}/{}  conv {}  {}",
        msg.id, msg.status, msg.retry_count, msg.max_retries, conversation, msg.content
    );
    if let Some(error) = &msg.error {
        print!("  [{error}]");
    }
    println!();
}

fn report_outcome(outcome: &SyncOutcome) {
    match outcome {
        SyncOutcome::Skipped(reason) => println!("sync skipped: {reason:?}"),
        SyncOutcome::Completed(report) => println!(
            "sync finished: {} attempted, {} delivered, {} retrying, {} failed, {} deferred",
            report.attempted, report.delivered, report.retrying, report.failed, report.deferred
        ),
    }
}

pub async fn enqueue(
    service: &OfflineService,
    content: &str,
    conversation: Option<String>,
    attachments: Vec<String>,
) -> Result<(), CourierError> {
    let enqueued = service.enqueue_message(content, conversation, attachments).await?;
    if let Some(warning) = &enqueued.warning {
        eprintln!("warning: {warning}");
    }
    println!("{}", enqueued.message.id);
    Ok(())
}

pub async fn list(service: &OfflineService, json: bool) -> Result<(), CourierError> {
    let messages = service.list_queued().await;
    if json {
        return print_json(&messages);
    }
    if messages.is_empty() {
        println!("queue is empty");
    }
    for msg in &messages {
        print_message(msg);
    }
    Ok(())
}

pub async fn remove(service: &OfflineService, id: &str) -> Result<(), CourierError> {
    let removed = service.remove_from_queue(&MessageId::from(id)).await?;
    println!("removed {}", removed.id);
    Ok(())
}

pub async fn retry(service: &OfflineService, id: &str) -> Result<(), CourierError> {
    let msg = service.retry_message(&MessageId::from(id)).await?;
    println!("{} reset to {}", msg.id, msg.status);
    Ok(())
}

pub async fn clear(service: &OfflineService) -> Result<(), CourierError> {
    let count = service.clear_queue().await?;
    println!("cleared {count} message(s)");
    Ok(())
}

pub async fn sync(service: &OfflineService, budget: Option<Duration>) -> Result<(), CourierError> {
    let outcome = match budget {
        Some(budget) => service.sync_messages_within(budget).await,
        None => service.sync_messages().await,
    };
    report_outcome(&outcome);
    Ok(())
}

pub async fn stats(service: &OfflineService, json: bool) -> Result<(), CourierError> {
    let stats = service.storage_stats().await?;
    let queued = service.list_queued().await.len();
    let response = StatsResponse {
        used_bytes: stats.quota.used,
        limit_bytes: stats.quota.limit,
        available_bytes: stats.quota.available,
        percentage: stats.quota.percentage,
        item_count: stats.item_count,
        oldest_item_age_secs: stats.oldest_item_age.map(|age| age.as_secs()),
        largest_item: stats.largest_item.as_ref().map(|item| item.key.clone()),
        queued,
    };
    if json {
        return print_json(&response);
    }

    println!(
        "storage: {} of {} used ({:.1}%), {} available",
        format_bytes(response.used_bytes),
        format_bytes(response.limit_bytes),
        response.percentage,
        format_bytes(response.available_bytes)
    );
    println!("items:   {}", response.item_count);
    if let Some(age) = response.oldest_item_age_secs {
        println!("oldest:  {age}s");
    }
    if let Some(item) = &stats.largest_item {
        println!("largest: {} ({})", item.key, format_bytes(item.size));
    }
    println!("queued:  {queued}");
    Ok(())
}

pub async fn status(service: &OfflineService, json: bool) -> Result<(), CourierError> {
    let network = service.network_status();
    let breaker = service.breaker_snapshot();
    let adapters = service
        .health()
        .await
        .into_iter()
        .map(|h| AdapterStatus {
            name: h.name,
            kind: h.adapter_type.to_string(),
            health: format_health(&h.status),
        })
        .collect();
    let response = StatusResponse {
        online: network.is_online(),
        connection_type: network.connection_type.to_string(),
        circuit: breaker.state.to_string(),
        circuit_failures: breaker.failures,
        adapters,
    };
    if json {
        return print_json(&response);
    }

    let online = if response.online { "online" } else { "offline" };
    println!("network: {online} ({})", response.connection_type);
    println!(
        "circuit: {} ({} consecutive failures)",
        response.circuit, response.circuit_failures
    );
    for adapter in &response.adapters {
        println!("  {:<14} {:<14} {}", adapter.name, adapter.kind, adapter.health);
    }
    Ok(())
}

/// Run until SIGINT/SIGTERM, syncing on reconnect and on the maintenance
/// interval.
pub async fn run(runtime: Runtime) -> Result<(), CourierError> {
    let signal = shutdown::install_signal_handler();
    run_until(runtime, signal).await
}

pub async fn run_until(runtime: Runtime, stop: CancellationToken) -> Result<(), CourierError> {
    let Runtime { service, probe } = runtime;
    let probe_stop = CancellationToken::new();
    let probe_task = probe.map(|probe| tokio::spawn(probe.run(probe_stop.clone())));

    service.start();
    info!("courier running, press Ctrl+C to stop");
    stop.cancelled().await;

    service.shutdown().await;
    probe_stop.cancel();
    if let Some(task) = probe_task {
        let _ = task.await;
    }
    info!("courier stopped");
    Ok(())
}

pub fn show_config(config: &CourierConfig) -> Result<(), CourierError> {
    let rendered = toml::to_string_pretty(config)
        .map_err(|e| CourierError::Internal(format!("failed to render config: {e}")))?;
    print!("{rendered}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_config::model::StorageBackend;

    #[test]
    fn bytes_are_humanized() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KiB");
        assert_eq!(format_bytes(50 * 1024 * 1024), "50.0 MiB");
    }

    #[test]
    fn health_is_rendered_with_reason() {
        assert_eq!(format_health(&HealthStatus::Healthy), "healthy");
        assert_eq!(
            format_health(&HealthStatus::Degraded("slow".into())),
            "degraded (slow)"
        );
    }

    #[test]
    fn default_config_renders_as_toml() {
        let rendered = toml::to_string_pretty(&CourierConfig::default()).unwrap();
        assert!(rendered.contains("max_queue_size = 50"));
        assert!(rendered.contains("[circuit_breaker]"));
    }

    #[tokio::test]
    async fn run_stops_when_token_is_cancelled() {
        let mut config = CourierConfig::default();
        config.storage.backend = StorageBackend::Memory;
        let runtime = crate::runtime::open(&config).await.unwrap();
        let service = runtime.service.clone();

        let stop = CancellationToken::new();
        let task = tokio::spawn(run_until(runtime, stop.clone()));
        stop.cancel();
        task.await.unwrap().unwrap();
        assert!(service.is_shut_down());
    }
}
