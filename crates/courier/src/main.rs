// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Courier - offline-first message queue and sync.
//!
//! This is the binary entry point for the Courier CLI.

mod commands;
mod runtime;
mod shutdown;

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use courier_config::CourierConfig;
use courier_core::CourierError;

/// Courier - offline-first message queue and sync.
#[derive(Parser, Debug)]
#[command(name = "courier", version, about, long_about = None)]
struct Cli {
    /// Read configuration from this file instead of the standard locations.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Emit JSON instead of text where supported.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Queue a message for delivery.
    Enqueue {
        content: String,
        #[arg(long)]
        conversation: Option<String>,
        /// Attachment reference; may be repeated.
        #[arg(long = "attach")]
        attachments: Vec<String>,
    },
    /// List queued messages.
    List,
    /// Remove a queued message.
    Remove { id: String },
    /// Reset a failed message to pending.
    Retry { id: String },
    /// Remove every queued message.
    Clear,
    /// Run one sync cycle now.
    Sync {
        /// Stop the cycle after this many seconds.
        #[arg(long)]
        budget_secs: Option<u64>,
    },
    /// Show storage usage.
    Stats,
    /// Show connectivity, circuit state and adapter health.
    Status,
    /// Stay running and sync on reconnect until interrupted.
    Run,
    /// Print the effective configuration.
    Config,
}

fn load_config(path: Option<&PathBuf>) -> CourierConfig {
    let loaded = match path {
        Some(path) => courier_config::load_and_validate_path(path),
        None => courier_config::load_and_validate(),
    };
    match loaded {
        Ok(config) => config,
        Err(errors) => {
            courier_config::render_errors(&errors);
            std::process::exit(1);
        }
    }
}

fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let crates = [
            "courier",
            "courier_core",
            "courier_config",
            "courier_resilience",
            "courier_storage",
            "courier_sync",
            "courier_remote",
        ];
        let directives: Vec<String> = crates.iter().map(|c| format!("{c}={log_level}")).collect();
        EnvFilter::new(format!("{},warn", directives.join(",")))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .init();
}

async fn dispatch(cli: Cli, config: CourierConfig) -> Result<(), CourierError> {
    if let Commands::Config = cli.command {
        return commands::show_config(&config);
    }

    let runtime = runtime::open(&config).await?;
    let service = runtime.service.clone();
    let json = cli.json;

    match cli.command {
        Commands::Enqueue {
            content,
            conversation,
            attachments,
        } => commands::enqueue(&service, &content, conversation, attachments).await?,
        Commands::List => commands::list(&service, json).await?,
        Commands::Remove { id } => commands::remove(&service, &id).await?,
        Commands::Retry { id } => commands::retry(&service, &id).await?,
        Commands::Clear => commands::clear(&service).await?,
        Commands::Sync { budget_secs } => {
            commands::sync(&service, budget_secs.map(Duration::from_secs)).await?
        }
        Commands::Stats => commands::stats(&service, json).await?,
        Commands::Status => commands::status(&service, json).await?,
        Commands::Run => return commands::run(runtime).await,
        Commands::Config => {}
    }

    service.shutdown().await;
    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref());
    init_tracing(&config.app.log_level);

    if let Err(e) = dispatch(cli, config).await {
        eprintln!("courier: {e}");
        std::process::exit(1);
    }
}
