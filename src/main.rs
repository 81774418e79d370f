//! relayq - Reliable at-least-once task queue
//!
//! Main entry point for the relayq CLI and worker.

mod adapters;
mod cli;
mod cmd_task;
mod cmd_work;

use std::path::Path;

use clap::Parser;
use tracing::{debug, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use relayq_config::{AppConfig, ConfigLoader, LogFormat, LoggingConfig};

use crate::cli::{Cli, Commands};

fn init_tracing(logging: &LoggingConfig) {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&logging.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    // Logs go to stderr so command output on stdout stays scriptable.
    let registry = tracing_subscriber::registry().with(env_filter);
    match logging.format {
        LogFormat::Text => registry
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init(),
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init(),
    }
}

/// Load the config file, falling back to defaults when it does not exist.
fn load_config(path: &Path) -> Result<AppConfig, Box<dyn std::error::Error>> {
    let expanded = ConfigLoader::expand_path(&path.to_string_lossy());
    let path = Path::new(&expanded);
    if path.exists() {
        Ok(ConfigLoader::load_validated(path)?)
    } else {
        Ok(AppConfig::default())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = load_config(&cli.config)?;
    init_tracing(&config.logging);
    debug!("Configuration: {:?}", config);

    if let Commands::Work {
        max_out: Some(max_out),
    } = cli.command
    {
        config.queue.listener.max_out = max_out;
    }

    let queue = adapters::connect_queue(&config).await?;
    info!(
        "Connected to queue '{}' ({:?} store)",
        config.queue.prefix, config.store.backend
    );

    let result = match cli.command {
        Commands::Push { payload } => cmd_task::push(&queue, &payload).await,
        Commands::Defer {
            payload,
            delay_ms,
            at,
        } => cmd_task::defer(&queue, &payload, delay_ms, at.as_deref()).await,
        Commands::Recur { payload, every_ms } => cmd_task::recur(&queue, &payload, every_ms).await,
        Commands::Undefer { task_ref, now } => cmd_task::undefer(&queue, &task_ref, now).await,
        Commands::Unrecur { task_ref } => cmd_task::unrecur(&queue, &task_ref).await,
        Commands::Remove {
            queue: from,
            task_ref,
            keep_storage,
        } => cmd_task::remove(&queue, from, &task_ref, keep_storage).await,
        Commands::Show { task_ref } => cmd_task::show(&queue, &task_ref).await,
        Commands::List { queue: name } => cmd_task::list(&queue, name).await,
        Commands::Stats { json } => cmd_task::stats(&queue, json).await,
        Commands::Work { .. } => return cmd_work::work(queue).await,
    };

    queue.end().await;
    result
}
