//! Batcho worker and operator CLI
//!
//! `batcho listen` polls a compute resource and handles its batches; the
//! other subcommands run single coordinator operations against the store.

use anyhow::{Context, Result};
use batcho_client::HttpStoreClient;
use batcho_runner::BatchStore;
use batcho_runner::cli::{Cli, Commands, handle_command};
use batcho_runner::config::Config;
use batcho_runner::retry::{RetryPolicy, retry_on_error};
use batcho_runner::service::{BatchCoordinator, JobRegistry, register_builtin_commands};
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "batcho_runner=info,batcho=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.store_url.clone())?;

    let client = HttpStoreClient::new(config.store_url.clone()).with_cache_dir(config.cache_dir.clone());

    if matches!(cli.command, Commands::Listen { .. }) {
        info!(
            "Starting batcho worker: worker_id={}, store_url={}",
            config.worker_id, config.store_url
        );
        wait_for_store(&client).await?;
    }

    let mut registry = JobRegistry::new();
    register_builtin_commands(&mut registry);
    info!("Registered commands: {}", registry.command_names().join(", "));

    let store = BatchStore::new(Arc::new(client)).with_pending_set_retry(config.pending_set_retry_policy());
    let coordinator = Arc::new(BatchCoordinator::with_batch_store(store, Arc::new(registry)));

    handle_command(cli.command, coordinator, &config).await
}

/// Loads configuration from the environment, applying CLI overrides
fn load_config(store_url: Option<String>) -> Result<Config> {
    let mut config = Config::from_env().context("Invalid configuration")?;

    if let Some(store_url) = store_url {
        config.store_url = store_url;
    }

    config.validate()?;
    Ok(config)
}

/// Waits for the store to answer its health check
///
/// The store may still be starting when a worker comes up (common in
/// container environments).
async fn wait_for_store(client: &HttpStoreClient) -> Result<()> {
    let policy = RetryPolicy::exponential(Duration::from_millis(500), Duration::from_secs(30), 10);

    retry_on_error(&policy, "Store health check", || client.health())
        .await
        .with_context(|| format!("Store at {} is not reachable", client.base_url()))?;

    info!("Connected to store at {}", client.base_url());
    Ok(())
}
