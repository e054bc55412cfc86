use anyhow::{Context, Result};
use openei_rates::config::Config;
use openei_rates::coordinator::CoordinatorSettings;
use openei_rates::error::OpenEiError;
use openei_rates::host::{InMemoryStateStore, SystemClock};
use openei_rates::integration::Integration;
use openei_rates::logging::init_logging;
use openei_rates::rates::OpenEiClient;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let config = match std::env::args().nth(1) {
        Some(path) => Config::from_file(&path).with_context(|| format!("loading {}", path))?,
        None => Config::load().context("loading configuration")?,
    };
    config.validate().context("invalid configuration")?;
    init_logging(&config.logging).context("initialising logging")?;

    info!("OpenEI rate sensors starting up");

    let client = OpenEiClient::new(&config.api)
        .map_err(|e| anyhow::anyhow!("Failed to create OpenEI client: {}", e))?;
    let settings = CoordinatorSettings {
        timezone: config.host.tz()?,
        storage_dir: PathBuf::from(&config.host.storage_dir),
        fallback_interval: Duration::from_secs(config.coordinator.fallback_interval_secs),
    };
    let mut integration = Integration::new(
        Arc::new(client),
        Arc::new(InMemoryStateStore::new()),
        Arc::new(SystemClock),
        settings,
    );

    let mut pending: VecDeque<_> = config.entries.iter().cloned().collect();
    if pending.is_empty() {
        warn!("No entries configured; nothing to poll");
    }
    let mut retry = tokio::time::interval(Duration::from_secs(config.coordinator.setup_retry_secs));

    loop {
        tokio::select! {
            _ = retry.tick(), if !pending.is_empty() => {
                let mut not_ready = VecDeque::new();
                while let Some(record) = pending.pop_front() {
                    let entry_id = record.entry_id.clone();
                    match integration.setup(record.clone()).await {
                        Ok(()) => info!("Entry {} loaded", entry_id),
                        Err(e @ OpenEiError::NotReady { .. }) => {
                            warn!("Entry {} not ready, retrying in {}s: {}",
                                entry_id, config.coordinator.setup_retry_secs, e);
                            not_ready.push_back(record);
                        }
                        Err(e) => error!("Entry {} failed to load: {}", entry_id, e),
                    }
                }
                pending = not_ready;
            }
            res = tokio::signal::ctrl_c() => {
                if let Err(e) = res {
                    error!("Failed to listen for shutdown signal: {}", e);
                }
                info!("Shutdown signal received");
                break;
            }
        }
    }

    integration.unload_all().await;
    info!("Shutdown complete");
    Ok(())
}
