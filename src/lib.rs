pub mod cli;
pub mod core;
pub mod providers;
pub mod scheduler;
pub mod seed;
pub mod service;
pub mod store;

pub use crate::core::config;

use anyhow::{Context, Result};
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppCommand {
    /// Refresh rates periodically until interrupted.
    Serve,
    /// Run one refresh pass and exit.
    Refresh,
    /// Show stored rates for a currency pair.
    Rates(String),
    /// List supported currency pairs.
    Pairs,
    /// List registered providers.
    Providers,
}

/// Loads config, opens and seeds the store, then runs `command` against it.
/// With `ephemeral` the store lives in memory only.
pub async fn run_command(
    command: AppCommand,
    config_path: Option<&str>,
    ephemeral: bool,
) -> Result<()> {
    info!("ratefinder starting...");

    let config = match config_path {
        Some(path) => config::AppConfig::load_from_path(path)?,
        None => config::AppConfig::load()?,
    };
    debug!("Loaded config: {config:#?}");

    let store = store::open_store(&config, ephemeral)?;
    seed::seed_store(store.as_ref(), &config)
        .await
        .context("Failed to seed rate store")?;

    let service = service::RateService::new(&config, store);

    match command {
        AppCommand::Serve => cli::serve::serve(&service).await,
        AppCommand::Refresh => cli::refresh::refresh_once(&service).await,
        AppCommand::Rates(pair) => cli::rates::show_rates(&service, &pair).await,
        AppCommand::Pairs => {
            cli::rates::show_pairs(&service);
            Ok(())
        }
        AppCommand::Providers => cli::rates::show_providers(&service).await,
    }
}
