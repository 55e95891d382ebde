pub mod disk;
pub mod memory;

use crate::core::RateStore;
use crate::core::config::AppConfig;
use anyhow::{Context, Result};
use disk::DiskRateStore;
use memory::MemoryRateStore;
use std::sync::Arc;
use tracing::info;

/// Opens the store the application runs against: a throwaway memory store
/// when `ephemeral`, otherwise the disk store under the configured data path.
pub fn open_store(config: &AppConfig, ephemeral: bool) -> Result<Arc<dyn RateStore>> {
    if ephemeral {
        info!("Using in-memory rate store; nothing will be persisted");
        return Ok(Arc::new(MemoryRateStore::new()));
    }

    let path = config.default_data_path()?.join("rates");
    std::fs::create_dir_all(&path)
        .with_context(|| format!("Failed to create data directory: {}", path.display()))?;
    let store = DiskRateStore::open(&path)
        .with_context(|| format!("Failed to open rate store at {}", path.display()))?;
    info!(path = %path.display(), "Opened rate store");
    Ok(Arc::new(store))
}
