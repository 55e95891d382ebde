use crate::service::RateService;
use anyhow::{Context, Result};
use tracing::info;

/// Keeps refreshing rates until Ctrl-C.
pub async fn serve(service: &RateService) -> Result<()> {
    let handle = service.start_scheduler();
    info!("Refreshing rates in the background; press Ctrl-C to stop");

    let signal = tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal");

    info!("Shutting down");
    handle.stop().await;
    signal
}
