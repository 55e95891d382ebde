use super::ui;
use crate::scheduler::PassOutcome;
use crate::service::RateService;
use anyhow::{Result, anyhow};

/// Runs a single refresh pass and reports how it went.
pub async fn refresh_once(service: &RateService) -> Result<()> {
    let spinner = ui::new_spinner("Refreshing rates");
    let outcome = service.trigger_refresh_now().await;
    spinner.finish_and_clear();

    match outcome {
        PassOutcome::Committed(summary) => {
            println!(
                "{} {} updated, {} unavailable, {} providers skipped",
                ui::style_text("Refresh complete:", ui::StyleType::Success),
                summary.successes,
                summary.failures,
                summary.skipped_providers
            );
            Ok(())
        }
        PassOutcome::Skipped => {
            println!(
                "{}",
                ui::style_text("A refresh is already running", ui::StyleType::Subtle)
            );
            Ok(())
        }
        PassOutcome::LoadFailed(e) => {
            println!("{}", ui::style_text("Refresh failed", ui::StyleType::Error));
            Err(anyhow!(e).context("Failed to load providers"))
        }
        PassOutcome::CommitFailed { error, .. } => {
            println!("{}", ui::style_text("Refresh failed", ui::StyleType::Error));
            Err(anyhow!(error).context("Failed to commit refreshed rates"))
        }
    }
}
