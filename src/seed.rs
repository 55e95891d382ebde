use crate::core::config::AppConfig;
use crate::core::{Provider, RateStore, StoreError};
use chrono::Utc;
use tracing::{debug, info};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SeedSummary {
    pub providers_added: usize,
    pub rates_added: usize,
}

/// Registers configured providers missing from the store and, when the store
/// has no rates at all, loads the configured starting rates in one batch.
pub async fn seed_store(store: &dyn RateStore, config: &AppConfig) -> Result<SeedSummary, StoreError> {
    let mut summary = SeedSummary::default();

    for provider in &config.providers {
        let inserted = store
            .insert_provider(Provider {
                name: provider.name.clone(),
                registration_link: provider.registration_link.clone(),
            })
            .await?;
        if inserted {
            summary.providers_added += 1;
        }
    }

    if config.seed_rates.is_empty() {
        debug!("No seed rates configured");
    } else if store.rate_count().await? == 0 {
        let now = Utc::now();
        let mut batch = store.begin();
        for seed in &config.seed_rates {
            batch.upsert(&seed.provider, &seed.pair, seed.rate, now);
        }
        summary.rates_added = store.commit(batch).await?;
    } else {
        debug!("Store already holds rates; skipping seed rates");
    }

    info!(
        providers_added = summary.providers_added,
        rates_added = summary.rates_added,
        "Seeded rate store"
    );
    Ok(summary)
}
