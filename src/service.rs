//! Read and refresh operations offered to the outer layers.

use crate::core::config::AppConfig;
use crate::core::{CurrencyPair, Provider, Rate, RateSource, RateStore, StoreError};
use crate::providers::SimulatedRateSource;
use crate::scheduler::{PassOutcome, RefreshScheduler, SchedulerHandle};
use std::sync::Arc;
use std::time::Duration;

pub struct RateService {
    store: Arc<dyn RateStore>,
    scheduler: Arc<RefreshScheduler>,
    pairs: Vec<CurrencyPair>,
}

impl RateService {
    /// Wires the simulated rate source from `config` to `store`.
    pub fn new(config: &AppConfig, store: Arc<dyn RateStore>) -> Self {
        let source = Arc::new(SimulatedRateSource::from_config(config));
        Self::with_source(
            store,
            source,
            config.supported_pairs.clone(),
            Duration::from_secs(config.refresh_interval_secs),
        )
    }

    pub fn with_source(
        store: Arc<dyn RateStore>,
        source: Arc<dyn RateSource>,
        pairs: Vec<CurrencyPair>,
        interval: Duration,
    ) -> Self {
        let scheduler = Arc::new(RefreshScheduler::new(
            Arc::clone(&store),
            source,
            pairs.clone(),
            interval,
        ));
        RateService {
            store,
            scheduler,
            pairs,
        }
    }

    /// Latest committed rate; `None` when the key has never been fetched.
    pub async fn get_latest_rate(
        &self,
        provider: &str,
        pair: &CurrencyPair,
    ) -> Result<Option<Rate>, StoreError> {
        self.store.get(provider, pair).await
    }

    /// Supported pairs in configuration order.
    pub fn list_supported_currency_pairs(&self) -> Vec<CurrencyPair> {
        self.pairs.clone()
    }

    /// Committed rates for `pair`, lowest first.
    pub async fn rates_for_pair(&self, pair: &CurrencyPair) -> Result<Vec<Rate>, StoreError> {
        self.store.rates_for_pair(pair).await
    }

    pub async fn list_providers(&self) -> Result<Vec<Provider>, StoreError> {
        self.store.list_providers().await
    }

    /// Runs a pass now unless one is already running.
    pub async fn trigger_refresh_now(&self) -> PassOutcome {
        self.scheduler.run_pass().await
    }

    pub fn start_scheduler(&self) -> SchedulerHandle {
        Arc::clone(&self.scheduler).start()
    }

    pub fn store(&self) -> &Arc<dyn RateStore> {
        &self.store
    }
}
