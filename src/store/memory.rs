use crate::core::store::{RateBatch, RateStore, StoreError, sort_rates};
use crate::core::{CurrencyPair, Provider, Rate};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Default)]
struct Tables {
    providers: Vec<Provider>,
    rates: HashMap<(String, CurrencyPair), Rate>,
}

/// In-memory rate store. Commits apply a whole batch under one write lock, so
/// readers never observe part of a pass.
#[derive(Default)]
pub struct MemoryRateStore {
    inner: RwLock<Tables>,
}

impl MemoryRateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RateStore for MemoryRateStore {
    async fn list_providers(&self) -> Result<Vec<Provider>, StoreError> {
        Ok(self.inner.read().await.providers.clone())
    }

    async fn insert_provider(&self, provider: Provider) -> Result<bool, StoreError> {
        let mut tables = self.inner.write().await;
        if tables.providers.iter().any(|p| p.name == provider.name) {
            return Ok(false);
        }
        debug!(provider = %provider.name, "Registering provider");
        tables.providers.push(provider);
        Ok(true)
    }

    async fn get(&self, provider: &str, pair: &CurrencyPair) -> Result<Option<Rate>, StoreError> {
        let tables = self.inner.read().await;
        Ok(tables
            .rates
            .get(&(provider.to_string(), pair.clone()))
            .cloned())
    }

    async fn rates_for_pair(&self, pair: &CurrencyPair) -> Result<Vec<Rate>, StoreError> {
        let tables = self.inner.read().await;
        let mut rates: Vec<Rate> = tables
            .rates
            .values()
            .filter(|rate| &rate.pair == pair)
            .cloned()
            .collect();
        sort_rates(&mut rates);
        Ok(rates)
    }

    async fn rate_count(&self) -> Result<usize, StoreError> {
        Ok(self.inner.read().await.rates.len())
    }

    async fn commit(&self, batch: RateBatch) -> Result<usize, StoreError> {
        let rates = batch.into_rates();
        let applied = rates.len();

        let mut tables = self.inner.write().await;
        for rate in rates {
            tables
                .rates
                .insert((rate.provider.clone(), rate.pair.clone()), rate);
        }
        debug!(applied, "Committed rate batch to memory store");
        Ok(applied)
    }
}
