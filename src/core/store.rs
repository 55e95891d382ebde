//! Rate storage abstractions

use crate::core::pair::CurrencyPair;
use crate::core::rate::{Provider, Rate};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage backend error: {0}")]
    Backend(#[from] fjall::Error),
    #[error("failed to encode or decode stored value: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("commit rejected: {0}")]
    CommitRejected(String),
}

/// Pending rate writes for one pass.
///
/// Nothing in a batch is visible to readers until it is handed to
/// [`RateStore::commit`]. Dropping a batch without committing discards it.
#[derive(Debug, Default)]
pub struct RateBatch {
    pending: Vec<Rate>,
}

impl RateBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an insert-or-update for `(provider, pair)`. A later upsert of
    /// the same key in this batch wins.
    pub fn upsert(&mut self, provider: &str, pair: &CurrencyPair, rate: f64, at: DateTime<Utc>) {
        self.pending.push(Rate {
            provider: provider.to_string(),
            pair: pair.clone(),
            rate,
            last_updated: at,
        });
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Takes the queued writes in insertion order. Store backends call this
    /// from `commit`.
    pub fn into_rates(mut self) -> Vec<Rate> {
        std::mem::take(&mut self.pending)
    }
}

impl Drop for RateBatch {
    fn drop(&mut self) {
        if !self.pending.is_empty() {
            debug!(
                discarded = self.pending.len(),
                "Rolling back uncommitted rate batch"
            );
        }
    }
}

/// Keyed table of the latest rate per (provider, pair), plus the provider
/// registry it hangs off.
#[async_trait]
pub trait RateStore: Send + Sync {
    async fn list_providers(&self) -> Result<Vec<Provider>, StoreError>;

    /// Registers `provider` unless one with the same name exists. Returns
    /// whether it was inserted.
    async fn insert_provider(&self, provider: Provider) -> Result<bool, StoreError>;

    async fn get(&self, provider: &str, pair: &CurrencyPair) -> Result<Option<Rate>, StoreError>;

    /// All rates stored for `pair`, lowest rate first.
    async fn rates_for_pair(&self, pair: &CurrencyPair) -> Result<Vec<Rate>, StoreError>;

    async fn rate_count(&self) -> Result<usize, StoreError>;

    /// Applies every write in `batch` atomically. Returns the number of
    /// writes applied. On error nothing from the batch is visible.
    async fn commit(&self, batch: RateBatch) -> Result<usize, StoreError>;

    fn begin(&self) -> RateBatch {
        RateBatch::new()
    }

    /// Single-key upsert committed immediately.
    async fn upsert(
        &self,
        provider: &str,
        pair: &CurrencyPair,
        rate: f64,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut batch = self.begin();
        batch.upsert(provider, pair, rate, at);
        self.commit(batch).await.map(|_| ())
    }
}

/// Orders rates the way listings present them: cheapest first, ties by
/// provider name.
pub fn sort_rates(rates: &mut [Rate]) {
    rates.sort_by(|a, b| {
        a.rate
            .total_cmp(&b.rate)
            .then_with(|| a.provider.cmp(&b.provider))
    });
}
