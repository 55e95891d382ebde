use crate::core::store::{RateBatch, RateStore, StoreError, sort_rates};
use crate::core::{CurrencyPair, Provider, Rate};
use async_trait::async_trait;
use fjall::{Keyspace, PartitionCreateOptions, PartitionHandle, PersistMode};
use std::fmt::Display;
use std::path::Path;
use tracing::{debug, warn};

const PROVIDERS_PARTITION: &str = "providers";
const RATES_PARTITION: &str = "rates";

/// Rate keys are `PAIR/provider` so a pair's rows share a prefix.
fn rate_key(provider: &str, pair: &CurrencyPair) -> String {
    format!("{pair}/{provider}")
}

fn pair_prefix(pair: &CurrencyPair) -> String {
    format!("{pair}/")
}

/// Once a write batch has been applied its rows are visible, so a failed sync
/// afterwards cannot be reported as a rejected commit. It is logged instead.
fn settle_sync<E: Display>(applied: usize, synced: Result<(), E>) -> usize {
    if let Err(error) = synced {
        warn!(%error, applied, "Rate batch applied but not yet synced to disk");
    }
    applied
}

/// Persistent rate store on a fjall keyspace. A commit goes through a single
/// write batch, so a pass is either fully applied or not at all.
pub struct DiskRateStore {
    keyspace: Keyspace,
    providers: PartitionHandle,
    rates: PartitionHandle,
}

impl DiskRateStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        debug!(path = %path.display(), "Opening rate store");
        let keyspace = fjall::Config::new(path).open()?;
        let providers =
            keyspace.open_partition(PROVIDERS_PARTITION, PartitionCreateOptions::default())?;
        let rates = keyspace.open_partition(RATES_PARTITION, PartitionCreateOptions::default())?;

        Ok(Self {
            keyspace,
            providers,
            rates,
        })
    }
}

#[async_trait]
impl RateStore for DiskRateStore {
    async fn list_providers(&self) -> Result<Vec<Provider>, StoreError> {
        let mut providers = Vec::new();
        for entry in self.providers.iter() {
            let (_, value) = entry?;
            providers.push(serde_json::from_slice(&value)?);
        }
        Ok(providers)
    }

    async fn insert_provider(&self, provider: Provider) -> Result<bool, StoreError> {
        if self.providers.contains_key(&provider.name)? {
            return Ok(false);
        }
        debug!(provider = %provider.name, "Registering provider");
        self.providers
            .insert(provider.name.as_str(), serde_json::to_vec(&provider)?)?;
        self.keyspace.persist(PersistMode::SyncAll)?;
        Ok(true)
    }

    async fn get(&self, provider: &str, pair: &CurrencyPair) -> Result<Option<Rate>, StoreError> {
        match self.rates.get(rate_key(provider, pair))? {
            Some(value) => Ok(Some(serde_json::from_slice(&value)?)),
            None => Ok(None),
        }
    }

    async fn rates_for_pair(&self, pair: &CurrencyPair) -> Result<Vec<Rate>, StoreError> {
        let mut rates = Vec::new();
        for entry in self.rates.prefix(pair_prefix(pair)) {
            let (_, value) = entry?;
            rates.push(serde_json::from_slice::<Rate>(&value)?);
        }
        sort_rates(&mut rates);
        Ok(rates)
    }

    async fn rate_count(&self) -> Result<usize, StoreError> {
        Ok(self.rates.len()?)
    }

    async fn commit(&self, batch: RateBatch) -> Result<usize, StoreError> {
        let rates = batch.into_rates();
        let applied = rates.len();

        // Encode everything before touching the keyspace.
        let mut encoded = Vec::with_capacity(applied);
        for rate in &rates {
            encoded.push((rate_key(&rate.provider, &rate.pair), serde_json::to_vec(rate)?));
        }

        let mut write = self.keyspace.batch();
        for (key, value) in encoded {
            write.insert(&self.rates, key, value);
        }
        write.commit()?;
        let applied = settle_sync(applied, self.keyspace.persist(PersistMode::SyncAll));

        debug!(applied, "Committed rate batch to disk store");
        Ok(applied)
    }
}
