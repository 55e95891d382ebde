use crate::core::config::{ApiConfig, AppConfig};
use crate::core::{CurrencyPair, FetchOutcome, RateSource, UnavailableReason};
use crate::providers::util::{extract_rate, render_params, simulated_response};
use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::{HashMap, HashSet};
use tokio::sync::Mutex;
use tracing::{debug, instrument, warn};

/// Stands in for the providers' rate APIs: quotes a base rate per pair plus a
/// per-provider offset, and fails a configurable share of calls.
pub struct SimulatedRateSource {
    supported: HashSet<CurrencyPair>,
    base_rates: HashMap<CurrencyPair, f64>,
    apis: HashMap<String, ApiConfig>,
    offsets: HashMap<String, f64>,
    failure_probability: f64,
    rng: Mutex<StdRng>,
}

impl SimulatedRateSource {
    pub fn from_config(config: &AppConfig) -> Self {
        let apis = config
            .providers
            .iter()
            .filter_map(|p| p.api.clone().map(|api| (p.name.clone(), api)))
            .collect();

        SimulatedRateSource {
            supported: config.supported_pairs.iter().cloned().collect(),
            base_rates: config
                .simulation
                .base_rates
                .iter()
                .map(|(pair, rate)| (pair.clone(), *rate))
                .collect(),
            apis,
            offsets: config
                .simulation
                .offsets
                .iter()
                .map(|(name, offset)| (name.clone(), *offset))
                .collect(),
            failure_probability: usable_probability(config.simulation.failure_probability),
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    pub fn with_failure_probability(mut self, probability: f64) -> Self {
        self.failure_probability = usable_probability(probability);
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = Mutex::new(StdRng::seed_from_u64(seed));
        self
    }

    async fn upstream_failed(&self) -> bool {
        let mut rng = self.rng.lock().await;
        rng.gen_bool(self.failure_probability)
    }
}

/// `gen_bool` panics outside `0.0..=1.0`; a non-finite probability never fails.
fn usable_probability(probability: f64) -> f64 {
    if probability.is_finite() {
        probability.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

#[async_trait]
impl RateSource for SimulatedRateSource {
    fn is_configured(&self, provider: &str) -> bool {
        self.apis.contains_key(provider)
    }

    #[instrument(
        name = "SimulatedRateFetch",
        skip(self),
        fields(provider = %provider, pair = %pair)
    )]
    async fn fetch(&self, provider: &str, pair: &CurrencyPair) -> FetchOutcome {
        if !self.supported.contains(pair) {
            debug!("Currency pair is not supported");
            return FetchOutcome::Unavailable(UnavailableReason::UnsupportedPair);
        }
        let Some(api) = self.apis.get(provider) else {
            debug!("No API configuration for provider");
            return FetchOutcome::Unavailable(UnavailableReason::NotConfigured);
        };
        let Some(base_rate) = self.base_rates.get(pair) else {
            debug!("No simulated base rate for pair");
            return FetchOutcome::Unavailable(UnavailableReason::UnsupportedPair);
        };

        let params = render_params(&api.params_template, pair);
        debug!(
            api_url = %api.api_url,
            api_identity = %api.api_identity,
            ?params,
            "Simulating provider rate request"
        );

        if self.upstream_failed().await {
            warn!("Simulated upstream failure");
            return FetchOutcome::Unavailable(UnavailableReason::Transient);
        }

        let quoted = base_rate + self.offsets.get(provider).copied().unwrap_or(0.0);
        let Some(response) = simulated_response(&api.rate_path, pair, quoted) else {
            warn!(rate_path = ?api.rate_path, "Rate path cannot be answered");
            return FetchOutcome::Unavailable(UnavailableReason::MalformedResponse);
        };
        match extract_rate(&response, &api.rate_path, pair) {
            Some(rate) => {
                debug!(rate, "Fetched simulated rate");
                FetchOutcome::Rate(rate)
            }
            None => {
                warn!(%response, "Could not read rate from provider response");
                FetchOutcome::Unavailable(UnavailableReason::MalformedResponse)
            }
        }
    }
}
