//! Rate abstractions and core types

use crate::core::pair::CurrencyPair;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// A money-transfer service whose exchange rates are tracked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provider {
    pub name: String,
    pub registration_link: String,
}

/// Latest known rate for one (provider, pair) key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rate {
    pub provider: String,
    pub pair: CurrencyPair,
    pub rate: f64,
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnavailableReason {
    /// Pair is outside the supported set.
    UnsupportedPair,
    /// Provider has no adapter configuration.
    NotConfigured,
    /// Upstream failed for this call; the next pass may succeed.
    Transient,
    /// Upstream answered but no rate could be read from it.
    MalformedResponse,
}

impl Display for UnavailableReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                UnavailableReason::UnsupportedPair => "unsupported pair",
                UnavailableReason::NotConfigured => "provider not configured",
                UnavailableReason::Transient => "transient upstream failure",
                UnavailableReason::MalformedResponse => "malformed upstream response",
            }
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FetchOutcome {
    Rate(f64),
    Unavailable(UnavailableReason),
}

impl FetchOutcome {
    pub fn rate(&self) -> Option<f64> {
        match self {
            FetchOutcome::Rate(value) => Some(*value),
            FetchOutcome::Unavailable(_) => None,
        }
    }
}

/// Produces rates for a (provider, pair) key. Failures are reported through
/// [`FetchOutcome::Unavailable`], never as errors.
#[async_trait]
pub trait RateSource: Send + Sync {
    /// Whether the source knows how to reach `provider`.
    fn is_configured(&self, provider: &str) -> bool;

    async fn fetch(&self, provider: &str, pair: &CurrencyPair) -> FetchOutcome;
}
