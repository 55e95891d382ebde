use crate::core::pair::CurrencyPair;
use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::{fs, path::PathBuf};
use thiserror::Error;
use tracing::debug;

pub const DEFAULT_REFRESH_INTERVAL_SECS: u64 = 300;
pub const DEFAULT_FAILURE_PROBABILITY: f64 = 0.1;

/// Deepest array position a `rate_path` may step into.
pub const MAX_RATE_PATH_INDEX: usize = 64;

const TEMPLATE_PLACEHOLDERS: [&str; 2] = ["{source}", "{target}"];

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("refresh_interval_secs must be greater than zero")]
    ZeroInterval,
    #[error("supported_pairs must not be empty")]
    NoSupportedPairs,
    #[error("currency pair {0} is listed more than once")]
    DuplicatePair(String),
    #[error("provider name must not be empty")]
    EmptyProviderName,
    #[error("provider '{0}' is configured more than once")]
    DuplicateProvider(String),
    #[error("provider '{provider}': api_url '{url}' must be an http(s) URL")]
    InvalidApiUrl { provider: String, url: String },
    #[error("provider '{0}': rate_path must not be empty")]
    EmptyRatePath(String),
    #[error("provider '{provider}': rate_path index {index} is too large")]
    RatePathIndexTooLarge { provider: String, index: usize },
    #[error("provider '{provider}': template '{template}' uses an unknown placeholder")]
    UnknownPlaceholder { provider: String, template: String },
    #[error("failure_probability {0} must be between 0 and 1")]
    InvalidFailureProbability(f64),
    #[error("{section} references unknown provider '{provider}'")]
    UnknownProvider {
        section: &'static str,
        provider: String,
    },
    #[error("seed rate for '{provider}' {pair} must be positive")]
    NonPositiveSeedRate { provider: String, pair: String },
    #[error("seed rate for '{provider}' uses unsupported pair {pair}")]
    UnsupportedSeedPair { provider: String, pair: String },
    #[error("simulation base rate for {0} must be a positive number")]
    InvalidBaseRate(String),
    #[error("simulation offset for '{0}' must be a finite number")]
    NonFiniteOffset(String),
    #[error("simulated quote for '{provider}' {pair} would not be positive")]
    NonPositiveQuote { provider: String, pair: String },
}

/// One step into a provider's JSON response: an object key or an array index.
/// Keys may contain `{source}` / `{target}` placeholders.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(untagged)]
pub enum RatePathSegment {
    Index(usize),
    Key(String),
}

/// How to reach a provider's rate API.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ApiConfig {
    pub api_url: String,
    #[serde(default)]
    pub params_template: BTreeMap<String, String>,
    pub rate_path: Vec<RatePathSegment>,
    /// Name the provider's API uses for itself.
    pub api_identity: String,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ProviderConfig {
    pub name: String,
    pub registration_link: String,
    /// Providers without an API section are registered but never refreshed.
    pub api: Option<ApiConfig>,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct SimulationConfig {
    #[serde(default = "default_failure_probability")]
    pub failure_probability: f64,
    #[serde(default)]
    pub base_rates: BTreeMap<CurrencyPair, f64>,
    /// Per-provider adjustment added to the base rate.
    #[serde(default)]
    pub offsets: BTreeMap<String, f64>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        SimulationConfig {
            failure_probability: DEFAULT_FAILURE_PROBABILITY,
            base_rates: BTreeMap::new(),
            offsets: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct SeedRate {
    pub provider: String,
    pub pair: CurrencyPair,
    pub rate: f64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AppConfig {
    #[serde(default = "default_refresh_interval_secs")]
    pub refresh_interval_secs: u64,
    pub supported_pairs: Vec<CurrencyPair>,
    pub providers: Vec<ProviderConfig>,
    #[serde(default)]
    pub simulation: SimulationConfig,
    #[serde(default)]
    pub seed_rates: Vec<SeedRate>,
    pub data_path: Option<String>,
}

fn default_refresh_interval_secs() -> u64 {
    DEFAULT_REFRESH_INTERVAL_SECS
}

fn default_failure_probability() -> f64 {
    DEFAULT_FAILURE_PROBABILITY
}

fn has_only_known_placeholders(template: &str) -> bool {
    let mut stripped = template.to_string();
    for placeholder in TEMPLATE_PLACEHOLDERS {
        stripped = stripped.replace(placeholder, "");
    }
    !stripped.contains('{') && !stripped.contains('}')
}

impl ApiConfig {
    fn validate(&self, provider: &str) -> Result<(), ConfigError> {
        if !(self.api_url.starts_with("http://") || self.api_url.starts_with("https://")) {
            return Err(ConfigError::InvalidApiUrl {
                provider: provider.to_string(),
                url: self.api_url.clone(),
            });
        }
        if self.rate_path.is_empty() {
            return Err(ConfigError::EmptyRatePath(provider.to_string()));
        }

        for segment in &self.rate_path {
            if let RatePathSegment::Index(index) = segment {
                if *index > MAX_RATE_PATH_INDEX {
                    return Err(ConfigError::RatePathIndexTooLarge {
                        provider: provider.to_string(),
                        index: *index,
                    });
                }
            }
        }

        let path_keys = self.rate_path.iter().filter_map(|segment| match segment {
            RatePathSegment::Key(key) => Some(key.as_str()),
            RatePathSegment::Index(_) => None,
        });
        for template in self.params_template.values().map(String::as_str).chain(path_keys) {
            if !has_only_known_placeholders(template) {
                return Err(ConfigError::UnknownPlaceholder {
                    provider: provider.to_string(),
                    template: template.to_string(),
                });
            }
        }
        Ok(())
    }
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        debug!("Loading default config");
        let config_path = Self::default_config_path()?;
        Self::load_from_path(&config_path)
    }

    pub fn default_config_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("com", "ratefinder", "ratefinder")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.config_dir().join("config.yaml"))
    }

    pub fn default_data_path(&self) -> Result<PathBuf> {
        if let Some(custom_path) = &self.data_path {
            return Ok(PathBuf::from(custom_path));
        }
        let proj_dirs = ProjectDirs::from("com", "ratefinder", "ratefinder")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.data_dir().to_path_buf())
    }

    pub fn load_from_path<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let config_str = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        Self::from_yaml(&config_str)
            .with_context(|| format!("Invalid config file: {}", path.as_ref().display()))
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml).context("Failed to parse config")?;
        config.validate()?;
        debug!("Successfully loaded config");
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.refresh_interval_secs == 0 {
            return Err(ConfigError::ZeroInterval);
        }
        if self.supported_pairs.is_empty() {
            return Err(ConfigError::NoSupportedPairs);
        }

        let mut pairs = HashSet::new();
        for pair in &self.supported_pairs {
            if !pairs.insert(pair) {
                return Err(ConfigError::DuplicatePair(pair.to_string()));
            }
        }

        let mut names = HashSet::new();
        for provider in &self.providers {
            if provider.name.trim().is_empty() {
                return Err(ConfigError::EmptyProviderName);
            }
            if !names.insert(provider.name.as_str()) {
                return Err(ConfigError::DuplicateProvider(provider.name.clone()));
            }
            if let Some(api) = &provider.api {
                api.validate(&provider.name)?;
            }
        }

        let probability = self.simulation.failure_probability;
        if !(0.0..=1.0).contains(&probability) {
            return Err(ConfigError::InvalidFailureProbability(probability));
        }

        for (provider, offset) in &self.simulation.offsets {
            if !names.contains(provider.as_str()) {
                return Err(ConfigError::UnknownProvider {
                    section: "simulation.offsets",
                    provider: provider.clone(),
                });
            }
            if !offset.is_finite() {
                return Err(ConfigError::NonFiniteOffset(provider.clone()));
            }
        }
        for (pair, base) in &self.simulation.base_rates {
            if !(base.is_finite() && *base > 0.0) {
                return Err(ConfigError::InvalidBaseRate(pair.to_string()));
            }
            for provider in self.providers.iter().filter(|p| p.api.is_some()) {
                let offset = self.simulation.offsets.get(&provider.name).copied().unwrap_or(0.0);
                if base + offset <= 0.0 {
                    return Err(ConfigError::NonPositiveQuote {
                        provider: provider.name.clone(),
                        pair: pair.to_string(),
                    });
                }
            }
        }

        for seed in &self.seed_rates {
            if !names.contains(seed.provider.as_str()) {
                return Err(ConfigError::UnknownProvider {
                    section: "seed_rates",
                    provider: seed.provider.clone(),
                });
            }
            if !pairs.contains(&seed.pair) {
                return Err(ConfigError::UnsupportedSeedPair {
                    provider: seed.provider.clone(),
                    pair: seed.pair.to_string(),
                });
            }
            if !(seed.rate.is_finite() && seed.rate > 0.0) {
                return Err(ConfigError::NonPositiveSeedRate {
                    provider: seed.provider.clone(),
                    pair: seed.pair.to_string(),
                });
            }
        }

        Ok(())
    }

    pub fn provider_api(&self, name: &str) -> Option<&ApiConfig> {
        self.providers
            .iter()
            .find(|p| p.name == name)
            .and_then(|p| p.api.as_ref())
    }
}
