//! Currency pair identifiers

use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PairParseError {
    #[error("currency pair '{0}' must look like SOURCE_TARGET, e.g. USD_EUR")]
    Format(String),
    #[error("'{code}' in currency pair '{pair}' is not a three letter currency code")]
    Code { pair: String, code: String },
    #[error("currency pair '{0}' quotes a currency against itself")]
    SameCurrency(String),
}

/// An ordered (source, target) pair of currency codes, normalized to uppercase.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CurrencyPair {
    source: String,
    target: String,
}

impl CurrencyPair {
    pub fn new(source: &str, target: &str) -> Result<Self, PairParseError> {
        format!("{source}_{target}").parse()
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn target(&self) -> &str {
        &self.target
    }
}

fn parse_code(pair: &str, code: &str) -> Result<String, PairParseError> {
    if code.len() == 3 && code.chars().all(|c| c.is_ascii_alphabetic()) {
        Ok(code.to_ascii_uppercase())
    } else {
        Err(PairParseError::Code {
            pair: pair.to_string(),
            code: code.to_string(),
        })
    }
}

impl FromStr for CurrencyPair {
    type Err = PairParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let (source, target) = trimmed
            .split_once('_')
            .ok_or_else(|| PairParseError::Format(trimmed.to_string()))?;

        let source = parse_code(trimmed, source)?;
        let target = parse_code(trimmed, target)?;
        if source == target {
            return Err(PairParseError::SameCurrency(trimmed.to_string()));
        }

        Ok(CurrencyPair { source, target })
    }
}

impl TryFrom<String> for CurrencyPair {
    type Error = PairParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<CurrencyPair> for String {
    fn from(pair: CurrencyPair) -> Self {
        pair.to_string()
    }
}

impl Display for CurrencyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}_{}", self.source, self.target)
    }
}
