//! Core business logic abstractions

pub mod config;
pub mod log;
pub mod pair;
pub mod rate;
pub mod store;

// Re-export main types for cleaner imports
pub use pair::CurrencyPair;
pub use rate::{FetchOutcome, Provider, Rate, RateSource, UnavailableReason};
pub use store::{RateBatch, RateStore, StoreError};
