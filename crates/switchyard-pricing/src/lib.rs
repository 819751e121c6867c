//! # Switchyard Pricing
//!
//! Collaborator interfaces that feed prices and balances into the engine.
//!
//! Each pricing service implements [`PriceService`]: it is polled on its own
//! task, performs its I/O without holding the engine lock, and returns
//! [`PriceQuote`]s keyed by the service's own algorithm names. The engine
//! resolves those keys to workloads through a [`KeyMap`] and applies them
//! under its lock.
//!
//! - [`ManualService`]: prices fixed in configuration
//! - [`JsonFileService`]: prices read from a JSON document written by an
//!   external script
//! - [`PriceHistory`]: outlier flag and trailing average per sample

pub mod history;
pub mod keys;
pub mod service;
pub mod stale;

pub use history::{PassthroughHistory, PriceHistory, PriceStat};
pub use keys::KeyMap;
pub use service::{JsonFileService, ManualService, PriceService};
pub use stale::StalePolicy;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Price reported by a service for one of its algorithm keys
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceQuote {
    /// Service-side algorithm or price key
    pub key: String,
    /// Native units per unit hashrate per day
    pub price: Decimal,
}

impl PriceQuote {
    pub fn new(key: impl Into<String>, price: Decimal) -> Self {
        Self {
            key: key.into(),
            price,
        }
    }
}

/// Unpaid balance reported by a service for one of its algorithm keys
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceQuote {
    pub key: String,
    pub balance: Decimal,
}

impl BalanceQuote {
    pub fn new(key: impl Into<String>, balance: Decimal) -> Self {
        Self {
            key: key.into(),
            balance,
        }
    }
}
