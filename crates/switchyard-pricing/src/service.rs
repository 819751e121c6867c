//! Price service collaborators
//!
//! One implementation per service kind. Implementations never touch engine
//! state; the feed driver applies what they return.

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;
use switchyard_common::{PricingError, ServiceKind};
use tracing::{debug, instrument};

use crate::{BalanceQuote, PriceQuote};

/// Capability interface implemented per pricing service
#[async_trait]
pub trait PriceService: Send + Sync {
    /// Service display name
    fn name(&self) -> &str;

    fn kind(&self) -> ServiceKind;

    /// Whether the service should be polled repeatedly
    fn is_live(&self) -> bool {
        true
    }

    /// Fetch current prices
    async fn fetch_prices(&self) -> Result<Vec<PriceQuote>, PricingError>;

    /// Fetch unpaid balances; services without an account report none
    async fn fetch_balances(&self) -> Result<Vec<BalanceQuote>, PricingError> {
        Ok(Vec::new())
    }
}

/// Prices fixed in configuration
#[derive(Debug, Clone)]
pub struct ManualService {
    name: String,
    prices: Vec<PriceQuote>,
}

impl ManualService {
    pub fn new(name: impl Into<String>, prices: Vec<PriceQuote>) -> Self {
        Self {
            name: name.into(),
            prices,
        }
    }
}

#[async_trait]
impl PriceService for ManualService {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ServiceKind {
        ServiceKind::Manual
    }

    fn is_live(&self) -> bool {
        false
    }

    async fn fetch_prices(&self) -> Result<Vec<PriceQuote>, PricingError> {
        Ok(self.prices.clone())
    }
}

/// Layout of a price document on disk
#[derive(Debug, Default, Deserialize)]
struct PriceDocument {
    #[serde(default)]
    prices: HashMap<String, Decimal>,
    #[serde(default)]
    balances: HashMap<String, Decimal>,
}

/// Prices read from a JSON document
///
/// ```json
/// { "prices": { "x11": "0.00012" }, "balances": { "x11": "0.0004" } }
/// ```
#[derive(Debug, Clone)]
pub struct JsonFileService {
    name: String,
    path: PathBuf,
    /// Multiplier converting document units into catalog units
    price_multiplier: Decimal,
}

impl JsonFileService {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            price_multiplier: Decimal::ONE,
        }
    }

    /// Set the price multiplier
    pub fn with_price_multiplier(mut self, multiplier: Decimal) -> Self {
        self.price_multiplier = multiplier;
        self
    }

    async fn read(&self) -> Result<PriceDocument, PricingError> {
        let content = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            PricingError::ServiceUnavailable(format!("{}: {}", self.path.display(), e))
        })?;
        serde_json::from_str(&content).map_err(|e| PricingError::MalformedPayload(e.to_string()))
    }
}

#[async_trait]
impl PriceService for JsonFileService {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ServiceKind {
        ServiceKind::JsonFile
    }

    #[instrument(skip(self), fields(service = %self.name))]
    async fn fetch_prices(&self) -> Result<Vec<PriceQuote>, PricingError> {
        let document = self.read().await?;
        let mut quotes = Vec::with_capacity(document.prices.len());
        for (key, price) in document.prices {
            let price = price
                .checked_mul(self.price_multiplier)
                .ok_or(PricingError::Overflow)?;
            quotes.push(PriceQuote::new(key.to_lowercase(), price));
        }
        debug!("Read {} prices", quotes.len());
        Ok(quotes)
    }

    async fn fetch_balances(&self) -> Result<Vec<BalanceQuote>, PricingError> {
        let document = self.read().await?;
        Ok(document
            .balances
            .into_iter()
            .map(|(key, balance)| BalanceQuote::new(key.to_lowercase(), balance))
            .collect())
    }
}
