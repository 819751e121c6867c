//! Price feed driver
//!
//! One feed per pricing service. Network I/O happens without the engine
//! lock; results are applied through the engine's ingestion methods, each of
//! which takes the lock briefly.

use std::sync::Arc;
use std::time::Duration;

use switchyard_common::{Result, ServiceId};
use switchyard_pricing::{PriceService, StalePolicy};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::engine::MiningEngine;

/// Default polling period for live services
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);

pub struct PriceFeed {
    engine: MiningEngine,
    service_id: ServiceId,
    service: Arc<dyn PriceService>,
    stale: StalePolicy,
    interval: Duration,
}

impl PriceFeed {
    pub fn new(engine: MiningEngine, service_id: ServiceId, service: Arc<dyn PriceService>) -> Self {
        Self {
            engine,
            service_id,
            service,
            stale: StalePolicy::default(),
            interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_stale_policy(mut self, stale: StalePolicy) -> Self {
        self.stale = stale;
        self
    }

    /// Fetch once and apply; returns the number of prices applied
    pub async fn poll_once(&self) -> Result<usize> {
        self.engine.clear_stale_prices(self.service_id, &self.stale);

        let prices = self.service.fetch_prices().await?;
        let applied = self.engine.apply_prices(self.service_id, &prices);
        debug!(
            service = self.service.name(),
            received = prices.len(),
            applied,
            "Prices applied"
        );

        let balances = self.service.fetch_balances().await?;
        if !balances.is_empty() {
            self.engine.apply_balances(self.service_id, &balances);
        }
        Ok(applied)
    }

    /// Poll until shutdown; services that are not live are polled once
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        if !self.service.is_live() {
            if let Err(e) = self.poll_once().await {
                warn!(service = self.service.name(), "Price load failed: {}", e);
            }
            return;
        }

        info!(
            service = self.service.name(),
            interval_secs = self.interval.as_secs(),
            "Price feed started"
        );
        let mut ticker = tokio::time::interval(self.interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.poll_once().await {
                        warn!(service = self.service.name(), "Price fetch failed: {}", e);
                    }
                }
                _ = shutdown.changed() => break,
            }
        }
        debug!(service = self.service.name(), "Price feed stopped");
    }
}
