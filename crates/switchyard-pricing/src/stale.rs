//! Stale price policy

use chrono::{DateTime, Duration, Utc};

/// Prices not refreshed within `stale_after` are zeroed before the next fetch
#[derive(Debug, Clone, Copy)]
pub struct StalePolicy {
    pub stale_after: Duration,
}

impl StalePolicy {
    pub fn new(stale_after: Duration) -> Self {
        Self { stale_after }
    }

    /// A service that never reported is not stale, only empty
    pub fn is_stale(&self, last_updated: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
        match last_updated {
            Some(at) => at + self.stale_after <= now,
            None => false,
        }
    }
}

impl Default for StalePolicy {
    fn default() -> Self {
        Self::new(Duration::minutes(
            switchyard_common::DEFAULT_STALE_PRICE_MINUTES,
        ))
    }
}
