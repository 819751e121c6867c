//! Price history collaborator
//!
//! Given a price sample, the history reports whether the sample is a
//! statistical outlier and the trailing average over its window. The
//! statistics themselves live outside this workspace; the engine only
//! consumes the result.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use switchyard_common::WorkloadId;

/// Result of observing one price sample
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriceStat {
    pub outlier: bool,
    pub average: Decimal,
}

/// Outlier and trailing-average source
pub trait PriceHistory: Send {
    fn observe(&mut self, workload: WorkloadId, price: Decimal, at: DateTime<Utc>) -> PriceStat;
}

/// History that flags nothing and averages nothing
#[derive(Debug, Default, Clone, Copy)]
pub struct PassthroughHistory;

impl PriceHistory for PassthroughHistory {
    fn observe(&mut self, _workload: WorkloadId, price: Decimal, _at: DateTime<Utc>) -> PriceStat {
        PriceStat {
            outlier: false,
            average: price,
        }
    }
}
