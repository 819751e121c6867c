//! Profit Model - Net = (Earn - Fees) × Weight - PowerCost
//!
//! All monetary quantities are fixed-point `Decimal`s:
//! - Earn: price per unit of hashrate per day, scaled by the rated hashrate
//! - Fees: service fees in native units per day
//! - Weight: operator bias towards or away from a service
//! - PowerCost: rated power draw over 24h at the local tariff, converted to
//!   native units through the current exchange rate

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::PricingError;

const THOUSAND: Decimal = Decimal::ONE_THOUSAND;
const HOURS_PER_DAY: i64 = 24;

/// Shared power tariff and exchange rate
///
/// Both values are owned by the engine and updated by an external
/// collaborator; a snapshot is taken under the engine lock before any
/// profitability evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PowerPricing {
    /// Electricity cost per kWh in fiat
    pub cost_per_kwh: Decimal,
    /// Fiat per native unit
    pub exchange: Decimal,
}

impl PowerPricing {
    pub fn new(cost_per_kwh: Decimal, exchange: Decimal) -> Self {
        Self {
            cost_per_kwh,
            exchange,
        }
    }

    /// Power cost ignored entirely (used when no tariff is configured)
    pub fn free() -> Self {
        Self::new(Decimal::ZERO, Decimal::ONE)
    }
}

/// Inputs to the profit model for one workload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfitInputs {
    /// Native units per unit hashrate per day
    pub price: Decimal,
    /// Rated hashrate
    pub hashrate: Decimal,
    /// Rated power draw in watts
    pub power: Decimal,
    /// Fees in native units per day
    pub fees: Decimal,
    /// Weight multiplier
    pub weight: Decimal,
}

/// Gross revenue: `price/1000 * hashrate/1000`
#[inline]
pub fn gross_earn(price: Decimal, hashrate: Decimal) -> Result<Decimal, PricingError> {
    (price / THOUSAND)
        .checked_mul(hashrate)
        .map(|earn| earn / THOUSAND)
        .ok_or(PricingError::Overflow)
}

/// Daily power cost in native units: `power/1000 * 24 * costPerKwh / exchange`
///
/// A zero exchange rate yields no power cost rather than a division fault.
#[inline]
pub fn power_cost(power: Decimal, pricing: &PowerPricing) -> Result<Decimal, PricingError> {
    let fiat = (power / THOUSAND)
        .checked_mul(Decimal::from(HOURS_PER_DAY))
        .and_then(|kwh| kwh.checked_mul(pricing.cost_per_kwh))
        .ok_or(PricingError::Overflow)?;
    if pricing.exchange.is_zero() {
        return Ok(Decimal::ZERO);
    }
    fiat.checked_div(pricing.exchange)
        .ok_or(PricingError::Overflow)
}

/// Net revenue: `(gross - fees) * weight - powerCost`
///
/// Any intermediate that leaves the `Decimal` range is reported as
/// [`PricingError::Overflow`].
#[inline]
pub fn net_earn(inputs: &ProfitInputs, pricing: &PowerPricing) -> Result<Decimal, PricingError> {
    let power = power_cost(inputs.power, pricing)?;
    gross_earn(inputs.price, inputs.hashrate)?
        .checked_sub(inputs.fees)
        .and_then(|net| net.checked_mul(inputs.weight))
        .and_then(|net| net.checked_sub(power))
        .ok_or(PricingError::Overflow)
}

/// Ratio of a candidate's net earn over the running workload's
///
/// A running workload that earns nothing (or loses) makes any better
/// candidate infinitely preferable; otherwise the plain quotient is used.
pub fn profit_ratio(best: Decimal, running: Decimal) -> Decimal {
    if running <= Decimal::ZERO {
        return if best > running {
            Decimal::MAX
        } else {
            Decimal::ONE
        };
    }
    best.checked_div(running).unwrap_or(Decimal::MAX)
}
