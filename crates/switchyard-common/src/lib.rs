//! # Switchyard Common
//!
//! Shared types, errors, and the profitability model for Switchyard.
//!
//! ## Core Types
//!
//! - [`Workload`]: one algorithm/service pairing with profitability inputs,
//!   execution parameters, and runtime flags
//! - [`PowerPricing`]/[`ProfitInputs`]: fixed-point profit model inputs
//! - [`MiningMode`]: Stopped, Automatic, or Donation
//! - [`Clock`]: injectable time source
//!
//! ## Profit Formula
//!
//! ```text
//! Net = (Price/1000 × Hashrate/1000 − Fees) × Weight − Power/1000 × 24 × Tariff / Exchange
//! ```

pub mod error;
pub mod types;

// Re-export commonly used types at crate root
pub use error::{LaunchError, PricingError, Result, SwitchyardError};
pub use types::{
    clock::{Clock, ManualClock, SystemClock},
    mode::{KillMode, MiningMode, ProcessPriority, TrayMode},
    profit::{gross_earn, net_earn, power_cost, profit_ratio, PowerPricing, ProfitInputs},
    workload::{ExecSpec, ServiceId, ServiceKind, ServiceRef, Workload, WorkloadId},
};

/// Switchyard version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default donation cycle length in minutes
pub const DEFAULT_DONATION_FREQUENCY_MINUTES: i64 = 240;

/// Default share of each donation cycle spent donating (2%)
pub const DEFAULT_DONATION_PERCENTAGE: f64 = 2.0;

/// Default exponent of the dynamic switch-time curve
pub const DEFAULT_DYNAMIC_SWITCH_POWER: f64 = 2.0;

/// Default profit ratio at which the dynamic switch time equals the flat one
pub const DEFAULT_DYNAMIC_SWITCH_PIVOT: f64 = 1.05;

/// Dynamic switch offset (minutes) used when `pivot^power` evaluates to zero
pub const FALLBACK_DYNAMIC_SWITCH_OFFSET: f64 = 0.5;

/// Prices older than this many minutes are zeroed before the next fetch
pub const DEFAULT_STALE_PRICE_MINUTES: i64 = 30;
