//! # Switchyard Engine
//!
//! Decides which single workload should run and supervises its process.
//!
//! ## Tick
//!
//! Each externally timed tick, under one lock:
//!
//! ```text
//! dead check → donation flip → max-time restart → price floor
//!   → rank usable → forced switch on ban → switch hysteresis
//!   → dead decay → hold checks → stop + cooldown-gated start
//! ```
//!
//! ## Hysteresis
//!
//! A better candidate only replaces the running workload once
//! - the running workload has met the minimum run time,
//! - the profit ratio clears the minimum-profit threshold, and
//! - the candidate has stayed best for the (optionally dynamic) switch time.

pub mod activity;
pub mod catalog;
pub mod donation;
pub mod engine;
pub mod feed;
pub mod notify;
pub mod remote;
pub mod supervisor;

pub use activity::{ActivityAction, ActivityLog, ActivityRecord, ActivityWorkload};
pub use catalog::{ServiceState, WorkloadCatalog};
pub use donation::DonationScheduler;
pub use engine::{
    EngineBuilder, EngineStatus, MiningEngine, PendingSwitch, TickOutcome, WorkloadStatus,
    WorkloadView,
};
pub use feed::PriceFeed;
pub use notify::{ActivityNotifier, Notification};
pub use remote::RemoteMessage;
pub use supervisor::{
    CompletedRun, LaunchSpec, OsLauncher, ProcessLauncher, ProcessSupervisor, RunningProcess,
    WindowStyle,
};

use chrono::Duration;
use rust_decimal::Decimal;
use switchyard_common::{KillMode, TrayMode, FALLBACK_DYNAMIC_SWITCH_OFFSET};

/// Bound on [`minutes`] results, in milliseconds (about 31,000 years)
const MAX_MILLISECONDS: f64 = 1e15;

/// Convert fractional minutes to a duration, rounding to the millisecond
///
/// Non-finite input maps to zero; out-of-range input saturates.
pub fn minutes(value: f64) -> Duration {
    if !value.is_finite() {
        return Duration::zero();
    }
    let millis = (value * 60_000.0)
        .round()
        .clamp(-MAX_MILLISECONDS, MAX_MILLISECONDS);
    Duration::milliseconds(millis as i64)
}

/// Fractional minutes of a duration
pub fn as_minutes(value: Duration) -> f64 {
    value.num_milliseconds() as f64 / 60_000.0
}

/// Profit-ratio dependent switch time
///
/// ```text
/// required = switch_time / ratio^power + offset
/// ```
///
/// With the default offset the curve passes through `switch_time` at
/// `ratio == pivot`: larger leads switch sooner, smaller leads wait longer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DynamicSwitch {
    /// Exponent applied to the profit ratio
    pub power: f64,
    /// Additive offset in minutes
    pub offset_minutes: f64,
}

impl DynamicSwitch {
    /// Build the curve, deriving the offset from the pivot when not given
    pub fn new(switch_time: Duration, power: f64, pivot: f64, offset: Option<f64>) -> Self {
        let offset_minutes = offset.unwrap_or_else(|| {
            let switch = as_minutes(switch_time);
            if pivot.powf(power) != 0.0 {
                switch - switch * (1.0 / pivot).powf(power)
            } else {
                FALLBACK_DYNAMIC_SWITCH_OFFSET
            }
        });
        Self {
            power,
            offset_minutes,
        }
    }

    /// Required pending duration for a profit ratio; falls back to the flat
    /// switch time when the ratio does not yield a finite curve value
    pub fn required(&self, switch_time: Duration, ratio: f64) -> Duration {
        let value = as_minutes(switch_time) / ratio.powf(self.power) + self.offset_minutes;
        if ratio > 0.0 && value.is_finite() {
            minutes(value)
        } else {
            switch_time
        }
    }
}

/// Donation cycle settings
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DonationConfig {
    /// Length of one automatic + donation cycle
    pub frequency: Duration,
    /// Share of the cycle spent donating, `0 <= fraction < 1`
    pub fraction: f64,
}

impl Default for DonationConfig {
    fn default() -> Self {
        Self {
            frequency: Duration::minutes(switchyard_common::DEFAULT_DONATION_FREQUENCY_MINUTES),
            fraction: switchyard_common::DEFAULT_DONATION_PERCENTAGE / 100.0,
        }
    }
}

/// Engine configuration snapshot
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Minimum run time before a switch may happen
    pub min_time: Duration,
    /// Maximum run time before a restart; zero disables
    pub max_time: Duration,
    /// Time a candidate must stay best before switching; zero disables
    pub switch_time: Duration,
    /// Cooldown between a stop and the next start
    pub delay: Duration,
    /// Time a crashed workload stays excluded
    pub dead_time: Duration,
    /// Dynamic switch curve; `None` uses the flat switch time
    pub dynamic_switch: Option<DynamicSwitch>,
    /// Global minimum profit ratio
    pub min_profit: Decimal,
    /// Net-earn floor in native units
    pub min_price: Decimal,
    /// Rank by trailing average instead of instantaneous earn
    pub mine_by_average: bool,
    /// Hold instead of switching onto an outlier price
    pub ignore_outliers: bool,
    pub kill_mode: KillMode,
    pub tray_mode: TrayMode,
    pub donation: DonationConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            min_time: Duration::zero(),
            max_time: Duration::zero(),
            switch_time: Duration::zero(),
            delay: Duration::zero(),
            dead_time: Duration::minutes(5),
            dynamic_switch: None,
            min_profit: Decimal::ONE,
            min_price: Decimal::ZERO,
            mine_by_average: false,
            ignore_outliers: false,
            kill_mode: KillMode::Tree,
            tray_mode: TrayMode::Minimized,
            donation: DonationConfig::default(),
        }
    }
}
