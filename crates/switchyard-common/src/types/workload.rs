//! Workload - one algorithm/service pairing
//!
//! A workload carries three groups of fields:
//! - Identity and execution parameters, fixed at catalog load
//! - Profitability inputs, mutated by price collaborators under the engine lock
//! - Runtime flags (ban, dead, outlier, price floor), mutated by the engine

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::mode::MiningMode;
use crate::error::PricingError;
use super::profit::{self, PowerPricing, ProfitInputs};

/// Stable workload identifier, assigned once at catalog load
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WorkloadId(pub u32);

impl fmt::Display for WorkloadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Index of a pricing service in the engine's service table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServiceId(pub usize);

/// Pricing service implementation backing a group of workloads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceKind {
    /// Prices fixed in configuration
    Manual,
    /// Prices read from a JSON document on disk
    JsonFile,
}

/// Owning service of a workload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceRef {
    pub id: ServiceId,
    /// Display name, matched case-sensitively by ban toggles
    pub name: String,
    pub kind: ServiceKind,
}

/// Folder, command and argument string for one launch variant
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecSpec {
    pub folder: String,
    pub command: String,
    pub arguments: String,
}

impl ExecSpec {
    pub fn new(
        folder: impl Into<String>,
        command: impl Into<String>,
        arguments: impl Into<String>,
    ) -> Self {
        Self {
            folder: folder.into(),
            command: command.into(),
            arguments: arguments.into(),
        }
    }

    pub fn has_command(&self) -> bool {
        !self.command.trim().is_empty()
    }

    /// Working directory, present only when a folder is configured
    pub fn working_dir(&self) -> Option<PathBuf> {
        let folder = self.folder.trim();
        (!folder.is_empty()).then(|| PathBuf::from(folder))
    }

    /// Executable path: the folder joined with the command when a folder is
    /// configured, the bare command otherwise
    pub fn program(&self) -> PathBuf {
        match self.working_dir() {
            Some(dir) => dir.join(self.command.trim()),
            None => PathBuf::from(self.command.trim()),
        }
    }
}

/// One candidate workload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workload {
    /// Stable id, never reused
    pub id: WorkloadId,
    /// Algorithm key (e.g. "x11")
    pub algo: String,
    /// Algorithm display name (e.g. "X11")
    pub name: String,
    /// Owning service
    pub service: ServiceRef,
    /// Service-specific price key overriding the algorithm key
    pub price_id: Option<String>,

    /// Current price, native units per unit hashrate per day
    pub price: Decimal,
    /// Trailing average price from the history collaborator
    pub average_price: Option<Decimal>,
    /// Rated hashrate
    pub hashrate: Decimal,
    /// Rated power draw in watts
    pub power: Decimal,
    /// Fees in native units per day
    pub fees: Decimal,
    /// Weight multiplier applied before power cost
    pub weight: Decimal,
    /// Minimum profit ratio required to switch onto this workload from
    /// another service
    pub min_profit: Decimal,
    /// Unpaid balance reported by the service for this workload
    pub balance: Decimal,

    /// Launch variant used in automatic mode
    pub normal: ExecSpec,
    /// Launch variant used in donation mode
    pub donation: ExecSpec,
    /// Launch in a visible window instead of capturing output
    pub use_window: bool,
    /// Requested OS priority (blank for default)
    pub priority: String,
    /// CPU affinity bitmask (non-positive for none)
    pub affinity: i64,

    /// Toggled by the operator, sticky until toggled again
    pub banned: bool,
    /// Set when the process crashed or failed to launch
    pub dead_since: Option<DateTime<Utc>>,
    /// Set by the history collaborator
    pub outlier: bool,
    /// Recomputed every tick against the configured price floor
    pub below_min_price: bool,
    /// Accumulated time mined, excluding the current run
    #[serde(with = "duration_secs")]
    pub time_mining: Duration,
}

impl Workload {
    /// Create a workload with neutral profitability and no launch command
    pub fn new(
        id: WorkloadId,
        algo: impl Into<String>,
        name: impl Into<String>,
        service: ServiceRef,
    ) -> Self {
        Self {
            id,
            algo: algo.into(),
            name: name.into(),
            service,
            price_id: None,
            price: Decimal::ZERO,
            average_price: None,
            hashrate: Decimal::ZERO,
            power: Decimal::ZERO,
            fees: Decimal::ZERO,
            weight: Decimal::ONE,
            min_profit: Decimal::ONE,
            balance: Decimal::ZERO,
            normal: ExecSpec::default(),
            donation: ExecSpec::default(),
            use_window: false,
            priority: String::new(),
            affinity: 0,
            banned: false,
            dead_since: None,
            outlier: false,
            below_min_price: false,
            time_mining: Duration::zero(),
        }
    }

    /// Service display name
    pub fn service_name(&self) -> &str {
        &self.service.name
    }

    /// Launch variant for a mode
    pub fn exec(&self, mode: MiningMode) -> &ExecSpec {
        if mode.uses_donation_command() {
            &self.donation
        } else {
            &self.normal
        }
    }

    pub fn has_command(&self, mode: MiningMode) -> bool {
        self.exec(mode).has_command()
    }

    fn inputs_at(&self, price: Decimal) -> ProfitInputs {
        ProfitInputs {
            price,
            hashrate: self.hashrate,
            power: self.power,
            fees: self.fees,
            weight: self.weight,
        }
    }

    /// Gross revenue at the current price
    pub fn earn(&self) -> Result<Decimal, PricingError> {
        profit::gross_earn(self.price, self.hashrate)
    }

    /// Daily power cost in native units
    pub fn power_cost(&self, pricing: &PowerPricing) -> Result<Decimal, PricingError> {
        profit::power_cost(self.power, pricing)
    }

    /// Net revenue at the current price
    pub fn net_earn(&self, pricing: &PowerPricing) -> Result<Decimal, PricingError> {
        profit::net_earn(&self.inputs_at(self.price), pricing)
    }

    /// Net revenue at the trailing average price, falling back to the
    /// current price until the history collaborator has reported
    pub fn net_average(&self, pricing: &PowerPricing) -> Result<Decimal, PricingError> {
        let price = self.average_price.unwrap_or(self.price);
        profit::net_earn(&self.inputs_at(price), pricing)
    }

    /// Net revenue used for ranking
    pub fn net_for_ranking(
        &self,
        pricing: &PowerPricing,
        by_average: bool,
    ) -> Result<Decimal, PricingError> {
        if by_average {
            self.net_average(pricing)
        } else {
            self.net_earn(pricing)
        }
    }

    /// Dead while `now <= dead_since + cooldown`
    pub fn is_dead(&self, now: DateTime<Utc>, cooldown: Duration) -> bool {
        self.dead_since
            .map(|since| now <= since + cooldown)
            .unwrap_or(false)
    }

    /// Candidate for selection in the given mode
    pub fn is_usable(&self, now: DateTime<Utc>, cooldown: Duration, mode: MiningMode) -> bool {
        !self.banned
            && !self.is_dead(now, cooldown)
            && !self.below_min_price
            && self.has_command(mode)
    }
}

mod duration_secs {
    use chrono::Duration;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(value.num_seconds())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::seconds(i64::deserialize(deserializer)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn workload() -> Workload {
        let service = ServiceRef {
            id: ServiceId(0),
            name: "Alpha".to_string(),
            kind: ServiceKind::Manual,
        };
        let mut w = Workload::new(WorkloadId(1), "x11", "X11", service);
        w.normal = ExecSpec::new("", "miner", "-a x11");
        w.hashrate = dec!(1000);
        w.price = dec!(10);
        w
    }

    #[test]
    fn test_usable_requires_command_for_mode() {
        let now = Utc::now();
        let w = workload();
        assert!(w.is_usable(now, Duration::minutes(5), MiningMode::Automatic));
        assert!(!w.is_usable(now, Duration::minutes(5), MiningMode::Donation));
    }

    #[test]
    fn test_dead_until_cooldown_elapsed() {
        let now = Utc::now();
        let mut w = workload();
        w.dead_since = Some(now);
        let cooldown = Duration::minutes(5);

        assert!(w.is_dead(now + Duration::minutes(1), cooldown));
        assert!(w.is_dead(now + cooldown, cooldown));
        assert!(!w.is_dead(now + Duration::minutes(6), cooldown));
        assert!(!w.is_usable(now + Duration::minutes(1), cooldown, MiningMode::Automatic));
        assert!(w.is_usable(now + Duration::minutes(6), cooldown, MiningMode::Automatic));
    }

    #[test]
    fn test_banned_and_price_floor_exclude() {
        let now = Utc::now();
        let mut w = workload();
        w.banned = true;
        assert!(!w.is_usable(now, Duration::zero(), MiningMode::Automatic));
        w.banned = false;
        w.below_min_price = true;
        assert!(!w.is_usable(now, Duration::zero(), MiningMode::Automatic));
    }

    #[test]
    fn test_net_average_falls_back_to_price() {
        let w = workload();
        let pricing = PowerPricing::free();
        assert_eq!(w.net_average(&pricing), w.net_earn(&pricing));

        let mut averaged = workload();
        averaged.average_price = Some(dec!(20));
        assert_eq!(averaged.net_average(&pricing), Ok(dec!(0.02)));
        assert!(
            averaged.net_for_ranking(&pricing, true).unwrap()
                > averaged.net_for_ranking(&pricing, false).unwrap()
        );
    }

    #[test]
    fn test_exec_program_joins_folder() {
        let spec = ExecSpec::new("/opt/miners", "ccminer", "-a x11");
        assert_eq!(spec.program(), PathBuf::from("/opt/miners/ccminer"));
        assert_eq!(spec.working_dir(), Some(PathBuf::from("/opt/miners")));

        let bare = ExecSpec::new("  ", "ccminer", "");
        assert_eq!(bare.program(), PathBuf::from("ccminer"));
        assert_eq!(bare.working_dir(), None);
    }
}
