//! Activity log
//!
//! One CSV row per start/stop/death transition. The header is written when
//! the file is created.

use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use switchyard_common::{MiningMode, PowerPricing, Result, Workload};

pub const ACTIVITY_HEADER: &str =
    "time,action,mode,service,algo,price,earn,fees,power,netearn,exchange,servicebalance";

/// Transition recorded in the activity log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActivityAction {
    Start,
    Stop,
    Dead,
    DonationStart,
    DonationStop,
    DonationDead,
}

impl ActivityAction {
    /// Pick the donation variant when the run was a donation run
    pub fn for_mode(self, mode: MiningMode) -> Self {
        if !mode.uses_donation_command() {
            return self;
        }
        match self {
            ActivityAction::Start => ActivityAction::DonationStart,
            ActivityAction::Stop => ActivityAction::DonationStop,
            ActivityAction::Dead => ActivityAction::DonationDead,
            other => other,
        }
    }
}

impl fmt::Display for ActivityAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ActivityAction::Start => "Start",
            ActivityAction::Stop => "Stop",
            ActivityAction::Dead => "Dead",
            ActivityAction::DonationStart => "DonationStart",
            ActivityAction::DonationStop => "DonationStop",
            ActivityAction::DonationDead => "DonationDead",
        };
        f.write_str(name)
    }
}

/// Workload figures captured with an activity row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityWorkload {
    pub service: String,
    pub algo: String,
    pub price: Decimal,
    pub earn: Decimal,
    pub fees: Decimal,
    pub power: Decimal,
    pub net_earn: Decimal,
    pub service_balance: Decimal,
}

impl ActivityWorkload {
    /// Out-of-range earnings are recorded as `Decimal::MAX`
    pub fn capture(workload: &Workload, pricing: &PowerPricing, service_balance: Decimal) -> Self {
        Self {
            service: workload.service_name().to_string(),
            algo: workload.name.clone(),
            price: workload.price,
            earn: workload.earn().unwrap_or(Decimal::MAX),
            fees: workload.fees,
            power: workload.power,
            net_earn: workload.net_earn(pricing).unwrap_or(Decimal::MAX),
            service_balance,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityRecord {
    pub at: DateTime<Utc>,
    pub action: ActivityAction,
    pub mode: MiningMode,
    /// Absent when no workload was involved
    pub workload: Option<ActivityWorkload>,
    pub exchange: Decimal,
}

impl ActivityRecord {
    /// Render as one CSV row in local time
    pub fn to_csv(&self) -> String {
        let time = self.at.with_timezone(&Local).format("%Y-%m-%dT%H:%M:%S");
        let workload = match &self.workload {
            Some(w) => format!(
                "{},{},{:.6},{:.6},{:.6},{:.6},{:.6}",
                w.service, w.algo, w.price, w.earn, w.fees, w.power, w.net_earn
            ),
            None => ",,,,,,".to_string(),
        };
        let balance = self
            .workload
            .as_ref()
            .map(|w| format!("{:.8}", w.service_balance))
            .unwrap_or_default();
        format!(
            "{},{},{},{},{:.2},{}",
            time, self.action, self.mode, workload, self.exchange, balance
        )
    }
}

/// Append-only CSV writer
#[derive(Debug, Clone)]
pub struct ActivityLog {
    path: PathBuf,
}

impl ActivityLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, record: &ActivityRecord) -> Result<()> {
        let fresh = std::fs::metadata(&self.path)
            .map(|m| m.len() == 0)
            .unwrap_or(true);
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        if fresh {
            writeln!(file, "{}", ACTIVITY_HEADER)?;
        }
        writeln!(file, "{}", record.to_csv())?;
        Ok(())
    }
}
