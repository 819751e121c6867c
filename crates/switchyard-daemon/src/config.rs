//! Daemon configuration
//!
//! Loaded from a TOML file (default `switchyard.toml`, overridable through
//! `SWITCHYARD_CONFIG`) with `SWITCHYARD_`-prefixed environment overrides,
//! e.g. `SWITCHYARD_GENERAL__POWER_COST=0.12`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::Duration;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use switchyard_common::{
    KillMode, PowerPricing, Result, ServiceKind, SwitchyardError, TrayMode,
    DEFAULT_DONATION_FREQUENCY_MINUTES, DEFAULT_DONATION_PERCENTAGE,
    DEFAULT_DYNAMIC_SWITCH_PIVOT, DEFAULT_DYNAMIC_SWITCH_POWER, DEFAULT_STALE_PRICE_MINUTES,
};
use switchyard_engine::{minutes, DonationConfig, DynamicSwitch, EngineConfig};

/// Default configuration file
pub const DEFAULT_CONFIG_PATH: &str = "switchyard.toml";

/// Environment variable naming the configuration file
pub const CONFIG_PATH_ENV: &str = "SWITCHYARD_CONFIG";

/// Suffix marking a minimum price already in native units
const NATIVE_PRICE_SUFFIX: &str = "BTC";

/// Longest configurable time span, in minutes (100 years)
const MAX_MINUTES: f64 = 100.0 * 365.0 * 24.0 * 60.0;

/// Longest tick period, in seconds
const MAX_TICK_INTERVAL: f64 = 24.0 * 60.0 * 60.0;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DaemonConfig {
    #[serde(default)]
    pub general: GeneralSettings,
    #[serde(default)]
    pub algorithms: Vec<AlgorithmSettings>,
    #[serde(default)]
    pub services: Vec<ServiceSettings>,
}

/// Engine-wide settings; times are minutes unless noted
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralSettings {
    /// Electricity cost per kWh in fiat
    pub power_cost: Decimal,
    /// Fiat per native unit
    pub exchange: Decimal,
    pub currency_code: String,
    pub min_time: f64,
    pub max_time: f64,
    pub switch_time: f64,
    pub dead_time: f64,
    /// Auto exit; ignored below one minute
    pub exit_time: f64,
    /// Inter-run delay in seconds
    pub delay: f64,
    pub ignore_outliers: bool,
    pub mine_by_average: bool,
    pub log_activity: bool,
    pub activity_log_path: PathBuf,
    pub kill_mode: KillMode,
    /// 0 minimized, 1 hide after start, 2 hidden
    pub tray_mode: u8,
    /// Percent of each donation cycle
    pub donation_percentage: f64,
    pub donation_frequency: f64,
    pub remote_send: bool,
    pub remote_receive: bool,
    pub dynamic_switching: bool,
    pub dynamic_switch_power: f64,
    pub dynamic_switch_pivot: f64,
    pub dynamic_switch_offset: Option<f64>,
    pub min_profit: Decimal,
    /// Fiat amount, or native amount when suffixed with `BTC`
    pub min_price: String,
    /// Tick period in seconds
    pub tick_interval: f64,
    pub stale_after: f64,
    /// Poll period for live services in seconds
    pub poll_interval: u64,
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            power_cost: Decimal::ZERO,
            exchange: Decimal::ONE,
            currency_code: "USD".to_string(),
            min_time: 0.0,
            max_time: 0.0,
            switch_time: 0.0,
            dead_time: 5.0,
            exit_time: 0.0,
            delay: 0.0,
            ignore_outliers: false,
            mine_by_average: false,
            log_activity: false,
            activity_log_path: PathBuf::from("activity.log"),
            kill_mode: KillMode::Tree,
            tray_mode: 0,
            donation_percentage: DEFAULT_DONATION_PERCENTAGE,
            donation_frequency: DEFAULT_DONATION_FREQUENCY_MINUTES as f64,
            remote_send: false,
            remote_receive: false,
            dynamic_switching: false,
            dynamic_switch_power: DEFAULT_DYNAMIC_SWITCH_POWER,
            dynamic_switch_pivot: DEFAULT_DYNAMIC_SWITCH_PIVOT,
            dynamic_switch_offset: None,
            min_profit: Decimal::ONE,
            min_price: "0".to_string(),
            tick_interval: 1.0,
            stale_after: DEFAULT_STALE_PRICE_MINUTES as f64,
            poll_interval: 60,
        }
    }
}

/// Hardware profile of one algorithm
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AlgorithmSettings {
    pub name: String,
    /// Display name; looked up from the known table when absent
    pub display: Option<String>,
    pub hashrate: Decimal,
    /// Watts
    pub power: Decimal,
    pub priority: String,
    pub affinity: i64,
    pub aparam1: String,
    pub aparam2: String,
    pub aparam3: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceSettings {
    pub kind: ServiceKind,
    pub name: String,
    #[serde(default)]
    pub account: String,
    #[serde(default)]
    pub worker: String,
    #[serde(default = "one")]
    pub weight: Decimal,
    #[serde(default = "one")]
    pub min_profit: Decimal,
    #[serde(default)]
    pub param1: String,
    #[serde(default)]
    pub param2: String,
    #[serde(default)]
    pub param3: String,
    #[serde(default)]
    pub donation_account: String,
    #[serde(default)]
    pub donation_worker: String,
    /// Price document for the JSON file kind
    #[serde(default)]
    pub path: Option<PathBuf>,
    #[serde(default)]
    pub price_multiplier: Option<Decimal>,
    /// Service algorithm key to catalog algorithm name
    #[serde(default)]
    pub translations: HashMap<String, String>,
    #[serde(default)]
    pub algos: Vec<ServiceAlgoSettings>,
}

/// One algorithm offered by a service
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceAlgoSettings {
    pub algo: String,
    pub price_id: Option<String>,
    pub folder: String,
    pub command: String,
    pub arguments: String,
    pub use_window: bool,
    /// Fixed price for the manual kind
    pub price: Option<Decimal>,
}

fn one() -> Decimal {
    Decimal::ONE
}

impl DaemonConfig {
    /// Load `.env`, then the configuration file and environment overrides
    pub fn load() -> anyhow::Result<Self> {
        let _ = dotenvy::dotenv();
        let path = std::env::var(CONFIG_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));
        Self::from_path(&path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))
    }

    /// Load a file with environment overrides and validate it
    pub fn from_path(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(SwitchyardError::Config(format!(
                "Config file '{}' not found",
                path.display()
            )));
        }
        let settings = config::Config::builder()
            .add_source(config::File::from(path))
            .add_source(
                config::Environment::with_prefix("SWITCHYARD")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| SwitchyardError::Config(e.to_string()))?;
        let cfg: Self = settings
            .try_deserialize()
            .map_err(|e| SwitchyardError::Config(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        let general = &self.general;
        if general.exchange <= Decimal::ZERO {
            return Err(SwitchyardError::Config(
                "exchange must be positive".to_string(),
            ));
        }
        if !(0.0..100.0).contains(&general.donation_percentage) {
            return Err(SwitchyardError::Config(format!(
                "donation_percentage {} outside [0, 100)",
                general.donation_percentage
            )));
        }
        TrayMode::try_from(general.tray_mode)
            .map_err(|_| SwitchyardError::Config(format!("unknown tray_mode {}", general.tray_mode)))?;
        if !(general.tick_interval > 0.0 && general.tick_interval <= MAX_TICK_INTERVAL) {
            return Err(SwitchyardError::Config(format!(
                "tick_interval {} outside (0, {}] seconds",
                general.tick_interval, MAX_TICK_INTERVAL
            )));
        }
        for (name, value) in [
            ("min_time", general.min_time),
            ("max_time", general.max_time),
            ("switch_time", general.switch_time),
            ("dead_time", general.dead_time),
            ("exit_time", general.exit_time),
            ("delay", general.delay / 60.0),
            ("donation_frequency", general.donation_frequency),
            ("stale_after", general.stale_after),
        ] {
            if !(0.0..=MAX_MINUTES).contains(&value) {
                return Err(SwitchyardError::Config(format!(
                    "{} out of range: {}",
                    name, value
                )));
            }
        }
        let offset = general.dynamic_switch_offset.unwrap_or(0.0);
        if !(general.dynamic_switch_power.is_finite()
            && general.dynamic_switch_pivot.is_finite()
            && offset.is_finite())
        {
            return Err(SwitchyardError::Config(
                "dynamic switch parameters must be finite".to_string(),
            ));
        }
        self.min_price_native()?;

        for service in &self.services {
            if service.kind == ServiceKind::JsonFile && service.path.is_none() {
                return Err(SwitchyardError::Config(format!(
                    "service '{}' needs a path",
                    service.name
                )));
            }
            for entry in &service.algos {
                if self.algorithm(&entry.algo).is_none() {
                    return Err(SwitchyardError::Config(format!(
                        "service '{}' references unknown algorithm '{}'",
                        service.name, entry.algo
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn algorithm(&self, name: &str) -> Option<&AlgorithmSettings> {
        self.algorithms.iter().find(|a| a.name == name)
    }

    /// Minimum net earn in native units
    pub fn min_price_native(&self) -> Result<Decimal> {
        let raw = self.general.min_price.trim();
        let parse = |s: &str| {
            s.trim()
                .parse::<Decimal>()
                .map_err(|e| SwitchyardError::Config(format!("min_price '{}': {}", raw, e)))
        };
        match raw.strip_suffix(NATIVE_PRICE_SUFFIX) {
            Some(native) => parse(native),
            None => parse(raw)?
                .checked_div(self.general.exchange)
                .ok_or_else(|| SwitchyardError::Config("min_price overflow".to_string())),
        }
    }

    pub fn power_pricing(&self) -> PowerPricing {
        PowerPricing::new(self.general.power_cost, self.general.exchange)
    }

    pub fn engine_config(&self) -> Result<EngineConfig> {
        let general = &self.general;
        let switch_time = minutes(general.switch_time);
        let tray_mode = TrayMode::try_from(general.tray_mode)
            .map_err(|_| SwitchyardError::Config(format!("unknown tray_mode {}", general.tray_mode)))?;

        Ok(EngineConfig {
            min_time: minutes(general.min_time),
            max_time: minutes(general.max_time),
            switch_time,
            delay: minutes(general.delay / 60.0),
            dead_time: minutes(general.dead_time),
            dynamic_switch: general.dynamic_switching.then(|| {
                DynamicSwitch::new(
                    switch_time,
                    general.dynamic_switch_power,
                    general.dynamic_switch_pivot,
                    general.dynamic_switch_offset,
                )
            }),
            min_profit: general.min_profit,
            min_price: self.min_price_native()?,
            mine_by_average: general.mine_by_average,
            ignore_outliers: general.ignore_outliers,
            kill_mode: general.kill_mode,
            tray_mode,
            donation: DonationConfig {
                frequency: minutes(general.donation_frequency),
                fraction: general.donation_percentage / 100.0,
            },
        })
    }

    /// Auto-exit delay, present only when at least one minute
    pub fn exit_after(&self) -> Option<std::time::Duration> {
        if self.general.exit_time < 1.0 {
            return None;
        }
        std::time::Duration::try_from_secs_f64(self.general.exit_time * 60.0).ok()
    }

    /// Tick period; falls back to one second for a value `validate` rejects
    pub fn tick_interval(&self) -> std::time::Duration {
        std::time::Duration::try_from_secs_f64(self.general.tick_interval)
            .ok()
            .filter(|period| !period.is_zero())
            .unwrap_or(std::time::Duration::from_secs(1))
    }

    pub fn poll_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.general.poll_interval.max(1))
    }

    pub fn stale_after(&self) -> Duration {
        minutes(self.general.stale_after)
    }
}
