//! Mining mode and supervised-process options

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Engine-wide mining mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MiningMode {
    /// Nothing runs; ticks are ignored
    #[default]
    Stopped,
    /// Run the most profitable workload with the operator's account
    Automatic,
    /// Run the most profitable workload with the donation account
    Donation,
}

impl MiningMode {
    /// Whether the donation variant of a workload's command applies
    pub fn uses_donation_command(&self) -> bool {
        matches!(self, MiningMode::Donation)
    }
}

impl fmt::Display for MiningMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MiningMode::Stopped => write!(f, "Stopped"),
            MiningMode::Automatic => write!(f, "Automatic"),
            MiningMode::Donation => write!(f, "Donation"),
        }
    }
}

/// How a supervised process is terminated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KillMode {
    /// Kill the launched process only
    Process,
    /// Kill the launched process and every descendant
    #[default]
    Tree,
}

/// OS scheduling priority requested for a supervised process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProcessPriority {
    Idle,
    BelowNormal,
    Normal,
    AboveNormal,
    High,
    RealTime,
}

impl ProcessPriority {
    /// Parse a configured priority, yielding `None` for blank, unknown or
    /// default values so that nothing is applied
    pub fn from_hint(hint: &str) -> Option<Self> {
        match hint.parse::<ProcessPriority>() {
            Ok(ProcessPriority::Normal) | Err(_) => None,
            Ok(priority) => Some(priority),
        }
    }

    /// Unix niceness equivalent
    pub fn niceness(&self) -> i32 {
        match self {
            ProcessPriority::Idle => 19,
            ProcessPriority::BelowNormal => 10,
            ProcessPriority::Normal => 0,
            ProcessPriority::AboveNormal => -5,
            ProcessPriority::High => -10,
            ProcessPriority::RealTime => -20,
        }
    }
}

impl FromStr for ProcessPriority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Idle" => Ok(ProcessPriority::Idle),
            "BelowNormal" => Ok(ProcessPriority::BelowNormal),
            "Normal" => Ok(ProcessPriority::Normal),
            "AboveNormal" => Ok(ProcessPriority::AboveNormal),
            "High" => Ok(ProcessPriority::High),
            "RealTime" => Ok(ProcessPriority::RealTime),
            other => Err(format!("unknown process priority '{}'", other)),
        }
    }
}

/// How a windowed miner is shown when the host is minimized to the tray
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrayMode {
    /// Always start minimized
    #[default]
    Minimized,
    /// Start minimized, then hide once the title is set
    HideAfterStart,
    /// Start hidden
    Hidden,
}

impl TryFrom<u8> for TrayMode {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(TrayMode::Minimized),
            1 => Ok(TrayMode::HideAfterStart),
            2 => Ok(TrayMode::Hidden),
            other => Err(format!("unknown tray mode {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_hint() {
        assert_eq!(ProcessPriority::from_hint("High"), Some(ProcessPriority::High));
        assert_eq!(ProcessPriority::from_hint("Normal"), None);
        assert_eq!(ProcessPriority::from_hint(""), None);
        // case-sensitive like the configuration format
        assert_eq!(ProcessPriority::from_hint("high"), None);
    }

    #[test]
    fn test_mode_display() {
        assert_eq!(MiningMode::Automatic.to_string(), "Automatic");
        assert_eq!(MiningMode::Donation.to_string(), "Donation");
        assert!(MiningMode::Donation.uses_donation_command());
        assert!(!MiningMode::Automatic.uses_donation_command());
    }

    #[test]
    fn test_tray_mode_from_config() {
        assert_eq!(TrayMode::try_from(2), Ok(TrayMode::Hidden));
        assert!(TrayMode::try_from(7).is_err());
    }
}
