//! Donation scheduling
//!
//! Mining time is split into cycles of `frequency`. Within a cycle the
//! engine mines `frequency * (1 - fraction)` with the operator's commands,
//! then `frequency * fraction` with the donation commands. Each mode keeps
//! its own accumulator of completed runs; leaving a mode resets the
//! accumulator of the mode being left.

use chrono::Duration;
use switchyard_common::MiningMode;
use tracing::info;

use crate::{as_minutes, minutes, DonationConfig};

#[derive(Debug, Clone)]
pub struct DonationScheduler {
    config: DonationConfig,
    /// Whether any workload has a donation command
    available: bool,
    /// Completed automatic mining since the last donation
    automatic: Duration,
    /// Completed donation mining in the current donation window
    donation: Duration,
}

impl DonationScheduler {
    pub fn new(config: DonationConfig, available: bool) -> Self {
        Self {
            config,
            available,
            automatic: Duration::zero(),
            donation: Duration::zero(),
        }
    }

    /// Donation applies only with a positive cycle, a positive fraction and
    /// at least one donation-capable workload
    pub fn is_enabled(&self) -> bool {
        self.available
            && self.config.frequency > Duration::zero()
            && self.config.fraction > 0.0
            && self.config.fraction < 1.0
    }

    /// Automatic mining owed before each donation window
    pub fn mining_before_donation(&self) -> Duration {
        minutes(as_minutes(self.config.frequency) * (1.0 - self.config.fraction))
    }

    /// Length of each donation window
    pub fn mining_during_donation(&self) -> Duration {
        self.config.frequency - self.mining_before_donation()
    }

    fn accumulated(&self, mode: MiningMode) -> Duration {
        match mode {
            MiningMode::Donation => self.donation,
            _ => self.automatic,
        }
    }

    /// Automatic mining left before the next donation window, counting the
    /// elapsed time of a run in progress
    pub fn time_before_due(&self, current: Option<(MiningMode, Duration)>) -> Duration {
        let mut mined = self.automatic;
        if let Some((MiningMode::Automatic, elapsed)) = current {
            mined = mined + elapsed;
        }
        (self.mining_before_donation() - mined).max(Duration::zero())
    }

    /// Donation mining left in the current window, counting the elapsed time
    /// of a run in progress
    pub fn time_remaining(&self, current: Option<(MiningMode, Duration)>) -> Duration {
        let mut mined = self.donation;
        if let Some((MiningMode::Donation, elapsed)) = current {
            mined = mined + elapsed;
        }
        (self.mining_during_donation() - mined).max(Duration::zero())
    }

    /// Mode to flip to given the current run, if the window has been reached
    pub fn due_transition(&self, mode: MiningMode, elapsed: Duration) -> Option<MiningMode> {
        if !self.is_enabled() {
            return None;
        }
        let current = Some((mode, elapsed));
        match mode {
            MiningMode::Automatic if self.time_before_due(current) <= Duration::zero() => {
                Some(MiningMode::Donation)
            }
            MiningMode::Donation if self.time_remaining(current) <= Duration::zero() => {
                Some(MiningMode::Automatic)
            }
            _ => None,
        }
    }

    /// Add a completed run to its mode's accumulator
    pub fn record(&mut self, mode: MiningMode, elapsed: Duration) {
        match mode {
            MiningMode::Automatic => self.automatic = self.automatic + elapsed,
            MiningMode::Donation => self.donation = self.donation + elapsed,
            MiningMode::Stopped => {}
        }
    }

    /// Flip modes, resetting the accumulator of the mode being left
    pub fn flip(&mut self, from: MiningMode, to: MiningMode) {
        info!(
            from = %from,
            to = %to,
            mined = as_minutes(self.accumulated(from)),
            "Donation window flip"
        );
        match from {
            MiningMode::Automatic => self.automatic = Duration::zero(),
            MiningMode::Donation => self.donation = Duration::zero(),
            MiningMode::Stopped => {}
        }
    }
}
