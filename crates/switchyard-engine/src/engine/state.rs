//! Guarded engine state
//!
//! Everything the tick and the operator controls mutate lives in
//! [`EngineCore`], which is only ever reached through the engine's mutex.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use switchyard_common::{
    MiningMode, PowerPricing, Result, SwitchyardError, Workload, WorkloadId,
};
use switchyard_pricing::PriceHistory;
use tracing::{info, warn};

use crate::activity::{ActivityAction, ActivityRecord, ActivityWorkload};
use crate::catalog::WorkloadCatalog;
use crate::donation::DonationScheduler;
use crate::notify::ActivityNotifier;
use crate::supervisor::{CompletedRun, ProcessSupervisor};
use crate::EngineConfig;

/// Candidate waiting out the switch delay
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PendingSwitch {
    #[default]
    None,
    Pending {
        target: WorkloadId,
        since: DateTime<Utc>,
    },
}

impl PendingSwitch {
    pub fn target(&self) -> Option<WorkloadId> {
        match self {
            PendingSwitch::None => None,
            PendingSwitch::Pending { target, .. } => Some(*target),
        }
    }
}

pub(crate) struct EngineCore {
    pub(crate) config: EngineConfig,
    pub(crate) catalog: WorkloadCatalog,
    pub(crate) supervisor: ProcessSupervisor,
    pub(crate) donation: DonationScheduler,
    pub(crate) history: Box<dyn PriceHistory>,
    pub(crate) notifier: ActivityNotifier,
    pub(crate) pricing: PowerPricing,
    pub(crate) mode: MiningMode,
    pub(crate) pending: PendingSwitch,
    pub(crate) last_stopped: Option<DateTime<Utc>>,
    /// Profit ratio of the best candidate over the running workload, as of
    /// the last tick
    pub(crate) last_ratio: Option<Decimal>,
    pub(crate) minimized_to_tray: bool,
    pub(crate) has_prices: bool,
    pub(crate) prices_updated: bool,
}

impl EngineCore {
    /// Command variant used for new launches
    pub(crate) fn launch_mode(&self) -> MiningMode {
        match self.mode {
            MiningMode::Donation => MiningMode::Donation,
            _ => MiningMode::Automatic,
        }
    }

    pub(crate) fn workload(&self, id: WorkloadId) -> Result<&Workload> {
        self.catalog
            .get(id)
            .ok_or(SwitchyardError::UnknownWorkload(id.0))
    }

    pub(crate) fn run_elapsed(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.supervisor.active().map(|run| run.elapsed(now))
    }

    fn activity(
        &self,
        action: ActivityAction,
        workload: WorkloadId,
        mode: MiningMode,
        now: DateTime<Utc>,
    ) -> ActivityRecord {
        let captured = self.catalog.get(workload).map(|w| {
            let balance = self
                .catalog
                .service(w.service.id)
                .map(|s| s.balance)
                .unwrap_or_default();
            ActivityWorkload::capture(w, &self.pricing, balance)
        });
        ActivityRecord {
            at: now,
            action: action.for_mode(mode),
            mode: self.mode,
            workload: captured,
            exchange: self.pricing.exchange,
        }
    }

    fn console(&self, now: DateTime<Utc>, text: String) {
        info!("{}", text);
        self.notifier.console(now, text);
    }

    fn record_run(&mut self, run: CompletedRun) {
        if let Some(workload) = self.catalog.get_mut(run.workload) {
            workload.time_mining = workload.time_mining + run.elapsed;
        }
        self.donation.record(run.mode, run.elapsed);
    }

    /// Stop the running process, accumulating its mining time; no-op when
    /// nothing runs
    pub(crate) fn stop_miner(&mut self, now: DateTime<Utc>) -> Option<CompletedRun> {
        let (id, mode) = self
            .supervisor
            .active()
            .map(|run| (run.workload, run.mode))?;

        if let Ok(workload) = self.workload(id) {
            self.console(
                now,
                format!("Stopping {} {}", workload.service_name(), workload.name),
            );
        }
        self.notifier
            .activity(self.activity(ActivityAction::Stop, id, mode, now));

        let run = self.supervisor.stop(now)?;
        self.record_run(run);
        self.last_stopped = Some(now);
        Some(run)
    }

    /// Launch a workload; launch failures leave it marked dead
    pub(crate) fn start_miner(&mut self, id: WorkloadId, now: DateTime<Utc>) -> Result<()> {
        self.pending = PendingSwitch::None;
        self.last_stopped = None;

        let mode = self.launch_mode();
        let minimized = self.minimized_to_tray;
        let workload = self
            .catalog
            .get_mut(id)
            .ok_or(SwitchyardError::UnknownWorkload(id.0))?;
        self.supervisor.start(workload, mode, minimized, now)?;

        self.notifier
            .activity(self.activity(ActivityAction::Start, id, mode, now));
        Ok(())
    }

    /// Release a process that exited on its own and mark its workload dead
    pub(crate) fn check_dead(&mut self, now: DateTime<Utc>) -> Option<WorkloadId> {
        let (id, mode) = self
            .supervisor
            .active()
            .map(|run| (run.workload, run.mode))?;
        if self.supervisor.is_alive() {
            return None;
        }

        self.notifier
            .activity(self.activity(ActivityAction::Dead, id, mode, now));
        let run = self.supervisor.reap(now)?;
        if let Some(workload) = self.catalog.get_mut(id) {
            workload.dead_since = Some(now);
            let text = format!("Dead {} {}", workload.service_name(), workload.name);
            warn!(workload = %id, "{}", text);
            self.notifier.console(now, text);
        }
        self.record_run(run);
        Some(id)
    }

    /// Flip between automatic and donation mining when the window is reached
    ///
    /// With nothing running, the engine mode and the recorded accumulators
    /// alone decide, so a run that exits right at the boundary still flips
    /// before the next launch.
    pub(crate) fn check_donation(&mut self, now: DateTime<Utc>) -> Option<MiningMode> {
        let (mode, elapsed) = self
            .supervisor
            .active()
            .map(|run| (run.mode, run.elapsed(now)))
            .unwrap_or((self.mode, Duration::zero()));
        let target = self.donation.due_transition(mode, elapsed)?;

        self.stop_miner(now);
        self.donation.flip(mode, target);
        self.mode = target;
        self.console(now, format!("Switching to {} mining", target));
        Some(target)
    }

    /// Stop a run that reached the maximum run time
    pub(crate) fn check_max_time(&mut self, now: DateTime<Utc>) -> Option<WorkloadId> {
        if self.config.max_time <= Duration::zero() {
            return None;
        }
        let elapsed = self.run_elapsed(now)?;
        if elapsed < self.config.max_time {
            return None;
        }
        self.stop_miner(now).map(|run| run.workload)
    }

    /// Net earn of a workload as used for ranking
    pub(crate) fn ranking_earn(&self, id: WorkloadId) -> Result<Decimal> {
        let earn = self
            .catalog
            .get(id)
            .map(|w| w.net_for_ranking(&self.pricing, self.config.mine_by_average))
            .transpose()?;
        Ok(earn.unwrap_or_default())
    }

    /// Effective minimum profit ratio for switching from `running` to `best`
    pub(crate) fn switch_threshold(&self, best: &Workload, running: &Workload) -> Decimal {
        if best.service.id != running.service.id {
            best.min_profit.max(self.config.min_profit)
        } else {
            self.config.min_profit
        }
    }

    /// Required time a pending candidate must stay best
    pub(crate) fn required_switch_time(&self) -> Duration {
        match self.config.dynamic_switch {
            Some(curve) => {
                let ratio = self
                    .last_ratio
                    .and_then(|r| r.to_f64())
                    .unwrap_or(1.0);
                curve.required(self.config.switch_time, ratio)
            }
            None => self.config.switch_time,
        }
    }

    /// Remaining hysteresis wait for the pending switch, if any
    pub(crate) fn next_run_wait(&self, now: DateTime<Utc>) -> Option<Duration> {
        let run = self.supervisor.active()?;
        let since = match self.pending {
            PendingSwitch::Pending { since, .. } => since,
            PendingSwitch::None => return None,
        };
        let until_switch = self.required_switch_time() - (now - since);
        let until_min_time = self.config.min_time - run.elapsed(now);
        Some(until_switch.max(until_min_time))
    }

    /// Cooldown left before the next start is allowed
    pub(crate) fn cooldown_remaining(&self, now: DateTime<Utc>) -> Option<Duration> {
        let stopped = self.last_stopped?;
        let remaining = stopped + self.config.delay - now;
        (remaining > Duration::zero()).then_some(remaining)
    }
}
