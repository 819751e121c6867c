//! Mining engine handle
//!
//! [`MiningEngine`] is a cheap, cloneable handle over the guarded engine
//! state. Ticks, operator controls and price ingestion all take the same
//! lock, so no two of them ever interleave.

mod decision;
mod state;

pub use self::state::PendingSwitch;
pub use self::decision::TickOutcome;

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use switchyard_common::{
    Clock, MiningMode, PowerPricing, Result, ServiceId, SystemClock, WorkloadId,
};
use switchyard_pricing::{BalanceQuote, PassthroughHistory, PriceHistory, PriceQuote, StalePolicy};
use tracing::{debug, info};

use self::state::EngineCore;
use crate::catalog::WorkloadCatalog;
use crate::donation::DonationScheduler;
use crate::notify::ActivityNotifier;
use crate::supervisor::{OsLauncher, ProcessLauncher, ProcessSupervisor};
use crate::EngineConfig;

/// Per-workload status, in precedence order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkloadStatus {
    Running,
    Dead,
    Banned,
    Pending,
    Idle,
}

/// Read-only view of one workload
#[derive(Debug, Clone)]
pub struct WorkloadView {
    pub id: WorkloadId,
    pub service: String,
    pub algo: String,
    pub name: String,
    pub status: WorkloadStatus,
    pub price: Decimal,
    /// `Decimal::MAX` when the profit model overflows
    pub net_earn: Decimal,
    pub balance: Decimal,
    /// Time mined, including the current run
    pub time_mining: Duration,
}

/// Snapshot of the engine for display
#[derive(Debug, Clone)]
pub struct EngineStatus {
    pub mode: MiningMode,
    pub running: Option<WorkloadId>,
    pub pending: PendingSwitch,
    /// Elapsed time of the current run
    pub mining_time: Option<Duration>,
    /// Time until the maximum run time forces a restart
    pub restart_in: Option<Duration>,
    /// Remaining hysteresis wait for the pending switch
    pub next_run_in: Option<Duration>,
    /// Remaining inter-run delay
    pub cooldown_in: Option<Duration>,
    /// `None` when donation is disabled
    pub time_until_donation: Option<Duration>,
    pub donation_remaining: Option<Duration>,
    pub total_time_mining: Duration,
    pub exchange: Decimal,
    pub workloads: Vec<WorkloadView>,
}

/// Builder for [`MiningEngine`]
pub struct EngineBuilder {
    config: EngineConfig,
    catalog: WorkloadCatalog,
    launcher: Box<dyn ProcessLauncher>,
    clock: Arc<dyn Clock>,
    notifier: ActivityNotifier,
    history: Box<dyn PriceHistory>,
    pricing: PowerPricing,
    mode: MiningMode,
}

impl EngineBuilder {
    pub fn with_launcher(mut self, launcher: impl ProcessLauncher + 'static) -> Self {
        self.launcher = Box::new(launcher);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_notifier(mut self, notifier: ActivityNotifier) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_history(mut self, history: impl PriceHistory + 'static) -> Self {
        self.history = Box::new(history);
        self
    }

    pub fn with_pricing(mut self, pricing: PowerPricing) -> Self {
        self.pricing = pricing;
        self
    }

    /// Initial mining mode
    pub fn with_mode(mut self, mode: MiningMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn build(self) -> MiningEngine {
        let donation =
            DonationScheduler::new(self.config.donation, self.catalog.has_donation_commands());
        let supervisor = ProcessSupervisor::new(self.launcher, self.notifier.clone())
            .with_kill_mode(self.config.kill_mode)
            .with_tray_mode(self.config.tray_mode);

        info!(
            workloads = self.catalog.len(),
            services = self.catalog.services().len(),
            donation = donation.is_enabled(),
            "Engine ready"
        );

        let core = EngineCore {
            config: self.config,
            catalog: self.catalog,
            supervisor,
            donation,
            history: self.history,
            notifier: self.notifier,
            pricing: self.pricing,
            mode: self.mode,
            pending: PendingSwitch::None,
            last_stopped: None,
            last_ratio: None,
            minimized_to_tray: false,
            has_prices: false,
            prices_updated: false,
        };

        MiningEngine {
            core: Arc::new(Mutex::new(core)),
            clock: self.clock,
        }
    }
}

#[derive(Clone)]
pub struct MiningEngine {
    core: Arc<Mutex<EngineCore>>,
    clock: Arc<dyn Clock>,
}

impl MiningEngine {
    /// Start building an engine with OS processes, the wall clock and no
    /// observers
    pub fn builder(config: EngineConfig, catalog: WorkloadCatalog) -> EngineBuilder {
        EngineBuilder {
            config,
            catalog,
            launcher: Box::new(OsLauncher::new()),
            clock: Arc::new(SystemClock),
            notifier: ActivityNotifier::disabled(),
            history: Box::new(PassthroughHistory),
            pricing: PowerPricing::free(),
            mode: MiningMode::Stopped,
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Run one decision tick, waiting for the lock
    pub fn tick(&self) -> TickOutcome {
        let now = self.clock.now();
        self.core.lock().tick(now)
    }

    /// Run one decision tick unless another tick or mutation holds the lock
    pub fn try_tick(&self) -> Option<TickOutcome> {
        let now = self.clock.now();
        let mut core = self.core.try_lock()?;
        Some(core.tick(now))
    }

    pub fn mode(&self) -> MiningMode {
        self.core.lock().mode
    }

    /// Change mode; stopping goes through [`MiningEngine::request_stop`]
    pub fn set_mode(&self, mode: MiningMode) {
        if mode == MiningMode::Stopped {
            self.request_stop();
            return;
        }
        let mut core = self.core.lock();
        if core.mode != mode {
            info!(from = %core.mode, to = %mode, "Mode changed");
            core.mode = mode;
        }
    }

    /// Stop mining, drop any pending switch and forget dead markers
    pub fn request_stop(&self) {
        let now = self.clock.now();
        let mut core = self.core.lock();
        core.pending = PendingSwitch::None;
        core.stop_miner(now);
        core.catalog.clear_dead_times();
        core.mode = MiningMode::Stopped;
    }

    /// Stop whatever runs and start a specific workload
    pub fn request_start(&self, id: WorkloadId) -> Result<()> {
        let now = self.clock.now();
        let mut core = self.core.lock();
        core.workload(id)?;
        core.stop_miner(now);
        core.start_miner(id, now)
    }

    /// Start the workload running `algo` for `service`, or the best pick when
    /// no workload runs that algorithm
    pub fn request_start_by(&self, service: &str, algo: &str) -> Result<TickOutcome> {
        let now = self.clock.now();
        let mut core = self.core.lock();
        match core.catalog.find(service, algo) {
            Some(id) => {
                core.stop_miner(now);
                core.start_miner(id, now)?;
                Ok(TickOutcome::Started(id))
            }
            None => Ok(core.tick(now)),
        }
    }

    /// Flip the ban on every workload of a service; returns how many flipped
    pub fn toggle_ban(&self, service: &str) -> usize {
        let now = self.clock.now();
        let mut guard = self.core.lock();
        let core = &mut *guard;
        let toggled = core.catalog.toggle_ban(service);
        if toggled > 0 {
            core.notifier
                .console(now, format!("Toggled ban on {} ({} workloads)", service, toggled));
        }
        toggled
    }

    /// Record whether the host is minimized to the tray
    pub fn set_minimized_to_tray(&self, minimized: bool) {
        self.core.lock().minimized_to_tray = minimized;
    }

    pub fn hide_window(&self) {
        self.core.lock().supervisor.hide_window();
    }

    pub fn minimize_window(&self) {
        self.core.lock().supervisor.minimize_window();
    }

    /// Stop a captured-output process; a windowed process is left running
    pub fn shutdown(&self) {
        let now = self.clock.now();
        let mut core = self.core.lock();
        let windowed = match core.supervisor.active() {
            Some(run) => run.use_window,
            None => return,
        };
        if windowed {
            info!("Leaving windowed process running");
        } else {
            core.stop_miner(now);
        }
    }

    /// Set a workload's price; unknown ids are ignored
    pub fn update_price(&self, id: WorkloadId, price: Decimal) -> bool {
        let mut core = self.core.lock();
        match core.catalog.get_mut(id) {
            Some(workload) => {
                workload.price = price;
                true
            }
            None => {
                debug!(workload = %id, "Price for unknown workload dropped");
                false
            }
        }
    }

    /// Set a service's balance; unknown ids are ignored
    pub fn update_balance(&self, service: ServiceId, balance: Decimal) -> bool {
        let mut core = self.core.lock();
        match core.catalog.service_mut(service) {
            Some(state) => {
                state.balance = balance;
                true
            }
            None => false,
        }
    }

    /// Store the history collaborator's verdict for a workload
    pub fn record_stats(&self, id: WorkloadId, outlier: bool, average: Decimal) -> bool {
        let mut core = self.core.lock();
        match core.catalog.get_mut(id) {
            Some(workload) => {
                workload.outlier = outlier;
                workload.average_price = Some(average);
                true
            }
            None => false,
        }
    }

    /// Stamp a service's prices as fresh
    pub fn mark_prices_updated(&self, service: ServiceId) {
        let now = self.clock.now();
        let mut core = self.core.lock();
        if let Some(state) = core.catalog.service_mut(service) {
            state.last_updated = Some(now);
        }
        core.has_prices = true;
        core.prices_updated = true;
    }

    pub fn has_prices(&self) -> bool {
        self.core.lock().has_prices
    }

    /// Consume the prices-updated flag
    pub fn take_prices_updated(&self) -> bool {
        std::mem::take(&mut self.core.lock().prices_updated)
    }

    /// Update the exchange rate; non-positive or unchanged rates are ignored
    pub fn update_exchange(&self, rate: Decimal) -> bool {
        let mut core = self.core.lock();
        if rate <= Decimal::ZERO || rate == core.pricing.exchange {
            return false;
        }
        info!(from = %core.pricing.exchange, to = %rate, "Exchange rate updated");
        core.pricing.exchange = rate;
        true
    }

    pub fn pricing(&self) -> PowerPricing {
        self.core.lock().pricing
    }

    /// Zero a service's prices when its last update is too old
    pub fn clear_stale_prices(&self, service: ServiceId, policy: &StalePolicy) -> bool {
        let now = self.clock.now();
        let mut core = self.core.lock();
        let cleared = core.catalog.clear_stale_prices(service, policy, now);
        if cleared {
            info!(service = service.0, "Cleared stale prices");
        }
        cleared
    }

    /// Apply a batch of quotes from one service; returns how many matched
    pub fn apply_prices(&self, service: ServiceId, quotes: &[PriceQuote]) -> usize {
        let now = self.clock.now();
        let mut guard = self.core.lock();
        let core = &mut *guard;
        let keys = match core.catalog.service(service) {
            Some(state) => state.keys.clone(),
            None => return 0,
        };

        let mut applied = 0;
        for quote in quotes {
            let id = match keys.resolve(&quote.key, core.catalog.workloads_of(service)) {
                Some(id) => id,
                None => {
                    debug!(service = service.0, key = %quote.key, "Unmatched price key");
                    continue;
                }
            };
            let stat = core.history.observe(id, quote.price, now);
            if let Some(workload) = core.catalog.get_mut(id) {
                workload.price = quote.price;
                workload.outlier = stat.outlier;
                workload.average_price = Some(stat.average);
                applied += 1;
            }
        }

        if let Some(state) = core.catalog.service_mut(service) {
            state.last_updated = Some(now);
        }
        core.has_prices = true;
        core.prices_updated = true;
        applied
    }

    /// Apply per-workload balances; the service balance becomes their sum
    pub fn apply_balances(&self, service: ServiceId, quotes: &[BalanceQuote]) -> usize {
        let mut guard = self.core.lock();
        let core = &mut *guard;
        let keys = match core.catalog.service(service) {
            Some(state) => state.keys.clone(),
            None => return 0,
        };

        let mut applied = 0;
        for quote in quotes {
            let id = keys.resolve(&quote.key, core.catalog.workloads_of(service));
            if let Some(workload) = id.and_then(|id| core.catalog.get_mut(id)) {
                workload.balance = quote.balance;
                applied += 1;
            }
        }

        let total = core
            .catalog
            .workloads_of(service)
            .fold(Decimal::ZERO, |acc, w| acc + w.balance);
        if let Some(state) = core.catalog.service_mut(service) {
            state.balance = total;
        }
        applied
    }

    /// Snapshot for display
    pub fn status(&self) -> EngineStatus {
        let now = self.clock.now();
        let core = self.core.lock();
        let active = core
            .supervisor
            .active()
            .map(|run| (run.workload, run.mode, run.elapsed(now)));
        let running = active.map(|(id, _, _)| id);
        let mining_time = active.map(|(_, _, elapsed)| elapsed);
        let current = active.map(|(_, mode, elapsed)| (mode, elapsed));

        let restart_in = mining_time
            .filter(|_| core.config.max_time > Duration::zero())
            .map(|elapsed| (core.config.max_time - elapsed).max(Duration::zero()));
        let next_run_in = core
            .next_run_wait(now)
            .map(|wait| wait.max(Duration::zero()));
        let enabled = core.donation.is_enabled();

        let workloads = core
            .catalog
            .iter()
            .map(|w| {
                let status = if running == Some(w.id) {
                    WorkloadStatus::Running
                } else if w.is_dead(now, core.config.dead_time) {
                    WorkloadStatus::Dead
                } else if w.banned {
                    WorkloadStatus::Banned
                } else if core.pending.target() == Some(w.id) {
                    WorkloadStatus::Pending
                } else {
                    WorkloadStatus::Idle
                };
                let current_run = if running == Some(w.id) {
                    mining_time.unwrap_or_else(Duration::zero)
                } else {
                    Duration::zero()
                };
                WorkloadView {
                    id: w.id,
                    service: w.service_name().to_string(),
                    algo: w.algo.clone(),
                    name: w.name.clone(),
                    status,
                    price: w.price,
                    net_earn: w.net_earn(&core.pricing).unwrap_or(Decimal::MAX),
                    balance: w.balance,
                    time_mining: w.time_mining + current_run,
                }
            })
            .collect();

        EngineStatus {
            mode: core.mode,
            running,
            pending: core.pending,
            mining_time,
            restart_in,
            next_run_in,
            cooldown_in: core.cooldown_remaining(now),
            time_until_donation: enabled.then(|| core.donation.time_before_due(current)),
            donation_remaining: enabled.then(|| core.donation.time_remaining(current)),
            total_time_mining: core.catalog.total_time_mining()
                + mining_time.unwrap_or_else(Duration::zero),
            exchange: core.pricing.exchange,
            workloads,
        }
    }

    /// Read access to the catalog under the lock
    pub fn with_catalog<R>(&self, f: impl FnOnce(&WorkloadCatalog) -> R) -> R {
        f(&self.core.lock().catalog)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::supervisor::testing::{command_dir, ScriptedLauncher};
    use crate::{DonationConfig, DynamicSwitch};
    use rust_decimal_macros::dec;
    use switchyard_common::{ExecSpec, ManualClock, ServiceKind};
    use switchyard_pricing::KeyMap;

    struct Fixture {
        engine: MiningEngine,
        clock: Arc<ManualClock>,
        launcher: ScriptedLauncher,
        _dir: tempfile::TempDir,
    }

    impl Fixture {
        fn advance(&self, minutes: i64) {
            self.clock.advance(Duration::minutes(minutes));
        }

        fn running(&self) -> Option<WorkloadId> {
            self.engine.status().running
        }
    }

    /// One workload per entry; prices are per-day earn x 1000 at hashrate 1000
    fn fixture(config: EngineConfig, entries: &[(&str, &str, Decimal)]) -> Fixture {
        let dir = command_dir();
        let folder = dir.path().to_str().unwrap().to_string();
        let mut catalog = WorkloadCatalog::new();
        let mut services: Vec<switchyard_common::ServiceRef> = Vec::new();
        for (service, algo, price) in entries {
            let reference = match services.iter().find(|s| s.name == *service) {
                Some(reference) => reference.clone(),
                None => {
                    let reference =
                        catalog.add_service(*service, ServiceKind::Manual, KeyMap::new());
                    services.push(reference.clone());
                    reference
                }
            };
            let w = catalog.add_workload(&reference, *algo, algo.to_uppercase());
            w.hashrate = dec!(1000);
            w.price = *price;
            w.normal = ExecSpec::new(folder.as_str(), "miner", format!("-a {}", algo));
        }

        let clock = Arc::new(ManualClock::default());
        let launcher = ScriptedLauncher::default();
        let engine = MiningEngine::builder(config, catalog)
            .with_launcher(launcher.clone())
            .with_clock(clock.clone())
            .with_mode(MiningMode::Automatic)
            .build();
        Fixture {
            engine,
            clock,
            launcher,
            _dir: dir,
        }
    }

    #[test]
    fn test_starts_best_when_idle() {
        let f = fixture(
            EngineConfig::default(),
            &[("Alpha", "x11", dec!(10)), ("Alpha", "x13", dec!(12))],
        );
        assert_eq!(f.engine.tick(), TickOutcome::Started(WorkloadId(2)));
        assert_eq!(f.running(), Some(WorkloadId(2)));
        assert_eq!(f.launcher.log.lock().launched[0].arguments, vec!["-a", "x13"]);
    }

    #[test]
    fn test_stopped_mode_is_idle() {
        let f = fixture(EngineConfig::default(), &[("Alpha", "x11", dec!(10))]);
        f.engine.set_mode(MiningMode::Stopped);
        assert_eq!(f.engine.tick(), TickOutcome::Idle);
        assert!(f.launcher.log.lock().launched.is_empty());
    }

    #[test]
    fn test_holds_below_min_profit() {
        let config = EngineConfig {
            min_profit: dec!(1.10),
            ..EngineConfig::default()
        };
        let f = fixture(config, &[("Alpha", "x11", dec!(10)), ("Alpha", "x13", dec!(5))]);
        assert_eq!(f.engine.tick(), TickOutcome::Started(WorkloadId(1)));

        f.engine.update_price(WorkloadId(2), dec!(10.5));
        f.advance(1);
        assert_eq!(f.engine.tick(), TickOutcome::Held(WorkloadId(1)));

        f.engine.update_price(WorkloadId(2), dec!(11.5));
        f.advance(1);
        assert_eq!(
            f.engine.tick(),
            TickOutcome::Switched {
                from: WorkloadId(1),
                to: WorkloadId(2)
            }
        );
    }

    #[test]
    fn test_cross_service_uses_candidate_min_profit() {
        let config = EngineConfig {
            min_profit: dec!(1.0),
            ..EngineConfig::default()
        };
        let f = fixture(config, &[("Alpha", "x11", dec!(10)), ("Beta", "x11", dec!(5))]);
        f.engine.tick();
        {
            let mut core = f.engine.core.lock();
            core.catalog.get_mut(WorkloadId(2)).unwrap().min_profit = dec!(1.2);
        }
        f.engine.update_price(WorkloadId(2), dec!(11));
        f.advance(1);
        assert_eq!(f.engine.tick(), TickOutcome::Held(WorkloadId(1)));
    }

    #[test]
    fn test_min_time_holds() {
        let config = EngineConfig {
            min_time: Duration::minutes(10),
            ..EngineConfig::default()
        };
        let f = fixture(config, &[("Alpha", "x11", dec!(10)), ("Alpha", "x13", dec!(5))]);
        f.engine.tick();
        f.engine.update_price(WorkloadId(2), dec!(50));
        f.advance(5);
        assert_eq!(f.engine.tick(), TickOutcome::Held(WorkloadId(1)));
        f.advance(5);
        assert!(matches!(f.engine.tick(), TickOutcome::Switched { .. }));
    }

    #[test]
    fn test_switch_delay_marks_pending() {
        let config = EngineConfig {
            switch_time: Duration::minutes(3),
            ..EngineConfig::default()
        };
        let f = fixture(config, &[("Alpha", "x11", dec!(10)), ("Alpha", "x13", dec!(5))]);
        f.engine.tick();
        f.engine.update_price(WorkloadId(2), dec!(20));
        f.advance(1);
        assert_eq!(f.engine.tick(), TickOutcome::Held(WorkloadId(1)));

        let status = f.engine.status();
        assert_eq!(status.pending.target(), Some(WorkloadId(2)));
        assert_eq!(status.next_run_in, Some(Duration::minutes(3)));
        assert_eq!(status.workloads[1].status, WorkloadStatus::Pending);

        f.advance(2);
        assert_eq!(f.engine.tick(), TickOutcome::Held(WorkloadId(1)));
        f.advance(1);
        assert!(matches!(f.engine.tick(), TickOutcome::Switched { to, .. } if to == WorkloadId(2)));
        assert_eq!(f.engine.status().pending, PendingSwitch::None);
    }

    #[test]
    fn test_pending_cleared_when_lead_evaporates() {
        let config = EngineConfig {
            switch_time: Duration::minutes(3),
            ..EngineConfig::default()
        };
        let f = fixture(config, &[("Alpha", "x11", dec!(10)), ("Alpha", "x13", dec!(5))]);
        f.engine.tick();
        f.engine.update_price(WorkloadId(2), dec!(20));
        f.advance(1);
        f.engine.tick();
        f.engine.update_price(WorkloadId(2), dec!(5));
        f.advance(1);
        assert_eq!(f.engine.tick(), TickOutcome::Held(WorkloadId(1)));
        assert_eq!(f.engine.status().pending, PendingSwitch::None);
    }

    #[test]
    fn test_dynamic_switch_shortens_wait() {
        let switch_time = Duration::minutes(10);
        let config = EngineConfig {
            switch_time,
            dynamic_switch: Some(DynamicSwitch::new(switch_time, 1.0, 1.05, Some(0.0))),
            ..EngineConfig::default()
        };
        let f = fixture(config, &[("Alpha", "x11", dec!(10)), ("Alpha", "x13", dec!(5))]);
        f.engine.tick();
        f.engine.update_price(WorkloadId(2), dec!(50));
        f.advance(1);
        f.engine.tick();
        // ratio 5 -> 10 / 5 = 2 minutes
        assert_eq!(f.engine.status().next_run_in, Some(Duration::minutes(2)));
        f.advance(2);
        assert!(matches!(f.engine.tick(), TickOutcome::Switched { .. }));
    }

    #[test]
    fn test_dead_process_is_excluded_until_cooldown() {
        let config = EngineConfig {
            dead_time: Duration::minutes(5),
            ..EngineConfig::default()
        };
        let f = fixture(config, &[("Alpha", "x11", dec!(10)), ("Alpha", "x13", dec!(5))]);
        f.engine.tick();
        f.launcher.crash();

        f.advance(1);
        assert_eq!(f.engine.tick(), TickOutcome::Started(WorkloadId(2)));
        let status = f.engine.status();
        assert_eq!(status.workloads[0].status, WorkloadStatus::Dead);
        assert_eq!(status.workloads[0].time_mining, Duration::minutes(1));

        f.advance(6);
        assert!(matches!(
            f.engine.tick(),
            TickOutcome::Switched { to, .. } if to == WorkloadId(1)
        ));
    }

    #[test]
    fn test_banned_running_switches_immediately() {
        let config = EngineConfig {
            min_time: Duration::minutes(30),
            switch_time: Duration::minutes(10),
            ..EngineConfig::default()
        };
        let f = fixture(config, &[("Alpha", "x11", dec!(10)), ("Beta", "x11", dec!(1))]);
        f.engine.tick();
        assert_eq!(f.engine.toggle_ban("Alpha"), 1);
        f.advance(1);
        assert_eq!(
            f.engine.tick(),
            TickOutcome::Switched {
                from: WorkloadId(1),
                to: WorkloadId(2)
            }
        );
        assert_eq!(f.engine.status().workloads[0].status, WorkloadStatus::Banned);
    }

    #[test]
    fn test_no_candidate_stops() {
        let f = fixture(EngineConfig::default(), &[("Alpha", "x11", dec!(10))]);
        f.engine.tick();
        f.engine.toggle_ban("Alpha");
        assert_eq!(f.engine.tick(), TickOutcome::Stopped(WorkloadId(1)));
        assert_eq!(f.engine.tick(), TickOutcome::NoCandidate);
    }

    #[test]
    fn test_delay_gates_restart() {
        let config = EngineConfig {
            max_time: Duration::minutes(30),
            delay: Duration::minutes(2),
            ..EngineConfig::default()
        };
        let f = fixture(config, &[("Alpha", "x11", dec!(10))]);
        f.engine.tick();
        assert_eq!(f.engine.status().restart_in, Some(Duration::minutes(30)));

        f.advance(30);
        assert_eq!(f.engine.tick(), TickOutcome::CoolingDown);
        assert_eq!(f.engine.status().cooldown_in, Some(Duration::minutes(2)));
        f.advance(1);
        assert_eq!(f.engine.tick(), TickOutcome::CoolingDown);
        f.advance(1);
        assert_eq!(f.engine.tick(), TickOutcome::Started(WorkloadId(1)));
        assert_eq!(f.engine.status().total_time_mining, Duration::minutes(30));
    }

    #[test]
    fn test_outlier_holds() {
        let config = EngineConfig {
            ignore_outliers: true,
            ..EngineConfig::default()
        };
        let f = fixture(config, &[("Alpha", "x11", dec!(10)), ("Alpha", "x13", dec!(5))]);
        f.engine.tick();
        f.engine.update_price(WorkloadId(2), dec!(50));
        f.engine.record_stats(WorkloadId(2), true, dec!(5));
        f.advance(1);
        assert_eq!(f.engine.tick(), TickOutcome::Held(WorkloadId(1)));
    }

    #[test]
    fn test_price_floor_excludes() {
        let config = EngineConfig {
            min_price: dec!(0.02),
            ..EngineConfig::default()
        };
        let f = fixture(config, &[("Alpha", "x11", dec!(10))]);
        assert_eq!(f.engine.tick(), TickOutcome::NoCandidate);
    }

    #[test]
    fn test_request_stop_is_idempotent_and_clears_dead() {
        let f = fixture(EngineConfig::default(), &[("Alpha", "x11", dec!(10))]);
        f.engine.tick();
        f.launcher.crash();
        f.engine.tick();
        assert_eq!(f.engine.status().workloads[0].status, WorkloadStatus::Dead);

        f.engine.request_stop();
        f.engine.request_stop();
        let status = f.engine.status();
        assert_eq!(status.mode, MiningMode::Stopped);
        assert_eq!(status.workloads[0].status, WorkloadStatus::Idle);
        assert_eq!(f.launcher.log.lock().terminated, 1);
    }

    #[test]
    fn test_request_start_by_falls_back_to_best() {
        let f = fixture(
            EngineConfig::default(),
            &[("Alpha", "x11", dec!(10)), ("Beta", "x11", dec!(5))],
        );
        assert_eq!(
            f.engine.request_start_by("Beta", "x11").unwrap(),
            TickOutcome::Started(WorkloadId(2))
        );
        assert!(matches!(
            f.engine.request_start_by("Beta", "sha256").unwrap(),
            TickOutcome::Switched { to, .. } if to == WorkloadId(1)
        ));
        assert!(f.engine.request_start(WorkloadId(9)).is_err());
    }

    #[test]
    fn test_donation_flip() {
        let config = EngineConfig {
            donation: DonationConfig {
                frequency: Duration::minutes(100),
                fraction: 0.1,
            },
            ..EngineConfig::default()
        };
        let f = fixture(config, &[("Alpha", "x11", dec!(10))]);
        {
            let mut core = f.engine.core.lock();
            let w = core.catalog.get_mut(WorkloadId(1)).unwrap();
            w.donation = w.normal.clone();
            core.donation = DonationScheduler::new(core.config.donation, true);
        }
        f.engine.tick();
        f.advance(90);
        assert_eq!(f.engine.tick(), TickOutcome::Started(WorkloadId(1)));
        assert_eq!(f.engine.mode(), MiningMode::Donation);
        f.advance(10);
        f.engine.tick();
        assert_eq!(f.engine.mode(), MiningMode::Automatic);
    }

    #[test]
    fn test_donation_flip_after_exit_at_boundary() {
        let config = EngineConfig {
            donation: DonationConfig {
                frequency: Duration::minutes(100),
                fraction: 0.1,
            },
            ..EngineConfig::default()
        };
        let f = fixture(config, &[("Alpha", "x11", dec!(10)), ("Alpha", "x13", dec!(5))]);
        {
            let mut core = f.engine.core.lock();
            for id in [WorkloadId(1), WorkloadId(2)] {
                let w = core.catalog.get_mut(id).unwrap();
                let args = format!("-u donor -a {}", w.algo);
                w.donation = ExecSpec::new(w.normal.folder.as_str(), "miner", args);
            }
            core.donation = DonationScheduler::new(core.config.donation, true);
        }
        assert_eq!(f.engine.tick(), TickOutcome::Started(WorkloadId(1)));

        f.advance(90);
        f.launcher.crash();
        assert_eq!(f.engine.tick(), TickOutcome::Started(WorkloadId(2)));
        assert_eq!(f.engine.mode(), MiningMode::Donation);
        {
            let log = f.launcher.log.lock();
            assert_eq!(log.launched.len(), 2);
            assert_eq!(log.launched[1].arguments, vec!["-u", "donor", "-a", "x13"]);
        }

        // Nothing stopped and restarted on the following tick
        f.advance(1);
        assert_eq!(f.engine.tick(), TickOutcome::Held(WorkloadId(2)));
        assert_eq!(f.launcher.log.lock().launched.len(), 2);
    }

    #[test]
    fn test_price_overflow_faults_tick_and_recovers() {
        let f = fixture(
            EngineConfig::default(),
            &[("Alpha", "x11", dec!(10)), ("Alpha", "x13", dec!(5))],
        );
        assert_eq!(f.engine.tick(), TickOutcome::Started(WorkloadId(1)));

        f.engine.core.lock().catalog.get_mut(WorkloadId(1)).unwrap().hashrate =
            Decimal::from(10_000_000_000u64);
        let huge = Decimal::from_i128_with_scale(10i128.pow(25), 0);
        assert!(f.engine.update_price(WorkloadId(1), huge));
        f.advance(1);
        assert_eq!(f.engine.tick(), TickOutcome::Faulted);
        assert_eq!(f.running(), Some(WorkloadId(1)));
        assert_eq!(f.engine.status().workloads[0].net_earn, Decimal::MAX);

        // The lock is released and later ticks run normally
        assert!(f.engine.update_price(WorkloadId(1), Decimal::ZERO));
        f.advance(1);
        assert_eq!(
            f.engine.tick(),
            TickOutcome::Switched {
                from: WorkloadId(1),
                to: WorkloadId(2)
            }
        );
    }

    #[test]
    fn test_apply_prices_resolves_and_marks() {
        let f = fixture(
            EngineConfig::default(),
            &[("Alpha", "x11", dec!(0)), ("Alpha", "x13", dec!(0))],
        );
        let applied = f.engine.apply_prices(
            ServiceId(0),
            &[PriceQuote::new("x13", dec!(7)), PriceQuote::new("sha256", dec!(1))],
        );
        assert_eq!(applied, 1);
        assert!(f.engine.has_prices());
        assert!(f.engine.take_prices_updated());
        assert!(!f.engine.take_prices_updated());
        f.engine.with_catalog(|c| assert_eq!(c.get(WorkloadId(2)).unwrap().price, dec!(7)));

        f.engine.apply_balances(
            ServiceId(0),
            &[BalanceQuote::new("x11", dec!(0.1)), BalanceQuote::new("x13", dec!(0.2))],
        );
        f.engine
            .with_catalog(|c| assert_eq!(c.service(ServiceId(0)).unwrap().balance, dec!(0.3)));

        f.advance(31);
        assert!(f.engine.clear_stale_prices(ServiceId(0), &StalePolicy::default()));
        f.engine.with_catalog(|c| assert_eq!(c.get(WorkloadId(2)).unwrap().price, Decimal::ZERO));
    }

    #[test]
    fn test_update_exchange() {
        let f = fixture(EngineConfig::default(), &[("Alpha", "x11", dec!(10))]);
        assert!(!f.engine.update_exchange(dec!(0)));
        assert!(!f.engine.update_exchange(Decimal::ONE));
        assert!(f.engine.update_exchange(dec!(450)));
        assert_eq!(f.engine.pricing().exchange, dec!(450));
    }

    #[test]
    fn test_try_tick_coalesces() {
        let f = fixture(EngineConfig::default(), &[("Alpha", "x11", dec!(10))]);
        let guard = f.engine.core.lock();
        assert!(f.engine.try_tick().is_none());
        drop(guard);
        assert_eq!(f.engine.try_tick(), Some(TickOutcome::Started(WorkloadId(1))));
    }

    #[test]
    fn test_shutdown_leaves_windowed_process() {
        let f = fixture(EngineConfig::default(), &[("Alpha", "x11", dec!(10))]);
        f.engine.core.lock().catalog.get_mut(WorkloadId(1)).unwrap().use_window = true;
        f.engine.tick();
        f.engine.shutdown();
        assert_eq!(f.launcher.log.lock().terminated, 0);

        let g = fixture(EngineConfig::default(), &[("Alpha", "x11", dec!(10))]);
        g.engine.tick();
        g.engine.shutdown();
        assert_eq!(g.launcher.log.lock().terminated, 1);
    }
}
