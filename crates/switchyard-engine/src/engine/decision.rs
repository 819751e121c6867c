//! The decision tick

use chrono::{DateTime, Duration, Utc};
use switchyard_common::{profit_ratio, MiningMode, Result, SwitchyardError, WorkloadId};
use tracing::{debug, error, warn};

use super::state::{EngineCore, PendingSwitch};
use crate::catalog::WorkloadCatalog;

/// What a tick did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Mode is stopped; only dead detection ran
    Idle,
    /// Nothing usable and nothing running
    NoCandidate,
    /// Nothing usable; the running workload was stopped
    Stopped(WorkloadId),
    /// The running workload keeps running
    Held(WorkloadId),
    /// A workload was started with nothing running before
    Started(WorkloadId),
    Switched { from: WorkloadId, to: WorkloadId },
    /// Stopped or idle, waiting out the inter-run delay
    CoolingDown,
    /// The chosen workload failed to launch and is now dead
    LaunchFailed(WorkloadId),
    /// The tick raised an error and was abandoned
    Faulted,
}

impl EngineCore {
    /// Run one tick, logging and swallowing any error
    pub(crate) fn tick(&mut self, now: DateTime<Utc>) -> TickOutcome {
        match self.run_best(now) {
            Ok(outcome) => {
                debug!(?outcome, "Tick complete");
                outcome
            }
            Err(e) => {
                error!("Tick failed: {}", e);
                TickOutcome::Faulted
            }
        }
    }

    fn run_best(&mut self, now: DateTime<Utc>) -> Result<TickOutcome> {
        self.check_dead(now);
        if self.supervisor.active().is_none() {
            self.pending = PendingSwitch::None;
        }
        if self.mode == MiningMode::Stopped {
            return Ok(TickOutcome::Idle);
        }

        self.check_donation(now);
        self.check_max_time(now);

        self.catalog
            .tag_price_floor(self.config.min_price, &self.pricing)?;

        let ranked: Vec<WorkloadId> = {
            let usable =
                self.catalog
                    .filter_usable(now, self.config.dead_time, self.launch_mode());
            WorkloadCatalog::rank(usable, self.config.mine_by_average, &self.pricing)?
                .iter()
                .map(|w| w.id)
                .collect()
        };

        let running = self.supervisor.running_id();
        let top = match ranked.first() {
            Some(top) => *top,
            None => {
                return Ok(match self.stop_miner(now) {
                    Some(run) => TickOutcome::Stopped(run.workload),
                    None => TickOutcome::NoCandidate,
                });
            }
        };

        if let Some(current) = running {
            if current != top && self.workload(current)?.banned {
                self.stop_miner(now);
                return Ok(self.launch(top, now, Some(current)));
            }
        }

        let mut best = top;
        match running {
            Some(current) => {
                let ratio = profit_ratio(self.ranking_earn(top)?, self.ranking_earn(current)?);
                self.last_ratio = Some(ratio);

                if self.config.switch_time > Duration::zero() {
                    match self.pending {
                        PendingSwitch::None if top != current => {
                            self.pending = PendingSwitch::Pending {
                                target: top,
                                since: now,
                            };
                        }
                        PendingSwitch::Pending { .. } if top == current => {
                            self.pending = PendingSwitch::None;
                        }
                        _ => {}
                    }
                    if self
                        .next_run_wait(now)
                        .map_or(false, |wait| wait > Duration::zero())
                    {
                        best = current;
                    }
                }
            }
            None => self.last_ratio = None,
        }

        self.catalog
            .clear_decayed_dead(now, self.config.dead_time);

        if let Some(current) = running {
            let ratio = self.last_ratio.unwrap_or_default();
            let threshold = self.switch_threshold(self.workload(top)?, self.workload(current)?);
            let outlier = !self.config.mine_by_average
                && self.config.ignore_outliers
                && self.workload(best)?.outlier;
            let elapsed = self.run_elapsed(now).unwrap_or_else(Duration::zero);

            if ratio < threshold || outlier || best == current || elapsed < self.config.min_time {
                return Ok(TickOutcome::Held(current));
            }
            self.stop_miner(now);
        }

        if self.cooldown_remaining(now).is_some() {
            return Ok(TickOutcome::CoolingDown);
        }
        Ok(self.launch(best, now, running))
    }

    /// Start a workload, converting launch failures into an outcome
    fn launch(
        &mut self,
        id: WorkloadId,
        now: DateTime<Utc>,
        previous: Option<WorkloadId>,
    ) -> TickOutcome {
        match self.start_miner(id, now) {
            Ok(()) => match previous {
                Some(from) if from != id => TickOutcome::Switched { from, to: id },
                _ => TickOutcome::Started(id),
            },
            Err(SwitchyardError::Launch(e)) => {
                warn!(workload = %id, "Launch failed: {}", e);
                TickOutcome::LaunchFailed(id)
            }
            Err(e) => {
                error!(workload = %id, "Start failed: {}", e);
                TickOutcome::Faulted
            }
        }
    }
}
