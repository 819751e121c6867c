//! Decision tick timer

use std::time::Duration;

use switchyard_engine::MiningEngine;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::debug;

/// Tick the engine every `period` until shutdown
///
/// Nothing is ticked before the first prices land. A tick that follows a
/// price update waits for the engine lock; otherwise a busy engine skips
/// the tick.
pub async fn tick_loop(engine: MiningEngine, period: Duration, mut shutdown: watch::Receiver<bool>) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                if !engine.has_prices() {
                    continue;
                }
                let outcome = if engine.take_prices_updated() {
                    Some(engine.tick())
                } else {
                    engine.try_tick()
                };
                if let Some(outcome) = outcome {
                    debug!(?outcome, "Tick");
                }
            }
            _ = shutdown.changed() => return,
        }
    }
}
