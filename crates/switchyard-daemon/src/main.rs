//! Switchyard Daemon Binary
//!
//! Runs the most profitable configured workload and switches as prices move.

use std::time::Duration;

use anyhow::Result;
use switchyard_common::{MiningMode, VERSION};
use switchyard_daemon::{
    build_catalog, tick_loop, DaemonConfig, NotificationDrain, RemoteReceiver, RemoteSender,
};
use switchyard_engine::{ActivityLog, ActivityNotifier, MiningEngine, PriceFeed};
use switchyard_pricing::StalePolicy;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .init();

    info!("Starting Switchyard v{}", VERSION);

    // Load configuration
    let config = DaemonConfig::load()?;
    let engine_config = config.engine_config()?;
    info!(
        "Timing: min_time={}m max_time={}m switch_time={}m delay={}s dead_time={}m",
        config.general.min_time,
        config.general.max_time,
        config.general.switch_time,
        config.general.delay,
        config.general.dead_time
    );

    let loaded = build_catalog(&config)?;
    let (notifier, notifications) = ActivityNotifier::channel();

    let engine = MiningEngine::builder(engine_config, loaded.catalog)
        .with_notifier(notifier.clone())
        .with_pricing(config.power_pricing())
        .with_mode(MiningMode::Automatic)
        .build();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut tasks = Vec::new();

    // Notification drain
    let mut drain = NotificationDrain::new();
    if config.general.remote_send {
        match RemoteSender::bind().await {
            Ok(sender) => drain = drain.with_remote(sender),
            Err(e) => warn!("Remote send disabled: {}", e),
        }
    }
    if config.general.log_activity {
        drain = drain.with_activity_log(ActivityLog::new(&config.general.activity_log_path));
    }
    let drain_task = tokio::spawn(drain.run(notifications));

    // Remote console
    if config.general.remote_receive {
        match RemoteReceiver::join().await {
            Ok(receiver) => tasks.push(tokio::spawn(
                receiver.run(notifier.clone(), shutdown_rx.clone()),
            )),
            Err(e) => warn!("Remote receive disabled: {}", e),
        }
    }
    drop(notifier);

    // Price feeds
    let stale = StalePolicy::new(config.stale_after());
    for (service_id, service) in loaded.services {
        let feed = PriceFeed::new(engine.clone(), service_id, service)
            .with_interval(config.poll_interval())
            .with_stale_policy(stale);
        tasks.push(tokio::spawn(feed.run(shutdown_rx.clone())));
    }

    // Decision ticks
    tasks.push(tokio::spawn(tick_loop(
        engine.clone(),
        config.tick_interval(),
        shutdown_rx.clone(),
    )));

    info!("Switchyard started successfully");

    match config.exit_after() {
        Some(after) => {
            info!("Exiting automatically after {:?}", after);
            tokio::select! {
                result = tokio::signal::ctrl_c() => result?,
                _ = tokio::time::sleep(after) => info!("Exit time reached"),
            }
        }
        None => tokio::signal::ctrl_c().await?,
    }

    info!("Shutting down...");
    let _ = shutdown_tx.send(true);
    for task in tasks {
        if let Err(e) = task.await {
            warn!("Task ended abnormally: {}", e);
        }
    }
    engine.shutdown();
    drop(engine);

    if tokio::time::timeout(Duration::from_secs(2), drain_task)
        .await
        .is_err()
    {
        warn!("Notification drain did not finish");
    }

    Ok(())
}
