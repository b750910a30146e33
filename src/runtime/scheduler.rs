//! Interval triggers for the sync run and the health checks.
//!
//! Each trigger is its own loop, so a long sync never delays health checks.
//! A loop awaits its own invocation before taking the next tick, which means
//! one trigger never overlaps itself; missed ticks are skipped, not replayed.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info};

use crate::config::ScheduleConfig;
use crate::core::{HealthMonitor, Spawn, SyncOrchestrator};

/// Running trigger loops.
pub struct ScheduleHandle {
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl ScheduleHandle {
    /// Stop both loops and wait for them to exit. An invocation already in
    /// progress finishes first.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        for task in self.tasks {
            if let Err(e) = task.await {
                error!(error = %e, "schedule loop terminated abnormally");
            }
        }
        info!("schedules stopped");
    }
}

/// Start the daily sync and the periodic health checks. The first invocation
/// of each happens one full interval after this call.
pub fn spawn_schedules<S>(
    orchestrator: Arc<SyncOrchestrator<S>>,
    health: Arc<HealthMonitor<S>>,
    cfg: &ScheduleConfig,
) -> ScheduleHandle
where
    S: Spawn + Send + Sync + 'static,
{
    let (shutdown, rx) = watch::channel(false);

    let sync_every = Duration::from_secs(cfg.sync_interval_secs);
    let sync_task = tokio::spawn(trigger_loop("sync", sync_every, rx.clone(), move || {
        let orchestrator = Arc::clone(&orchestrator);
        async move {
            match orchestrator.run().await {
                Ok(run) => debug!(run_id = %run.id, "scheduled sync finished"),
                Err(e) => error!(error = %e, "scheduled sync failed"),
            }
        }
    }));

    let health_every = Duration::from_secs(cfg.health_interval_secs);
    let health_task = tokio::spawn(trigger_loop("health", health_every, rx, move || {
        let health = Arc::clone(&health);
        async move {
            let snapshot = health.run_checks().await;
            debug!(healthy = snapshot.healthy, "scheduled health check finished");
        }
    }));

    info!(
        sync_interval_secs = cfg.sync_interval_secs,
        health_interval_secs = cfg.health_interval_secs,
        "schedules started"
    );

    ScheduleHandle {
        shutdown,
        tasks: vec![sync_task, health_task],
    }
}

async fn trigger_loop<F, Fut>(
    name: &'static str,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
    mut fire: F,
) where
    F: FnMut() -> Fut + Send,
    Fut: Future<Output = ()> + Send,
{
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                debug!(trigger = name, "trigger fired");
                fire().await;
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    debug!(trigger = name, "trigger loop stopping");
                    return;
                }
            }
        }
    }
}
