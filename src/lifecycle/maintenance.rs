//! Periodic background maintenance.
//!
//! # Responsibilities
//! - Hourly: clear suspicion counters, purge expired blocks and rate-limit windows
//! - Every 5 minutes: prune old metrics and alerts
//! - Every minute: evaluate the trailing-minute error rate
//! - Every few seconds: resample process memory for the request path
//!
//! # Design Decisions
//! - One task per job so a slow job never delays another
//! - First run happens one full period after startup
//! - Every task exits on the broadcast shutdown

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::config::MaintenanceConfig;
use crate::context::GateContext;
use crate::lifecycle::Shutdown;

/// Run `job` every `period` until shutdown.
pub async fn run_periodic<F>(
    name: &'static str,
    period: Duration,
    mut shutdown: broadcast::Receiver<()>,
    job: F,
) where
    F: Fn() + Send + 'static,
{
    tracing::debug!(task = name, period_secs = period.as_secs_f64(), "Maintenance task starting");
    let mut ticker = time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => job(),
            _ = shutdown.recv() => {
                tracing::debug!(task = name, "Maintenance task received shutdown signal, exiting loop");
                break;
            }
        }
    }
}

/// Spawn the maintenance tasks.
pub fn spawn_maintenance(
    ctx: Arc<GateContext>,
    config: &MaintenanceConfig,
    shutdown: &Shutdown,
) -> Vec<JoinHandle<()>> {
    let housekeeping = {
        let ctx = ctx.clone();
        run_periodic(
            "housekeeping",
            Duration::from_secs(config.housekeeping_interval_secs),
            shutdown.subscribe(),
            move || {
                let (blocks, windows) = ctx.gate.housekeeping();
                tracing::info!(
                    expired_blocks = blocks,
                    expired_windows = windows,
                    "Security housekeeping complete"
                );
            },
        )
    };

    let prune = {
        let ctx = ctx.clone();
        run_periodic(
            "prune",
            Duration::from_secs(config.prune_interval_secs),
            shutdown.subscribe(),
            move || {
                let (metrics, alerts) = ctx.performance.prune();
                tracing::debug!(metrics, alerts, "Pruned performance history");
            },
        )
    };

    let error_rate = {
        let ctx = ctx.clone();
        run_periodic(
            "error_rate",
            Duration::from_secs(config.error_rate_interval_secs),
            shutdown.subscribe(),
            move || {
                ctx.performance.check_error_rate();
            },
        )
    };

    let memory = run_periodic(
        "memory",
        Duration::from_secs(config.memory_sample_interval_secs),
        shutdown.subscribe(),
        move || ctx.performance.refresh_memory(),
    );

    vec![
        tokio::spawn(housekeeping),
        tokio::spawn(prune),
        tokio::spawn(error_rate),
        tokio::spawn(memory),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_runs_until_shutdown() {
        let shutdown = Shutdown::new();
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = runs.clone();

        let handle = tokio::spawn(run_periodic(
            "test",
            Duration::from_millis(10),
            shutdown.subscribe(),
            move || {
                counter.fetch_add(1, Ordering::SeqCst);
            },
        ));

        time::sleep(Duration::from_millis(80)).await;
        shutdown.trigger();
        handle.await.unwrap();

        let seen = runs.load(Ordering::SeqCst);
        assert!(seen >= 1);
        time::sleep(Duration::from_millis(30)).await;
        assert_eq!(runs.load(Ordering::SeqCst), seen);
    }

    #[tokio::test]
    async fn test_first_run_waits_one_period() {
        let shutdown = Shutdown::new();
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = runs.clone();

        let handle = tokio::spawn(run_periodic(
            "slow",
            Duration::from_secs(3600),
            shutdown.subscribe(),
            move || {
                counter.fetch_add(1, Ordering::SeqCst);
            },
        ));

        time::sleep(Duration::from_millis(20)).await;
        shutdown.trigger();
        handle.await.unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }
}
