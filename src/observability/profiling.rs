//! Runtime profiling loop.
//!
//! Periodically samples the Tokio runtime and publishes gauges. Best-effort:
//! it never fails, and it exits when shutdown is signalled.

use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time;

use crate::observability::metrics::StatsScope;

pub async fn run_profiler(
    stats: StatsScope,
    interval: Duration,
    mut shutdown: broadcast::Receiver<()>,
) {
    let stats = stats.scope("runtime");
    let mut ticker = time::interval(interval.max(Duration::from_millis(100)));

    tracing::debug!(interval = ?interval, "Profiler starting");

    loop {
        tokio::select! {
            _ = ticker.tick() => sample(&stats),
            _ = shutdown.recv() => {
                tracing::debug!("Profiler received shutdown signal, exiting loop");
                break;
            }
        }
    }
}

fn sample(stats: &StatsScope) {
    let runtime = tokio::runtime::Handle::current().metrics();
    stats.gauge("workers", runtime.num_workers() as f64);
    stats.gauge("alive_tasks", runtime.num_alive_tasks() as f64);
    stats.gauge("global_queue_depth", runtime.global_queue_depth() as f64);
}
