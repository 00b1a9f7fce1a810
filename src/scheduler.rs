//! Fixed-delay task loop with shutdown signalling.

use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{error, info};

/// Runs `task` forever at a fixed delay: run, log any failure, wait
/// `interval`, repeat. A failed run is retried on the same cadence as a
/// successful one.
///
/// The loop stops at the wait boundary when the shutdown channel fires
/// or its sender is dropped; a run already in flight completes first.
pub async fn run_periodic<F, Fut, E>(
    name: &'static str,
    interval: Duration,
    mut shutdown: watch::Receiver<()>,
    task: F,
) where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<(), E>>,
    E: std::fmt::Display,
{
    info!(task = %name, interval = ?interval, "scheduler started");
    loop {
        if let Err(e) = task().await {
            error!(task = %name, error = %e, "task run failed");
        }

        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = shutdown.changed() => {
                info!(task = %name, "scheduler stopping");
                return;
            }
        }
    }
}
