//! Simulated progress ticks.
//!
//! The estimator knows nothing about real progress. It only emits a tick
//! on its own fixed period; the orchestrator applies each tick to the
//! job's [`ProgressState`](batchvision_core::progress::ProgressState),
//! which enforces the clamp and monotonicity.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::config::DEFAULT_PROGRESS_INTERVAL;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EstimatorConfig {
    pub interval: Duration,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_PROGRESS_INTERVAL,
        }
    }
}

/// Spawn a task that calls `on_tick` once per interval until `cancel`
/// fires or the receiving side is gone.
///
/// The first tick happens one full interval after spawning. `on_tick`
/// returns the message to forward; the task exits when `tx` is closed.
pub fn spawn<M, F>(
    config: EstimatorConfig,
    tx: mpsc::Sender<M>,
    cancel: CancellationToken,
    mut on_tick: F,
) -> JoinHandle<u64>
where
    M: Send + 'static,
    F: FnMut() -> M + Send + 'static,
{
    tokio::spawn(async move {
        let period = config.interval;
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut ticks = 0u64;

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    ticks += 1;
                    if tx.send(on_tick()).await.is_err() {
                        break;
                    }
                }
            }
        }

        tracing::trace!(ticks, "Progress estimator stopped");
        ticks
    })
}
