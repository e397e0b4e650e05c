//! Background reclamation of lapsed holds.
//!
//! A single sweeper task wakes on a fixed interval, asks the store for
//! `Pending` reservations past their deadline and expires each one through
//! the lifecycle engine. The engine re-checks status and deadline under
//! the per-reservation lock, so a buyer action racing the sweep is safe:
//! exactly one side wins.

use crate::config::EngineConfig;
use crate::lifecycle::ReservationLifecycle;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Periodic sweeper for expired `Pending` reservations
pub struct ExpirationReclaimer {
    lifecycle: Arc<ReservationLifecycle>,
    interval: std::time::Duration,
}

/// Handle to a running reclaimer; dropping it does not stop the task,
/// call [`ReclaimerHandle::shutdown`]
pub struct ReclaimerHandle {
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl ReclaimerHandle {
    /// Signals the sweeper to stop and waits for the in-flight sweep to
    /// finish
    pub async fn shutdown(self) {
        let _ = self.stop.send(true);
        let _ = self.task.await;
        tracing::info!("reclaimer stopped");
    }
}

impl ExpirationReclaimer {
    /// Creates a reclaimer over the lifecycle engine
    #[must_use]
    pub fn new(lifecycle: Arc<ReservationLifecycle>, config: &EngineConfig) -> Self {
        Self {
            lifecycle,
            interval: config.reclaim_interval,
        }
    }

    /// Performs one sweep, returning how many reservations were expired
    pub async fn run_once(&self) -> usize {
        let now = self.lifecycle.clock().now();
        let candidates = self.lifecycle.store().expired_pending(now).await;
        let mut reclaimed = 0;
        for id in candidates {
            match self.lifecycle.expire_reservation(id).await {
                Ok(true) => reclaimed += 1,
                Ok(false) => {}
                Err(err) => {
                    tracing::warn!(reservation = %id, error = %err, "expiration sweep failed");
                }
            }
        }
        if reclaimed > 0 {
            metrics::counter!("reclaimer.sweeps.reclaimed").increment(reclaimed as u64);
            tracing::info!(reclaimed, "expiration sweep reclaimed holds");
        }
        reclaimed
    }

    /// Spawns the periodic sweep loop
    #[must_use]
    pub fn spawn(self) -> ReclaimerHandle {
        let interval = self.interval;
        let (stop, mut stopped) = watch::channel(false);
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        self.run_once().await;
                    }
                    _ = stopped.changed() => {
                        if *stopped.borrow() {
                            break;
                        }
                    }
                }
            }
        });
        tracing::info!(interval_secs = interval.as_secs(), "reclaimer started");
        ReclaimerHandle { stop, task }
    }
}
