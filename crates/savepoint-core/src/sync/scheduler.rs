//! Background auto-sync task.
//!
//! Each tick snapshots the pending queue and attempts one sync per id.
//! Failures are isolated per item: a conflict or transient error leaves the
//! id queued for the next tick; the scheduler never resolves conflicts.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::engine::SaveEngine;
use crate::error::Error;

/// Handle to the periodic auto-sync task. Stopping is explicit via
/// [`AutoSyncScheduler::shutdown`]; dropping the handle aborts the task.
pub struct AutoSyncScheduler {
    shutdown: watch::Sender<bool>,
    handle: Option<JoinHandle<()>>,
}

impl AutoSyncScheduler {
    /// Spawn the scheduler over a shared engine handle.
    #[must_use]
    pub fn start(engine: Arc<SaveEngine>, interval: Duration) -> Self {
        let (shutdown, mut rx) = watch::channel(false);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            tracing::info!(interval_secs = interval.as_secs(), "auto-sync scheduler started");

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        run_once(&engine).await;
                    }
                    changed = rx.changed() => {
                        if changed.is_err() || *rx.borrow() {
                            break;
                        }
                    }
                }
            }
            tracing::info!("auto-sync scheduler stopped");
        });

        Self {
            shutdown,
            handle: Some(handle),
        }
    }

    /// Stop the scheduler and wait for the task to finish.
    pub async fn shutdown(mut self) {
        let _ = self.shutdown.send(true);
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for AutoSyncScheduler {
    fn drop(&mut self) {
        if let Some(handle) = &self.handle {
            handle.abort();
        }
    }
}

/// One pass over the pending queue. Exposed so callers and tests can drive
/// a drain deterministically.
pub async fn run_once(engine: &SaveEngine) {
    let pending = engine.pending_sync().await;
    if pending.is_empty() {
        return;
    }
    tracing::debug!(count = pending.len(), "auto-sync pass starting");

    for save_id in pending {
        match engine.sync_with_cloud(&save_id, false).await {
            Ok(outcome) => {
                tracing::debug!(%save_id, %outcome, "auto-sync attempt finished");
            }
            Err(Error::ConflictUnresolved(_)) => {
                tracing::debug!(%save_id, "auto-sync skipped, conflict pending");
            }
            Err(error) => {
                tracing::warn!(%save_id, "auto-sync attempt failed: {error}");
            }
        }
    }
}
