use std::sync::Arc;

use dashmap::DashSet;
use tokio::sync::mpsc;
use tokio::time::{Duration, MissedTickBehavior, sleep};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::engine::sync::SyncManager;
use crate::platform::DeferredScheduler;

/// Deferred-execution capability backed by the tokio runtime.
#[derive(Clone)]
pub struct TokioDeferredScheduler {
    tx: mpsc::Sender<Uuid>,
    pending: Arc<DashSet<Uuid>>,
}

pub struct RetryQueue {
    rx: mpsc::Receiver<Uuid>,
    pending: Arc<DashSet<Uuid>>,
}

pub fn deferred_channel(capacity: usize) -> (TokioDeferredScheduler, RetryQueue) {
    let (tx, rx) = mpsc::channel(capacity);
    let pending = Arc::new(DashSet::new());
    (
        TokioDeferredScheduler {
            tx,
            pending: pending.clone(),
        },
        RetryQueue { rx, pending },
    )
}

impl TokioDeferredScheduler {
    pub fn is_pending(&self, owner_id: Uuid) -> bool {
        self.pending.contains(&owner_id)
    }
}

impl DeferredScheduler for TokioDeferredScheduler {
    fn register_retry(&self, owner_id: Uuid) -> bool {
        if !self.pending.insert(owner_id) {
            return false;
        }

        if let Err(err) = self.tx.try_send(owner_id) {
            warn!(owner_id = %owner_id, error = %err, "retry channel unavailable");
            self.pending.remove(&owner_id);
            return false;
        }

        true
    }
}

/// Runs each registered retry once after `delay`.
pub async fn run_retry_worker(sync: Arc<SyncManager>, mut retries: RetryQueue, delay: Duration) {
    info!(delay_secs = delay.as_secs(), "retry worker started");

    while let Some(owner_id) = retries.rx.recv().await {
        let sync = sync.clone();
        let pending = retries.pending.clone();

        tokio::spawn(async move {
            sleep(delay).await;
            // Cleared before draining so a failed pass can register the next retry.
            pending.remove(&owner_id);
            if let Err(err) = sync.drain(owner_id).await {
                error!(owner_id = %owner_id, error = %err, "deferred drain failed");
            }
        });
    }

    warn!("retry worker stopped: retry channel closed");
}

/// Manual-drain fallback for platforms without deferred execution.
pub async fn run_periodic_drain(
    sync: Arc<SyncManager>,
    interval: Duration,
    cancel: CancellationToken,
) {
    info!(interval_secs = interval.as_secs(), "periodic drain started");

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                if let Err(err) = sync.drain_all().await {
                    error!(error = %err, "periodic drain failed");
                }
            }
        }
    }

    info!("periodic drain stopped");
}
