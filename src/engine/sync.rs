use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::engine::queue::TelemetryQueue;
use crate::error::TelemetryError;
use crate::models::location::LocationSample;
use crate::observability::metrics::Metrics;
use crate::platform::{DeferredScheduler, IngestionEndpoint, TokenProvider};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SyncOutcome {
    Delivered,
    Queued,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DrainReport {
    pub owner_id: Uuid,
    pub delivered: usize,
    pub remaining: usize,
    /// First sample that failed; the pass stops there to keep capture order.
    pub halted_on: Option<Uuid>,
}

/// Delivers samples to the ingestion endpoint, falling back to the durable
/// queue. Delivery is at-least-once: the endpoint deduplicates by sample id.
pub struct SyncManager {
    queue: Arc<TelemetryQueue>,
    tokens: Arc<dyn TokenProvider>,
    endpoint: Arc<dyn IngestionEndpoint>,
    scheduler: Option<Arc<dyn DeferredScheduler>>,
    drain_locks: DashMap<Uuid, Arc<Mutex<()>>>,
    metrics: Metrics,
}

impl SyncManager {
    pub fn new(
        queue: Arc<TelemetryQueue>,
        tokens: Arc<dyn TokenProvider>,
        endpoint: Arc<dyn IngestionEndpoint>,
        metrics: Metrics,
    ) -> Self {
        Self {
            queue,
            tokens,
            endpoint,
            scheduler: None,
            drain_locks: DashMap::new(),
            metrics,
        }
    }

    pub fn with_scheduler(mut self, scheduler: Arc<dyn DeferredScheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    pub fn supports_deferred_retry(&self) -> bool {
        self.scheduler.is_some()
    }

    pub fn queue(&self) -> &Arc<TelemetryQueue> {
        &self.queue
    }

    /// Attempts immediate delivery; on any auth or delivery failure the sample
    /// is queued instead. Only a local storage failure is returned as an error.
    pub async fn submit(&self, sample: LocationSample) -> Result<SyncOutcome, TelemetryError> {
        match self.deliver(&sample).await {
            Ok(()) => {
                self.metrics
                    .deliveries_total
                    .with_label_values(&["delivered"])
                    .inc();
                if self.queue.mark_synced(sample.id).await? {
                    self.queue.purge_synced().await?;
                }
                debug!(sample_id = %sample.id, "sample delivered");
                Ok(SyncOutcome::Delivered)
            }
            Err(err) => {
                warn!(sample_id = %sample.id, owner_id = %sample.owner_id, error = %err, "delivery failed; queueing sample");
                let owner_id = sample.owner_id;
                self.queue.enqueue(sample).await?;
                self.metrics
                    .deliveries_total
                    .with_label_values(&["queued"])
                    .inc();
                self.schedule_retry(owner_id);
                Ok(SyncOutcome::Queued)
            }
        }
    }

    /// Replays the owner's pending samples oldest first, stopping at the first
    /// failure. Concurrent drains for one owner run one after the other.
    pub async fn drain(&self, owner_id: Uuid) -> Result<DrainReport, TelemetryError> {
        let lock = self.drain_locks.entry(owner_id).or_default().clone();
        let report = {
            let _guard = lock.lock().await;
            self.drain_locked(owner_id).await
        };

        // Forget the lock once no other drain for this owner holds or awaits it.
        drop(lock);
        self.drain_locks
            .remove_if(&owner_id, |_, lock| Arc::strong_count(lock) == 1);

        report
    }

    /// Owners with a drain in progress or waiting to start.
    pub fn draining_owners(&self) -> usize {
        self.drain_locks.len()
    }

    async fn drain_locked(&self, owner_id: Uuid) -> Result<DrainReport, TelemetryError> {
        let start = Instant::now();
        let pending = self.queue.list_pending_for(owner_id).await;
        let mut delivered = 0;
        let mut halted_on = None;

        for sample in &pending {
            match self.deliver(sample).await {
                Ok(()) => {
                    self.queue.mark_synced(sample.id).await?;
                    delivered += 1;
                }
                Err(err) => {
                    warn!(owner_id = %owner_id, sample_id = %sample.id, error = %err, "drain halted");
                    halted_on = Some(sample.id);
                    break;
                }
            }
        }

        self.queue.purge_synced().await?;

        let outcome = if halted_on.is_some() { "halted" } else { "complete" };
        self.metrics
            .drain_latency_seconds
            .with_label_values(&[outcome])
            .observe(start.elapsed().as_secs_f64());
        self.metrics
            .deliveries_total
            .with_label_values(&["drained"])
            .inc_by(delivered as u64);

        if halted_on.is_some() {
            self.schedule_retry(owner_id);
        }

        let report = DrainReport {
            owner_id,
            delivered,
            remaining: pending.len() - delivered,
            halted_on,
        };
        if !pending.is_empty() {
            info!(
                owner_id = %owner_id,
                delivered = report.delivered,
                remaining = report.remaining,
                "queue drained"
            );
        }
        Ok(report)
    }

    pub async fn drain_all(&self) -> Result<Vec<DrainReport>, TelemetryError> {
        let mut reports = Vec::new();
        for owner_id in self.queue.owners_with_pending().await {
            reports.push(self.drain(owner_id).await?);
        }
        Ok(reports)
    }

    async fn deliver(&self, sample: &LocationSample) -> Result<(), TelemetryError> {
        let token = self.tokens.identity_token(sample.owner_id)?;
        self.endpoint.deliver(&token, sample).await
    }

    fn schedule_retry(&self, owner_id: Uuid) {
        match &self.scheduler {
            Some(scheduler) => {
                if scheduler.register_retry(owner_id) {
                    debug!(owner_id = %owner_id, "deferred retry registered");
                }
            }
            None => debug!(owner_id = %owner_id, "no deferred execution; waiting for manual drain"),
        }
    }
}
