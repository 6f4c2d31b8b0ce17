use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tracing::error;

use crate::engine::proximity::ProximityTracker;
use crate::engine::sampling::SampleSink;
use crate::engine::sync::SyncManager;
use crate::models::location::LocationSample;

/// Fan-out for accepted samples: live stream, proximity tracking, then delivery.
pub struct TelemetryPipeline {
    sync: Arc<SyncManager>,
    proximity: Arc<ProximityTracker>,
    samples_tx: broadcast::Sender<LocationSample>,
}

impl TelemetryPipeline {
    pub fn new(
        sync: Arc<SyncManager>,
        proximity: Arc<ProximityTracker>,
        event_buffer_size: usize,
    ) -> Self {
        let (samples_tx, _unused_rx) = broadcast::channel(event_buffer_size);
        Self {
            sync,
            proximity,
            samples_tx,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LocationSample> {
        self.samples_tx.subscribe()
    }
}

#[async_trait]
impl SampleSink for TelemetryPipeline {
    async fn accept(&self, sample: LocationSample) {
        let _ = self.samples_tx.send(sample.clone());

        let observed_at =
            DateTime::<Utc>::from_timestamp_millis(sample.captured_at_epoch_ms).unwrap_or_else(Utc::now);
        self.proximity
            .observe(sample.owner_id, sample.point(), observed_at);

        let sample_id = sample.id;
        if let Err(err) = self.sync.submit(sample).await {
            error!(sample_id = %sample_id, error = %err, "sample could not be delivered or queued");
        }
    }
}
