use std::sync::Arc;

use tokio::sync::Mutex;

use crate::engine::eta::EtaEstimator;
use crate::engine::pipeline::TelemetryPipeline;
use crate::engine::proximity::ProximityTracker;
use crate::engine::queue::TelemetryQueue;
use crate::engine::sampling::SamplingController;
use crate::engine::sync::SyncManager;
use crate::models::profile::AppVisibility;
use crate::observability::metrics::Metrics;
use crate::platform::{
    BatteryLevel, ChannelPositionSource, DeferredScheduler, IngestionEndpoint, ReportedBattery,
    TokenProvider,
};

/// Outside services the engine delivers through.
pub struct Collaborators {
    pub tokens: Arc<dyn TokenProvider>,
    pub endpoint: Arc<dyn IngestionEndpoint>,
    pub scheduler: Option<Arc<dyn DeferredScheduler>>,
}

#[derive(Debug, Clone)]
pub struct StateOptions {
    pub event_buffer_size: usize,
    pub proximity_threshold: f64,
    pub battery_fraction: Option<f64>,
}

impl Default for StateOptions {
    fn default() -> Self {
        Self {
            event_buffer_size: 1024,
            proximity_threshold: crate::engine::proximity::DEFAULT_THRESHOLD_RATIO,
            battery_fraction: None,
        }
    }
}

pub struct AppState {
    pub positions: Arc<ChannelPositionSource>,
    pub battery: Arc<ReportedBattery>,
    pub queue: Arc<TelemetryQueue>,
    pub sync: Arc<SyncManager>,
    pub proximity: Arc<ProximityTracker>,
    pub pipeline: Arc<TelemetryPipeline>,
    pub controller: Mutex<SamplingController>,
    pub eta: EtaEstimator,
    pub metrics: Metrics,
}

impl AppState {
    pub fn new(
        queue: Arc<TelemetryQueue>,
        collaborators: Collaborators,
        options: StateOptions,
        metrics: Metrics,
    ) -> Self {
        let positions = Arc::new(ChannelPositionSource::new(options.event_buffer_size));
        let battery = Arc::new(ReportedBattery::new(options.battery_fraction));

        let mut sync = SyncManager::new(
            queue.clone(),
            collaborators.tokens,
            collaborators.endpoint,
            metrics.clone(),
        );
        if let Some(scheduler) = collaborators.scheduler {
            sync = sync.with_scheduler(scheduler);
        }
        let sync = Arc::new(sync);

        let proximity = Arc::new(ProximityTracker::new(
            options.proximity_threshold,
            options.event_buffer_size,
            metrics.clone(),
        ));
        let pipeline = Arc::new(TelemetryPipeline::new(
            sync.clone(),
            proximity.clone(),
            options.event_buffer_size,
        ));

        let controller = SamplingController::new(positions.clone(), pipeline.clone(), metrics.clone())
            .with_conditions(AppVisibility::Active, battery.fraction());

        Self {
            positions,
            battery,
            queue,
            sync,
            proximity,
            pipeline,
            controller: Mutex::new(controller),
            eta: EtaEstimator::with_defaults(),
            metrics,
        }
    }
}
