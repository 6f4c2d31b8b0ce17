use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use futures::StreamExt;
use prometheus::IntGauge;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Duration, sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::TelemetryError;
use crate::models::location::{LocationSample, PositionError, PositionFix};
use crate::models::profile::{AppVisibility, SamplingMode, SamplingProfile};
use crate::observability::metrics::Metrics;
use crate::platform::{PositionSource, PositionStream};

pub const LOW_BATTERY_FRACTION: f64 = 0.20;
pub const BACKGROUND_THROTTLE_MS: i64 = 30_000;
pub const TIMEOUT_RETRY_DELAY: Duration = Duration::from_secs(5);

const NO_SAMPLE: i64 = i64::MIN;

/// Low battery wins over visibility; hidden apps sample like background ones.
pub fn select_profile(visibility: AppVisibility, battery_fraction: Option<f64>) -> SamplingProfile {
    if matches!(battery_fraction, Some(fraction) if fraction < LOW_BATTERY_FRACTION) {
        return SamplingProfile::battery_saver();
    }

    match visibility {
        AppVisibility::Active => SamplingProfile::active(),
        AppVisibility::Background | AppVisibility::Hidden => SamplingProfile::background(),
    }
}

/// Receives every sample the controller accepts.
#[async_trait]
pub trait SampleSink: Send + Sync {
    async fn accept(&self, sample: LocationSample);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FailureKind {
    Acquisition,
    Timeout,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WatchFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl WatchFailure {
    fn from_position_error(error: &PositionError) -> Self {
        let kind = match error {
            PositionError::Timeout => FailureKind::Timeout,
            PositionError::PermissionDenied | PositionError::Unavailable(_) => {
                FailureKind::Acquisition
            }
        };
        Self {
            kind,
            message: error.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum WatchStatus {
    Idle,
    Watching { owner_id: Uuid, mode: SamplingMode },
    RetryScheduled { owner_id: Uuid, retry_in_ms: u64 },
    Failed { owner_id: Uuid, failure: WatchFailure },
    Stopped { owner_id: Uuid },
}

struct ActiveWatch {
    owner_id: Uuid,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Owns the single continuous position watch of a device session.
///
/// `restart` and `stop` cancel the running watch and wait for its task to
/// finish before anything new is opened, so one owner never has two watches.
pub struct SamplingController {
    source: Arc<dyn PositionSource>,
    sink: Arc<dyn SampleSink>,
    visibility: AppVisibility,
    battery_fraction: Option<f64>,
    profile: SamplingProfile,
    owner_id: Option<Uuid>,
    active: Option<ActiveWatch>,
    last_accepted_ms: Arc<AtomicI64>,
    status_tx: Arc<watch::Sender<WatchStatus>>,
    retry_delay: Duration,
    metrics: Metrics,
}

impl SamplingController {
    pub fn new(source: Arc<dyn PositionSource>, sink: Arc<dyn SampleSink>, metrics: Metrics) -> Self {
        let (status_tx, _unused_rx) = watch::channel(WatchStatus::Idle);
        Self {
            source,
            sink,
            visibility: AppVisibility::Active,
            battery_fraction: None,
            profile: select_profile(AppVisibility::Active, None),
            owner_id: None,
            active: None,
            last_accepted_ms: Arc::new(AtomicI64::new(NO_SAMPLE)),
            status_tx: Arc::new(status_tx),
            retry_delay: TIMEOUT_RETRY_DELAY,
            metrics,
        }
    }

    /// Device conditions to use for the next `start`.
    pub fn with_conditions(mut self, visibility: AppVisibility, battery_fraction: Option<f64>) -> Self {
        self.visibility = visibility;
        self.battery_fraction = battery_fraction;
        self.profile = select_profile(visibility, battery_fraction);
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn profile(&self) -> SamplingProfile {
        self.profile
    }

    pub fn owner_id(&self) -> Option<Uuid> {
        self.owner_id
    }

    pub fn status(&self) -> watch::Receiver<WatchStatus> {
        self.status_tx.subscribe()
    }

    pub fn current_status(&self) -> WatchStatus {
        self.status_tx.borrow().clone()
    }

    pub fn is_watching(&self) -> bool {
        self.active
            .as_ref()
            .is_some_and(|active| !active.handle.is_finished())
    }

    pub async fn start(&mut self, owner_id: Uuid) -> Result<(), TelemetryError> {
        self.start_with(owner_id, self.visibility, self.battery_fraction)
            .await
    }

    /// Like `start`, but first applies the given device conditions.
    pub async fn start_with(
        &mut self,
        owner_id: Uuid,
        visibility: AppVisibility,
        battery_fraction: Option<f64>,
    ) -> Result<(), TelemetryError> {
        if let Some(active) = self.active.as_ref().filter(|_| self.is_watching()) {
            return Err(TelemetryError::WatchConflict(format!(
                "a position watch is already open for owner {}",
                active.owner_id
            )));
        }

        // A watch that ended on its own still has a task handle to reap.
        self.cancel_active().await;

        self.visibility = visibility;
        self.battery_fraction = battery_fraction;
        self.profile = select_profile(visibility, battery_fraction);

        if self.owner_id != Some(owner_id) {
            self.last_accepted_ms.store(NO_SAMPLE, Ordering::SeqCst);
        }
        self.owner_id = Some(owner_id);
        self.open_watch(owner_id).await
    }

    /// Stops the current watch, recomputes the profile and opens a new watch
    /// for the same owner. Without a started owner only the profile changes.
    pub async fn restart(
        &mut self,
        visibility: AppVisibility,
        battery_fraction: Option<f64>,
    ) -> Result<SamplingProfile, TelemetryError> {
        self.cancel_active().await;

        self.visibility = visibility;
        self.battery_fraction = battery_fraction;
        self.profile = select_profile(visibility, battery_fraction);

        if let Some(owner_id) = self.owner_id {
            info!(owner_id = %owner_id, mode = %self.profile.mode, "restarting position watch");
            self.open_watch(owner_id).await?;
        }

        Ok(self.profile)
    }

    pub async fn stop(&mut self) {
        self.cancel_active().await;
        if let Some(owner_id) = self.owner_id {
            self.status_tx.send_replace(WatchStatus::Stopped { owner_id });
            info!(owner_id = %owner_id, "position watch stopped");
        }
    }

    async fn cancel_active(&mut self) {
        if let Some(active) = self.active.take() {
            active.cancel.cancel();
            if let Err(err) = active.handle.await {
                warn!(owner_id = %active.owner_id, error = %err, "position watch task ended abnormally");
            }
        }
    }

    async fn open_watch(&mut self, owner_id: Uuid) -> Result<(), TelemetryError> {
        let profile = self.profile;
        let stream = match self.source.watch(profile).await {
            Ok(stream) => Some(stream),
            // The watch task opens the source again after the retry delay.
            Err(PositionError::Timeout) if !profile.is_active() => {
                self.status_tx.send_replace(WatchStatus::RetryScheduled {
                    owner_id,
                    retry_in_ms: self.retry_delay.as_millis() as u64,
                });
                None
            }
            Err(err) => {
                self.status_tx.send_replace(WatchStatus::Failed {
                    owner_id,
                    failure: WatchFailure::from_position_error(&err),
                });
                return Err(match err {
                    PositionError::Timeout => TelemetryError::Timeout {
                        timeout_ms: profile.timeout_ms,
                    },
                    other => TelemetryError::Acquisition(other.to_string()),
                });
            }
        };

        let cancel = CancellationToken::new();
        let task = WatchTask {
            owner_id,
            source: self.source.clone(),
            sink: self.sink.clone(),
            cancel: cancel.clone(),
            last_accepted_ms: self.last_accepted_ms.clone(),
            status_tx: self.status_tx.clone(),
            retry_delay: self.retry_delay,
            metrics: self.metrics.clone(),
        };

        if stream.is_some() {
            self.status_tx.send_replace(WatchStatus::Watching {
                owner_id,
                mode: profile.mode,
            });
            info!(owner_id = %owner_id, mode = %profile.mode, "position watch started");
        }

        let handle = tokio::spawn(task.run(profile, stream));
        self.active = Some(ActiveWatch {
            owner_id,
            cancel,
            handle,
        });
        Ok(())
    }
}

impl Drop for SamplingController {
    fn drop(&mut self) {
        if let Some(active) = &self.active {
            active.cancel.cancel();
        }
    }
}

struct WatchTask {
    owner_id: Uuid,
    source: Arc<dyn PositionSource>,
    sink: Arc<dyn SampleSink>,
    cancel: CancellationToken,
    last_accepted_ms: Arc<AtomicI64>,
    status_tx: Arc<watch::Sender<WatchStatus>>,
    retry_delay: Duration,
    metrics: Metrics,
}

struct OpenWatchGauge(IntGauge);

impl OpenWatchGauge {
    fn open(gauge: IntGauge) -> Self {
        gauge.inc();
        Self(gauge)
    }
}

impl Drop for OpenWatchGauge {
    fn drop(&mut self) {
        self.0.dec();
    }
}

impl WatchTask {
    /// Runs the watch until it is cancelled, fails or the source ends. Without
    /// an opened stream the task starts in the timeout retry.
    async fn run(self, profile: SamplingProfile, opened: Option<PositionStream>) {
        let _open = OpenWatchGauge::open(self.metrics.active_watches.clone());
        let mut retry_available = opened.is_some();

        let (mut profile, mut stream) = match opened {
            Some(stream) => (profile, stream),
            None => match self.retry_after_timeout().await {
                Some(reopened) => reopened,
                None => return,
            },
        };

        loop {
            let item = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                item = stream.next() => item,
            };

            match item {
                Some(Ok(fix)) => {
                    if self.throttled(&profile, &fix) {
                        self.metrics.samples_total.with_label_values(&["throttled"]).inc();
                        debug!(owner_id = %self.owner_id, captured_at = fix.captured_at_epoch_ms, "fix throttled");
                        continue;
                    }

                    self.last_accepted_ms
                        .store(fix.captured_at_epoch_ms, Ordering::SeqCst);
                    retry_available = true;
                    self.metrics.samples_total.with_label_values(&["accepted"]).inc();
                    self.sink
                        .accept(LocationSample::from_fix(self.owner_id, &fix))
                        .await;
                }
                Some(Err(PositionError::Timeout)) if !profile.is_active() && retry_available => {
                    retry_available = false;
                    // Close the timed-out watch before the retry opens another.
                    drop(stream);

                    match self.retry_after_timeout().await {
                        Some((next_profile, next_stream)) => {
                            profile = next_profile;
                            stream = next_stream;
                        }
                        None => break,
                    }
                }
                Some(Err(err)) => {
                    self.fail(&err);
                    break;
                }
                None => {
                    debug!(owner_id = %self.owner_id, "position stream ended");
                    self.status_tx.send_replace(WatchStatus::Stopped {
                        owner_id: self.owner_id,
                    });
                    break;
                }
            }
        }
    }

    /// Waits out the retry delay, then reopens with the background profile.
    /// Returns None when cancelled or when the reopen fails.
    async fn retry_after_timeout(&self) -> Option<(SamplingProfile, PositionStream)> {
        warn!(owner_id = %self.owner_id, "position timeout; retrying in background mode");
        self.status_tx.send_replace(WatchStatus::RetryScheduled {
            owner_id: self.owner_id,
            retry_in_ms: self.retry_delay.as_millis() as u64,
        });

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return None,
            _ = sleep(self.retry_delay) => {}
        }

        let profile = SamplingProfile::background();
        match self.source.watch(profile).await {
            Ok(stream) => {
                self.status_tx.send_replace(WatchStatus::Watching {
                    owner_id: self.owner_id,
                    mode: profile.mode,
                });
                info!(owner_id = %self.owner_id, mode = %profile.mode, "position watch reopened");
                Some((profile, stream))
            }
            Err(err) => {
                self.fail(&err);
                None
            }
        }
    }

    fn throttled(&self, profile: &SamplingProfile, fix: &PositionFix) -> bool {
        if profile.is_active() {
            return false;
        }

        match self.last_accepted_ms.load(Ordering::SeqCst) {
            NO_SAMPLE => false,
            last => fix.captured_at_epoch_ms.saturating_sub(last) < BACKGROUND_THROTTLE_MS,
        }
    }

    fn fail(&self, error: &PositionError) {
        warn!(owner_id = %self.owner_id, error = %error, "position watch failed");
        self.status_tx.send_replace(WatchStatus::Failed {
            owner_id: self.owner_id,
            failure: WatchFailure::from_position_error(error),
        });
    }
}
