#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::mpsc;
use uuid::Uuid;

use courier_telemetry::engine::sampling::SampleSink;
use courier_telemetry::error::TelemetryError;
use courier_telemetry::models::location::{LocationSample, PositionError, PositionFix, SyncState};
use courier_telemetry::models::profile::SamplingProfile;
use courier_telemetry::platform::{
    ChannelPositionSource, DeferredScheduler, IngestionEndpoint, PositionSource, PositionStream,
    TokenProvider,
};

pub fn fix_at(captured_at_epoch_ms: i64) -> PositionFix {
    fix_at_point(captured_at_epoch_ms, 52.52, 13.405)
}

pub fn fix_at_point(captured_at_epoch_ms: i64, latitude: f64, longitude: f64) -> PositionFix {
    PositionFix {
        latitude,
        longitude,
        accuracy: 8.5,
        heading: Some(90.0),
        speed: Some(4.2),
        altitude: None,
        captured_at_epoch_ms,
    }
}

pub fn sample(owner_id: Uuid, captured_at_epoch_ms: i64) -> LocationSample {
    LocationSample {
        id: Uuid::new_v4(),
        owner_id,
        latitude: 52.52,
        longitude: 13.405,
        accuracy: 12.0,
        heading: Some(180.0),
        speed: None,
        altitude: Some(34.0),
        captured_at_epoch_ms,
        sync_state: SyncState::Pending,
    }
}

/// Ingestion endpoint that records every attempt and fails on demand.
#[derive(Default)]
pub struct ScriptedEndpoint {
    offline: AtomicBool,
    failing: Mutex<HashSet<Uuid>>,
    attempts: Mutex<Vec<Uuid>>,
    delivered: Mutex<Vec<LocationSample>>,
    last_token: Mutex<Option<String>>,
}

impl ScriptedEndpoint {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn fail_sample(&self, id: Uuid) {
        self.failing.lock().unwrap().insert(id);
    }

    pub fn attempted_ids(&self) -> Vec<Uuid> {
        self.attempts.lock().unwrap().clone()
    }

    pub fn delivered(&self) -> Vec<LocationSample> {
        self.delivered.lock().unwrap().clone()
    }

    pub fn delivered_ids(&self) -> Vec<Uuid> {
        self.delivered().iter().map(|s| s.id).collect()
    }

    pub fn last_token(&self) -> Option<String> {
        self.last_token.lock().unwrap().clone()
    }
}

#[async_trait]
impl IngestionEndpoint for ScriptedEndpoint {
    async fn deliver(&self, token: &str, sample: &LocationSample) -> Result<(), TelemetryError> {
        self.attempts.lock().unwrap().push(sample.id);
        *self.last_token.lock().unwrap() = Some(token.to_string());

        if self.offline.load(Ordering::SeqCst) {
            return Err(TelemetryError::Delivery("network unreachable".to_string()));
        }
        if self.failing.lock().unwrap().contains(&sample.id) {
            return Err(TelemetryError::Delivery("rejected by remote".to_string()));
        }

        self.delivered.lock().unwrap().push(sample.clone());
        Ok(())
    }
}

/// Issues a fresh token string per call and counts the calls.
#[derive(Default)]
pub struct CountingTokens {
    calls: AtomicUsize,
}

impl CountingTokens {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl TokenProvider for CountingTokens {
    fn identity_token(&self, owner_id: Uuid) -> Result<String, TelemetryError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(format!("token-{owner_id}-{n}"))
    }
}

pub struct SignedOut;

impl TokenProvider for SignedOut {
    fn identity_token(&self, _owner_id: Uuid) -> Result<String, TelemetryError> {
        Err(TelemetryError::Auth("user is signed out".to_string()))
    }
}

#[derive(Default)]
pub struct CountingScheduler {
    registrations: Mutex<Vec<Uuid>>,
}

impl CountingScheduler {
    pub fn registrations(&self) -> Vec<Uuid> {
        self.registrations.lock().unwrap().clone()
    }
}

impl DeferredScheduler for CountingScheduler {
    fn register_retry(&self, owner_id: Uuid) -> bool {
        self.registrations.lock().unwrap().push(owner_id);
        true
    }
}

/// Forwards accepted samples to the test through a channel.
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<LocationSample>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<LocationSample>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl SampleSink for ChannelSink {
    async fn accept(&self, sample: LocationSample) {
        let _ = self.tx.send(sample);
    }
}

/// Position source whose permission was denied by the user.
pub struct DeniedSource;

#[async_trait]
impl PositionSource for DeniedSource {
    async fn watch(&self, _profile: SamplingProfile) -> Result<PositionStream, PositionError> {
        Err(PositionError::PermissionDenied)
    }
}

/// Times out on the first `timeouts` opens, then hands out watches from a
/// channel source the test publishes into.
pub struct SlowFixSource {
    timeouts: usize,
    opens: AtomicUsize,
    pub inner: ChannelPositionSource,
}

impl SlowFixSource {
    pub fn new(timeouts: usize) -> Self {
        Self {
            timeouts,
            opens: AtomicUsize::new(0),
            inner: ChannelPositionSource::new(16),
        }
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PositionSource for SlowFixSource {
    async fn watch(&self, profile: SamplingProfile) -> Result<PositionStream, PositionError> {
        let attempt = self.opens.fetch_add(1, Ordering::SeqCst);
        if attempt < self.timeouts {
            return Err(PositionError::Timeout);
        }
        self.inner.watch(profile).await
    }
}
