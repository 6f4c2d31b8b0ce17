use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

/// A raw reading yielded by the position source, before the sampling policy
/// decides whether to keep it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PositionFix {
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy: f64,
    #[serde(default)]
    pub heading: Option<f64>,
    #[serde(default)]
    pub speed: Option<f64>,
    #[serde(default)]
    pub altitude: Option<f64>,
    pub captured_at_epoch_ms: i64,
}

impl PositionFix {
    pub fn point(&self) -> GeoPoint {
        GeoPoint::new(self.latitude, self.longitude)
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum PositionError {
    #[error("location permission denied")]
    PermissionDenied,

    #[error("position unavailable: {0}")]
    Unavailable(String),

    #[error("position request timed out")]
    Timeout,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SyncState {
    Pending,
    Synced,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LocationSample {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy: f64,
    pub heading: Option<f64>,
    pub speed: Option<f64>,
    pub altitude: Option<f64>,
    pub captured_at_epoch_ms: i64,
    pub sync_state: SyncState,
}

impl LocationSample {
    pub fn from_fix(owner_id: Uuid, fix: &PositionFix) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner_id,
            latitude: fix.latitude,
            longitude: fix.longitude,
            accuracy: fix.accuracy,
            heading: fix.heading,
            speed: fix.speed,
            altitude: fix.altitude,
            captured_at_epoch_ms: fix.captured_at_epoch_ms,
            sync_state: SyncState::Pending,
        }
    }

    pub fn point(&self) -> GeoPoint {
        GeoPoint::new(self.latitude, self.longitude)
    }
}

/// Row persisted by the telemetry queue.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueuedSample {
    #[serde(flatten)]
    pub sample: LocationSample,
    pub queued_at_epoch_ms: i64,
}
