//! Seams to the device and the outside world.
//!
//! The engine only talks to these traits. Concrete adapters for a hosted
//! deployment live in the submodules; tests substitute their own fakes.

pub mod battery;
pub mod channel_source;
pub mod http;
pub mod token;

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use uuid::Uuid;

use crate::error::TelemetryError;
use crate::models::location::{LocationSample, PositionError, PositionFix};
use crate::models::profile::SamplingProfile;

pub use battery::ReportedBattery;
pub use channel_source::ChannelPositionSource;
pub use http::HttpIngestionEndpoint;
pub use token::StaticTokenProvider;

/// Fixes (or acquisition errors) in arrival order. Dropping the stream ends the watch.
pub type PositionStream = Pin<Box<dyn Stream<Item = Result<PositionFix, PositionError>> + Send>>;

/// Continuous position watch parameterized by a sampling profile.
#[async_trait]
pub trait PositionSource: Send + Sync {
    async fn watch(&self, profile: SamplingProfile) -> Result<PositionStream, PositionError>;
}

/// Battery charge as a 0..=1 fraction, or `None` when the platform does not report it.
pub trait BatteryLevel: Send + Sync {
    fn fraction(&self) -> Option<f64>;
}

/// Issues an identity token for a single send attempt.
pub trait TokenProvider: Send + Sync {
    fn identity_token(&self, owner_id: Uuid) -> Result<String, TelemetryError>;
}

/// Remote ingestion endpoint. Must deduplicate by sample id.
#[async_trait]
pub trait IngestionEndpoint: Send + Sync {
    async fn deliver(&self, token: &str, sample: &LocationSample) -> Result<(), TelemetryError>;
}

/// Deferred background execution, where the platform offers it.
pub trait DeferredScheduler: Send + Sync {
    /// Registers a single retry for the owner. Returns false if one was already pending.
    fn register_retry(&self, owner_id: Uuid) -> bool;
}
