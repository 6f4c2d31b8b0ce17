use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::delivery::DeliveryLeg;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ProximityState {
    AwaitingOrigin,
    Tracking,
    Fired,
}

/// One-shot notification that a courier has covered the configured share of a leg.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProximityEvent {
    pub session_id: Uuid,
    pub owner_id: Uuid,
    pub target_id: Uuid,
    pub leg: DeliveryLeg,
    pub message: String,
    pub progress_ratio: f64,
    pub fired_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProximityUpdate {
    pub session_id: Uuid,
    pub state: ProximityState,
    pub progress_ratio: f64,
    pub fired: Option<ProximityEvent>,
}
