use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::location::GeoPoint;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum DeliveryLeg {
    Pickup,
    Dropoff,
}

impl std::fmt::Display for DeliveryLeg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeliveryLeg::Pickup => write!(f, "pickup"),
            DeliveryLeg::Dropoff => write!(f, "dropoff"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryWaypointSet {
    pub target_id: Uuid,
    pub pickup_point: GeoPoint,
    pub dropoff_point: GeoPoint,
    pub active_leg: DeliveryLeg,
}

impl DeliveryWaypointSet {
    pub fn new(target_id: Uuid, pickup_point: GeoPoint, dropoff_point: GeoPoint) -> Self {
        Self {
            target_id,
            pickup_point,
            dropoff_point,
            active_leg: DeliveryLeg::Pickup,
        }
    }

    pub fn active_target(&self) -> GeoPoint {
        match self.active_leg {
            DeliveryLeg::Pickup => self.pickup_point,
            DeliveryLeg::Dropoff => self.dropoff_point,
        }
    }

    /// Flips to the dropoff leg. Returns false when the pickup was already recorded.
    pub fn record_pickup_proof(&mut self) -> bool {
        if self.active_leg == DeliveryLeg::Dropoff {
            return false;
        }
        self.active_leg = DeliveryLeg::Dropoff;
        true
    }
}
