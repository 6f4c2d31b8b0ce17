use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::TelemetryError;
use crate::geo::haversine_m;
use crate::models::delivery::{DeliveryLeg, DeliveryWaypointSet};
use crate::models::location::GeoPoint;
use crate::models::proximity::{ProximityEvent, ProximityState, ProximityUpdate};
use crate::observability::metrics::Metrics;

pub const DEFAULT_THRESHOLD_RATIO: f64 = 0.25;

/// Progress tracking for one delivery leg. The origin is fixed by the first
/// position observed; the threshold event fires at most once.
#[derive(Debug, Clone, Serialize)]
pub struct ProximitySession {
    pub session_id: Uuid,
    pub owner_id: Uuid,
    pub target_id: Uuid,
    pub leg: DeliveryLeg,
    pub origin_point: Option<GeoPoint>,
    pub target_point: GeoPoint,
    pub total_distance_m: Option<f64>,
    pub threshold_ratio: f64,
    pub state: ProximityState,
    pub progress_ratio: f64,
}

impl ProximitySession {
    pub fn new(
        owner_id: Uuid,
        target_id: Uuid,
        leg: DeliveryLeg,
        target_point: GeoPoint,
        threshold_ratio: f64,
    ) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            owner_id,
            target_id,
            leg,
            origin_point: None,
            target_point,
            total_distance_m: None,
            threshold_ratio,
            state: ProximityState::AwaitingOrigin,
            progress_ratio: 0.0,
        }
    }

    pub fn fired(&self) -> bool {
        self.state == ProximityState::Fired
    }

    pub fn observe(&mut self, position: GeoPoint, at: DateTime<Utc>) -> ProximityUpdate {
        let (origin, total) = match (self.origin_point, self.total_distance_m) {
            (Some(origin), Some(total)) => (origin, total),
            _ => {
                let total = haversine_m(&position, &self.target_point);
                self.origin_point = Some(position);
                self.total_distance_m = Some(total);
                self.state = ProximityState::Tracking;
                (position, total)
            }
        };

        // A zero-length leg is complete as soon as it starts.
        self.progress_ratio = if total > 0.0 {
            (haversine_m(&origin, &position) / total).max(0.0)
        } else {
            1.0
        };

        let fired = if !self.fired() && self.progress_ratio >= self.threshold_ratio {
            self.state = ProximityState::Fired;
            Some(ProximityEvent {
                session_id: self.session_id,
                owner_id: self.owner_id,
                target_id: self.target_id,
                leg: self.leg,
                message: format!("courier is approaching the {} point", self.leg),
                progress_ratio: self.progress_ratio,
                fired_at: at,
            })
        } else {
            None
        };

        ProximityUpdate {
            session_id: self.session_id,
            state: self.state,
            progress_ratio: self.progress_ratio,
            fired,
        }
    }
}

struct TrackedDelivery {
    waypoints: DeliveryWaypointSet,
    session: ProximitySession,
}

/// Active delivery legs by owner, with the event stream consumed by notifiers.
pub struct ProximityTracker {
    threshold_ratio: f64,
    deliveries: DashMap<Uuid, TrackedDelivery>,
    events_tx: broadcast::Sender<ProximityEvent>,
    metrics: Metrics,
}

impl ProximityTracker {
    pub fn new(threshold_ratio: f64, event_buffer_size: usize, metrics: Metrics) -> Self {
        let (events_tx, _unused_rx) = broadcast::channel(event_buffer_size);
        Self {
            threshold_ratio,
            deliveries: DashMap::new(),
            events_tx,
            metrics,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProximityEvent> {
        self.events_tx.subscribe()
    }

    /// Starts tracking a newly accepted delivery, replacing any previous one for the owner.
    pub fn attach(&self, owner_id: Uuid, waypoints: DeliveryWaypointSet) -> ProximitySession {
        let session = self.session_for(owner_id, &waypoints);
        info!(
            owner_id = %owner_id,
            target_id = %waypoints.target_id,
            leg = %waypoints.active_leg,
            "proximity session attached"
        );
        self.deliveries.insert(
            owner_id,
            TrackedDelivery {
                waypoints,
                session: session.clone(),
            },
        );
        session
    }

    pub fn observe(
        &self,
        owner_id: Uuid,
        position: GeoPoint,
        at: DateTime<Utc>,
    ) -> Option<ProximityUpdate> {
        let update = {
            let mut tracked = self.deliveries.get_mut(&owner_id)?;
            tracked.session.observe(position, at)
        };

        if let Some(event) = &update.fired {
            self.metrics
                .proximity_events_total
                .with_label_values(&[&event.leg.to_string()])
                .inc();
            info!(
                owner_id = %owner_id,
                session_id = %event.session_id,
                progress = event.progress_ratio,
                "proximity threshold crossed"
            );
            let _ = self.events_tx.send(event.clone());
        } else {
            debug!(owner_id = %owner_id, progress = update.progress_ratio, "proximity progress");
        }

        Some(update)
    }

    /// Pickup proof recorded: the pickup leg ends and a fresh dropoff session begins.
    pub fn record_pickup_proof(&self, owner_id: Uuid) -> Result<ProximitySession, TelemetryError> {
        let mut tracked = self
            .deliveries
            .get_mut(&owner_id)
            .ok_or_else(|| TelemetryError::NotFound(format!("no delivery for owner {owner_id}")))?;

        if !tracked.waypoints.record_pickup_proof() {
            return Err(TelemetryError::BadRequest(format!(
                "pickup already recorded for owner {owner_id}"
            )));
        }

        let session = self.session_for(owner_id, &tracked.waypoints);
        tracked.session = session.clone();
        info!(owner_id = %owner_id, session_id = %session.session_id, "dropoff leg started");
        Ok(session)
    }

    pub fn finalize(&self, owner_id: Uuid) -> Option<DeliveryWaypointSet> {
        let (_, tracked) = self.deliveries.remove(&owner_id)?;
        info!(owner_id = %owner_id, target_id = %tracked.waypoints.target_id, "delivery finalized");
        Some(tracked.waypoints)
    }

    pub fn snapshot(&self, owner_id: Uuid) -> Option<ProximitySession> {
        self.deliveries
            .get(&owner_id)
            .map(|tracked| tracked.session.clone())
    }

    pub fn len(&self) -> usize {
        self.deliveries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.deliveries.is_empty()
    }

    fn session_for(&self, owner_id: Uuid, waypoints: &DeliveryWaypointSet) -> ProximitySession {
        ProximitySession::new(
            owner_id,
            waypoints.target_id,
            waypoints.active_leg,
            waypoints.active_target(),
            self.threshold_ratio,
        )
    }
}
