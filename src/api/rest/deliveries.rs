use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use serde::Deserialize;
use uuid::Uuid;

use crate::engine::eta::Eta;
use crate::engine::proximity::ProximitySession;
use crate::error::TelemetryError;
use crate::models::delivery::DeliveryWaypointSet;
use crate::models::location::GeoPoint;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/deliveries", post(accept_delivery))
        .route(
            "/deliveries/:owner_id",
            get(get_session).delete(finalize_delivery),
        )
        .route("/deliveries/:owner_id/pickup-proof", post(record_pickup_proof))
        .route("/eta", get(estimate_arrival))
}

#[derive(Deserialize)]
pub struct AcceptDeliveryRequest {
    pub owner_id: Uuid,
    pub target_id: Option<Uuid>,
    pub pickup: GeoPoint,
    pub dropoff: GeoPoint,
}

#[derive(Deserialize)]
pub struct EtaQuery {
    pub distance_meters: f64,
    pub profile: String,
}

async fn accept_delivery(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<AcceptDeliveryRequest>,
) -> Json<ProximitySession> {
    let waypoints = DeliveryWaypointSet::new(
        payload.target_id.unwrap_or_else(Uuid::new_v4),
        payload.pickup,
        payload.dropoff,
    );
    Json(state.proximity.attach(payload.owner_id, waypoints))
}

async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(owner_id): Path<Uuid>,
) -> Result<Json<ProximitySession>, TelemetryError> {
    state
        .proximity
        .snapshot(owner_id)
        .map(Json)
        .ok_or_else(|| TelemetryError::NotFound(format!("no delivery for owner {owner_id}")))
}

async fn record_pickup_proof(
    State(state): State<Arc<AppState>>,
    Path(owner_id): Path<Uuid>,
) -> Result<Json<ProximitySession>, TelemetryError> {
    Ok(Json(state.proximity.record_pickup_proof(owner_id)?))
}

async fn finalize_delivery(
    State(state): State<Arc<AppState>>,
    Path(owner_id): Path<Uuid>,
) -> Result<Json<DeliveryWaypointSet>, TelemetryError> {
    state
        .proximity
        .finalize(owner_id)
        .map(Json)
        .ok_or_else(|| TelemetryError::NotFound(format!("no delivery for owner {owner_id}")))
}

async fn estimate_arrival(
    State(state): State<Arc<AppState>>,
    Query(query): Query<EtaQuery>,
) -> Result<Json<Eta>, TelemetryError> {
    Ok(Json(state.eta.eta(query.distance_meters, &query.profile)?))
}
