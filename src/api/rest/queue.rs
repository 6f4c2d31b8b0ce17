use std::sync::Arc;

use axum::extract::{Query, State};
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::engine::sync::DrainReport;
use crate::error::TelemetryError;
use crate::models::location::LocationSample;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/queue", get(list_pending))
        .route("/queue/drain", post(drain))
}

#[derive(Serialize)]
pub struct QueueResponse {
    pub pending: Vec<LocationSample>,
    pub deferred_retry: bool,
}

#[derive(Deserialize)]
pub struct DrainQuery {
    pub owner_id: Option<Uuid>,
}

async fn list_pending(State(state): State<Arc<AppState>>) -> Json<QueueResponse> {
    Json(QueueResponse {
        pending: state.queue.list_pending().await,
        deferred_retry: state.sync.supports_deferred_retry(),
    })
}

async fn drain(
    State(state): State<Arc<AppState>>,
    Query(query): Query<DrainQuery>,
) -> Result<Json<Vec<DrainReport>>, TelemetryError> {
    let reports = match query.owner_id {
        Some(owner_id) => vec![state.sync.drain(owner_id).await?],
        None => state.sync.drain_all().await?,
    };
    Ok(Json(reports))
}
