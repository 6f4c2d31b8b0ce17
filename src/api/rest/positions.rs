use std::sync::Arc;

use axum::extract::State;
use axum::routing::post;
use axum::Json;
use axum::Router;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::TelemetryError;
use crate::models::location::{PositionError, PositionFix};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/positions", post(report_fix))
        .route("/positions/errors", post(report_error))
}

#[derive(Serialize)]
pub struct PublishResponse {
    pub delivered_to: usize,
}

async fn report_fix(
    State(state): State<Arc<AppState>>,
    Json(fix): Json<PositionFix>,
) -> Result<Json<PublishResponse>, TelemetryError> {
    if !(-90.0..=90.0).contains(&fix.latitude) {
        return Err(TelemetryError::BadRequest(
            "latitude must be within -90..=90".to_string(),
        ));
    }
    if !(-180.0..=180.0).contains(&fix.longitude) {
        return Err(TelemetryError::BadRequest(
            "longitude must be within -180..=180".to_string(),
        ));
    }
    if !fix.accuracy.is_finite() || fix.accuracy < 0.0 {
        return Err(TelemetryError::BadRequest(
            "accuracy must be a non-negative number of meters".to_string(),
        ));
    }

    if DateTime::<Utc>::from_timestamp_millis(fix.captured_at_epoch_ms).is_none() {
        return Err(TelemetryError::BadRequest(format!(
            "captured_at_epoch_ms {} is not a representable time",
            fix.captured_at_epoch_ms
        )));
    }

    Ok(Json(PublishResponse {
        delivered_to: state.positions.publish_fix(fix),
    }))
}

async fn report_error(
    State(state): State<Arc<AppState>>,
    Json(error): Json<PositionError>,
) -> Json<PublishResponse> {
    Json(PublishResponse {
        delivered_to: state.positions.publish_error(error),
    })
}
