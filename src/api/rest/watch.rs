use std::sync::Arc;

use axum::extract::State;
use axum::routing::{get, patch, post, put};
use axum::Json;
use axum::Router;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::engine::sampling::{SamplingController, WatchStatus};
use crate::error::TelemetryError;
use crate::models::profile::{AppVisibility, SamplingProfile};
use crate::platform::BatteryLevel;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/watch", get(get_watch))
        .route("/watch/start", post(start_watch))
        .route("/watch/profile", patch(update_profile))
        .route("/watch/stop", post(stop_watch))
        .route("/device/battery", put(report_battery))
}

#[derive(Deserialize)]
pub struct StartWatchRequest {
    pub owner_id: Uuid,
    #[serde(default = "default_visibility")]
    pub visibility: AppVisibility,
    pub battery_fraction: Option<f64>,
}

#[derive(Deserialize)]
pub struct UpdateProfileRequest {
    pub visibility: AppVisibility,
    pub battery_fraction: Option<f64>,
}

#[derive(Serialize, Deserialize)]
pub struct BatteryReport {
    pub fraction: Option<f64>,
}

#[derive(Serialize)]
pub struct WatchResponse {
    pub owner_id: Option<Uuid>,
    pub watching: bool,
    pub profile: SamplingProfile,
    pub status: WatchStatus,
}

fn default_visibility() -> AppVisibility {
    AppVisibility::Active
}

fn describe(controller: &SamplingController) -> WatchResponse {
    WatchResponse {
        owner_id: controller.owner_id(),
        watching: controller.is_watching(),
        profile: controller.profile(),
        status: controller.current_status(),
    }
}

/// Explicit readings are recorded first; otherwise the last reported level applies.
fn battery_for(state: &AppState, reported: Option<f64>) -> Result<Option<f64>, TelemetryError> {
    if let Some(fraction) = reported {
        if !(0.0..=1.0).contains(&fraction) {
            return Err(TelemetryError::BadRequest(
                "battery_fraction must be within 0..=1".to_string(),
            ));
        }
        state.battery.report(Some(fraction));
    }
    Ok(state.battery.fraction())
}

async fn get_watch(State(state): State<Arc<AppState>>) -> Json<WatchResponse> {
    let controller = state.controller.lock().await;
    Json(describe(&controller))
}

async fn start_watch(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<StartWatchRequest>,
) -> Result<Json<WatchResponse>, TelemetryError> {
    let battery = battery_for(&state, payload.battery_fraction)?;

    let mut controller = state.controller.lock().await;
    controller
        .start_with(payload.owner_id, payload.visibility, battery)
        .await?;

    Ok(Json(describe(&controller)))
}

async fn update_profile(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<UpdateProfileRequest>,
) -> Result<Json<WatchResponse>, TelemetryError> {
    let battery = battery_for(&state, payload.battery_fraction)?;

    let mut controller = state.controller.lock().await;
    controller.restart(payload.visibility, battery).await?;

    Ok(Json(describe(&controller)))
}

async fn stop_watch(State(state): State<Arc<AppState>>) -> Json<WatchResponse> {
    let mut controller = state.controller.lock().await;
    controller.stop().await;

    Json(describe(&controller))
}

async fn report_battery(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<BatteryReport>,
) -> Result<Json<BatteryReport>, TelemetryError> {
    if payload.fraction.is_none() {
        state.battery.report(None);
    }
    let fraction = battery_for(&state, payload.fraction)?;
    Ok(Json(BatteryReport { fraction }))
}
