pub mod deliveries;
pub mod positions;
pub mod queue;
pub mod watch;
pub mod ws;

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Json;
use axum::Router;
use serde::Serialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(watch::router())
        .merge(positions::router())
        .merge(deliveries::router())
        .merge(queue::router())
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .route("/ws", get(ws::ws_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    watching: bool,
    queued_samples: usize,
    tracked_deliveries: usize,
    deferred_retry: bool,
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let watching = state.controller.lock().await.is_watching();

    Json(HealthResponse {
        status: "ok",
        watching,
        queued_samples: state.queue.len().await,
        tracked_deliveries: state.proximity.len(),
        deferred_retry: state.sync.supports_deferred_retry(),
    })
}

async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, err).into_response(),
    }
}
