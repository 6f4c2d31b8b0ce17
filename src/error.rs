use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("position acquisition failed: {0}")]
    Acquisition(String),

    #[error("no position fix within {timeout_ms} ms")]
    Timeout { timeout_ms: u64 },

    #[error("identity token unavailable: {0}")]
    Auth(String),

    #[error("delivery failed: {0}")]
    Delivery(String),

    #[error("unknown movement profile: {0}")]
    UnknownProfile(String),

    #[error("watch conflict: {0}")]
    WatchConflict(String),

    #[error("queue storage error: {0}")]
    Storage(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl IntoResponse for TelemetryError {
    fn into_response(self) -> Response {
        let status = match &self {
            TelemetryError::NotFound(_) => StatusCode::NOT_FOUND,
            TelemetryError::BadRequest(_) | TelemetryError::UnknownProfile(_) => {
                StatusCode::BAD_REQUEST
            }
            TelemetryError::WatchConflict(_) => StatusCode::CONFLICT,
            TelemetryError::Auth(_) => StatusCode::UNAUTHORIZED,
            TelemetryError::Delivery(_) => StatusCode::BAD_GATEWAY,
            TelemetryError::Acquisition(_) | TelemetryError::Timeout { .. } => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            TelemetryError::Storage(_) | TelemetryError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let body = Json(json!({
            "error": self.to_string()
        }));

        (status, body).into_response()
    }
}
