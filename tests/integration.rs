mod common;

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::{Value, json};
use tempfile::TempDir;
use tokio::time::{Duration, sleep};
use tower::ServiceExt;
use uuid::Uuid;

use courier_telemetry::api::rest::router;
use courier_telemetry::engine::queue::TelemetryQueue;
use courier_telemetry::observability::metrics::Metrics;
use courier_telemetry::platform::StaticTokenProvider;
use courier_telemetry::state::{AppState, Collaborators, StateOptions};

use common::ScriptedEndpoint;

const OWNER: Uuid = Uuid::from_u128(0xD15_7A7C4);

struct Harness {
    app: axum::Router,
    state: Arc<AppState>,
    endpoint: Arc<ScriptedEndpoint>,
    _dir: TempDir,
}

async fn setup() -> Harness {
    let dir = TempDir::new().unwrap();
    let metrics = Metrics::new();
    let queue = Arc::new(
        TelemetryQueue::open(dir.path().join("queue.json"), metrics.clone())
            .await
            .unwrap(),
    );
    let endpoint = Arc::new(ScriptedEndpoint::new());

    let state = Arc::new(AppState::new(
        queue,
        Collaborators {
            tokens: Arc::new(StaticTokenProvider::new(Some("token".to_string()))),
            endpoint: endpoint.clone(),
            scheduler: None,
        },
        StateOptions::default(),
        metrics,
    ));

    Harness {
        app: router(state.clone()),
        state,
        endpoint,
        _dir: dir,
    }
}

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_string(&body).unwrap()))
        .unwrap()
}

fn get_request(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

fn empty_request(method: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn body_string(response: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

fn fix(lat: f64, lng: f64, captured_at_epoch_ms: i64) -> Value {
    json!({
        "latitude": lat,
        "longitude": lng,
        "accuracy": 5.0,
        "captured_at_epoch_ms": captured_at_epoch_ms
    })
}

async fn start_watch(app: &axum::Router) -> Value {
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/watch/start",
            json!({ "owner_id": OWNER, "visibility": "Active", "battery_fraction": 0.9 }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    body_json(response).await
}

async fn publish(app: &axum::Router, body: Value) -> Value {
    let response = app
        .clone()
        .oneshot(json_request("POST", "/positions", body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    body_json(response).await
}

#[tokio::test]
async fn health_returns_ok() {
    let h = setup().await;
    let response = h.app.oneshot(get_request("/health")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["watching"], false);
    assert_eq!(body["queued_samples"], 0);
    assert_eq!(body["tracked_deliveries"], 0);
    assert_eq!(body["deferred_retry"], false);
}

#[tokio::test]
async fn metrics_returns_prometheus_format() {
    let h = setup().await;
    let response = h.app.oneshot(get_request("/metrics")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let content_type = response
        .headers()
        .get("content-type")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(content_type.starts_with("text/plain"));

    let body = body_string(response).await;
    assert!(body.contains("queue_depth"));
    assert!(body.contains("active_watches"));
}

#[tokio::test]
async fn eta_uses_named_profile() {
    let h = setup().await;
    let response = h
        .app
        .oneshot(get_request("/eta?distance_meters=10000&profile=Priority"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["minutes"], 10);
}

#[tokio::test]
async fn eta_rejects_unknown_profile() {
    let h = setup().await;
    let response = h
        .app
        .oneshot(get_request("/eta?distance_meters=500&profile=teleport"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert!(body["error"].as_str().unwrap().contains("teleport"));
}

#[tokio::test]
async fn eta_rejects_distance_beyond_calendar() {
    let h = setup().await;
    let response = h
        .app
        .oneshot(get_request("/eta?distance_meters=1e15&profile=priority"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn delivery_lifecycle_switches_leg_on_pickup_proof() {
    let h = setup().await;
    let response = h
        .app
        .clone()
        .oneshot(json_request(
            "POST",
            "/deliveries",
            json!({
                "owner_id": OWNER,
                "pickup": { "lat": 52.51, "lng": 13.40 },
                "dropoff": { "lat": 52.53, "lng": 13.42 }
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let session = body_json(response).await;
    assert_eq!(session["leg"], "Pickup");
    assert_eq!(session["state"], "AwaitingOrigin");

    let uri = format!("/deliveries/{OWNER}/pickup-proof");
    let response = h
        .app
        .clone()
        .oneshot(empty_request("POST", &uri))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let session = body_json(response).await;
    assert_eq!(session["leg"], "Dropoff");
    assert_eq!(session["target_point"]["lat"], 52.53);

    let response = h
        .app
        .clone()
        .oneshot(empty_request("POST", &uri))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = h
        .app
        .clone()
        .oneshot(empty_request("DELETE", &format!("/deliveries/{OWNER}")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = h
        .app
        .oneshot(get_request(&format!("/deliveries/{OWNER}")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn unknown_delivery_is_not_found() {
    let h = setup().await;
    let uri = format!("/deliveries/{}/pickup-proof", Uuid::new_v4());
    let response = h.app.oneshot(empty_request("POST", &uri)).await.unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn second_watch_start_conflicts() {
    let h = setup().await;
    let body = start_watch(&h.app).await;
    assert_eq!(body["watching"], true);
    assert_eq!(body["profile"]["mode"], "Active");

    let response = h
        .app
        .clone()
        .oneshot(json_request(
            "POST",
            "/watch/start",
            json!({ "owner_id": Uuid::new_v4() }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = h
        .app
        .clone()
        .oneshot(empty_request("POST", "/watch/stop"))
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body["watching"], false);
    assert_eq!(body["status"]["status"], "stopped");
}

#[tokio::test]
async fn low_battery_report_switches_to_battery_saver() {
    let h = setup().await;
    start_watch(&h.app).await;

    let response = h
        .app
        .clone()
        .oneshot(json_request("PUT", "/device/battery", json!({ "fraction": 1.5 })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = h
        .app
        .clone()
        .oneshot(json_request(
            "PATCH",
            "/watch/profile",
            json!({ "visibility": "Active", "battery_fraction": 0.1 }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["profile"]["mode"], "BatterySaver");
    assert_eq!(body["watching"], true);
    assert_eq!(h.state.positions.active_watches(), 1);
}

#[tokio::test]
async fn invalid_latitude_is_rejected() {
    let h = setup().await;
    let response = h
        .app
        .oneshot(json_request("POST", "/positions", fix(91.0, 13.40, 1)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unrepresentable_capture_time_is_rejected() {
    let h = setup().await;
    start_watch(&h.app).await;

    let response = h
        .app
        .clone()
        .oneshot(json_request("POST", "/positions", fix(52.50, 13.40, i64::MAX)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(h.state.positions.active_watches(), 1);
}

#[tokio::test]
async fn reported_fixes_are_delivered_and_fire_proximity() {
    let h = setup().await;
    start_watch(&h.app).await;

    let response = h
        .app
        .clone()
        .oneshot(json_request(
            "POST",
            "/deliveries",
            json!({
                "owner_id": OWNER,
                "pickup": { "lat": 52.51, "lng": 13.40 },
                "dropoff": { "lat": 52.53, "lng": 13.42 }
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    assert_eq!(publish(&h.app, fix(52.50, 13.40, 1_000)).await["delivered_to"], 1);
    assert_eq!(publish(&h.app, fix(52.505, 13.40, 2_000)).await["delivered_to"], 1);

    for _ in 0..200 {
        if h.endpoint.delivered().len() == 2 {
            break;
        }
        sleep(Duration::from_millis(10)).await;
    }

    let delivered = h.endpoint.delivered();
    assert_eq!(delivered.len(), 2);
    assert!(delivered.iter().all(|s| s.owner_id == OWNER));
    assert_eq!(h.endpoint.last_token(), Some("token".to_string()));

    let response = h
        .app
        .oneshot(get_request(&format!("/deliveries/{OWNER}")))
        .await
        .unwrap();
    let session = body_json(response).await;
    assert_eq!(session["state"], "Fired");
    assert!(session["progress_ratio"].as_f64().unwrap() >= 0.25);
    assert!(h.state.queue.is_empty().await);
}

#[tokio::test]
async fn offline_samples_queue_until_drained() {
    let h = setup().await;
    h.endpoint.set_offline(true);
    start_watch(&h.app).await;

    publish(&h.app, fix(52.50, 13.40, 1_000)).await;

    for _ in 0..200 {
        if h.state.queue.len().await == 1 {
            break;
        }
        sleep(Duration::from_millis(10)).await;
    }

    let response = h.app.clone().oneshot(get_request("/queue")).await.unwrap();
    let body = body_json(response).await;
    let pending = body["pending"].as_array().unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0]["captured_at_epoch_ms"], 1_000);

    h.endpoint.set_offline(false);
    let response = h
        .app
        .clone()
        .oneshot(empty_request("POST", &format!("/queue/drain?owner_id={OWNER}")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let reports = body_json(response).await;
    assert_eq!(reports[0]["delivered"], 1);
    assert_eq!(reports[0]["remaining"], 0);

    assert!(h.state.queue.is_empty().await);
    assert_eq!(h.endpoint.delivered().len(), 1);
}

#[tokio::test]
async fn position_errors_reach_active_watch() {
    let h = setup().await;
    start_watch(&h.app).await;

    let response = h
        .app
        .clone()
        .oneshot(json_request(
            "POST",
            "/positions/errors",
            json!({ "kind": "unavailable", "message": "gps off" }),
        ))
        .await
        .unwrap();
    assert_eq!(body_json(response).await["delivered_to"], 1);

    for _ in 0..200 {
        if !h.state.controller.lock().await.is_watching() {
            break;
        }
        sleep(Duration::from_millis(10)).await;
    }

    let response = h.app.oneshot(get_request("/watch")).await.unwrap();
    let body = body_json(response).await;
    assert_eq!(body["watching"], false);
    assert_eq!(body["status"]["status"], "failed");
    assert_eq!(body["status"]["failure"]["kind"], "Acquisition");
}
