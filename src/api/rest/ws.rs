use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::SinkExt;
use futures::StreamExt;
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use crate::models::location::LocationSample;
use crate::models::proximity::ProximityEvent;
use crate::state::AppState;

/// Frames pushed to live map and notification clients.
#[derive(Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum StreamMessage {
    Sample(LocationSample),
    Proximity(ProximityEvent),
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();
    let mut samples = state.pipeline.subscribe();
    let mut events = state.proximity.subscribe();

    info!("websocket client connected");

    let send_task = tokio::spawn(async move {
        loop {
            let message = tokio::select! {
                sample = samples.recv() => match sample {
                    Ok(sample) => StreamMessage::Sample(sample),
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "websocket client lagging on samples");
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                },
                event = events.recv() => match event {
                    Ok(event) => StreamMessage::Proximity(event),
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "websocket client lagging on proximity events");
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                },
            };

            let json = match serde_json::to_string(&message) {
                Ok(json) => json,
                Err(err) => {
                    warn!(error = %err, "failed to serialize stream message for ws");
                    continue;
                }
            };

            if sender.send(Message::Text(json)).await.is_err() {
                break;
            }
        }
    });

    let recv_task = tokio::spawn(async move {
        while let Some(Ok(_msg)) = receiver.next().await {}
    });

    tokio::select! {
        _ = send_task => {},
        _ = recv_task => {},
    }

    info!("websocket client disconnected");
}
