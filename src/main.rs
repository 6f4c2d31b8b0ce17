use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use courier_telemetry::api;
use courier_telemetry::config::Config;
use courier_telemetry::engine::queue::TelemetryQueue;
use courier_telemetry::engine::retry::{deferred_channel, run_periodic_drain, run_retry_worker};
use courier_telemetry::error::TelemetryError;
use courier_telemetry::observability::metrics::Metrics;
use courier_telemetry::platform::{DeferredScheduler, HttpIngestionEndpoint, StaticTokenProvider};
use courier_telemetry::state::{AppState, Collaborators, StateOptions};

#[tokio::main]
async fn main() -> Result<(), TelemetryError> {
    let config = Config::from_env()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(config.log_level.clone()))
        .with_target(false)
        .compact()
        .init();

    let metrics = Metrics::new();
    let queue = Arc::new(TelemetryQueue::open(&config.queue_path, metrics.clone()).await?);

    let endpoint = HttpIngestionEndpoint::new(
        &config.ingestion_url,
        Duration::from_secs(config.http_timeout_secs),
    )?;
    tracing::info!(url = endpoint.url(), "ingestion endpoint configured");

    let (scheduler, retries) = if config.deferred_retry {
        let (scheduler, retries) = deferred_channel(config.event_buffer_size);
        (
            Some(Arc::new(scheduler) as Arc<dyn DeferredScheduler>),
            Some(retries),
        )
    } else {
        (None, None)
    };

    let state = Arc::new(AppState::new(
        queue,
        Collaborators {
            tokens: Arc::new(StaticTokenProvider::new(config.identity_token.clone())),
            endpoint: Arc::new(endpoint),
            scheduler,
        },
        StateOptions {
            event_buffer_size: config.event_buffer_size,
            proximity_threshold: config.proximity_threshold,
            battery_fraction: config.battery_fraction,
        },
        metrics,
    ));

    let shutdown = CancellationToken::new();
    match retries {
        Some(retries) => {
            tokio::spawn(run_retry_worker(
                state.sync.clone(),
                retries,
                Duration::from_secs(config.retry_delay_secs),
            ));
        }
        None => {
            tokio::spawn(run_periodic_drain(
                state.sync.clone(),
                Duration::from_secs(config.drain_interval_secs),
                shutdown.clone(),
            ));
        }
    }

    // Samples left over from a previous run.
    if let Err(err) = state.sync.drain_all().await {
        tracing::warn!(error = %err, "startup drain failed");
    }

    let app = api::rest::router(state.clone());

    let bind_addr = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|err| TelemetryError::Internal(format!("failed to bind {bind_addr}: {err}")))?;

    tracing::info!(http_port = config.http_port, "http server started");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| TelemetryError::Internal(format!("server error: {err}")))?;

    shutdown.cancel();
    state.controller.lock().await.stop().await;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
    }
}
