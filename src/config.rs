use std::env;
use std::path::PathBuf;

use crate::error::TelemetryError;

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub log_level: String,
    pub event_buffer_size: usize,
    pub queue_path: PathBuf,
    pub ingestion_url: String,
    pub identity_token: Option<String>,
    pub proximity_threshold: f64,
    pub deferred_retry: bool,
    pub retry_delay_secs: u64,
    pub drain_interval_secs: u64,
    pub http_timeout_secs: u64,
    pub battery_fraction: Option<f64>,
}

impl Config {
    pub fn from_env() -> Result<Self, TelemetryError> {
        let _ = dotenvy::dotenv();

        let config = Self {
            http_port: parse_or_default("HTTP_PORT", 3000)?,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            event_buffer_size: parse_or_default("EVENT_BUFFER_SIZE", 1024)?,
            queue_path: env::var("QUEUE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("telemetry-queue.json")),
            ingestion_url: env::var("INGESTION_URL")
                .unwrap_or_else(|_| "http://127.0.0.1:8080".to_string()),
            identity_token: env::var("IDENTITY_TOKEN").ok().filter(|t| !t.is_empty()),
            proximity_threshold: parse_or_default("PROXIMITY_THRESHOLD", 0.25)?,
            deferred_retry: parse_or_default("DEFERRED_RETRY", true)?,
            retry_delay_secs: parse_or_default("RETRY_DELAY_SECS", 30)?,
            drain_interval_secs: parse_or_default("DRAIN_INTERVAL_SECS", 60)?,
            http_timeout_secs: parse_or_default("HTTP_TIMEOUT_SECS", 10)?,
            battery_fraction: parse_optional("BATTERY_FRACTION")?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Channel capacities and the drain period must be non-zero.
    pub fn validate(&self) -> Result<(), TelemetryError> {
        if !(0.0..=1.0).contains(&self.proximity_threshold) {
            return Err(TelemetryError::Internal(format!(
                "invalid PROXIMITY_THRESHOLD: {} is outside 0..=1",
                self.proximity_threshold
            )));
        }
        if self.event_buffer_size == 0 {
            return Err(TelemetryError::Internal(
                "invalid EVENT_BUFFER_SIZE: must be at least 1".to_string(),
            ));
        }
        if self.drain_interval_secs == 0 {
            return Err(TelemetryError::Internal(
                "invalid DRAIN_INTERVAL_SECS: must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_or_default<T>(key: &str, default: T) -> Result<T, TelemetryError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    Ok(parse_optional(key)?.unwrap_or(default))
}

fn parse_optional<T>(key: &str) -> Result<Option<T>, TelemetryError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|err| TelemetryError::Internal(format!("invalid {key}: {err}"))),
        Err(_) => Ok(None),
    }
}
