use std::time::Duration;

use async_trait::async_trait;

use crate::error::TelemetryError;
use crate::models::location::LocationSample;
use crate::platform::IngestionEndpoint;

/// Posts samples as JSON to `{base_url}/locations` with a bearer token.
pub struct HttpIngestionEndpoint {
    client: reqwest::Client,
    url: String,
}

impl HttpIngestionEndpoint {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, TelemetryError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| TelemetryError::Internal(format!("failed to build http client: {err}")))?;

        Ok(Self {
            client,
            url: format!("{}/locations", base_url.trim_end_matches('/')),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl IngestionEndpoint for HttpIngestionEndpoint {
    async fn deliver(&self, token: &str, sample: &LocationSample) -> Result<(), TelemetryError> {
        let response = self
            .client
            .post(&self.url)
            .bearer_auth(token)
            .json(sample)
            .send()
            .await
            .map_err(|err| TelemetryError::Delivery(format!("request failed: {err}")))?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(TelemetryError::Auth(format!("ingestion endpoint rejected token: {status}")));
        }
        if !status.is_success() {
            return Err(TelemetryError::Delivery(format!(
                "ingestion endpoint returned {status}"
            )));
        }

        Ok(())
    }
}
