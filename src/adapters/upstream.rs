use std::time::Duration;

use reqwest::Client;
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue, USER_AGENT};
use thiserror::Error;

use crate::domain::upstream_payload::UpstreamEnvelope;

pub const DEFAULT_UPSTREAM_BASE_URL: &str =
    "https://mkmonitoring.siwrr.io.vn/api/v1/data/get-monitoring-station";
pub const SYNC_USER_AGENT: &str = "SWFM-Sync/1.0";

#[allow(async_fn_in_trait)]
pub trait HydroClient {
    async fn fetch_station(&self, station_code: &str) -> Result<UpstreamEnvelope, FetchError>;
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum FetchError {
    #[error("HTTP {status}: {reason}")]
    Status { status: u16, reason: String },
    #[error("request failed: {0}")]
    Transport(String),
    #[error("invalid response body: {0}")]
    Body(String),
}

#[derive(Debug, Clone)]
pub struct ReqwestHydroClient {
    client: Client,
    base_url: String,
}

impl ReqwestHydroClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, FetchError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(USER_AGENT, HeaderValue::from_static(SYNC_USER_AGENT));

        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|error| FetchError::Transport(error.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn station_url(&self, station_code: &str) -> String {
        format!("{}/{station_code}", self.base_url)
    }
}

impl HydroClient for ReqwestHydroClient {
    async fn fetch_station(&self, station_code: &str) -> Result<UpstreamEnvelope, FetchError> {
        let response = self
            .client
            .get(self.station_url(station_code))
            .send()
            .await
            .map_err(|error| FetchError::Transport(error.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                reason: status.canonical_reason().unwrap_or("Unknown").to_string(),
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|error| FetchError::Transport(error.to_string()))?;

        serde_json::from_slice(&body).map_err(|error| FetchError::Body(error.to_string()))
    }
}
