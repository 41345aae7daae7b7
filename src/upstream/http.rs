//! HTTPS client for the management API.
//!
//! Maps transport failures and HTTP statuses onto [`UpstreamError`] so the
//! retry executor can classify them. Retrying and throttling happen one
//! level up, in [`crate::retry`].

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use super::{
    ApiAdmin, ApiClient, ApiDevice, ApiNetwork, ApiOrganization, ManagementApi, TrafficEntry,
};
use crate::config::UpstreamConfig;
use crate::error::UpstreamError;

/// Error body shape used by the platform: `{"errors": ["..."]}`
#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    errors: Vec<String>,
}

/// reqwest-backed [`ManagementApi`]
pub struct HttpManagementApi {
    client: Client,
    base_url: String,
}

impl HttpManagementApi {
    /// Create a client, reading the API key from the configured variable
    pub fn new(config: &UpstreamConfig) -> Result<Self, UpstreamError> {
        let api_key = std::env::var(&config.api_key_env).unwrap_or_default();
        Self::with_api_key(config, &api_key)
    }

    pub fn with_api_key(config: &UpstreamConfig, api_key: &str) -> Result<Self, UpstreamError> {
        let mut headers = reqwest::header::HeaderMap::new();
        if !api_key.is_empty() {
            let name = reqwest::header::HeaderName::try_from(config.api_key_header.as_str())
                .map_err(|e| UpstreamError::Connection(format!("invalid header name: {e}")))?;
            let value = reqwest::header::HeaderValue::try_from(api_key)
                .map_err(|e| UpstreamError::Connection(format!("invalid API key: {e}")))?;
            headers.insert(name, value);
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .default_headers(headers)
            .build()
            .map_err(|e| UpstreamError::Connection(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, UpstreamError> {
        let url = self.url(path);
        debug!(%url, "GET");
        let response = self
            .client
            .get(&url)
            .query(query)
            .send()
            .await
            .map_err(map_transport_error)?;

        let response = check_status(response).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| UpstreamError::Decode(e.to_string()))
    }
}

fn map_transport_error(err: reqwest::Error) -> UpstreamError {
    if err.is_timeout() {
        UpstreamError::Timeout(err.to_string())
    } else if err.is_decode() {
        UpstreamError::Decode(err.to_string())
    } else {
        UpstreamError::Connection(err.to_string())
    }
}

async fn check_status(response: Response) -> Result<Response, UpstreamError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());
        return Err(UpstreamError::RateLimited { retry_after });
    }

    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&body)
        .map(|b| b.errors.join(" "))
        .unwrap_or(body);

    Err(UpstreamError::Status {
        status: status.as_u16(),
        message,
    })
}

#[async_trait]
impl ManagementApi for HttpManagementApi {
    async fn list_organizations(&self) -> Result<Vec<ApiOrganization>, UpstreamError> {
        self.get_json("organizations", &[]).await
    }

    async fn list_networks(&self, org_id: &str) -> Result<Vec<ApiNetwork>, UpstreamError> {
        self.get_json(&format!("organizations/{org_id}/networks"), &[])
            .await
    }

    async fn list_admins(&self, org_id: &str) -> Result<Vec<ApiAdmin>, UpstreamError> {
        self.get_json(&format!("organizations/{org_id}/admins"), &[])
            .await
    }

    async fn list_devices(&self, net_id: &str) -> Result<Vec<ApiDevice>, UpstreamError> {
        self.get_json(&format!("networks/{net_id}/devices"), &[])
            .await
    }

    async fn list_clients(
        &self,
        serial: &str,
        window_secs: u64,
    ) -> Result<Vec<ApiClient>, UpstreamError> {
        self.get_json(
            &format!("devices/{serial}/clients"),
            &[("timespan", window_secs.to_string())],
        )
        .await
    }

    async fn traffic_data(
        &self,
        net_id: &str,
        timespan_secs: u64,
    ) -> Result<Vec<TrafficEntry>, UpstreamError> {
        self.get_json(
            &format!("networks/{net_id}/traffic"),
            &[("timespan", timespan_secs.to_string())],
        )
        .await
    }
}
