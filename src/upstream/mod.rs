//! Upstream management API boundary
//!
//! The [`ManagementApi`] trait is the only way the rest of the crate talks
//! to the remote platform. [`HttpManagementApi`] implements it over HTTPS;
//! tests substitute scripted fakes.

pub mod http;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::UpstreamError;

pub use http::HttpManagementApi;

/// Organization as returned by the platform
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiOrganization {
    pub id: String,
    pub name: String,
}

/// Network as returned by the platform
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiNetwork {
    pub id: String,
    pub name: String,
    #[serde(rename = "organizationId", default)]
    pub organization_id: Option<String>,
}

/// Admin as returned by the platform
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiAdmin {
    pub id: String,
    pub name: String,
    pub email: String,
}

/// Device as returned by the platform
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiDevice {
    pub serial: String,
    #[serde(default)]
    pub name: Option<String>,
    pub model: String,
}

/// Sent/received byte counts for one client
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ClientUsage {
    pub sent: f64,
    pub recv: f64,
}

/// A client seen by a device over a time window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiClient {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub usage: ClientUsage,
}

/// One row of a network's traffic analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrafficEntry {
    #[serde(default)]
    pub application: Option<String>,
    #[serde(default)]
    pub destination: Option<String>,
    /// Bytes sent
    #[serde(default)]
    pub sent: f64,
    /// Bytes received
    #[serde(default)]
    pub recv: f64,
    /// Seconds of activity
    #[serde(rename = "activeTime", default)]
    pub active_time: u64,
    #[serde(rename = "numClients", default)]
    pub num_clients: u64,
}

impl TrafficEntry {
    /// Human label: application, then destination
    pub fn label(&self) -> String {
        match (self.application.as_deref(), self.destination.as_deref()) {
            (Some(app), Some(dest)) if !dest.is_empty() => format!("{app} - {dest}"),
            (Some(app), _) => app.to_string(),
            (None, Some(dest)) => dest.to_string(),
            (None, None) => "Unknown".to_string(),
        }
    }
}

/// Operations consumed from the remote management platform.
///
/// Every method may fail with a rate-limit shaped error (retryable) or any
/// other error (permanent). Callers go through the retry executor.
#[async_trait]
pub trait ManagementApi: Send + Sync {
    async fn list_organizations(&self) -> Result<Vec<ApiOrganization>, UpstreamError>;

    async fn list_networks(&self, org_id: &str) -> Result<Vec<ApiNetwork>, UpstreamError>;

    async fn list_admins(&self, org_id: &str) -> Result<Vec<ApiAdmin>, UpstreamError>;

    async fn list_devices(&self, net_id: &str) -> Result<Vec<ApiDevice>, UpstreamError>;

    async fn list_clients(
        &self,
        serial: &str,
        window_secs: u64,
    ) -> Result<Vec<ApiClient>, UpstreamError>;

    async fn traffic_data(
        &self,
        net_id: &str,
        timespan_secs: u64,
    ) -> Result<Vec<TrafficEntry>, UpstreamError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_traffic_entry_deserializes_platform_shape() {
        let json = r#"{"application":"Google","destination":"google.com","sent":10.5,"recv":4,"activeTime":600,"numClients":3}"#;
        let entry: TrafficEntry = serde_json::from_str(json).unwrap();
        assert_eq!(entry.active_time, 600);
        assert_eq!(entry.num_clients, 3);
        assert_eq!(entry.label(), "Google - google.com");
    }

    #[test]
    fn test_device_name_optional() {
        let device: ApiDevice = serde_json::from_str(r#"{"serial":"Q1","model":"MX64"}"#).unwrap();
        assert!(device.name.is_none());
    }
}
