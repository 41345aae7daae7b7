//! Shared fixtures for integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use netassist::config::SourcesConfig;
use netassist::upstream::{
    ApiAdmin, ApiClient, ApiDevice, ApiNetwork, ApiOrganization, TrafficEntry,
};
use netassist::webhook::{WebhookRequest, WebhookResponse};
use netassist::{
    ActionRegistry, ActionServices, InMemoryKvStore, KvMirror, ManagementApi, RefreshPipeline,
    ResolutionOrchestrator, RetryExecutor, RetryPolicy, SnapshotStore, UpstreamError,
    UpstreamThrottle, WebhookService,
};

pub const SESSION: &str = "projects/demo/agent/sessions/it-1";

/// In-process stand-in for the management platform
pub struct FakeDashboard {
    pub org_name: Mutex<String>,
    pub fail_listing: AtomicBool,
    /// Rate-limit answers still to give before traffic succeeds
    pub traffic_rate_limits: AtomicU32,
    pub traffic_calls: AtomicU32,
    pub traffic: Mutex<Vec<TrafficEntry>>,
}

impl Default for FakeDashboard {
    fn default() -> Self {
        Self {
            org_name: Mutex::new("Acme Corp".into()),
            fail_listing: AtomicBool::new(false),
            traffic_rate_limits: AtomicU32::new(0),
            traffic_calls: AtomicU32::new(0),
            traffic: Mutex::new(Vec::new()),
        }
    }
}

impl FakeDashboard {
    fn check_listing(&self) -> Result<(), UpstreamError> {
        if self.fail_listing.load(Ordering::SeqCst) {
            return Err(UpstreamError::Status {
                status: 401,
                message: "Invalid API key".into(),
            });
        }
        Ok(())
    }
}

fn network(id: &str, name: &str) -> ApiNetwork {
    ApiNetwork {
        id: id.into(),
        name: name.into(),
        organization_id: None,
    }
}

fn device(serial: &str, name: Option<&str>, model: &str) -> ApiDevice {
    ApiDevice {
        serial: serial.into(),
        name: name.map(str::to_string),
        model: model.into(),
    }
}

#[async_trait]
impl ManagementApi for FakeDashboard {
    async fn list_organizations(&self) -> Result<Vec<ApiOrganization>, UpstreamError> {
        self.check_listing()?;
        let name = self.org_name.lock().unwrap().clone();
        Ok(vec![
            ApiOrganization {
                id: "o1".into(),
                name,
            },
            ApiOrganization {
                id: "o2".into(),
                name: "Globex".into(),
            },
        ])
    }

    async fn list_networks(&self, org_id: &str) -> Result<Vec<ApiNetwork>, UpstreamError> {
        self.check_listing()?;
        Ok(match org_id {
            "o1" => vec![network("n1", "Main Office"), network("n2", "Main Street Branch")],
            _ => vec![network("n3", "Warehouse")],
        })
    }

    async fn list_admins(&self, org_id: &str) -> Result<Vec<ApiAdmin>, UpstreamError> {
        self.check_listing()?;
        Ok(match org_id {
            "o1" => vec![ApiAdmin {
                id: "a1".into(),
                name: "Alice".into(),
                email: "alice@acme.test".into(),
            }],
            _ => Vec::new(),
        })
    }

    async fn list_devices(&self, net_id: &str) -> Result<Vec<ApiDevice>, UpstreamError> {
        self.check_listing()?;
        Ok(match net_id {
            "n1" => vec![
                device("Q1", Some("Lobby AP"), "MR33"),
                device("Q2", None, "MX64"),
                device("Q4", Some("Door Cam"), "MV21"),
            ],
            "n2" => vec![device("Q3", Some("Branch Switch"), "MS220")],
            _ => Vec::new(),
        })
    }

    async fn list_clients(
        &self,
        _serial: &str,
        _window_secs: u64,
    ) -> Result<Vec<ApiClient>, UpstreamError> {
        Ok(Vec::new())
    }

    async fn traffic_data(
        &self,
        _net_id: &str,
        _timespan_secs: u64,
    ) -> Result<Vec<TrafficEntry>, UpstreamError> {
        self.traffic_calls.fetch_add(1, Ordering::SeqCst);
        let remaining = self.traffic_rate_limits.load(Ordering::SeqCst);
        if remaining > 0 {
            self.traffic_rate_limits.store(remaining - 1, Ordering::SeqCst);
            return Err(UpstreamError::RateLimited { retry_after: None });
        }
        Ok(self.traffic.lock().unwrap().clone())
    }
}

pub struct Harness {
    pub api: Arc<FakeDashboard>,
    pub kv: Arc<InMemoryKvStore>,
    pub store: Arc<SnapshotStore>,
    pub pipeline: Arc<RefreshPipeline>,
    pub webhook: WebhookService,
}

pub fn executor() -> RetryExecutor {
    RetryExecutor::new(
        RetryPolicy {
            max_attempts: 4,
            min_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
        },
        Arc::new(UpstreamThrottle::new(1000)),
    )
}

/// Wired service without the initial refresh
pub fn harness_with(api: Arc<FakeDashboard>) -> Harness {
    let kv = Arc::new(InMemoryKvStore::new());
    let store = Arc::new(SnapshotStore::new().with_mirror(KvMirror::new(kv.clone())));
    let executor = executor();
    let dyn_api: Arc<dyn ManagementApi> = api.clone();
    let pipeline = Arc::new(RefreshPipeline::new(
        dyn_api.clone(),
        executor.clone(),
        store.clone(),
    ));
    let services = ActionServices::new(
        Arc::new(ResolutionOrchestrator::new(store.clone(), 10)),
        dyn_api,
        executor,
    );
    let webhook = WebhookService::new(
        Arc::new(ActionRegistry::with_defaults()),
        services,
        SourcesConfig::default(),
    );
    Harness {
        api,
        kv,
        store,
        pipeline,
        webhook,
    }
}

/// Wired service with the snapshot already loaded
pub async fn harness() -> Harness {
    let harness = harness_with(Arc::new(FakeDashboard::default()));
    harness
        .pipeline
        .initial_refresh()
        .await
        .expect("initial refresh");
    harness
}

/// One Slack turn
pub fn turn(action: &str, parameters: Value, contexts: Value) -> WebhookRequest {
    serde_json::from_value(json!({
        "session": SESSION,
        "queryResult": {
            "action": action,
            "parameters": parameters,
            "outputContexts": contexts,
            "allRequiredParamsPresent": true
        },
        "originalDetectIntentRequest": {"source": "slack"}
    }))
    .expect("valid request")
}

pub fn context_name(id: &str) -> String {
    format!("{SESSION}/contexts/{id}")
}

pub fn text(response: &WebhookResponse) -> &str {
    response.fulfillment_text.as_deref().unwrap_or_default()
}
