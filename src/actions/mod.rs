//! Business actions
//!
//! Each conversational intent maps to one [`ActionId`]. Handlers declare the
//! fields they need, hand them to the resolution orchestrator and either
//! return its reprompt or do their work against the resolved entities.
//!
//! ```text
//! ActionInput ──► ActionRegistry::dispatch ──► ActionHandler::handle
//!                                                 │
//!                        ResolutionOrchestrator ◄─┤
//!                        RetryExecutor + API   ◄──┘ (traffic, clients)
//! ```

pub mod help;
pub mod inventory;
pub mod registry;
pub mod traffic;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;

use crate::context::ConversationContext;
use crate::error::BotError;
use crate::resolution::format::Message;
use crate::resolution::{
    FieldKind, FollowupEvent, Reprompt, ResolutionOrchestrator, ResolutionRequest, ResolvedFields,
};
use crate::retry::RetryExecutor;
use crate::upstream::ManagementApi;

pub use registry::ActionRegistry;

/// Every action the assistant can fulfill
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ActionId {
    ListOrganizations,
    ListNetworks,
    ListDevices,
    ListAdmins,
    TopTraffic,
    DataUsage,
    ListMyFunctions,
    ExplainFunction,
}

impl ActionId {
    pub const ALL: [ActionId; 8] = [
        ActionId::ListOrganizations,
        ActionId::ListNetworks,
        ActionId::ListDevices,
        ActionId::ListAdmins,
        ActionId::TopTraffic,
        ActionId::DataUsage,
        ActionId::ListMyFunctions,
        ActionId::ExplainFunction,
    ];

    /// Name the platform sends in `queryResult.action`
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionId::ListOrganizations => "listOrganizations",
            ActionId::ListNetworks => "listNetworks",
            ActionId::ListDevices => "listDevices",
            ActionId::ListAdmins => "listAdmins",
            ActionId::TopTraffic => "topTraffic",
            ActionId::DataUsage => "dataUsage",
            ActionId::ListMyFunctions => "listMyFunctions",
            ActionId::ExplainFunction => "explainFunction",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|id| id.as_str() == name)
    }

    /// Prefix of this action's follow-up events
    pub fn event_prefix(&self) -> String {
        self.as_str().to_ascii_lowercase()
    }
}

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything a handler learns from one request
#[derive(Debug, Clone, Default)]
pub struct ActionInput {
    pub context: ConversationContext,
    /// This turn's raw parameters
    pub parameters: Map<String, Value>,
    /// The platform still considers required parameters missing
    pub incomplete: bool,
}

impl ActionInput {
    pub fn new(context: ConversationContext) -> Self {
        Self {
            context,
            ..Self::default()
        }
    }

    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.parameters
            .get(name)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

/// Reply handed back to the platform
#[derive(Debug, Clone, PartialEq)]
pub struct ActionReply {
    pub message: Message,
    /// Confirmed values to keep in output contexts
    pub confirmed: Vec<(FieldKind, String)>,
    pub reset_fields: Vec<FieldKind>,
    pub followup: Option<FollowupEvent>,
    /// The conversation's reprompt state is settled and can be cleared
    pub clears_reprompt: bool,
}

impl ActionReply {
    pub fn new(message: Message) -> Self {
        Self {
            message,
            confirmed: Vec::new(),
            reset_fields: Vec::new(),
            followup: None,
            clears_reprompt: false,
        }
    }

    /// Successful reply carrying forward the resolved names
    pub fn resolved(message: Message, fields: &ResolvedFields) -> Self {
        Self {
            confirmed: fields.confirmed(),
            clears_reprompt: true,
            ..Self::new(message)
        }
    }
}

impl From<Reprompt> for ActionReply {
    fn from(reprompt: Reprompt) -> Self {
        Self {
            message: reprompt.message,
            confirmed: Vec::new(),
            reset_fields: reprompt.reset_fields,
            followup: reprompt.followup,
            clears_reprompt: false,
        }
    }
}

impl From<BotError> for ActionReply {
    fn from(err: BotError) -> Self {
        Self {
            message: Message::plain(err.message),
            confirmed: Vec::new(),
            reset_fields: err.reset_fields,
            followup: err.followup,
            clears_reprompt: false,
        }
    }
}

/// Shared collaborators for every handler
#[derive(Clone)]
pub struct ActionServices {
    pub orchestrator: Arc<ResolutionOrchestrator>,
    pub api: Arc<dyn ManagementApi>,
    pub executor: RetryExecutor,
}

impl ActionServices {
    pub fn new(
        orchestrator: Arc<ResolutionOrchestrator>,
        api: Arc<dyn ManagementApi>,
        executor: RetryExecutor,
    ) -> Self {
        Self {
            orchestrator,
            api,
            executor,
        }
    }

    pub fn display_limit(&self) -> usize {
        self.orchestrator.display_limit()
    }

    /// Resolve the action's fields, or the reply asking for the next one
    pub fn resolve(
        &self,
        request: &ResolutionRequest<'_>,
        input: &ActionInput,
    ) -> Result<ResolvedFields, ActionReply> {
        self.orchestrator
            .resolve_all(request, &input.context)
            .map_err(ActionReply::from)
    }
}

/// One business action
#[async_trait]
pub trait ActionHandler: Send + Sync {
    fn id(&self) -> ActionId;

    async fn handle(
        &self,
        services: &ActionServices,
        input: &ActionInput,
    ) -> Result<ActionReply, BotError>;
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::error::UpstreamError;
    use crate::model::fixtures::sample_snapshot;
    use crate::retry::{RetryPolicy, UpstreamThrottle};
    use crate::snapshot::SnapshotStore;
    use crate::upstream::{ApiAdmin, ApiClient, ApiDevice, ApiNetwork, ApiOrganization, TrafficEntry};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Scripted API for handler tests; only traffic and clients matter
    #[derive(Default)]
    pub struct ScriptedApi {
        pub traffic: Mutex<Option<Result<Vec<TrafficEntry>, UpstreamError>>>,
        pub clients: Mutex<Vec<ApiClient>>,
        pub client_serials: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ManagementApi for ScriptedApi {
        async fn list_organizations(&self) -> Result<Vec<ApiOrganization>, UpstreamError> {
            Ok(Vec::new())
        }

        async fn list_networks(&self, _: &str) -> Result<Vec<ApiNetwork>, UpstreamError> {
            Ok(Vec::new())
        }

        async fn list_admins(&self, _: &str) -> Result<Vec<ApiAdmin>, UpstreamError> {
            Ok(Vec::new())
        }

        async fn list_devices(&self, _: &str) -> Result<Vec<ApiDevice>, UpstreamError> {
            Ok(Vec::new())
        }

        async fn list_clients(&self, serial: &str, _: u64) -> Result<Vec<ApiClient>, UpstreamError> {
            self.client_serials.lock().unwrap().push(serial.to_string());
            Ok(self.clients.lock().unwrap().clone())
        }

        async fn traffic_data(&self, _: &str, _: u64) -> Result<Vec<TrafficEntry>, UpstreamError> {
            self.traffic.lock().unwrap().clone().unwrap_or_else(|| Ok(Vec::new()))
        }
    }

    pub fn services_with(api: Arc<ScriptedApi>, display_limit: usize) -> ActionServices {
        let store = Arc::new(SnapshotStore::with_snapshot(sample_snapshot()));
        let executor = RetryExecutor::new(
            RetryPolicy {
                max_attempts: 2,
                min_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(1),
            },
            Arc::new(UpstreamThrottle::new(1000)),
        );
        ActionServices::new(
            Arc::new(ResolutionOrchestrator::new(store, display_limit)),
            api,
            executor,
        )
    }

    pub fn services() -> ActionServices {
        services_with(Arc::new(ScriptedApi::default()), 10)
    }
}
