//! Conversational platform webhook
//!
//! [`WebhookService`] turns one fulfillment request into one response:
//! source filter, context reconciliation, action dispatch and rendering.
//! The axum routes in [`routes`] are a thin shell around it.

#[cfg(feature = "server")]
pub mod routes;
pub mod schema;

use std::sync::Arc;
use tracing::info;

use crate::actions::{ActionInput, ActionRegistry, ActionReply, ActionServices};
use crate::config::SourcesConfig;
use crate::context::reconcile;
use crate::error::BotError;

#[cfg(feature = "server")]
pub use routes::{create_router, AppState};
pub use schema::{Platform, WebhookRequest, WebhookResponse};

pub const UNSUPPORTED_PLATFORM_MESSAGE: &str = "This platform is currently not supported.";

/// Fulfills requests against the action registry
pub struct WebhookService {
    registry: Arc<ActionRegistry>,
    services: ActionServices,
    sources: SourcesConfig,
}

impl WebhookService {
    pub fn new(registry: Arc<ActionRegistry>, services: ActionServices, sources: SourcesConfig) -> Self {
        Self {
            registry,
            services,
            sources,
        }
    }

    /// Platform for a request source.
    ///
    /// `Ok(None)` is the platform console, which is always allowed.
    fn platform_for(&self, source: Option<&str>) -> Result<Option<Platform>, BotError> {
        let Some(source) = source else {
            return Ok(None);
        };
        match (self.sources.is_enabled(source), Platform::from_source(source)) {
            (Some(true), Some(platform)) => Ok(Some(platform)),
            _ => {
                info!(source, "Rejecting request from unsupported platform");
                Err(BotError::new(UNSUPPORTED_PLATFORM_MESSAGE))
            }
        }
    }

    pub async fn fulfill(&self, request: WebhookRequest) -> WebhookResponse {
        let platform = match self.platform_for(request.source()) {
            Ok(platform) => platform,
            Err(err) => {
                return WebhookResponse::from_reply(&request.session, None, ActionReply::from(err), None)
            }
        };

        let WebhookRequest {
            session,
            query_result: query,
            ..
        } = request;

        let context = reconcile(&query.parameters, &query.output_contexts);
        let reprompt_context = context.reprompt_context().map(str::to_string);
        let input = ActionInput {
            context,
            parameters: query.parameters,
            incomplete: !query.all_required_params_present,
        };

        info!(
            action = query.action.as_deref().unwrap_or(""),
            source = ?platform,
            incomplete = input.incomplete,
            "Executing action"
        );
        let Some(reply) = self
            .registry
            .dispatch(query.action.as_deref(), &self.services, &input)
            .await
        else {
            info!("No action in request, user cancelled slot filling");
            return WebhookResponse::default();
        };

        WebhookResponse::from_reply(&session, platform, reply, reprompt_context.as_deref())
    }
}
