//! Action registry
//!
//! The `ActionRegistry` maps every [`ActionId`] to its handler and routes
//! incoming action names. It is filled once at startup and validated so a
//! missing handler fails the process instead of the first request.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

use super::help::{ExplainFunction, ListMyFunctions};
use super::inventory::{ListAdmins, ListDevices, ListNetworks, ListOrganizations};
use super::traffic::{DataUsage, TopTraffic};
use super::{ActionHandler, ActionId, ActionInput, ActionReply, ActionServices};
use crate::error::BotError;

/// Generic reply for an action name nothing handles
pub const UNKNOWN_ACTION_MESSAGE: &str = "An unknown error occurred while processing your query.";

/// Registry of action handlers keyed by action id
#[derive(Default)]
pub struct ActionRegistry {
    handlers: HashMap<ActionId, Arc<dyn ActionHandler>>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in action
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(ListOrganizations));
        registry.register(Arc::new(ListNetworks));
        registry.register(Arc::new(ListDevices));
        registry.register(Arc::new(ListAdmins));
        registry.register(Arc::new(TopTraffic));
        registry.register(Arc::new(DataUsage));
        registry.register(Arc::new(ListMyFunctions));
        registry.register(Arc::new(ExplainFunction));
        registry
    }

    /// Register a handler under its own id, replacing any previous one
    pub fn register(&mut self, handler: Arc<dyn ActionHandler>) {
        self.handlers.insert(handler.id(), handler);
    }

    pub fn get(&self, id: ActionId) -> Option<&Arc<dyn ActionHandler>> {
        self.handlers.get(&id)
    }

    /// Fails with the ids that have no handler
    pub fn validate(&self) -> Result<(), Vec<ActionId>> {
        let missing: Vec<ActionId> = ActionId::ALL
            .into_iter()
            .filter(|id| !self.handlers.contains_key(id))
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(missing)
        }
    }

    /// Route one request.
    ///
    /// `None` means there is nothing to say: the platform sent no action,
    /// which happens when the user abandons slot filling.
    pub async fn dispatch(
        &self,
        action: Option<&str>,
        services: &ActionServices,
        input: &ActionInput,
    ) -> Option<ActionReply> {
        let name = action.map(str::trim).filter(|s| !s.is_empty())?;

        let Some(handler) = ActionId::parse(name).and_then(|id| self.handlers.get(&id)) else {
            warn!(action = name, "No handler registered for action");
            return Some(BotError::new(UNKNOWN_ACTION_MESSAGE).into());
        };

        let reply = match handler.handle(services, input).await {
            Ok(reply) => reply,
            Err(err) => {
                info!(action = name, error = %err, reset = ?err.reset_fields, "Action ended with a user-facing error");
                err.into()
            }
        };
        Some(reply)
    }
}
