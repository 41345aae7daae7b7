//! Listing actions served straight from the snapshot

use async_trait::async_trait;

use super::{ActionHandler, ActionId, ActionInput, ActionReply, ActionServices};
use crate::error::BotError;
use crate::resolution::format::{bold, truncate_double_list, truncate_list, ListTemplate, Message};
use crate::resolution::{FieldKind, ResolutionRequest};

const ORG_FIELDS: &[FieldKind] = &[FieldKind::Organization];
const NETWORK_FIELDS: &[FieldKind] = &[FieldKind::Network];

/// Render a list, or fail with the template's fallback and clear `reset`
fn list_or_error<S: AsRef<str>>(
    template: &ListTemplate<'_>,
    items: &[S],
    limit: usize,
    reset: FieldKind,
) -> Result<Message, BotError> {
    truncate_list(template, items, limit)
        .ok_or_else(|| BotError::new(template.fallback).with_reset(reset))
}

pub struct ListOrganizations;

#[async_trait]
impl ActionHandler for ListOrganizations {
    fn id(&self) -> ActionId {
        ActionId::ListOrganizations
    }

    async fn handle(
        &self,
        services: &ActionServices,
        _input: &ActionInput,
    ) -> Result<ActionReply, BotError> {
        let snapshot = services.orchestrator.store().current();
        let names: Vec<&str> = snapshot
            .organizations()
            .iter()
            .map(|o| o.name.as_str())
            .collect();

        let text = format!("You are in the following {}:\n", bold("organizations"));
        let template = ListTemplate::new(
            &text,
            "You are in the following organizations: ",
            "You are not in any organizations!",
            "organizations",
        );
        let message = list_or_error(
            &template,
            &names,
            services.display_limit(),
            FieldKind::Organization,
        )?;
        Ok(ActionReply::new(message))
    }
}

pub struct ListNetworks;

#[async_trait]
impl ActionHandler for ListNetworks {
    fn id(&self) -> ActionId {
        ActionId::ListNetworks
    }

    async fn handle(
        &self,
        services: &ActionServices,
        input: &ActionInput,
    ) -> Result<ActionReply, BotError> {
        let prefix = self.id().event_prefix();
        let fields = match services.resolve(&ResolutionRequest::new(&prefix, ORG_FIELDS), input) {
            Ok(fields) => fields,
            Err(reply) => return Ok(reply),
        };
        let org = fields.organization()?;
        let names: Vec<&str> = fields
            .snapshot()
            .networks_for_org(&org.id)
            .iter()
            .map(|n| n.name.as_str())
            .collect();

        let text = format!(
            "Your organization, {}, has the following networks:\n",
            bold(&org.name)
        );
        let speech = format!("Your organization, {}, has the following networks: ", org.name);
        let fallback = format!("There are no networks in the \"{}\" organization!", org.name);
        let template = ListTemplate::new(&text, &speech, &fallback, "networks");

        let message = list_or_error(
            &template,
            &names,
            services.display_limit(),
            FieldKind::Organization,
        )?;
        Ok(ActionReply::resolved(message, &fields))
    }
}

pub struct ListDevices;

#[async_trait]
impl ActionHandler for ListDevices {
    fn id(&self) -> ActionId {
        ActionId::ListDevices
    }

    async fn handle(
        &self,
        services: &ActionServices,
        input: &ActionInput,
    ) -> Result<ActionReply, BotError> {
        let prefix = self.id().event_prefix();
        let fields = match services.resolve(&ResolutionRequest::new(&prefix, NETWORK_FIELDS), input) {
            Ok(fields) => fields,
            Err(reply) => return Ok(reply),
        };
        let net = fields.network()?;
        let names: Vec<&str> = fields
            .snapshot()
            .devices_for_network(&net.id)
            .iter()
            .map(|d| d.display_name())
            .collect();

        let text = format!(
            "Your network, {}, has the following devices:\n",
            bold(&net.name)
        );
        let speech = format!("Your network, {}, has the following devices: ", net.name);
        let fallback = format!("There are no devices in the \"{}\" network!", net.name);
        let template = ListTemplate::new(&text, &speech, &fallback, "devices");

        let message = list_or_error(&template, &names, services.display_limit(), FieldKind::Network)?;
        Ok(ActionReply::resolved(message, &fields))
    }
}

pub struct ListAdmins;

#[async_trait]
impl ActionHandler for ListAdmins {
    fn id(&self) -> ActionId {
        ActionId::ListAdmins
    }

    async fn handle(
        &self,
        services: &ActionServices,
        input: &ActionInput,
    ) -> Result<ActionReply, BotError> {
        let prefix = self.id().event_prefix();
        let fields = match services.resolve(&ResolutionRequest::new(&prefix, ORG_FIELDS), input) {
            Ok(fields) => fields,
            Err(reply) => return Ok(reply),
        };
        let org = fields.organization()?;
        let admins = fields.snapshot().admins_for_org(&org.id);
        let infos: Vec<String> = admins
            .iter()
            .map(|a| format!("{} - {}", a.name, a.email))
            .collect();
        let names: Vec<&str> = admins.iter().map(|a| a.name.as_str()).collect();

        let text = format!(
            "Your organization, {}, has the following administrators:\n",
            bold(&org.name)
        );
        let speech = format!(
            "Your organization, {}, has the following administrators: ",
            org.name
        );
        let fallback = format!(
            "There are no administrators in the \"{}\" organization!",
            org.name
        );
        let template = ListTemplate::new(&text, &speech, &fallback, "administrators");

        let message = truncate_double_list(&template, &infos, &names, services.display_limit())
            .ok_or_else(|| BotError::new(fallback.as_str()).with_reset(FieldKind::Organization))?;
        Ok(ActionReply::resolved(message, &fields))
    }
}
