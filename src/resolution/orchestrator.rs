//! Resolution orchestrator
//!
//! Entry point business actions use to turn conversation context into
//! resolved entities. Fields are resolved left to right in the order the
//! action declares them; the first field that cannot be resolved stops the
//! walk and becomes a [`Reprompt`], so one turn disambiguates at most one
//! field.
//!
//! Entities are matched and shown by label. A label is the entity's name,
//! qualified with the owning organization (networks) or the id
//! (organizations) when several entities of the same kind share a name.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

use super::format::{list_or_fallback, ListStyle, ListTemplate, Message};
use super::prompt::{FollowupEvent, Reprompt};
use super::{FieldKind, FieldState, ResolutionOutcome};
use crate::context::ConversationContext;
use crate::duration::{duration_prompt, out_of_range_message, TimeDuration};
use crate::error::BotError;
use crate::fuzzy;
use crate::model::{EntityKind, Network, Organization, Snapshot};
use crate::snapshot::SnapshotStore;

/// What an action asks the orchestrator to resolve
#[derive(Debug, Clone, Copy)]
pub struct ResolutionRequest<'a> {
    /// Prefix of follow-up event names, e.g. `listnetworks`
    pub event_prefix: &'a str,
    /// Fields in resolution order
    pub fields: &'a [FieldKind],
    /// What a duration limits, for prompts, e.g. "data usage statistics"
    pub subject: &'a str,
}

impl<'a> ResolutionRequest<'a> {
    pub fn new(event_prefix: &'a str, fields: &'a [FieldKind]) -> Self {
        Self {
            event_prefix,
            fields,
            subject: "statistics",
        }
    }

    pub fn subject(mut self, subject: &'a str) -> Self {
        self.subject = subject;
        self
    }
}

/// A resolved organization or network
#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedEntity {
    Organization(Organization),
    Network(Network),
}

impl ResolvedEntity {
    pub fn name(&self) -> &str {
        match self {
            ResolvedEntity::Organization(org) => &org.name,
            ResolvedEntity::Network(net) => &net.name,
        }
    }
}

/// Values resolved for one request, plus the snapshot they were read from
#[derive(Debug, Clone)]
pub struct ResolvedFields {
    snapshot: Arc<Snapshot>,
    organization: Option<Organization>,
    network: Option<Network>,
    time_duration: Option<TimeDuration>,
}

impl ResolvedFields {
    fn new(snapshot: Arc<Snapshot>) -> Self {
        Self {
            snapshot,
            organization: None,
            network: None,
            time_duration: None,
        }
    }

    fn set(&mut self, entity: ResolvedEntity) {
        match entity {
            ResolvedEntity::Organization(org) => self.organization = Some(org),
            ResolvedEntity::Network(net) => self.network = Some(net),
        }
    }

    /// Snapshot every lookup for this request must use
    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    pub fn organization(&self) -> Result<&Organization, BotError> {
        self.organization.as_ref().ok_or_else(BotError::internal)
    }

    pub fn network(&self) -> Result<&Network, BotError> {
        self.network.as_ref().ok_or_else(BotError::internal)
    }

    pub fn time_duration(&self) -> Result<&TimeDuration, BotError> {
        self.time_duration.as_ref().ok_or_else(BotError::internal)
    }

    fn value(&self, field: FieldKind) -> Option<Value> {
        match field {
            FieldKind::Organization => self
                .organization
                .as_ref()
                .map(|o| Value::String(organization_label(&self.snapshot, o))),
            FieldKind::Network => self
                .network
                .as_ref()
                .map(|n| Value::String(network_label(&self.snapshot, n))),
            FieldKind::TimeDuration => self.time_duration.map(|d| d.to_raw().to_value()),
        }
    }

    /// Confirmed labels to carry forward in output contexts
    pub fn confirmed(&self) -> Vec<(FieldKind, String)> {
        let mut out = Vec::new();
        if let Some(org) = &self.organization {
            out.push((FieldKind::Organization, organization_label(&self.snapshot, org)));
        }
        if let Some(net) = &self.network {
            out.push((FieldKind::Network, network_label(&self.snapshot, net)));
        }
        out
    }
}

/// Resolves declared fields against the current snapshot
pub struct ResolutionOrchestrator {
    store: Arc<SnapshotStore>,
    display_limit: usize,
}

impl ResolutionOrchestrator {
    pub fn new(store: Arc<SnapshotStore>, display_limit: usize) -> Self {
        Self {
            store,
            display_limit: display_limit.max(1),
        }
    }

    pub fn store(&self) -> &Arc<SnapshotStore> {
        &self.store
    }

    pub fn display_limit(&self) -> usize {
        self.display_limit
    }

    /// Resolve one free-text value against the current snapshot.
    ///
    /// When `context` holds candidates offered earlier for this action and
    /// field, the value is matched against those candidates only.
    pub fn resolve_field(
        &self,
        event_prefix: &str,
        kind: EntityKind,
        input: &str,
        context: &ConversationContext,
    ) -> ResolutionOutcome<ResolvedEntity> {
        let snapshot = self.store.current();
        let pending = context.pending_choice(event_prefix, kind.into());
        resolve_in(&snapshot, kind, input, pending)
    }

    /// Resolve every field in `request`, stopping at the first one that
    /// needs the user's input.
    pub fn resolve_all(
        &self,
        request: &ResolutionRequest<'_>,
        context: &ConversationContext,
    ) -> Result<ResolvedFields, Reprompt> {
        let snapshot = self.store.current();
        let mut resolved = ResolvedFields::new(Arc::clone(&snapshot));

        for &field in request.fields {
            match field.entity_kind() {
                Some(kind) => {
                    let entity = self.resolve_entity(&snapshot, request, field, kind, context, &resolved)?;
                    resolved.set(entity);
                }
                None => {
                    let duration = self.resolve_duration(request, context, &resolved)?;
                    resolved.time_duration = Some(duration);
                }
            }
            debug!(field = %field, state = ?FieldState::Resolved, "Field resolved");
        }

        Ok(resolved)
    }

    fn resolve_entity(
        &self,
        snapshot: &Snapshot,
        request: &ResolutionRequest<'_>,
        field: FieldKind,
        kind: EntityKind,
        context: &ConversationContext,
        resolved: &ResolvedFields,
    ) -> Result<ResolvedEntity, Reprompt> {
        let pending = context.pending_choice(request.event_prefix, field);

        // An invalid field only counts as answered when this turn supplied it
        let input = if context.is_invalid(field) && !context.supplied_now(field) {
            None
        } else {
            context.text(field)
        };

        let Some(input) = input else {
            debug!(field = %field, state = ?FieldState::Missing, "No value for field");
            return Err(match pending {
                Some(candidates) => self.ambiguous_prompt(field, kind, candidates),
                None => self.missing_prompt(snapshot, field, kind),
            });
        };

        debug!(field = %field, input, state = ?FieldState::Resolving, restricted = pending.is_some(), "Resolving field");
        match resolve_in(snapshot, kind, input, pending) {
            ResolutionOutcome::Resolved(entity) => {
                info!(field = %field, input, resolved = entity.name(), "Resolved entity");
                Ok(entity)
            }
            ResolutionOutcome::Ambiguous(kind, names) => {
                info!(field = %field, input, candidates = names.len(), "Ambiguous entity name");
                let carried = carried_values(request, field, context, resolved);
                let followup =
                    FollowupEvent::reprompt(request.event_prefix, field, &names, &carried);
                Err(self.ambiguous_prompt(field, kind, &names).with_followup(followup))
            }
            ResolutionOutcome::NotFound(kind) => {
                info!(field = %field, input, "No entity matched");
                Err(self.not_found_prompt(snapshot, field, kind, pending))
            }
        }
    }

    fn resolve_duration(
        &self,
        request: &ResolutionRequest<'_>,
        context: &ConversationContext,
        resolved: &ResolvedFields,
    ) -> Result<TimeDuration, Reprompt> {
        let field = FieldKind::TimeDuration;
        let after_invalid = context.is_invalid(field);
        let raw = if after_invalid && !context.supplied_now(field) {
            None
        } else {
            context.duration()
        };

        let Some(raw) = raw else {
            return Err(Reprompt::new(
                field,
                FieldState::AwaitingValue,
                Message::plain(duration_prompt(after_invalid, request.subject)),
            ));
        };

        raw.validate().map_err(|e| {
            info!(error = %e, "Rejected time duration");
            let carried = carried_values(request, field, context, resolved);
            Reprompt::new(
                field,
                FieldState::NotFoundPendingRetry,
                Message::plain(out_of_range_message(request.subject)),
            )
            .with_followup(FollowupEvent::reprompt(
                request.event_prefix,
                field,
                &[],
                &carried,
            ))
        })
    }

    /// Menu of every candidate, asked when no value is known
    fn missing_prompt(&self, snapshot: &Snapshot, field: FieldKind, kind: EntityKind) -> Reprompt {
        let names = all_names(snapshot, kind);
        let menu = menu_noun(kind);
        let text = format!("Which {}? You can choose from the following {menu}:\n", kind.noun());
        let speech = format!("Which {}? You can choose from the following {menu}: ", kind.noun());
        let fallback = format!("Which {}?", kind.noun());
        let template = ListTemplate::new(&text, &speech, &fallback, kind.plural())
            .style(ListStyle::Bulleted);

        Reprompt::new(
            field,
            FieldState::AwaitingValue,
            list_or_fallback(&template, &names, self.display_limit),
        )
        .with_reset(field)
    }

    /// Menu restricted to tied candidates
    fn ambiguous_prompt(&self, field: FieldKind, kind: EntityKind, candidates: &[String]) -> Reprompt {
        let text = format!("Sorry, but there are multiple similarly named {}:\n", kind.plural());
        let speech = format!("Sorry, but there are multiple similarly named {}: ", kind.plural());
        let end_text = format!("\n Which {}?", kind.noun());
        let end_speech = format!(" Which {}?", kind.noun());
        let fallback = format!(
            "Sorry, but there are multiple similarly named {}. Which {}?",
            kind.plural(),
            kind.noun()
        );
        let template = ListTemplate::new(&text, &speech, &fallback, kind.plural())
            .ending(&end_text, &end_speech)
            .style(ListStyle::Bulleted);

        Reprompt::new(
            field,
            FieldState::AmbiguousPendingChoice,
            list_or_fallback(&template, candidates, self.display_limit),
        )
    }

    /// Ask again after a value matched nothing
    fn not_found_prompt(
        &self,
        snapshot: &Snapshot,
        field: FieldKind,
        kind: EntityKind,
        pending: Option<&[String]>,
    ) -> Reprompt {
        let names = match pending {
            Some(candidates) => candidates.to_vec(),
            None => all_names(snapshot, kind),
        };
        let text = format!(
            "Unable to find the specified {}! Please choose again from the following {}:\n",
            kind.noun(),
            kind.plural()
        );
        let speech = format!(
            "Unable to find the specified {}! Please choose again from the following {}: ",
            kind.noun(),
            kind.plural()
        );
        let fallback = format!("Unable to find the specified {}!", kind.noun());
        let template = ListTemplate::new(&text, &speech, &fallback, kind.plural())
            .style(ListStyle::Bulleted);

        Reprompt::new(
            field,
            FieldState::NotFoundPendingRetry,
            list_or_fallback(&template, &names, self.display_limit),
        )
        .with_reset(field)
    }
}

fn menu_noun(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::Organization => "orgs",
        EntityKind::Network => "networks",
    }
}

/// An entity as offered to the user
struct Labelled<'a, T> {
    entity: &'a T,
    label: String,
}

impl<T> fuzzy::Named for Labelled<'_, T> {
    fn name(&self) -> &str {
        &self.label
    }
}

/// Make `(id, name, qualifier)` entries unique for display and matching.
///
/// Names equal after normalization get ` (qualifier)`; a label that still
/// collides also gets ` [id]`.
fn unique_labels(entries: &[(&str, &str, &str)]) -> Vec<String> {
    let mut by_name: HashMap<String, usize> = HashMap::new();
    for (_, name, _) in entries {
        *by_name.entry(fuzzy::normalize(name)).or_default() += 1;
    }

    let qualified: Vec<String> = entries
        .iter()
        .map(|(_, name, qualifier)| {
            if by_name.get(&fuzzy::normalize(name)).copied().unwrap_or(0) > 1 {
                format!("{name} ({qualifier})")
            } else {
                name.to_string()
            }
        })
        .collect();

    let mut by_label: HashMap<String, usize> = HashMap::new();
    for label in &qualified {
        *by_label.entry(fuzzy::normalize(label)).or_default() += 1;
    }

    qualified
        .iter()
        .zip(entries)
        .map(|(label, (id, _, _))| {
            if by_label.get(&fuzzy::normalize(label)).copied().unwrap_or(0) > 1 {
                format!("{label} [{id}]")
            } else {
                label.clone()
            }
        })
        .collect()
}

fn labelled_organizations(snapshot: &Snapshot) -> Vec<Labelled<'_, Organization>> {
    let orgs = snapshot.organizations();
    let entries: Vec<(&str, &str, &str)> = orgs
        .iter()
        .map(|o| (o.id.as_str(), o.name.as_str(), o.id.as_str()))
        .collect();
    orgs.iter()
        .zip(unique_labels(&entries))
        .map(|(entity, label)| Labelled { entity, label })
        .collect()
}

fn labelled_networks(snapshot: &Snapshot) -> Vec<Labelled<'_, Network>> {
    let networks = snapshot.networks();
    let entries: Vec<(&str, &str, &str)> = networks
        .iter()
        .map(|n| {
            let owner = snapshot
                .organization(&n.organization_id)
                .map_or(n.organization_id.as_str(), |o| o.name.as_str());
            (n.id.as_str(), n.name.as_str(), owner)
        })
        .collect();
    let labels = unique_labels(&entries);
    networks
        .into_iter()
        .zip(labels)
        .map(|(entity, label)| Labelled { entity, label })
        .collect()
}

fn organization_label(snapshot: &Snapshot, org: &Organization) -> String {
    labelled_organizations(snapshot)
        .into_iter()
        .find(|c| c.entity.id == org.id)
        .map_or_else(|| org.name.clone(), |c| c.label)
}

fn network_label(snapshot: &Snapshot, net: &Network) -> String {
    labelled_networks(snapshot)
        .into_iter()
        .find(|c| c.entity.id == net.id)
        .map_or_else(|| net.name.clone(), |c| c.label)
}

fn all_names(snapshot: &Snapshot, kind: EntityKind) -> Vec<String> {
    match kind {
        EntityKind::Organization => labelled_organizations(snapshot)
            .into_iter()
            .map(|c| c.label)
            .collect(),
        EntityKind::Network => labelled_networks(snapshot)
            .into_iter()
            .map(|c| c.label)
            .collect(),
    }
}

fn resolve_in(
    snapshot: &Snapshot,
    kind: EntityKind,
    input: &str,
    pending: Option<&[String]>,
) -> ResolutionOutcome<ResolvedEntity> {
    let offered = |label: &str| pending.map_or(true, |labels| labels.iter().any(|l| l == label));
    match kind {
        EntityKind::Organization => fuzzy::resolve(
            input,
            labelled_organizations(snapshot)
                .into_iter()
                .filter(|c| offered(&c.label)),
            kind,
        )
        .map(|c| ResolvedEntity::Organization(c.entity.clone())),
        EntityKind::Network => fuzzy::resolve(
            input,
            labelled_networks(snapshot)
                .into_iter()
                .filter(|c| offered(&c.label)),
            kind,
        )
        .map(|c| ResolvedEntity::Network(c.entity.clone())),
    }
}

/// Values of the other requested fields, resolved or as supplied
fn carried_values(
    request: &ResolutionRequest<'_>,
    failing: FieldKind,
    context: &ConversationContext,
    resolved: &ResolvedFields,
) -> Vec<(FieldKind, Value)> {
    request
        .fields
        .iter()
        .filter(|&&f| f != failing)
        .filter_map(|&f| {
            resolved
                .value(f)
                .or_else(|| context.value(f).cloned())
                .map(|v| (f, v))
        })
        .collect()
}
