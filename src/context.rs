//! Context reconciler
//!
//! Turns the platform's raw per-turn state (this turn's parameters plus the
//! output contexts still alive from earlier turns) into a typed
//! [`ConversationContext`]. Only three context shapes are recognized, by
//! name suffix:
//!
//! - `…/organization` carrying `org`: a previously confirmed organization
//! - `…/network` carrying `network`: a previously confirmed network
//! - `…/{action}-repromptparams` carrying `invalid-*` flags and a
//!   `|`-delimited `possible-candidates` list
//!
//! Everything else is dropped.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use tracing::debug;

use crate::config::parse_bool;
use crate::duration::RawDuration;
use crate::resolution::FieldKind;

const REPROMPT_SUFFIX: &str = "-repromptparams";

/// One output context as the platform reports it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawContext {
    pub name: String,
    #[serde(rename = "lifespanCount", default)]
    pub lifespan: Option<u32>,
    #[serde(default)]
    pub parameters: Map<String, Value>,
}

impl RawContext {
    /// Last path segment of the context name
    pub fn short_name(&self) -> &str {
        self.name.rsplit('/').next().unwrap_or(&self.name)
    }
}

/// Candidates offered in an earlier turn for one field of one action
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingChoice {
    /// Action event prefix the reprompt was issued for, e.g. `listnetworks`
    pub event_prefix: String,
    pub field: FieldKind,
    pub candidates: Vec<String>,
}

/// Resolution-relevant view of one conversation turn
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConversationContext {
    /// Values supplied in this turn
    current: HashMap<FieldKind, Value>,
    /// Values confirmed in earlier turns
    confirmed: HashMap<FieldKind, Value>,
    invalid: HashSet<FieldKind>,
    pending: Option<PendingChoice>,
    /// Full name of the reprompt context, so it can be cleared on success
    reprompt_context: Option<String>,
}

impl ConversationContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a value supplied in this turn
    pub fn with_current(mut self, field: FieldKind, value: Value) -> Self {
        if !is_blank(&value) {
            self.current.insert(field, value);
        }
        self
    }

    /// Set a value confirmed in an earlier turn
    pub fn with_confirmed(mut self, field: FieldKind, value: Value) -> Self {
        if !is_blank(&value) {
            self.confirmed.insert(field, value);
        }
        self
    }

    pub fn with_invalid(mut self, field: FieldKind) -> Self {
        self.invalid.insert(field);
        self
    }

    pub fn with_pending(mut self, pending: PendingChoice) -> Self {
        self.invalid.insert(pending.field);
        self.pending = Some(pending);
        self
    }

    /// This turn's value, falling back to the confirmed one
    pub fn value(&self, field: FieldKind) -> Option<&Value> {
        self.current.get(&field).or_else(|| self.confirmed.get(&field))
    }

    /// Field value as text, if it is a non-empty string
    pub fn text(&self, field: FieldKind) -> Option<&str> {
        self.value(field)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    pub fn duration(&self) -> Option<RawDuration> {
        self.value(FieldKind::TimeDuration)
            .and_then(RawDuration::from_value)
    }

    /// Whether this turn itself supplied a value for `field`
    pub fn supplied_now(&self, field: FieldKind) -> bool {
        self.current.contains_key(&field)
    }

    pub fn is_invalid(&self, field: FieldKind) -> bool {
        self.invalid.contains(&field)
    }

    /// Candidates offered for `field` by a reprompt of the same action
    pub fn pending_choice(&self, event_prefix: &str, field: FieldKind) -> Option<&[String]> {
        self.pending
            .as_ref()
            .filter(|p| p.field == field && p.event_prefix == event_prefix)
            .map(|p| p.candidates.as_slice())
    }

    pub fn pending(&self) -> Option<&PendingChoice> {
        self.pending.as_ref()
    }

    pub fn reprompt_context(&self) -> Option<&str> {
        self.reprompt_context.as_deref()
    }
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

fn flag(parameters: &Map<String, Value>, key: &str) -> bool {
    match parameters.get(key) {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => parse_bool(s).unwrap_or(false),
        _ => false,
    }
}

/// Build the typed context for one request
pub fn reconcile(parameters: &Map<String, Value>, contexts: &[RawContext]) -> ConversationContext {
    let mut ctx = ConversationContext::new();

    for field in [
        FieldKind::Organization,
        FieldKind::Network,
        FieldKind::TimeDuration,
    ] {
        if let Some(value) = parameters.get(field.param()) {
            ctx = ctx.with_current(field, value.clone());
        }
    }

    for raw in contexts {
        let name = raw.short_name();
        if name.ends_with("organization") {
            if let Some(org) = raw.parameters.get(FieldKind::Organization.param()) {
                ctx = ctx.with_confirmed(FieldKind::Organization, org.clone());
            }
        } else if name.ends_with("network") {
            if let Some(net) = raw.parameters.get(FieldKind::Network.param()) {
                ctx = ctx.with_confirmed(FieldKind::Network, net.clone());
            }
        } else if let Some(event_prefix) = name.strip_suffix(REPROMPT_SUFFIX) {
            ctx = apply_reprompt(ctx, event_prefix, raw);
        } else {
            debug!(context = %raw.name, "Ignoring unrecognized context");
        }
    }

    ctx
}

fn apply_reprompt(
    mut ctx: ConversationContext,
    event_prefix: &str,
    raw: &RawContext,
) -> ConversationContext {
    ctx.reprompt_context = Some(raw.name.clone());

    let flagged: Vec<FieldKind> = [
        FieldKind::Organization,
        FieldKind::Network,
        FieldKind::TimeDuration,
    ]
    .into_iter()
    .filter(|field| flag(&raw.parameters, &field.invalid_param()))
    .collect();

    for field in &flagged {
        ctx = ctx.with_invalid(*field);
    }

    let candidates: Vec<String> = raw
        .parameters
        .get("possible-candidates")
        .and_then(Value::as_str)
        .map(|s| {
            s.split('|')
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    // Candidates belong to the first flagged entity field
    let entity_field = flagged
        .iter()
        .copied()
        .find(|f| f.entity_kind().is_some());
    if let (Some(field), false) = (entity_field, candidates.is_empty()) {
        ctx = ctx.with_pending(PendingChoice {
            event_prefix: event_prefix.to_string(),
            field,
            candidates,
        });
    }

    ctx
}
