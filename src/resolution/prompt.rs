//! Reprompts and follow-up events
//!
//! A [`Reprompt`] is the recoverable outcome of resolution: the user is
//! asked again instead of being told the request failed.

use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

use super::format::Message;
use super::{FieldKind, FieldState};

/// Event that re-enters slot filling on the platform with preset parameters
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FollowupEvent {
    pub name: String,
    pub parameters: BTreeMap<String, Value>,
}

impl FollowupEvent {
    /// `{action}-repromptparams` event clearing `field` and flagging it invalid.
    ///
    /// `candidates` are passed back so the next turn can restrict its choice
    /// to them; `carried` preserves values already resolved in this request.
    pub fn reprompt(
        event_prefix: &str,
        field: FieldKind,
        candidates: &[String],
        carried: &[(FieldKind, Value)],
    ) -> Self {
        let mut parameters = BTreeMap::new();
        parameters.insert(field.param().to_string(), Value::String(String::new()));
        parameters.insert(field.invalid_param(), Value::String("true".into()));
        if !candidates.is_empty() {
            parameters.insert(
                "possible-candidates".to_string(),
                Value::String(candidates.join("|")),
            );
        }
        for (kind, value) in carried {
            if *kind != field {
                parameters.insert(kind.param().to_string(), value.clone());
            }
        }

        Self {
            name: format!("{event_prefix}-repromptparams"),
            parameters,
        }
    }
}

/// Ask the user for (another) value of one field
#[derive(Debug, Clone, PartialEq)]
pub struct Reprompt {
    pub field: FieldKind,
    /// State the field is left in
    pub state: FieldState,
    pub message: Message,
    /// Context fields to clear on the platform
    pub reset_fields: Vec<FieldKind>,
    pub followup: Option<FollowupEvent>,
}

impl Reprompt {
    pub fn new(field: FieldKind, state: FieldState, message: Message) -> Self {
        Self {
            field,
            state,
            message,
            reset_fields: Vec::new(),
            followup: None,
        }
    }

    pub fn with_reset(mut self, field: FieldKind) -> Self {
        if !self.reset_fields.contains(&field) {
            self.reset_fields.push(field);
        }
        self
    }

    pub fn with_followup(mut self, followup: FollowupEvent) -> Self {
        self.followup = Some(followup);
        self
    }
}
