//! Entity resolution for slot-filling conversations
//!
//! Business actions declare the fields they need; the
//! [`ResolutionOrchestrator`] turns the reconciled conversation context into
//! either resolved values or a [`Reprompt`] the platform shows to the user.
//!
//! ```text
//!   ConversationContext ──► ResolutionOrchestrator ──► fuzzy::resolve
//!                                 │                        │
//!                                 │            Snapshot (read once per request)
//!                                 ▼
//!                 Ok(ResolvedFields) | Err(Reprompt)
//! ```
//!
//! Each field moves through
//! `Missing → AwaitingValue → Resolving → {Resolved | AmbiguousPendingChoice | NotFoundPendingRetry}`.

pub mod format;
pub mod orchestrator;
pub mod prompt;

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::model::EntityKind;

pub use orchestrator::{
    ResolutionOrchestrator, ResolutionRequest, ResolvedEntity, ResolvedFields,
};
pub use prompt::{FollowupEvent, Reprompt};

/// A slot the conversational platform fills
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FieldKind {
    Organization,
    Network,
    TimeDuration,
}

impl FieldKind {
    /// Parameter name used by the platform
    pub fn param(&self) -> &'static str {
        match self {
            FieldKind::Organization => "org",
            FieldKind::Network => "network",
            FieldKind::TimeDuration => "time-duration",
        }
    }

    /// Parameter flagging the field as invalid in a reprompt
    pub fn invalid_param(&self) -> String {
        format!("invalid-{}", self.param())
    }

    pub fn from_param(name: &str) -> Option<Self> {
        match name {
            "org" => Some(FieldKind::Organization),
            "network" => Some(FieldKind::Network),
            "time-duration" => Some(FieldKind::TimeDuration),
            _ => None,
        }
    }

    /// Entity kind behind the field, if it names a resource
    pub fn entity_kind(&self) -> Option<EntityKind> {
        match self {
            FieldKind::Organization => Some(EntityKind::Organization),
            FieldKind::Network => Some(EntityKind::Network),
            FieldKind::TimeDuration => None,
        }
    }
}

impl From<EntityKind> for FieldKind {
    fn from(kind: EntityKind) -> Self {
        match kind {
            EntityKind::Organization => FieldKind::Organization,
            EntityKind::Network => FieldKind::Network,
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.param())
    }
}

/// Result of matching one free-text value against candidates
#[derive(Debug, Clone, PartialEq)]
pub enum ResolutionOutcome<T> {
    /// Exactly one best match
    Resolved(T),
    /// Nothing matched
    NotFound(EntityKind),
    /// Several candidates tied for best; names sorted alphabetically
    Ambiguous(EntityKind, Vec<String>),
}

impl<T> ResolutionOutcome<T> {
    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> ResolutionOutcome<U> {
        match self {
            ResolutionOutcome::Resolved(value) => ResolutionOutcome::Resolved(f(value)),
            ResolutionOutcome::NotFound(kind) => ResolutionOutcome::NotFound(kind),
            ResolutionOutcome::Ambiguous(kind, names) => ResolutionOutcome::Ambiguous(kind, names),
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, ResolutionOutcome::Resolved(_))
    }

    pub fn resolved(self) -> Option<T> {
        match self {
            ResolutionOutcome::Resolved(value) => Some(value),
            _ => None,
        }
    }
}

/// Per-field slot-filling state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldState {
    /// No value in this turn or in prior context
    Missing,
    /// The user has been asked for a value
    AwaitingValue,
    /// A value is being matched
    Resolving,
    /// Terminal: exactly one value
    Resolved,
    /// Tied candidates were offered; the next input picks among them
    AmbiguousPendingChoice,
    /// The value matched nothing or was out of range; the user must supply another
    NotFoundPendingRetry,
}
