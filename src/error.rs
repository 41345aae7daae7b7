//! Error types
//!
//! `UpstreamError` covers calls into the management API, `RefreshError`
//! covers snapshot rebuilds, and `BotError` is the terminal, user-facing
//! failure a business action hands back to the conversational platform.
//! Recoverable resolution failures (no match, ambiguous match) are not
//! errors at all; see [`crate::resolution::ResolutionOutcome`].

use thiserror::Error;

use crate::resolution::FieldKind;

/// Failure of a single call to the upstream management API
#[derive(Error, Debug, Clone, PartialEq)]
pub enum UpstreamError {
    #[error("Rate limited by upstream (retry after {retry_after:?}s)")]
    RateLimited { retry_after: Option<u64> },

    #[error("Upstream request timed out: {0}")]
    Timeout(String),

    #[error("Upstream connection failed: {0}")]
    Connection(String),

    #[error("Upstream returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Failed to decode upstream response: {0}")]
    Decode(String),
}

impl UpstreamError {
    /// Rate limits, timeouts, dropped connections and server errors are
    /// transient; everything else is permanent.
    pub fn is_transient(&self) -> bool {
        match self {
            UpstreamError::RateLimited { .. }
            | UpstreamError::Timeout(_)
            | UpstreamError::Connection(_) => true,
            UpstreamError::Status { status, .. } => *status >= 500,
            UpstreamError::Decode(_) => false,
        }
    }

    /// Short message suitable for showing to a user
    pub fn user_message(&self) -> String {
        match self {
            UpstreamError::Status { message, .. } if !message.is_empty() => message.clone(),
            UpstreamError::RateLimited { .. } => {
                "The dashboard is busy right now. Please try again in a moment.".to_string()
            }
            _ => "An error occurred while contacting the dashboard. Please try again later."
                .to_string(),
        }
    }
}

/// Failure of a refresh cycle
#[derive(Error, Debug)]
pub enum RefreshError {
    #[error("Upstream failure during refresh: {0}")]
    Upstream(#[from] UpstreamError),

    #[error("Refreshed hierarchy is inconsistent: {0}")]
    InconsistentSnapshot(String),

    #[error("Initial cache population failed, refusing to serve: {0}")]
    StaleInitialCache(Box<RefreshError>),

    #[error("A refresh is already in progress")]
    AlreadyRunning,
}

/// Terminal failure surfaced to the user as a short message.
///
/// Optionally asks the platform to clear context fields so the next turn
/// starts clean, or to re-enter slot filling through a follow-up event.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{message}")]
pub struct BotError {
    pub message: String,
    pub reset_fields: Vec<FieldKind>,
    pub followup: Option<crate::resolution::FollowupEvent>,
}

impl BotError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
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

    pub fn with_followup(mut self, followup: crate::resolution::FollowupEvent) -> Self {
        self.followup = Some(followup);
        self
    }

    /// Generic failure for situations the user cannot fix
    pub fn internal() -> Self {
        Self::new("An error occurred while trying to process your request. Please try again later.")
    }
}

impl From<UpstreamError> for BotError {
    fn from(err: UpstreamError) -> Self {
        BotError::new(err.user_message())
    }
}

/// Configuration loading errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
