//! Wire format of the conversational platform
//!
//! Requests follow the platform's v2 fulfillment shape; only the fields
//! this service reads are modeled. Responses carry one reply rendered for
//! the requesting chat platform plus every platform's variant in `payload`.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::actions::ActionReply;
use crate::context::RawContext;
use crate::resolution::format::{BOLD, BULLET};
use crate::resolution::{FieldKind, FollowupEvent};

/// Lifespan of contexts carrying a confirmed org or network
pub const CONFIRMED_LIFESPAN: u32 = 5;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookRequest {
    #[serde(default)]
    pub session: String,
    pub query_result: QueryResult,
    #[serde(default)]
    pub original_detect_intent_request: Option<OriginalRequest>,
}

impl WebhookRequest {
    /// Chat platform the request came from; `None` for the platform console
    pub fn source(&self) -> Option<&str> {
        self.original_detect_intent_request
            .as_ref()
            .and_then(|r| r.source.as_deref())
            .filter(|s| !s.is_empty())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResult {
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub parameters: Map<String, Value>,
    #[serde(default)]
    pub output_contexts: Vec<RawContext>,
    #[serde(default)]
    pub all_required_params_present: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OriginalRequest {
    #[serde(default)]
    pub source: Option<String>,
}

/// Chat platforms with their own text dialect
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Google,
    Facebook,
    Slack,
    Spark,
}

impl Platform {
    pub fn from_source(source: &str) -> Option<Self> {
        match source {
            "ACTIONS_ON_GOOGLE" | "google" => Some(Platform::Google),
            "FACEBOOK" | "facebook" => Some(Platform::Facebook),
            "SLACK" | "slack" => Some(Platform::Slack),
            "spark" => Some(Platform::Spark),
            _ => None,
        }
    }

    fn bold(&self) -> &'static str {
        match self {
            Platform::Google | Platform::Spark => "**",
            Platform::Facebook | Platform::Slack => "*",
        }
    }

    fn bullet(&self) -> &'static str {
        match self {
            Platform::Google => "*",
            _ => "•",
        }
    }

    fn line_ending(&self) -> &'static str {
        match self {
            Platform::Google | Platform::Spark => "  \n",
            Platform::Facebook | Platform::Slack => "\n",
        }
    }

    /// Expand `<bold>`, `<o>` and newlines into this platform's markdown
    pub fn render(&self, text: &str) -> String {
        text.replace(BOLD, self.bold())
            .replace(BULLET, self.bullet())
            .replace('\n', self.line_ending())
    }
}

/// Text for a platform, or marker-free text for the console
pub fn render_text(text: &str, platform: Option<Platform>) -> String {
    match platform {
        Some(platform) => platform.render(text),
        None => text.replace(BOLD, "").replace(BULLET, "•"),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputContext {
    pub name: String,
    pub lifespan_count: u32,
    pub parameters: Map<String, Value>,
}

impl OutputContext {
    /// Context for a confirmed (or cleared) org/network
    fn entity(session: &str, field: FieldKind, value: &str, lifespan: u32) -> Option<Self> {
        let id = match field {
            FieldKind::Organization => "organization",
            FieldKind::Network => "network",
            FieldKind::TimeDuration => return None,
        };
        let mut parameters = Map::new();
        parameters.insert(field.param().to_string(), Value::String(value.to_string()));
        Some(Self {
            name: format!("{session}/contexts/{id}"),
            lifespan_count: lifespan,
            parameters,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FollowupEventInput {
    pub name: String,
    pub language_code: String,
    pub parameters: Map<String, Value>,
}

impl From<FollowupEvent> for FollowupEventInput {
    fn from(event: FollowupEvent) -> Self {
        Self {
            name: event.name,
            language_code: "en-US".to_string(),
            parameters: event.parameters.into_iter().collect(),
        }
    }
}

/// Fulfillment response; the empty response serializes to `{}`
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fulfillment_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub output_contexts: Vec<OutputContext>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub followup_event_input: Option<FollowupEventInput>,
}

impl WebhookResponse {
    /// Render `reply` for `platform`.
    ///
    /// `reprompt_context` is the full name of the live reprompt context, if
    /// any; it is expired when the reply settles the conversation.
    pub fn from_reply(
        session: &str,
        platform: Option<Platform>,
        reply: ActionReply,
        reprompt_context: Option<&str>,
    ) -> Self {
        let text = reply.message.text.trim();
        let speech = reply.message.speech.trim();

        let payload = json!({
            "speech": speech,
            "google": { "text": Platform::Google.render(text) },
            "facebook": { "text": Platform::Facebook.render(text) },
            "slack": { "text": Platform::Slack.render(text) },
            "spark": { "markdown": Platform::Spark.render(text) },
        });

        let mut output_contexts: Vec<OutputContext> = if reply.reset_fields.is_empty() {
            reply
                .confirmed
                .iter()
                .filter_map(|(field, name)| {
                    OutputContext::entity(session, *field, name, CONFIRMED_LIFESPAN)
                })
                .collect()
        } else {
            reply
                .reset_fields
                .iter()
                .filter_map(|field| OutputContext::entity(session, *field, "", 0))
                .collect()
        };

        if reply.clears_reprompt {
            if let Some(name) = reprompt_context {
                output_contexts.push(OutputContext {
                    name: name.to_string(),
                    lifespan_count: 0,
                    parameters: Map::new(),
                });
            }
        }

        Self {
            fulfillment_text: Some(render_text(text, platform)),
            payload: Some(payload),
            output_contexts,
            followup_event_input: reply.followup.map(FollowupEventInput::from),
        }
    }
}
