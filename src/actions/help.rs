//! Help actions

use async_trait::async_trait;

use super::{ActionHandler, ActionId, ActionInput, ActionReply, ActionServices};
use crate::error::BotError;
use crate::resolution::format::{bold, Message, BULLET};

/// Command name as the platform's `command` entity reports it, with its blurb
const COMMANDS: &[(&str, &str, &str)] = &[
    (
        "list organizations",
        "List organizations",
        "Shows the organizations that you are a part of",
    ),
    (
        "list networks",
        "List networks",
        "Show the networks in an organization",
    ),
    (
        "list admins",
        "List admins",
        "Lists the admins that are registered in an organization",
    ),
    (
        "list devices",
        "List devices",
        "Shows the currently connected devices in a network",
    ),
    (
        "data usage",
        "Data usage",
        "Presents some statistics of total data usage over a specified timeframe",
    ),
    (
        "top app/website usage",
        "Top app/website usage",
        "Lists the top 10 app/websites used in a specified timeframe",
    ),
];

/// Longer explanation for one command; `limit` is the list display limit
pub fn explain(command: &str, limit: usize) -> Option<String> {
    let explanation = match command.trim().to_lowercase().as_str() {
        "list organizations" => "It shows the organizations that you are a part of.".to_string(),
        "list networks" => "It show the networks in an organization.".to_string(),
        "list admins" => format!(
            "It lists the admins that are registered in an organization. \
             If there are more than {limit} admins, then it will list only the first {limit}."
        ),
        "list devices" => format!(
            "It list the devices currently connected in a network. \
             If there are more than {limit} devices, then it will list only the first {limit}."
        ),
        "data usage" => "It presents some statistics of the total data usage over a given timeframe in a network. \
             Note that 'Traffic Analysis with Hostname Visibility' must be enabled on the specified network. \
             The given timeframe cannot be less than 2 hours or more than 1 month."
            .to_string(),
        "top app/website usage" => "It lists the top 10 app or websites used in a given timeframe. \
             This is specific to networks only. \
             The given timeframe cannot be less than 2 hours or more than 1 month."
            .to_string(),
        _ => return None,
    };
    Some(explanation)
}

pub struct ListMyFunctions;

#[async_trait]
impl ActionHandler for ListMyFunctions {
    fn id(&self) -> ActionId {
        ActionId::ListMyFunctions
    }

    async fn handle(
        &self,
        _services: &ActionServices,
        _input: &ActionInput,
    ) -> Result<ActionReply, BotError> {
        let mut text = String::from(
            "Here's a list of the possible commands. If you would like me to clarify any of these commands, ask me \"What does this command do?\"",
        );
        for (_, title, blurb) in COMMANDS {
            text.push_str(&format!("\n{BULLET} {} - {blurb}", bold(title)));
        }
        let speech = "Here's a list of the possible commands: list organizations, list networks, list admins, \
             list devices, data usage, top app or website usage. \
             If you would like me to clarify any of these commands, just ask me \"What does this command do?\"";
        Ok(ActionReply::new(Message::new(text, speech)))
    }
}

pub struct ExplainFunction;

#[async_trait]
impl ActionHandler for ExplainFunction {
    fn id(&self) -> ActionId {
        ActionId::ExplainFunction
    }

    async fn handle(
        &self,
        services: &ActionServices,
        input: &ActionInput,
    ) -> Result<ActionReply, BotError> {
        let explanation = input
            .parameter("command")
            .and_then(|command| explain(command, services.display_limit()))
            .ok_or_else(|| {
                BotError::new(
                    "Sorry, I don't know that command. Ask me \"What can you do?\" to see the list of commands.",
                )
            })?;
        Ok(ActionReply::new(Message::plain(explanation)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::test_support::services;
    use serde_json::json;

    #[tokio::test]
    async fn test_list_my_functions_covers_every_command() {
        let reply = ListMyFunctions
            .handle(&services(), &ActionInput::default())
            .await
            .unwrap();
        for (command, title, _) in COMMANDS {
            assert!(reply.message.text.contains(&format!("<o> <bold>{title}<bold> - ")));
            assert!(explain(command, 10).is_some(), "{command} has no explanation");
        }
        assert!(!reply.message.speech.contains("<o>"));
    }

    #[tokio::test]
    async fn test_explain_function_uses_display_limit() {
        let mut input = ActionInput::default();
        input.parameters.insert("command".into(), json!("List Devices"));
        let reply = ExplainFunction.handle(&services(), &input).await.unwrap();
        assert!(reply
            .message
            .text
            .ends_with("If there are more than 10 devices, then it will list only the first 10."));
        assert_eq!(reply.message.text, reply.message.speech);
    }

    #[tokio::test]
    async fn test_explain_unknown_command() {
        let mut input = ActionInput::default();
        input.parameters.insert("command".into(), json!("reboot everything"));
        let err = ExplainFunction.handle(&services(), &input).await.unwrap_err();
        assert!(err.message.starts_with("Sorry, I don't know that command."));
        assert!(err.reset_fields.is_empty());
    }
}
