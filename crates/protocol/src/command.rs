//! Outbound commands and the builders the core relies on.

use {
    serde::{Deserialize, Serialize},
    serde_json::{Value, json},
};

use crate::token::TokenContext;

/// A client → gateway action call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    pub action: String,
    #[serde(default)]
    pub params: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub echo: Option<String>,
}

impl Command {
    pub fn new(action: impl Into<String>, params: Value) -> Self {
        Self {
            action: action.into(),
            params,
            echo: None,
        }
    }

    /// Attach a correlation token; the gateway returns it verbatim on the
    /// matching response.
    #[must_use]
    pub fn with_token(mut self, token: &TokenContext) -> Self {
        self.echo = Some(token.encode());
        self
    }

    /// Attach an optional token, leaving the echo untouched for `None`.
    #[must_use]
    pub fn with_optional_token(self, token: Option<&TokenContext>) -> Self {
        match token {
            Some(token) => self.with_token(token),
            None => self,
        }
    }

    /// Attach a literal echo string.
    #[must_use]
    pub fn with_echo(mut self, echo: impl Into<String>) -> Self {
        self.echo = Some(echo.into());
        self
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Message segment in the array message format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum Segment {
    Text { text: String },
    Reply { id: String },
    At { qq: String },
}

impl Segment {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn reply(message_id: impl Into<String>) -> Self {
        Self::Reply {
            id: message_id.into(),
        }
    }

    pub fn at(user_id: impl Into<String>) -> Self {
        Self::At { qq: user_id.into() }
    }
}

/// Numeric ids go out as numbers; anything else as a string.
fn id_value(id: &str) -> Value {
    id.parse::<i64>()
        .map(Value::from)
        .unwrap_or_else(|_| Value::from(id))
}

pub fn send_private_msg(user_id: &str, message: Vec<Segment>) -> Command {
    Command::new(
        "send_private_msg",
        json!({ "user_id": id_value(user_id), "message": message }),
    )
}

pub fn send_group_msg(group_id: &str, message: Vec<Segment>) -> Command {
    Command::new(
        "send_group_msg",
        json!({ "group_id": id_value(group_id), "message": message }),
    )
}

/// Retract (recall) a message.
pub fn delete_msg(message_id: &str) -> Command {
    Command::new("delete_msg", json!({ "message_id": id_value(message_id) }))
}

pub fn get_group_list(no_cache: bool) -> Command {
    Command::new("get_group_list", json!({ "no_cache": no_cache })).with_echo("get_group_list")
}

/// Member list request. The echo names the action and the group so the
/// response can be filed without keeping request state.
pub fn get_group_member_list(group_id: &str) -> Command {
    let token = TokenContext::new()
        .with("action", "get_group_member_list")
        .with("group_id", group_id);
    Command::new(
        "get_group_member_list",
        json!({ "group_id": id_value(group_id) }),
    )
    .with_token(&token)
}

pub fn get_stranger_info(user_id: &str) -> Command {
    Command::new(
        "get_stranger_info",
        json!({ "user_id": id_value(user_id) }),
    )
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn group_message_wire_shape() {
        let token = TokenContext::new().with("del_msg", 10);
        let cmd = send_group_msg("123", vec![Segment::reply("7"), Segment::text("hi")])
            .with_token(&token);
        let wire: Value = serde_json::from_str(&cmd.to_json().unwrap()).unwrap();
        assert_eq!(
            wire,
            json!({
                "action": "send_group_msg",
                "params": {
                    "group_id": 123,
                    "message": [
                        {"type": "reply", "data": {"id": "7"}},
                        {"type": "text", "data": {"text": "hi"}}
                    ]
                },
                "echo": "del_msg=10"
            })
        );
    }

    #[test]
    fn commands_without_token_omit_echo() {
        let wire = delete_msg("99").to_json().unwrap();
        assert!(!wire.contains("echo"));
        assert!(wire.contains(r#""message_id":99"#));
    }

    #[test]
    fn non_numeric_ids_stay_strings() {
        let cmd = send_private_msg("u-abc", vec![Segment::text("x")]);
        assert_eq!(cmd.params["user_id"], json!("u-abc"));
    }

    #[test]
    fn member_list_echo_names_the_group() {
        let cmd = get_group_member_list("777");
        assert_eq!(cmd.params, json!({ "group_id": 777 }));
        let echo = cmd.echo.unwrap();
        assert!(echo.contains("get_group_member_list"));
        let token = TokenContext::decode(&echo);
        assert_eq!(token.get("group_id"), Some("777"));
    }

    #[test]
    fn optional_token_none_keeps_builder_echo() {
        let cmd = get_group_list(true).with_optional_token(None);
        assert_eq!(cmd.echo.as_deref(), Some("get_group_list"));
    }
}
