//! Inbound frames.

use serde_json::Value;

use crate::{Error, Result, token::TokenContext};

/// One decoded inbound message: either a pushed event or the reply to a
/// command.
#[derive(Debug, Clone)]
pub enum Frame {
    Event(Event),
    Response(Response),
}

impl Frame {
    /// Decode a text frame.
    pub fn parse(text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text)?;
        Self::from_value(value)
    }

    /// Classify an already-parsed JSON value.
    ///
    /// `post_type` is checked first: heartbeats carry a `status` object and
    /// must still count as events. A string `status` marks a response.
    pub fn from_value(value: Value) -> Result<Self> {
        let Some(map) = value.as_object() else {
            return Err(Error::unrecognized("frame is not a JSON object"));
        };
        if map.get("post_type").is_some_and(Value::is_string) {
            return Ok(Self::Event(Event { body: value }));
        }
        if map.get("status").is_some_and(Value::is_string) {
            return Ok(Self::Response(Response::from_value(value)));
        }
        Err(Error::unrecognized("neither post_type nor status present"))
    }

    pub fn as_event(&self) -> Option<&Event> {
        match self {
            Self::Event(event) => Some(event),
            Self::Response(_) => None,
        }
    }

    pub fn as_response(&self) -> Option<&Response> {
        match self {
            Self::Response(response) => Some(response),
            Self::Event(_) => None,
        }
    }

    /// Short label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Event(_) => "event",
            Self::Response(_) => "response",
        }
    }
}

/// A gateway push: message, notice, request or meta event.
#[derive(Debug, Clone)]
pub struct Event {
    body: Value,
}

impl Event {
    /// Raw JSON of the event.
    pub fn body(&self) -> &Value {
        &self.body
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.body.get(key)
    }

    fn str_field(&self, key: &str) -> Option<&str> {
        self.body.get(key).and_then(Value::as_str)
    }

    pub fn post_type(&self) -> &str {
        self.str_field("post_type").unwrap_or_default()
    }

    pub fn message_type(&self) -> Option<&str> {
        self.str_field("message_type")
    }

    pub fn notice_type(&self) -> Option<&str> {
        self.str_field("notice_type")
    }

    pub fn meta_event_type(&self) -> Option<&str> {
        self.str_field("meta_event_type")
    }

    pub fn sub_type(&self) -> Option<&str> {
        self.str_field("sub_type")
    }

    pub fn raw_message(&self) -> Option<&str> {
        self.str_field("raw_message")
    }

    pub fn user_id(&self) -> Option<String> {
        id_field(&self.body, "user_id")
    }

    pub fn group_id(&self) -> Option<String> {
        id_field(&self.body, "group_id")
    }

    pub fn message_id(&self) -> Option<String> {
        id_field(&self.body, "message_id")
    }

    pub fn self_id(&self) -> Option<String> {
        id_field(&self.body, "self_id")
    }

    /// Sender role in a group (`owner`, `admin`, `member`).
    pub fn sender_role(&self) -> Option<&str> {
        self.body
            .get("sender")
            .and_then(|s| s.get("role"))
            .and_then(Value::as_str)
    }

    pub fn is_message(&self) -> bool {
        self.post_type() == "message"
    }

    pub fn is_group_message(&self) -> bool {
        self.is_message() && self.message_type() == Some("group")
    }

    pub fn is_private_message(&self) -> bool {
        self.is_message() && self.message_type() == Some("private")
    }

    pub fn is_meta(&self, meta_event_type: &str) -> bool {
        self.post_type() == "meta_event" && self.meta_event_type() == Some(meta_event_type)
    }
}

/// Status marker on a command reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseStatus {
    Ok,
    Failed,
    Timeout,
    Other(String),
}

impl ResponseStatus {
    fn parse(raw: &str) -> Self {
        match raw {
            "ok" => Self::Ok,
            "failed" => Self::Failed,
            "timeout" => Self::Timeout,
            other => Self::Other(other.to_string()),
        }
    }
}

/// Reply to a command, carrying back the command's echo token.
#[derive(Debug, Clone)]
pub struct Response {
    pub status: ResponseStatus,
    pub retcode: Option<i64>,
    pub data: Value,
    pub echo: Option<String>,
    pub message: Option<String>,
}

impl Response {
    fn from_value(value: Value) -> Self {
        let status = value
            .get("status")
            .and_then(Value::as_str)
            .map(ResponseStatus::parse)
            .unwrap_or(ResponseStatus::Other(String::new()));
        let echo = match value.get("echo") {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(s.clone()),
            Some(other) => Some(other.to_string()),
        };
        let message = ["message", "wording"]
            .iter()
            .filter_map(|key| value.get(*key).and_then(Value::as_str))
            .find(|s| !s.is_empty())
            .map(str::to_string);
        Self {
            status,
            retcode: value.get("retcode").and_then(Value::as_i64),
            data: value.get("data").cloned().unwrap_or(Value::Null),
            echo,
            message,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == ResponseStatus::Ok
    }

    /// Decode the echo as a correlation token. Absent or foreign echoes yield
    /// an empty context.
    pub fn token(&self) -> TokenContext {
        self.echo
            .as_deref()
            .map(TokenContext::decode)
            .unwrap_or_default()
    }

    /// Read an id out of `data` (e.g. `message_id` of a sent message).
    pub fn data_id(&self, key: &str) -> Option<String> {
        id_field(&self.data, key)
    }
}

/// Ids arrive as numbers or strings depending on the gateway implementation.
fn id_field(value: &Value, key: &str) -> Option<String> {
    match value.get(key)? {
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        _ => None,
    }
}
