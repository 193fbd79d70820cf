//! Inbound command parsing and normalization.
//!
//! Commands arrive as JSON objects on the command topic. Parsing is
//! deliberately forgiving on the way in (case-insensitive tokens) and
//! deliberately strict on what it accepts: payloads that are not objects, or
//! that lack a recognized `command` field, yield `None` and are dropped by
//! the intake without further ceremony.

use serde_json::Value;

/// Recognized lifecycle commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    Connect,
    Disconnect,
    Start,
    Stop,
    Condition,
}

impl CommandKind {
    /// Parse a normalized (lowercase) command token.
    fn from_token(token: &str) -> Option<Self> {
        match token {
            "connect" => Some(CommandKind::Connect),
            "disconnect" => Some(CommandKind::Disconnect),
            "start" => Some(CommandKind::Start),
            "stop" => Some(CommandKind::Stop),
            "condition" => Some(CommandKind::Condition),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CommandKind::Connect => "connect",
            CommandKind::Disconnect => "disconnect",
            CommandKind::Start => "start",
            CommandKind::Stop => "stop",
            CommandKind::Condition => "condition",
        }
    }
}

impl std::fmt::Display for CommandKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A parsed command with its accompanying fields, forwarded untouched.
///
/// `acquisition_id` travels as `id` on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub kind: CommandKind,
    pub label: Option<String>,
    pub subject_id: Option<i64>,
    pub session_id: Option<i64>,
    pub acquisition_id: Option<i64>,
}

impl Command {
    /// Parse a bus payload into a command.
    ///
    /// Returns `None` for anything that should be dropped: non-object
    /// payloads, missing or non-string `command` fields, and unrecognized
    /// command tokens.
    pub fn parse(payload: &Value) -> Option<Command> {
        let object = payload.as_object()?;
        let token = object.get("command")?.as_str()?.to_lowercase();
        let kind = CommandKind::from_token(&token)?;

        Some(Command {
            kind,
            label: object
                .get("label")
                .and_then(Value::as_str)
                .map(str::to_string),
            subject_id: object.get("subject_id").and_then(Value::as_i64),
            session_id: object.get("session_id").and_then(Value::as_i64),
            acquisition_id: object.get("id").and_then(Value::as_i64),
        })
    }
}
