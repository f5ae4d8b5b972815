//! Events emitted by a relay run

use serde::Serialize;
use serde_json::Value;

use crate::runtime::{AgentMessage, MessageKind};

/// Closed set of relay event tags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RelayEventKind {
    Init,
    AssistantText,
    ToolInvocation,
    Progress,
    Result,
    /// Upstream message with no dedicated tag, forwarded as-is
    Other,
    Error,
    Done,
}

impl RelayEventKind {
    pub fn is_terminal(self) -> bool {
        matches!(self, RelayEventKind::Error | RelayEventKind::Done)
    }
}

impl From<MessageKind> for RelayEventKind {
    fn from(kind: MessageKind) -> Self {
        match kind {
            MessageKind::Init => RelayEventKind::Init,
            MessageKind::AssistantText => RelayEventKind::AssistantText,
            MessageKind::ToolInvocation => RelayEventKind::ToolInvocation,
            MessageKind::Progress => RelayEventKind::Progress,
            MessageKind::Result => RelayEventKind::Result,
            MessageKind::Other => RelayEventKind::Other,
        }
    }
}

/// One event of a relay run, tagged with the owning session.
///
/// Serializes to `{"type", "data", "sessionId"}`, where `type` is the
/// upstream message type (`system`, `assistant`, ...) or `error` / `done`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayEvent {
    #[serde(skip)]
    pub kind: RelayEventKind,

    #[serde(rename = "type")]
    pub event_type: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,

    pub session_id: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// The runtime's own session id, set on the first event that reveals it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub runtime_session_id: Option<String>,
}

impl RelayEvent {
    /// Wrap an upstream message
    pub fn forwarded(session_id: &str, message: AgentMessage) -> Self {
        Self {
            kind: message.kind().into(),
            event_type: message.message_type().to_string(),
            data: Some(message.into_value()),
            session_id: session_id.to_string(),
            error: None,
            runtime_session_id: None,
        }
    }

    pub fn error(session_id: &str, message: impl Into<String>) -> Self {
        Self {
            kind: RelayEventKind::Error,
            event_type: "error".to_string(),
            data: None,
            session_id: session_id.to_string(),
            error: Some(message.into()),
            runtime_session_id: None,
        }
    }

    pub fn done(session_id: &str) -> Self {
        Self {
            kind: RelayEventKind::Done,
            event_type: "done".to_string(),
            data: None,
            session_id: session_id.to_string(),
            error: None,
            runtime_session_id: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.kind.is_terminal()
    }

    /// Upstream payload as a message, for forwarded events
    pub fn message(&self) -> Option<AgentMessage> {
        self.data.clone().map(AgentMessage::new)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
