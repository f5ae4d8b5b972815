//! Upstream agent messages
//!
//! The relay treats each message as opaque JSON; only the `type` tag, the
//! runtime's `session_id` and the assistant text blocks are ever inspected.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::{Error, Result};

/// Coarse classification of an upstream message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    /// `system` message with subtype `init`
    Init,
    /// `assistant` message with text only
    AssistantText,
    /// `assistant` message that invokes at least one tool
    ToolInvocation,
    /// `tool_progress` heartbeat for an in-flight tool call
    Progress,
    /// Final `result` summary of a run
    Result,
    /// Anything else (tool results, other system messages, ...)
    Other,
}

/// One message produced by the agent runtime
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentMessage(Value);

impl AgentMessage {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    /// Parse one line of the runtime's newline-delimited JSON output
    pub fn from_json_line(line: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(line)?;
        if !value.get("type").is_some_and(Value::is_string) {
            return Err(Error::Runtime(
                "agent message is missing a string \"type\" field".to_string(),
            ));
        }
        Ok(Self(value))
    }

    /// `system` / `init` message announcing the model and tools
    pub fn system_init(session_id: &str, model: &str, tools: &[&str]) -> Self {
        Self(json!({
            "type": "system",
            "subtype": "init",
            "session_id": session_id,
            "model": model,
            "tools": tools,
        }))
    }

    /// `assistant` message with a single text block
    pub fn assistant_text(session_id: &str, text: &str) -> Self {
        Self(json!({
            "type": "assistant",
            "session_id": session_id,
            "message": {
                "role": "assistant",
                "content": [{ "type": "text", "text": text }],
            },
        }))
    }

    /// `assistant` message with a single tool invocation
    pub fn tool_use(session_id: &str, id: &str, name: &str, input: Value) -> Self {
        Self(json!({
            "type": "assistant",
            "session_id": session_id,
            "message": {
                "role": "assistant",
                "content": [{ "type": "tool_use", "id": id, "name": name, "input": input }],
            },
        }))
    }

    /// `tool_progress` heartbeat
    pub fn tool_progress(session_id: &str, tool_name: &str, elapsed_secs: f64) -> Self {
        Self(json!({
            "type": "tool_progress",
            "session_id": session_id,
            "tool_name": tool_name,
            "elapsed_time_seconds": elapsed_secs,
        }))
    }

    /// Successful `result` summary
    pub fn result(session_id: &str, result: &str, duration_ms: u64, cost_usd: f64) -> Self {
        Self(json!({
            "type": "result",
            "subtype": "success",
            "session_id": session_id,
            "is_error": false,
            "result": result,
            "duration_ms": duration_ms,
            "total_cost_usd": cost_usd,
        }))
    }

    /// The upstream `type` tag
    pub fn message_type(&self) -> &str {
        self.0.get("type").and_then(Value::as_str).unwrap_or("unknown")
    }

    pub fn subtype(&self) -> Option<&str> {
        self.0.get("subtype").and_then(Value::as_str)
    }

    /// The runtime's own session/correlation id, if present
    pub fn session_id(&self) -> Option<&str> {
        self.0
            .get("session_id")
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
    }

    pub fn kind(&self) -> MessageKind {
        match self.message_type() {
            "system" if self.subtype() == Some("init") => MessageKind::Init,
            "assistant" if self.has_tool_use() => MessageKind::ToolInvocation,
            "assistant" => MessageKind::AssistantText,
            "tool_progress" => MessageKind::Progress,
            "result" => MessageKind::Result,
            _ => MessageKind::Other,
        }
    }

    fn content_blocks(&self) -> impl Iterator<Item = &Value> {
        self.0
            .pointer("/message/content")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
    }

    /// Whether an `assistant` message contains a `tool_use` block
    pub fn has_tool_use(&self) -> bool {
        self.content_blocks()
            .any(|block| block.get("type").and_then(Value::as_str) == Some("tool_use"))
    }

    /// Text blocks of an `assistant` message joined by newlines; `None` when
    /// the message carries no text.
    pub fn assistant_text_content(&self) -> Option<String> {
        if self.message_type() != "assistant" {
            return None;
        }
        let texts: Vec<&str> = self
            .content_blocks()
            .filter(|block| block.get("type").and_then(Value::as_str) == Some("text"))
            .filter_map(|block| block.get("text").and_then(Value::as_str))
            .collect();
        if texts.is_empty() {
            None
        } else {
            Some(texts.join("\n"))
        }
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }
}

impl From<Value> for AgentMessage {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert_eq!(AgentMessage::system_init("s", "m", &[]).kind(), MessageKind::Init);
        assert_eq!(AgentMessage::assistant_text("s", "hi").kind(), MessageKind::AssistantText);
        assert_eq!(
            AgentMessage::tool_use("s", "t1", "Bash", json!({"command": "ls"})).kind(),
            MessageKind::ToolInvocation
        );
        assert_eq!(AgentMessage::tool_progress("s", "Bash", 1.5).kind(), MessageKind::Progress);
        assert_eq!(AgentMessage::result("s", "ok", 10, 0.01).kind(), MessageKind::Result);
        assert_eq!(
            AgentMessage::new(json!({"type": "system", "subtype": "compact_boundary"})).kind(),
            MessageKind::Other
        );
        assert_eq!(AgentMessage::new(json!({"type": "user"})).kind(), MessageKind::Other);
    }

    #[test]
    fn test_from_json_line() {
        let message =
            AgentMessage::from_json_line(r#"{"type":"system","subtype":"init","session_id":"abc"}"#)
                .unwrap();
        assert_eq!(message.message_type(), "system");
        assert_eq!(message.session_id(), Some("abc"));

        assert!(AgentMessage::from_json_line("not json").is_err());
        assert!(AgentMessage::from_json_line(r#"{"no_type":1}"#).is_err());
        assert!(AgentMessage::from_json_line(r#"[1,2]"#).is_err());
    }

    #[test]
    fn test_assistant_text_content_joins_blocks() {
        let message = AgentMessage::new(json!({
            "type": "assistant",
            "message": {"content": [
                {"type": "text", "text": "first"},
                {"type": "tool_use", "name": "Read", "input": {}},
                {"type": "text", "text": "second"},
            ]},
        }));
        assert_eq!(message.assistant_text_content().as_deref(), Some("first\nsecond"));
        assert!(message.has_tool_use());
    }

    #[test]
    fn test_assistant_text_content_absent() {
        let tool_only = AgentMessage::tool_use("s", "t1", "Read", json!({}));
        assert!(tool_only.assistant_text_content().is_none());
        assert!(AgentMessage::result("s", "done", 1, 0.0).assistant_text_content().is_none());
    }

    #[test]
    fn test_empty_session_id_is_ignored() {
        let message = AgentMessage::new(json!({"type": "assistant", "session_id": ""}));
        assert!(message.session_id().is_none());
    }
}
