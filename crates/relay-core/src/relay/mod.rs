//! Event relay
//!
//! Drives one agent runtime invocation per prompt and forwards every message
//! it produces, tagged with the owning session, as a lazy [`RelayStream`].
//!
//! Guarantees of a run:
//! - events keep the runtime's order; the only thing ever dropped is an
//!   assistant text identical to the previously emitted one
//! - the last event is exactly one `done` (normal end) or `error` (failure)
//! - at most one run per session is in flight at a time

mod event;
mod stream;

use std::sync::Arc;

use dashmap::DashSet;
use futures::FutureExt;
use tracing::info;

use crate::config::Config;
use crate::runtime::{AgentOptions, AgentRequest, AgentRuntime, ClaudeCliRuntime};
use crate::session::Session;
use crate::{Error, Result};

pub use event::{RelayEvent, RelayEventKind};
pub use stream::RelayStream;

use stream::RunGuard;

/// Relays agent runs for sessions
#[derive(Clone)]
pub struct EventRelay {
    runtime: Arc<dyn AgentRuntime>,
    defaults: AgentOptions,
    active: Arc<DashSet<String>>,
}

impl EventRelay {
    pub fn new(runtime: Arc<dyn AgentRuntime>, defaults: AgentOptions) -> Self {
        Self {
            runtime,
            defaults,
            active: Arc::new(DashSet::new()),
        }
    }

    /// Relay backed by the agent CLI configured in `config`
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            Arc::new(ClaudeCliRuntime::from_config(&config.agent)),
            AgentOptions::from_config(config),
        )
    }

    pub fn runtime_name(&self) -> &str {
        self.runtime.name()
    }

    pub fn defaults(&self) -> &AgentOptions {
        &self.defaults
    }

    /// Whether a run is currently in flight for `session_id`
    pub fn is_running(&self, session_id: &str) -> bool {
        self.active.contains(session_id)
    }

    /// Start a run for `session`.
    ///
    /// Fails before anything is invoked if the prompt is blank
    /// ([`Error::Validation`]) or the session already has a run in flight
    /// ([`Error::Conflict`]). The runtime starts on the first poll of the
    /// returned stream.
    pub fn relay(
        &self,
        session: &Session,
        prompt: &str,
        overrides: &AgentOptions,
    ) -> Result<RelayStream> {
        if prompt.trim().is_empty() {
            return Err(Error::Validation("message must not be empty".to_string()));
        }

        let guard = RunGuard::acquire(&self.active, &session.id)
            .ok_or_else(|| Error::Conflict(session.id.clone()))?;

        let request = AgentRequest {
            prompt: prompt.to_string(),
            options: self.defaults.merged(overrides),
        };

        info!(
            session_id = %session.id,
            runtime = self.runtime.name(),
            prompt_len = prompt.len(),
            mcp_servers = request.options.mcp_servers.len(),
            "Starting relay run"
        );

        let runtime = Arc::clone(&self.runtime);
        let start = async move { runtime.start(request).await }.boxed();
        Ok(RelayStream::new(session.id.clone(), start, guard))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::McpServerConfig;
    use crate::runtime::{AgentMessage, ScriptStep, ScriptedRuntime};
    use futures::StreamExt;
    use serde_json::json;
    use std::collections::BTreeMap;
    use tokio_test::{assert_err, assert_ok};

    fn relay_with(runtime: ScriptedRuntime) -> (EventRelay, ScriptedRuntime) {
        let relay = EventRelay::new(Arc::new(runtime.clone()), AgentOptions::default());
        (relay, runtime)
    }

    fn types(events: &[RelayEvent]) -> Vec<&str> {
        events.iter().map(|e| e.event_type.as_str()).collect()
    }

    fn texts(events: &[RelayEvent]) -> Vec<String> {
        events
            .iter()
            .filter_map(|e| e.message())
            .filter_map(|m| m.assistant_text_content())
            .collect()
    }

    #[tokio::test]
    async fn test_repeated_text_is_suppressed() {
        let (relay, _) = relay_with(ScriptedRuntime::from_messages([
            AgentMessage::system_init("rt", "model", &["Bash"]),
            AgentMessage::assistant_text("rt", "hi"),
            AgentMessage::assistant_text("rt", "hi"),
            AgentMessage::result("rt", "hi", 5, 0.0),
        ]));
        let session = Session::new();

        let stream = assert_ok!(relay.relay(&session, "say hi", &AgentOptions::default()));
        let events: Vec<RelayEvent> = stream.collect().await;

        assert_eq!(types(&events), vec!["system", "assistant", "result", "done"]);
        assert_eq!(
            events.iter().map(|e| e.kind).collect::<Vec<_>>(),
            vec![
                RelayEventKind::Init,
                RelayEventKind::AssistantText,
                RelayEventKind::Result,
                RelayEventKind::Done,
            ]
        );
        assert!(events.iter().all(|e| e.session_id == session.id));
    }

    #[tokio::test]
    async fn test_runtime_failure_ends_with_single_error() {
        let (relay, _) = relay_with(ScriptedRuntime::new(vec![
            AgentMessage::system_init("rt", "model", &[]).into(),
            ScriptStep::Fail("connection reset".to_string()),
        ]));
        let session = Session::new();

        let events: Vec<RelayEvent> = relay
            .relay(&session, "go", &AgentOptions::default())
            .unwrap()
            .collect()
            .await;

        assert_eq!(types(&events), vec!["system", "error"]);
        let error = events[1].error.as_deref().unwrap();
        assert!(error.contains("connection reset"));
        assert!(!relay.is_running(&session.id));
    }

    #[tokio::test]
    async fn test_empty_runtime_sequence_yields_done() {
        let (relay, _) = relay_with(ScriptedRuntime::default());
        let events: Vec<RelayEvent> = relay
            .relay(&Session::new(), "go", &AgentOptions::default())
            .unwrap()
            .collect()
            .await;
        assert_eq!(types(&events), vec!["done"]);
    }

    #[tokio::test]
    async fn test_start_failure_is_error_event() {
        let (relay, runtime) = relay_with(ScriptedRuntime::failing_start("agent not installed"));
        let session = Session::new();

        let events: Vec<RelayEvent> = relay
            .relay(&session, "go", &AgentOptions::default())
            .unwrap()
            .collect()
            .await;

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, RelayEventKind::Error);
        assert!(events[0].error.as_deref().unwrap().contains("agent not installed"));
        assert_eq!(runtime.started(), 0);
        assert!(!relay.is_running(&session.id));
    }

    #[tokio::test]
    async fn test_blank_prompt_is_rejected_before_invocation() {
        let (relay, runtime) = relay_with(ScriptedRuntime::default());
        let session = Session::new();

        for prompt in ["", "   ", "\n\t"] {
            let err = assert_err!(relay.relay(&session, prompt, &AgentOptions::default()));
            assert!(matches!(err, Error::Validation(_)));
        }
        assert!(runtime.last_request().is_none());
        assert!(!relay.is_running(&session.id));
    }

    #[tokio::test]
    async fn test_concurrent_run_for_same_session_conflicts() {
        let (relay, _) = relay_with(ScriptedRuntime::new(vec![ScriptStep::Pending]));
        let session = Session::new();
        let other = Session::new();

        let first = relay.relay(&session, "one", &AgentOptions::default()).unwrap();
        assert!(relay.is_running(&session.id));

        let err = assert_err!(relay.relay(&session, "two", &AgentOptions::default()));
        assert!(matches!(err, Error::Conflict(id) if id == session.id));

        // Other sessions are unaffected
        let _second = assert_ok!(relay.relay(&other, "three", &AgentOptions::default()));

        drop(first);
        assert!(!relay.is_running(&session.id));
        assert_ok!(relay.relay(&session, "again", &AgentOptions::default()));
    }

    #[tokio::test]
    async fn test_non_adjacent_repeat_is_emitted() {
        let (relay, _) = relay_with(ScriptedRuntime::from_messages([
            AgentMessage::assistant_text("rt", "a"),
            AgentMessage::assistant_text("rt", "b"),
            AgentMessage::assistant_text("rt", "a"),
        ]));
        let events: Vec<RelayEvent> = relay
            .relay(&Session::new(), "go", &AgentOptions::default())
            .unwrap()
            .collect()
            .await;
        assert_eq!(texts(&events), vec!["a", "b", "a"]);
    }

    #[tokio::test]
    async fn test_repeat_across_other_events_is_suppressed() {
        let (relay, _) = relay_with(ScriptedRuntime::from_messages([
            AgentMessage::assistant_text("rt", "working"),
            AgentMessage::tool_progress("rt", "Bash", 1.0),
            AgentMessage::assistant_text("rt", "working"),
            AgentMessage::tool_use("rt", "t1", "Bash", json!({"command": "ls"})),
            AgentMessage::tool_use("rt", "t1", "Bash", json!({"command": "ls"})),
        ]));
        let events: Vec<RelayEvent> = relay
            .relay(&Session::new(), "go", &AgentOptions::default())
            .unwrap()
            .collect()
            .await;

        assert_eq!(
            events.iter().map(|e| e.kind).collect::<Vec<_>>(),
            vec![
                RelayEventKind::AssistantText,
                RelayEventKind::Progress,
                RelayEventKind::ToolInvocation,
                RelayEventKind::ToolInvocation,
                RelayEventKind::Done,
            ]
        );
    }

    #[tokio::test]
    async fn test_text_after_mixed_tool_message_is_suppressed() {
        let mixed = AgentMessage::new(json!({
            "type": "assistant",
            "session_id": "rt",
            "message": {"content": [
                {"type": "text", "text": "checking"},
                {"type": "tool_use", "id": "t1", "name": "Bash", "input": {"command": "ls"}},
            ]},
        }));
        let (relay, _) = relay_with(ScriptedRuntime::from_messages([
            mixed.clone(),
            AgentMessage::assistant_text("rt", "checking"),
            mixed,
        ]));
        let events: Vec<RelayEvent> = relay
            .relay(&Session::new(), "go", &AgentOptions::default())
            .unwrap()
            .collect()
            .await;

        assert_eq!(
            events.iter().map(|e| e.kind).collect::<Vec<_>>(),
            vec![
                RelayEventKind::ToolInvocation,
                RelayEventKind::ToolInvocation,
                RelayEventKind::Done,
            ]
        );
    }

    #[tokio::test]
    async fn test_order_is_preserved() {
        let script: Vec<AgentMessage> = (0..50)
            .map(|i| AgentMessage::assistant_text("rt", &format!("chunk {}", i)))
            .collect();
        let (relay, _) = relay_with(ScriptedRuntime::from_messages(script));

        let events: Vec<RelayEvent> = relay
            .relay(&Session::new(), "go", &AgentOptions::default())
            .unwrap()
            .collect()
            .await;

        let expected: Vec<String> = (0..50).map(|i| format!("chunk {}", i)).collect();
        assert_eq!(texts(&events), expected);
        assert_eq!(events.last().map(|e| e.kind), Some(RelayEventKind::Done));
    }

    #[tokio::test]
    async fn test_runtime_session_id_is_surfaced_once() {
        let (relay, _) = relay_with(ScriptedRuntime::from_messages([
            AgentMessage::system_init("runtime-xyz", "model", &[]),
            AgentMessage::assistant_text("runtime-xyz", "hello"),
        ]));
        let session = Session::with_id("client-chosen");

        let mut stream = relay.relay(&session, "go", &AgentOptions::default()).unwrap();
        let first = stream.next().await.unwrap();
        assert_eq!(first.runtime_session_id.as_deref(), Some("runtime-xyz"));
        assert_eq!(first.session_id, "client-chosen");
        assert_eq!(stream.runtime_session_id(), Some("runtime-xyz"));

        let second = stream.next().await.unwrap();
        assert!(second.runtime_session_id.is_none());
        assert_eq!(second.session_id, "client-chosen");
    }

    #[tokio::test]
    async fn test_matching_runtime_session_id_is_not_surfaced() {
        let session = Session::new();
        let (relay, _) = relay_with(ScriptedRuntime::from_messages([AgentMessage::system_init(
            &session.id,
            "model",
            &[],
        )]));

        let events: Vec<RelayEvent> = relay
            .relay(&session, "go", &AgentOptions::default())
            .unwrap()
            .collect()
            .await;
        assert!(events.iter().all(|e| e.runtime_session_id.is_none()));
    }

    #[tokio::test]
    async fn test_dropping_stream_cancels_runtime() {
        let (relay, runtime) = relay_with(ScriptedRuntime::new(vec![
            AgentMessage::assistant_text("rt", "partial").into(),
            ScriptStep::Pending,
        ]));
        let session = Session::new();

        let mut stream = relay.relay(&session, "go", &AgentOptions::default()).unwrap();
        let first = stream.next().await.unwrap();
        assert_eq!(first.kind, RelayEventKind::AssistantText);
        assert!(!runtime.stream_dropped());

        drop(stream);
        assert!(runtime.stream_dropped());
        assert!(!relay.is_running(&session.id));
    }

    #[tokio::test]
    async fn test_stream_is_fused_after_terminal_event() {
        let (relay, _) = relay_with(ScriptedRuntime::default());
        let mut stream = relay.relay(&Session::new(), "go", &AgentOptions::default()).unwrap();
        assert_eq!(stream.next().await.map(|e| e.kind), Some(RelayEventKind::Done));
        assert!(stream.is_finished());
        assert!(stream.next().await.is_none());
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_overrides_are_merged_into_request() {
        let runtime = ScriptedRuntime::default();
        let mut defaults = AgentOptions {
            model: Some("sonnet".to_string()),
            ..Default::default()
        };
        defaults.mcp_servers.insert(
            "shared".to_string(),
            McpServerConfig::Http {
                url: "https://env".to_string(),
                headers: BTreeMap::new(),
            },
        );
        let relay = EventRelay::new(Arc::new(runtime.clone()), defaults);

        let mut overrides = AgentOptions::default();
        overrides.mcp_servers.insert(
            "shared".to_string(),
            McpServerConfig::Http {
                url: "https://caller".to_string(),
                headers: BTreeMap::new(),
            },
        );

        let _: Vec<RelayEvent> = relay
            .relay(&Session::new(), "hello", &overrides)
            .unwrap()
            .collect()
            .await;

        let request = runtime.last_request().unwrap();
        assert_eq!(request.prompt, "hello");
        assert_eq!(request.options.model.as_deref(), Some("sonnet"));
        assert!(matches!(
            request.options.mcp_servers.get("shared"),
            Some(McpServerConfig::Http { url, .. }) if url == "https://caller"
        ));
    }
}
