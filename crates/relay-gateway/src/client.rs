//! HTTP client for a running relay server
//!
//! Posts prompts to `/chat` and decodes the Server-Sent Events body line by
//! line as it arrives.

use anyhow::{Context, bail};
use futures::StreamExt;
use serde_json::{Value, json};
use tracing::{debug, warn};

/// Default server address for client modes
pub const DEFAULT_API_URL: &str = "http://localhost:3000";

/// Client connection settings
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub api_url: String,
    pub api_key: Option<String>,
}

impl ClientConfig {
    /// Read `AGENT_API_URL` and `AGENT_API_KEY`
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Self {
        let api_url = get("AGENT_API_URL")
            .filter(|url| !url.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());
        Self {
            api_url: api_url.trim_end_matches('/').to_string(),
            api_key: get("AGENT_API_KEY").filter(|key| !key.is_empty()),
        }
    }
}

/// Splits an SSE byte stream into `data:` payloads
#[derive(Debug, Default)]
pub struct SseLineDecoder {
    buffer: Vec<u8>,
}

impl SseLineDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk; returns every event completed by it. Malformed JSON
    /// payloads are skipped.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Value> {
        // Buffer bytes so multi-byte characters split across chunks survive
        self.buffer.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some(newline) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=newline).collect();
            if let Some(event) = parse_data_line(&String::from_utf8_lossy(&line)) {
                events.push(event);
            }
        }
        events
    }

    /// Flush a trailing line without a newline
    pub fn finish(&mut self) -> Option<Value> {
        let line = std::mem::take(&mut self.buffer);
        parse_data_line(&String::from_utf8_lossy(&line))
    }
}

fn parse_data_line(line: &str) -> Option<Value> {
    let data = line.trim_end_matches(['\r', '\n']).strip_prefix("data:")?;
    match serde_json::from_str(data.trim_start()) {
        Ok(value) => Some(value),
        Err(e) => {
            debug!(error = %e, "Skipping malformed event");
            None
        }
    }
}

/// Chat client that remembers its session between turns
pub struct ChatClient {
    http: reqwest::Client,
    config: ClientConfig,
    session_id: Option<String>,
}

impl ChatClient {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
            session_id: None,
        }
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// Forget the current session; the next turn starts a new one
    pub fn reset_session(&mut self) {
        self.session_id = None;
    }

    /// Send one message and hand every received event to `on_event` in order
    pub async fn chat(&mut self, message: &str, mut on_event: impl FnMut(&Value)) -> anyhow::Result<()> {
        let url = format!("{}/chat", self.config.api_url);
        let mut request = self.http.post(&url).json(&json!({
            "message": message,
            "sessionId": self.session_id,
        }));
        if let Some(key) = &self.config.api_key {
            request = request.header("X-API-Key", key);
        }

        let response = request
            .send()
            .await
            .with_context(|| format!("failed to connect to {}", url))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let detail = serde_json::from_str::<Value>(&body)
                .ok()
                .and_then(|v| v.get("error").and_then(Value::as_str).map(str::to_string))
                .unwrap_or(body);
            bail!("{} {}", status, detail.trim());
        }

        if self.session_id.is_none() {
            self.session_id = response
                .headers()
                .get("x-session-id")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
        }

        let mut decoder = SseLineDecoder::new();
        let mut bytes = response.bytes_stream();
        while let Some(chunk) = bytes.next().await {
            let chunk = chunk.context("connection lost while streaming")?;
            for event in decoder.push(&chunk) {
                self.observe(&event);
                on_event(&event);
            }
        }
        if let Some(event) = decoder.finish() {
            self.observe(&event);
            on_event(&event);
        }
        Ok(())
    }

    fn observe(&mut self, event: &Value) {
        if self.session_id.is_some() {
            return;
        }
        match event.get("sessionId").and_then(Value::as_str) {
            Some(id) => self.session_id = Some(id.to_string()),
            None => warn!("Event without sessionId"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_decoder_handles_split_chunks() {
        let mut decoder = SseLineDecoder::new();
        assert!(decoder.push(b"data: {\"type\":\"sys").is_empty());
        let events = decoder.push(b"tem\",\"sessionId\":\"s1\"}\n\ndata: {\"type\":\"done\"}\n");
        assert_eq!(events.len(), 2);
        assert_eq!(events[0]["type"], "system");
        assert_eq!(events[0]["sessionId"], "s1");
        assert_eq!(events[1]["type"], "done");
    }

    #[test]
    fn test_decoder_skips_comments_and_malformed_data() {
        let mut decoder = SseLineDecoder::new();
        let events = decoder.push(b": keep-alive\r\n\r\ndata: not json\r\ndata:{\"type\":\"result\"}\r\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0]["type"], "result");
    }

    #[test]
    fn test_decoder_finish_flushes_trailing_line() {
        let mut decoder = SseLineDecoder::new();
        assert!(decoder.push(b"data: {\"type\":\"done\"}").is_empty());
        assert_eq!(decoder.finish().unwrap()["type"], "done");
        assert!(decoder.finish().is_none());
    }

    #[test]
    fn test_client_config_from_lookup() {
        let vars: HashMap<&str, &str> = [("AGENT_API_URL", "http://relay:8080/"), ("AGENT_API_KEY", "k")]
            .into_iter()
            .collect();
        let config = ClientConfig::from_lookup(|name| vars.get(name).map(|v| v.to_string()));
        assert_eq!(config.api_url, "http://relay:8080");
        assert_eq!(config.api_key.as_deref(), Some("k"));

        let config = ClientConfig::from_lookup(|_| None);
        assert_eq!(config.api_url, DEFAULT_API_URL);
        assert!(config.api_key.is_none());
    }

    #[test]
    fn test_observe_keeps_first_session_id() {
        let mut client = ChatClient::new(ClientConfig::from_lookup(|_| None));
        client.observe(&json!({"type": "system", "sessionId": "first"}));
        client.observe(&json!({"type": "done", "sessionId": "second"}));
        assert_eq!(client.session_id(), Some("first"));

        client.reset_session();
        assert!(client.session_id().is_none());
    }
}
