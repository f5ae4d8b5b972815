//! Options for one agent invocation

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::config::{Config, DEFAULT_SYSTEM_PROMPT, McpServerConfig};

/// Agent settings; every field is optional so the same type serves as
/// server defaults and as per-request overrides.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_turns: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub mcp_servers: BTreeMap<String, McpServerConfig>,
}

impl AgentOptions {
    /// Server-wide defaults from configuration
    pub fn from_config(config: &Config) -> Self {
        Self {
            system_prompt: Some(config.agent.system_prompt.clone()),
            model: config.agent.model.clone(),
            max_turns: config.agent.max_turns,
            cwd: config.agent.cwd.clone(),
            mcp_servers: config.mcp.servers.clone(),
        }
    }

    /// Layer `overrides` on top of `self`.
    ///
    /// Scalars present in `overrides` replace ours. MCP server maps are merged
    /// by name with the override's entry winning on collision.
    pub fn merged(&self, overrides: &AgentOptions) -> AgentOptions {
        let mut mcp_servers = self.mcp_servers.clone();
        mcp_servers.extend(
            overrides
                .mcp_servers
                .iter()
                .map(|(name, server)| (name.clone(), server.clone())),
        );

        AgentOptions {
            system_prompt: non_empty(&overrides.system_prompt).or_else(|| non_empty(&self.system_prompt)),
            model: non_empty(&overrides.model).or_else(|| non_empty(&self.model)),
            max_turns: overrides.max_turns.or(self.max_turns),
            cwd: non_empty(&overrides.cwd).or_else(|| non_empty(&self.cwd)),
            mcp_servers,
        }
    }

    /// Effective system prompt
    pub fn system_prompt(&self) -> &str {
        self.system_prompt
            .as_deref()
            .filter(|p| !p.trim().is_empty())
            .unwrap_or(DEFAULT_SYSTEM_PROMPT)
    }

    /// `{"mcpServers": {...}}` document for the agent CLI, or `None` when
    /// no servers are configured.
    pub fn mcp_config_json(&self) -> Option<String> {
        if self.mcp_servers.is_empty() {
            return None;
        }
        Some(json!({ "mcpServers": self.mcp_servers }).to_string())
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value.as_ref().filter(|v| !v.trim().is_empty()).cloned()
}

/// A fully-resolved request to the agent runtime
#[derive(Debug, Clone, PartialEq)]
pub struct AgentRequest {
    pub prompt: String,
    pub options: AgentOptions,
}
