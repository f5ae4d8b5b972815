//! Configuration management
//!
//! Settings are resolved in this order (later wins):
//! 1. Built-in defaults
//! 2. `agent-relay.toml` in the working directory
//! 3. Environment variables
//!
//! `${VAR_NAME}` inside the TOML file is replaced with the variable's value
//! before parsing.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{Error, Result};

/// Default config file looked up by [`Config::load`]
pub const DEFAULT_CONFIG_FILE: &str = "agent-relay.toml";

/// System prompt used when none is configured
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant that can read and write files, \
    run commands, search the web, and help with various tasks. Be concise and efficient.";

/// Lower bound for idle limits; zero would expire everything immediately
const MIN_LIMIT_SECS: u64 = 1;

/// Main configuration for agent-relay
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// HTTP API configuration
    #[serde(default)]
    pub api: ApiConfig,

    /// Session lifetime configuration
    #[serde(default)]
    pub session: SessionConfig,

    /// Agent runtime defaults
    #[serde(default)]
    pub agent: AgentConfig,

    /// Auxiliary tool-provider (MCP) endpoints
    #[serde(default)]
    pub mcp: McpConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// API key required by the HTTP API (auth disabled when unset)
    #[serde(default)]
    pub key: Option<String>,

    /// Port for HTTP API server
    #[serde(default = "default_api_port")]
    pub port: u16,

    /// Allowed CORS origins; permissive when unset
    #[serde(default)]
    pub allowed_origins: Option<Vec<String>>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            key: None,
            port: default_api_port(),
            allowed_origins: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Sessions idle longer than this are evicted
    #[serde(default = "default_max_idle_secs")]
    pub max_idle_secs: u64,

    /// Period between sweeper passes
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,

    /// Reject client-supplied ids that are not already known
    #[serde(default)]
    pub strict_ids: bool,
}

impl SessionConfig {
    pub fn max_idle(&self) -> Duration {
        Duration::from_secs(self.max_idle_secs.max(MIN_LIMIT_SECS))
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_idle_secs: default_max_idle_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
            strict_ids: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Agent CLI executable
    #[serde(default = "default_agent_command")]
    pub command: String,

    /// Arguments placed before the agent's own flags
    #[serde(default)]
    pub args: Vec<String>,

    /// Default system prompt
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,

    /// Default model; the agent's own default when unset
    #[serde(default)]
    pub model: Option<String>,

    /// Maximum agent turns per run
    #[serde(default)]
    pub max_turns: Option<u32>,

    /// Working directory for the agent; the process cwd when unset
    #[serde(default)]
    pub cwd: Option<String>,

    /// Fail a run when the agent produces no output for this long
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
}

impl AgentConfig {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs.max(MIN_LIMIT_SECS))
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            command: default_agent_command(),
            args: Vec::new(),
            system_prompt: default_system_prompt(),
            model: None,
            max_turns: None,
            cwd: None,
            idle_timeout_secs: default_idle_timeout_secs(),
        }
    }
}

/// One auxiliary tool-provider endpoint, in the shape the agent CLI's
/// `--mcp-config` expects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum McpServerConfig {
    Http {
        url: String,
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        headers: BTreeMap<String, String>,
    },
    Sse {
        url: String,
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        headers: BTreeMap<String, String>,
    },
    Stdio {
        command: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        args: Vec<String>,
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        env: BTreeMap<String, String>,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct McpConfig {
    /// Servers keyed by name
    #[serde(default)]
    pub servers: BTreeMap<String, McpServerConfig>,
}

fn default_api_port() -> u16 {
    3000
}

fn default_max_idle_secs() -> u64 {
    60 * 60
}

fn default_sweep_interval_secs() -> u64 {
    5 * 60
}

fn default_agent_command() -> String {
    "claude".to_string()
}

fn default_system_prompt() -> String {
    DEFAULT_SYSTEM_PROMPT.to_string()
}

fn default_idle_timeout_secs() -> u64 {
    600
}

impl Config {
    /// Load from `agent-relay.toml` if present, then apply the environment.
    pub fn load() -> Result<Self> {
        if Path::new(DEFAULT_CONFIG_FILE).exists() {
            return Self::from_toml_file(DEFAULT_CONFIG_FILE);
        }
        Ok(Self::from_env())
    }

    /// Defaults overridden by the process environment
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides();
        config
    }

    /// Load a TOML file, expand `${VAR}` references, then apply the
    /// environment on top.
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;

        let mut config = Self::from_toml_str(&content, env_lookup)?;
        config.apply_env_overrides();
        Ok(config)
    }

    fn from_toml_str(content: &str, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let expanded = expand_env_vars(content, lookup);
        toml::from_str(&expanded).map_err(|e| Error::Config(format!("Failed to parse TOML: {}", e)))
    }

    /// Override settings from environment variables
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(env_lookup);
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        // API
        if let Some(port) = get("API_PORT").or_else(|| get("PORT")) {
            set_parsed(&mut self.api.port, "API_PORT", &port);
        }
        if let Some(key) = get("AGENT_API_KEY").or_else(|| get("API_KEY")) {
            self.api.key = Some(key);
        }
        if let Some(origins) = get("API_ALLOWED_ORIGINS") {
            self.api.allowed_origins = Some(split_list(&origins));
        }

        // Session
        if let Some(secs) = get("SESSION_MAX_IDLE_SECS") {
            set_limit_secs(&mut self.session.max_idle_secs, "SESSION_MAX_IDLE_SECS", &secs);
        } else if let Some(ms) = get("SESSION_MAX_AGE_MS") {
            match ms.trim().parse::<u64>() {
                Ok(ms) if ms / 1000 < MIN_LIMIT_SECS => {
                    warn!(value = %ms, min_secs = MIN_LIMIT_SECS, "SESSION_MAX_AGE_MS below minimum, clamping");
                    self.session.max_idle_secs = MIN_LIMIT_SECS;
                }
                Ok(ms) => self.session.max_idle_secs = ms / 1000,
                Err(_) => warn!(value = %ms, "Ignoring invalid SESSION_MAX_AGE_MS"),
            }
        }
        if let Some(secs) = get("SESSION_SWEEP_INTERVAL_SECS") {
            set_parsed(
                &mut self.session.sweep_interval_secs,
                "SESSION_SWEEP_INTERVAL_SECS",
                &secs,
            );
        }
        if let Some(strict) = get("SESSION_STRICT_IDS") {
            self.session.strict_ids = parse_flag(&strict);
        }

        // Agent
        if let Some(command) = get("AGENT_COMMAND") {
            self.agent.command = command;
        }
        if let Some(args) = get("AGENT_ARGS") {
            self.agent.args = args.split_whitespace().map(str::to_string).collect();
        }
        if let Some(prompt) = get("AGENT_SYSTEM_PROMPT") {
            self.agent.system_prompt = prompt;
        }
        if let Some(model) = get("AGENT_MODEL") {
            self.agent.model = Some(model);
        }
        if let Some(turns) = get("AGENT_MAX_TURNS") {
            match turns.trim().parse::<u32>() {
                Ok(turns) => self.agent.max_turns = Some(turns),
                Err(_) => warn!(value = %turns, "Ignoring invalid AGENT_MAX_TURNS"),
            }
        }
        if let Some(cwd) = get("AGENT_CWD") {
            self.agent.cwd = Some(cwd);
        }
        if let Some(secs) = get("AGENT_IDLE_TIMEOUT_SECS") {
            set_limit_secs(&mut self.agent.idle_timeout_secs, "AGENT_IDLE_TIMEOUT_SECS", &secs);
        }

        // Default tool provider endpoint
        if let Some(url) = get("AGENT_MCP_URL") {
            let name = get("AGENT_MCP_NAME").unwrap_or_else(|| "default".to_string());
            let mut headers = BTreeMap::new();
            match get("AGENT_MCP_API_KEY") {
                Some(key) => {
                    headers.insert("X-API-Key".to_string(), key);
                }
                None => warn!(server = %name, "AGENT_MCP_API_KEY not set, connecting without credentials"),
            }
            self.mcp.servers.insert(name, McpServerConfig::Http { url, headers });
        }
    }
}

fn env_lookup(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

fn set_parsed<T: std::str::FromStr>(target: &mut T, name: &str, value: &str) {
    match value.trim().parse() {
        Ok(parsed) => *target = parsed,
        Err(_) => warn!(variable = name, value = %value, "Ignoring invalid value"),
    }
}

/// Like [`set_parsed`] for idle limits, clamped to [`MIN_LIMIT_SECS`]
fn set_limit_secs(target: &mut u64, name: &str, value: &str) {
    set_parsed(target, name, value);
    if *target < MIN_LIMIT_SECS {
        warn!(variable = name, min_secs = MIN_LIMIT_SECS, "Value below minimum, clamping");
        *target = MIN_LIMIT_SECS;
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(value.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Replace every `${NAME}` with the looked-up value (empty when unset).
fn expand_env_vars(value: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    let mut result = String::with_capacity(value.len());
    let mut rest = value;

    while let Some(start) = rest.find("${") {
        result.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) => {
                let name = &after[..end];
                if !name.is_empty() {
                    result.push_str(&lookup(name).unwrap_or_default());
                }
                rest = &after[end + 1..];
            }
            None => {
                // Unterminated reference is kept verbatim
                result.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    result.push_str(rest);
    result
}
