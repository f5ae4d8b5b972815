//! relay-core: session lifecycle and streaming relay for an agent gateway
//!
//! セッション管理、エージェント実行のイベント中継、アイドルセッションの
//! 定期掃除、設定読み込みを提供します。

pub mod config;
pub mod error;
pub mod relay;
pub mod runtime;
pub mod session;

pub use config::{AgentConfig, ApiConfig, Config, McpConfig, McpServerConfig, SessionConfig};
pub use error::{Error, Result};
pub use relay::{EventRelay, RelayEvent, RelayEventKind, RelayStream};
pub use runtime::{
    AgentMessage, AgentOptions, AgentRequest, AgentRuntime, ClaudeCliRuntime, EventStream,
    MessageKind, ScriptStep, ScriptedRuntime,
};
pub use session::{
    Session, SessionStore, Sweeper, SweeperConfig, SweeperHandle, SweeperState,
    generate_session_id, validate_session_id,
};
