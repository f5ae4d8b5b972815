//! Agent runtime abstraction
//!
//! An agent runtime turns a prompt into a lazy, ordered stream of
//! [`AgentMessage`]s. The stream ends normally when the agent is done, or
//! yields an `Err` when the agent fails; dropping it cancels the run.

mod claude;
mod message;
mod options;
mod scripted;

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::Result;

pub use claude::{ClaudeCliRuntime, PERMISSION_MODE};
pub use message::{AgentMessage, MessageKind};
pub use options::{AgentOptions, AgentRequest};
pub use scripted::{ScriptStep, ScriptedRuntime};

/// Stream of messages produced by one agent invocation
pub type EventStream = BoxStream<'static, Result<AgentMessage>>;

/// Something that can run an agent and stream its messages
#[async_trait]
pub trait AgentRuntime: Send + Sync {
    /// Runtime name for logs
    fn name(&self) -> &str;

    /// Start one invocation.
    ///
    /// An `Err` here means the agent could not be started at all.
    async fn start(&self, request: AgentRequest) -> Result<EventStream>;
}
