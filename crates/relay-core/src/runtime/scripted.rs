//! In-process runtime that replays a fixed script
//!
//! Used by tests and local demos where spawning a real agent is not wanted.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::StreamExt;

use crate::runtime::{AgentMessage, AgentRequest, AgentRuntime, EventStream};
use crate::{Error, Result};

/// One step of a scripted run
#[derive(Debug, Clone)]
pub enum ScriptStep {
    /// Yield this message
    Message(AgentMessage),
    /// Yield a runtime error and end the stream
    Fail(String),
    /// Never yield again; the stream stays open until dropped
    Pending,
}

impl From<AgentMessage> for ScriptStep {
    fn from(message: AgentMessage) -> Self {
        ScriptStep::Message(message)
    }
}

/// Runtime replaying the same script for every invocation
#[derive(Debug, Clone, Default)]
pub struct ScriptedRuntime {
    steps: Vec<ScriptStep>,
    start_error: Option<String>,
    requests: Arc<Mutex<Vec<AgentRequest>>>,
    started: Arc<AtomicUsize>,
    dropped: Arc<AtomicBool>,
}

impl ScriptedRuntime {
    pub fn new(steps: Vec<ScriptStep>) -> Self {
        Self {
            steps,
            ..Default::default()
        }
    }

    /// Replay plain messages with no failure
    pub fn from_messages(messages: impl IntoIterator<Item = AgentMessage>) -> Self {
        Self::new(messages.into_iter().map(ScriptStep::Message).collect())
    }

    /// Every `start` call fails with `message`
    pub fn failing_start(message: impl Into<String>) -> Self {
        Self {
            start_error: Some(message.into()),
            ..Default::default()
        }
    }

    /// Number of successful `start` calls
    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<AgentRequest> {
        self.requests.lock().ok()?.last().cloned()
    }

    /// Whether a stream handed out by this runtime has been dropped
    pub fn stream_dropped(&self) -> bool {
        self.dropped.load(Ordering::SeqCst)
    }
}

/// Sets the shared flag when the scripted stream goes away
struct DropFlag(Arc<AtomicBool>);

impl Drop for DropFlag {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl AgentRuntime for ScriptedRuntime {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn start(&self, request: AgentRequest) -> Result<EventStream> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request);
        }
        if let Some(message) = &self.start_error {
            return Err(Error::Runtime(message.clone()));
        }
        self.started.fetch_add(1, Ordering::SeqCst);

        let flag = DropFlag(self.dropped.clone());
        let steps = self.steps.clone().into_iter();
        let stream = futures::stream::unfold((steps, flag, false), |(mut steps, flag, done)| async move {
            if done {
                return None;
            }
            match steps.next()? {
                ScriptStep::Message(message) => {
                    tokio::task::yield_now().await;
                    Some((Ok(message), (steps, flag, false)))
                }
                ScriptStep::Fail(message) => Some((Err(Error::Runtime(message)), (steps, flag, true))),
                ScriptStep::Pending => {
                    std::future::pending::<()>().await;
                    None
                }
            }
        });
        Ok(stream.boxed())
    }
}
