//! The lazy event stream of one relay run

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, ready};
use std::time::Instant;

use dashmap::DashSet;
use futures::future::BoxFuture;
use futures::{Stream, StreamExt};
use tracing::{debug, info, warn};

use crate::relay::RelayEvent;
use crate::runtime::{AgentMessage, EventStream, MessageKind};
use crate::{Error, Result};

/// Holds the per-session run lock; released on drop
pub(crate) struct RunGuard {
    active: Arc<DashSet<String>>,
    session_id: String,
}

impl RunGuard {
    /// Take the lock for `session_id`, or `None` if a run already holds it
    pub(crate) fn acquire(active: &Arc<DashSet<String>>, session_id: &str) -> Option<Self> {
        if !active.insert(session_id.to_string()) {
            return None;
        }
        Some(Self {
            active: Arc::clone(active),
            session_id: session_id.to_string(),
        })
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.active.remove(&self.session_id);
    }
}

enum State {
    Starting(BoxFuture<'static, Result<EventStream>>),
    Streaming(EventStream),
    Finished,
}

/// Ordered [`RelayEvent`]s for one run, ending in exactly one `done` or
/// `error` event. Dropping the stream before the end cancels the run.
pub struct RelayStream {
    session_id: String,
    state: State,
    last_text: Option<String>,
    runtime_session_id: Option<String>,
    guard: Option<RunGuard>,
    started_at: Instant,
    forwarded: usize,
}

impl RelayStream {
    pub(crate) fn new(
        session_id: String,
        start: BoxFuture<'static, Result<EventStream>>,
        guard: RunGuard,
    ) -> Self {
        Self {
            session_id,
            state: State::Starting(start),
            last_text: None,
            runtime_session_id: None,
            guard: Some(guard),
            started_at: Instant::now(),
            forwarded: 0,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// The runtime's own session id, once seen
    pub fn runtime_session_id(&self) -> Option<&str> {
        self.runtime_session_id.as_deref()
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.state, State::Finished)
    }

    /// Wrap one upstream message, or `None` if it repeats the previous text
    fn forward(&mut self, message: AgentMessage) -> Option<RelayEvent> {
        match message.kind() {
            MessageKind::AssistantText => {
                let text = message.assistant_text_content();
                if text.is_some() && text == self.last_text {
                    debug!(session_id = %self.session_id, "Suppressed repeated assistant text");
                    return None;
                }
                if text.is_some() {
                    self.last_text = text;
                }
            }
            // Never suppressed, but its text still counts as the last emitted
            MessageKind::ToolInvocation => {
                if let Some(text) = message.assistant_text_content() {
                    self.last_text = Some(text);
                }
            }
            _ => {}
        }

        let captured = match message.session_id() {
            Some(id) if self.runtime_session_id.is_none() && id != self.session_id => {
                Some(id.to_string())
            }
            _ => None,
        };

        let mut event = RelayEvent::forwarded(&self.session_id, message);
        if let Some(id) = captured {
            info!(session_id = %self.session_id, runtime_session_id = %id, "Captured runtime session id");
            event.runtime_session_id = Some(id.clone());
            self.runtime_session_id = Some(id);
        }
        self.forwarded += 1;
        Some(event)
    }

    fn fail(&mut self, error: Error) -> RelayEvent {
        warn!(
            session_id = %self.session_id,
            forwarded = self.forwarded,
            error = %error,
            "Relay run failed"
        );
        self.close();
        RelayEvent::error(&self.session_id, error.to_string())
    }

    fn finish(&mut self) -> RelayEvent {
        info!(
            session_id = %self.session_id,
            forwarded = self.forwarded,
            elapsed_ms = self.started_at.elapsed().as_millis() as u64,
            "Relay run finished"
        );
        self.close();
        RelayEvent::done(&self.session_id)
    }

    fn close(&mut self) {
        self.state = State::Finished;
        self.guard = None;
    }
}

impl std::fmt::Debug for RelayStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayStream")
            .field("session_id", &self.session_id)
            .field("finished", &self.is_finished())
            .field("forwarded", &self.forwarded)
            .finish()
    }
}

impl Stream for RelayStream {
    type Item = RelayEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        loop {
            match &mut this.state {
                State::Starting(start) => match ready!(start.as_mut().poll(cx)) {
                    Ok(upstream) => this.state = State::Streaming(upstream),
                    Err(e) => return Poll::Ready(Some(this.fail(e))),
                },
                State::Streaming(upstream) => match ready!(upstream.poll_next_unpin(cx)) {
                    Some(Ok(message)) => {
                        if let Some(event) = this.forward(message) {
                            return Poll::Ready(Some(event));
                        }
                    }
                    Some(Err(e)) => return Poll::Ready(Some(this.fail(e))),
                    None => return Poll::Ready(Some(this.finish())),
                },
                State::Finished => return Poll::Ready(None),
            }
        }
    }
}

impl Drop for RelayStream {
    fn drop(&mut self) {
        if !self.is_finished() {
            info!(
                session_id = %self.session_id,
                forwarded = self.forwarded,
                "Relay run cancelled"
            );
        }
    }
}
