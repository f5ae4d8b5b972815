//! In-memory session registry
//!
//! Thread-safe session storage using DashMap. Every operation is atomic with
//! respect to the entry it touches, so two concurrent resolves of the same
//! unknown id create exactly one session.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::{debug, info};

use crate::session::Session;
use crate::session::types::generate_session_id;

/// Volatile, process-lifetime session store
#[derive(Clone, Default)]
pub struct SessionStore {
    sessions: Arc<DashMap<String, Session>>,
}

impl SessionStore {
    /// Create an empty session store
    pub fn new() -> Self {
        Self::default()
    }

    /// Resume the session named by `id`, or create one.
    ///
    /// An unknown `id` is adopted as the new session's id; `None` creates a
    /// session with a freshly generated id.
    pub fn resolve(&self, id: Option<&str>) -> Session {
        self.resolve_at(id, Utc::now())
    }

    pub(crate) fn resolve_at(&self, id: Option<&str>, now: DateTime<Utc>) -> Session {
        let Some(id) = id else {
            return self.create_at(now);
        };

        match self.sessions.entry(id.to_string()) {
            Entry::Occupied(mut entry) => {
                entry.get_mut().touch(now);
                debug!(session_id = %id, "Resumed session");
                entry.get().clone()
            }
            Entry::Vacant(entry) => {
                info!(session_id = %id, "Creating session with client-supplied id");
                entry.insert(Session::created_at(id, now)).clone()
            }
        }
    }

    fn create_at(&self, now: DateTime<Utc>) -> Session {
        loop {
            let id = generate_session_id();
            if let Entry::Vacant(entry) = self.sessions.entry(id.clone()) {
                info!(session_id = %id, "Created session");
                return entry.insert(Session::created_at(id, now)).clone();
            }
        }
    }

    /// Resume an existing session only, updating its access time.
    pub fn touch(&self, id: &str) -> Option<Session> {
        let mut session = self.sessions.get_mut(id)?;
        session.touch(Utc::now());
        Some(session.clone())
    }

    /// Look up a session without updating its access time
    pub fn get(&self, id: &str) -> Option<Session> {
        self.sessions.get(id).map(|s| s.clone())
    }

    /// Remove a session; returns whether anything was removed
    pub fn delete(&self, id: &str) -> bool {
        let removed = self.sessions.remove(id).is_some();
        if removed {
            info!(session_id = %id, "Deleted session");
        }
        removed
    }

    /// Snapshot of all live sessions, in no particular order
    pub fn list(&self) -> Vec<Session> {
        self.sessions.iter().map(|entry| entry.value().clone()).collect()
    }

    /// Remove every session idle for longer than `max_idle`.
    ///
    /// Returns the number of sessions removed.
    pub fn sweep(&self, max_idle: Duration) -> usize {
        self.sweep_at(Utc::now(), max_idle)
    }

    /// Same as [`sweep`](Self::sweep) with an explicit clock reading
    pub fn sweep_at(&self, now: DateTime<Utc>, max_idle: Duration) -> usize {
        let Ok(max_idle) = chrono::Duration::from_std(max_idle) else {
            // Larger than any representable idle time
            return 0;
        };

        let mut removed = 0;
        self.sessions.retain(|id, session| {
            let expired = session.idle_for(now) > max_idle;
            if expired {
                info!(session_id = %id, "Evicted idle session");
                removed += 1;
            }
            !expired
        });
        removed
    }

    /// Get session count
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    #[cfg(test)]
    pub(crate) fn backdate(&self, id: &str, by: chrono::Duration) {
        if let Some(mut session) = self.sessions.get_mut(id) {
            session.last_accessed_at -= by;
        }
    }
}
