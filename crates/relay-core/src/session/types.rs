//! Session types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Longest session id accepted from a client
pub const MAX_SESSION_ID_LEN: usize = 128;

/// A logical conversation thread spanning zero or more relay runs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// Unique session identifier
    pub id: String,
    /// Session creation timestamp (never changes)
    pub created_at: DateTime<Utc>,
    /// Last time the session was resolved
    pub last_accessed_at: DateTime<Utc>,
}

impl Session {
    /// Create a session with a freshly generated id
    pub fn new() -> Self {
        Self::with_id(generate_session_id())
    }

    /// Create a session with a caller-chosen id
    pub fn with_id(id: impl Into<String>) -> Self {
        Self::created_at(id, Utc::now())
    }

    pub(crate) fn created_at(id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            created_at: now,
            last_accessed_at: now,
        }
    }

    /// Mark the session as accessed at `now`
    pub fn touch(&mut self, now: DateTime<Utc>) {
        // Clock steps backwards must not move the timestamp backwards
        if now > self.last_accessed_at {
            self.last_accessed_at = now;
        }
    }

    /// How long the session has been idle as of `now`
    pub fn idle_for(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.last_accessed_at
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

/// Generate a new random session id (UUID v4)
pub fn generate_session_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Check that a client-supplied session id is safe to store and to echo
/// back in a response header.
pub fn validate_session_id(id: &str) -> Result<()> {
    if id.is_empty() {
        return Err(Error::Validation("session id must not be empty".to_string()));
    }
    if id.len() > MAX_SESSION_ID_LEN {
        return Err(Error::Validation(format!(
            "session id must be at most {} characters",
            MAX_SESSION_ID_LEN
        )));
    }
    if let Some(c) = id
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
    {
        return Err(Error::Validation(format!(
            "session id contains invalid character {:?}",
            c
        )));
    }
    Ok(())
}
