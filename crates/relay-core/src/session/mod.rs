//! Session management module
//!
//! Owns session identity, lookup, deletion and idle eviction.

mod store;
mod sweeper;
mod types;

pub use store::SessionStore;
pub use sweeper::{Sweeper, SweeperConfig, SweeperHandle, SweeperState};
pub use types::{MAX_SESSION_ID_LEN, Session, generate_session_id, validate_session_id};
