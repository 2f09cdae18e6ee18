//! Authentication module for managing the user session.
//!
//! This module provides:
//! - `SessionStore`: sign-up, sign-in, restore, refresh and sign-out
//! - `TokenStore`: where the session tokens are persisted
//! - `ScheduledTask`: the background timer that keeps the token fresh
//!
//! The access token is refreshed every 55 minutes by default; a failed
//! refresh signs the session out.

pub mod refresh;
pub mod session;
pub mod storage;

pub use refresh::{ScheduledTask, DEFAULT_REFRESH_INTERVAL, MAX_REFRESH_INTERVAL};
pub use session::{AuthError, Session, SessionStatus, SessionStore};
pub use storage::{FileTokenStore, KeyringTokenStore, MemoryTokenStore, SessionData, TokenStore};
