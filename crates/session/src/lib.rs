//! Session state for railpilot.
//!
//! Tracks the known accounts, the selected account and its login status,
//! and keeps the selection durable across restarts.

#![warn(missing_docs)]

pub mod manager;
pub mod state;

pub use manager::SessionManager;
pub use state::{SessionEvent, SessionState};
