//! railpilot core data models.
//!
//! This crate defines the account, session and task structures shared by the
//! session and task synchronization layers.

#![warn(missing_docs)]

// Identities
mod id;

// Accounts and login sessions
mod account;

// Tasks and their logs
mod task;

// Read-path results
mod sync;

// Re-exports
pub use id::*;

pub use account::{Account, LoginStatus, LoginQrCode, QrPoll, QrScanState};
pub use task::{
    Task, TaskStatus, Passenger, TaskDraft, TaskPatch, TaskLogEntry, TaskFilter, LogQuery,
    ValidationError,
};
pub use sync::{Synced, Freshness};

/// Timestamp type. The service reports naive wall-clock times.
pub type Time = chrono::NaiveDateTime;
