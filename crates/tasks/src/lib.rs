//! Task lifecycle state for railpilot.
//!
//! Mirrors the service's ticket tasks locally and applies lifecycle
//! transitions only after the service confirms them.

#![warn(missing_docs)]

pub mod locks;
pub mod manager;
pub mod state;

pub use locks::KeyedLocks;
pub use manager::TaskLifecycleManager;
pub use state::{TaskEvent, TaskState};
