//! Gateway abstraction and implementations for railpilot.
//!
//! This crate provides the trait-based transport the synchronization layers
//! talk through, with an HTTP implementation for the ticket service.

#![warn(missing_docs)]

pub mod trait_;
pub mod envelope;
pub mod http_gateway;
#[cfg(any(test, feature = "testing"))]
pub mod scripted;

pub use trait_::{Action, Gateway, GatewayError, Result};
pub use envelope::{Ack, Envelope, LogPage, TaskPage, call, call_data, decode};
pub use http_gateway::{HttpGateway, HttpGatewayConfig};
#[cfg(any(test, feature = "testing"))]
pub use scripted::{Hold, ScriptedGateway};
