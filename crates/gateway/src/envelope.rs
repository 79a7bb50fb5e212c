//! Response shapes and typed decoding.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use railpilot_core::{Task, TaskLogEntry};

use crate::{Action, Gateway, GatewayError, Result};

/// Standard `{success, message, data}` wrapper.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<T> {
    /// Whether the service accepted the request
    #[serde(default)]
    pub success: bool,

    /// Human-readable outcome
    #[serde(default)]
    pub message: String,

    /// Payload, when the action returns one
    pub data: Option<T>,
}

impl<T> Envelope<T> {
    /// Payload of a successful response.
    ///
    /// `success: false` or a missing payload is reported as
    /// [`GatewayError::Unsuccessful`].
    pub fn into_data(self, action: &'static str) -> Result<T> {
        match (self.success, self.data) {
            (true, Some(data)) => Ok(data),
            (true, None) => Err(GatewayError::Unsuccessful {
                action,
                message: "response carried no data".to_string(),
            }),
            (false, _) => Err(GatewayError::Unsuccessful { action, message: self.message }),
        }
    }

    /// Keep the envelope only if the service reported success.
    pub fn ensure_success(self, action: &'static str) -> Result<Self> {
        if self.success {
            Ok(self)
        } else {
            Err(GatewayError::Unsuccessful { action, message: self.message })
        }
    }
}

/// Acknowledgment returned by lifecycle actions.
pub type Ack = Envelope<serde_json::Value>;

/// One page of tasks.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskPage {
    /// Matching tasks on the service
    #[serde(default)]
    pub total: u64,

    /// This page
    #[serde(default)]
    pub tasks: Vec<Task>,
}

/// One page of log entries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LogPage {
    /// Entries returned
    #[serde(default)]
    pub total: u64,

    /// Entries, newest first
    #[serde(default)]
    pub logs: Vec<TaskLogEntry>,
}

/// Decode a raw response body.
pub fn decode<T: DeserializeOwned>(action: &'static str, value: serde_json::Value) -> Result<T> {
    serde_json::from_value(value).map_err(|source| GatewayError::Decode { action, source })
}

/// Perform `action` and decode the response as `T`.
pub async fn call<T: DeserializeOwned>(gateway: &dyn Gateway, action: Action) -> Result<T> {
    let name = action.name();
    let value = gateway.request(action).await?;
    decode(name, value)
}

/// Perform `action` and return the payload of a successful envelope.
pub async fn call_data<T: DeserializeOwned>(gateway: &dyn Gateway, action: Action) -> Result<T> {
    let name = action.name();
    let envelope: Envelope<T> = call(gateway, action).await?;
    envelope.into_data(name)
}
