//! Gateway trait abstraction.

use async_trait::async_trait;
use railpilot_core::{
    AccountId, LogQuery, TaskDraft, TaskFilter, TaskId, TaskPatch, ValidationError,
};

/// Error type for gateway operations.
pub type Result<T> = std::result::Result<T, GatewayError>;

/// Errors that can occur while talking to the service.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// The service refused the request; carries its message
    #[error("{0}")]
    Rejected(String),

    /// The service answered with `success: false`
    #[error("{action} was not successful: {message}")]
    Unsuccessful {
        /// Action name
        action: &'static str,
        /// Message sent by the service
        message: String,
    },

    /// The request never got a response
    #[error("transport error: {0}")]
    Transport(String),

    /// The response did not have the expected shape
    #[error("unexpected response to {action}: {source}")]
    Decode {
        /// Action name
        action: &'static str,
        /// Underlying decode failure
        #[source]
        source: serde_json::Error,
    },

    /// Payload rejected locally before sending
    #[error("invalid request: {0}")]
    Invalid(#[from] ValidationError),

    /// Operation needs a selected account
    #[error("no account selected")]
    NoSelection,
}

/// An operation the service understands, with its parameters.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// List all active accounts
    ListAccounts,
    /// Register an account
    RegisterAccount {
        /// Username to register
        username: String,
    },
    /// Confirmed login status of an account
    LoginStatus {
        /// Target account
        account_id: AccountId,
    },
    /// Issue a login QR code
    LoginQrCode {
        /// Target account
        account_id: AccountId,
    },
    /// Poll a login QR code
    LoginQrStatus {
        /// Target account
        account_id: AccountId,
        /// QR code handle
        uuid: String,
    },
    /// End an account's external session
    Logout {
        /// Target account
        account_id: AccountId,
    },
    /// Delete an account
    DeleteAccount {
        /// Target account
        account_id: AccountId,
    },
    /// List tasks
    ListTasks {
        /// Which tasks to list
        filter: TaskFilter,
    },
    /// Fetch one task
    GetTask {
        /// Target task
        task_id: TaskId,
    },
    /// Create a task for an account
    CreateTask {
        /// Target account
        account_id: AccountId,
        /// Task definition
        draft: TaskDraft,
    },
    /// Patch a task
    UpdateTask {
        /// Target task
        task_id: TaskId,
        /// Fields to change
        patch: TaskPatch,
    },
    /// Delete a task
    DeleteTask {
        /// Target task
        task_id: TaskId,
    },
    /// Start a task
    StartTask {
        /// Target task
        task_id: TaskId,
    },
    /// Pause a running task
    StopTask {
        /// Target task
        task_id: TaskId,
    },
    /// Cancel a task
    CancelTask {
        /// Target task
        task_id: TaskId,
    },
    /// Fetch a task's log
    TaskLogs {
        /// Target task
        task_id: TaskId,
        /// Which entries to fetch
        query: LogQuery,
    },
}

impl Action {
    /// Stable name used in logs and errors.
    pub fn name(&self) -> &'static str {
        match self {
            Action::ListAccounts => "list_accounts",
            Action::RegisterAccount { .. } => "register_account",
            Action::LoginStatus { .. } => "login_status",
            Action::LoginQrCode { .. } => "login_qr_code",
            Action::LoginQrStatus { .. } => "login_qr_status",
            Action::Logout { .. } => "logout",
            Action::DeleteAccount { .. } => "delete_account",
            Action::ListTasks { .. } => "list_tasks",
            Action::GetTask { .. } => "get_task",
            Action::CreateTask { .. } => "create_task",
            Action::UpdateTask { .. } => "update_task",
            Action::DeleteTask { .. } => "delete_task",
            Action::StartTask { .. } => "start_task",
            Action::StopTask { .. } => "stop_task",
            Action::CancelTask { .. } => "cancel_task",
            Action::TaskLogs { .. } => "task_logs",
        }
    }
}

/// Request/response transport to the service.
///
/// Implementations translate an [`Action`] into a request and hand back the
/// parsed JSON body, or a normalized [`GatewayError`]. Retries and timeouts
/// are the implementation's business.
#[async_trait]
pub trait Gateway: Send + Sync {
    /// Perform one request.
    async fn request(&self, action: Action) -> Result<serde_json::Value>;
}
