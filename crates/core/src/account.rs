//! Account and login-session models.

use serde::{Deserialize, Serialize};
use crate::id::AccountId;
use crate::Time;

/// An external account the client can act on behalf of.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    /// Unique identifier
    pub id: AccountId,

    /// Local display name
    pub username: String,

    /// Username on the railway service, known once logged in
    #[serde(default)]
    pub railway_username: Option<String>,

    /// Last-known login flag
    #[serde(default)]
    pub is_logged_in: bool,

    /// Soft-delete marker kept by the service
    #[serde(default = "default_true")]
    pub is_active: bool,

    /// When the current session was established
    #[serde(default)]
    pub login_time: Option<Time>,

    /// Registration timestamp
    #[serde(default)]
    pub created_at: Option<Time>,
}

fn default_true() -> bool {
    true
}

impl Account {
    /// Status implied by the account's last-known flag.
    ///
    /// Only meaningful when the flag says the session is active; used to
    /// avoid showing a logged-out state while confirmation is in flight.
    pub fn provisional_status(&self) -> Option<LoginStatus> {
        self.is_logged_in.then(|| LoginStatus {
            is_logged_in: true,
            username: Some(self.username.clone()),
            railway_username: self.railway_username.clone(),
            login_time: self.login_time,
            expire_time: None,
            extra: serde_json::Map::new(),
        })
    }
}

/// Whether an account's external session is live.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoginStatus {
    /// Session is active
    pub is_logged_in: bool,

    /// Local display name
    #[serde(default)]
    pub username: Option<String>,

    /// Username on the railway service
    #[serde(default)]
    pub railway_username: Option<String>,

    /// Session start
    #[serde(default)]
    pub login_time: Option<Time>,

    /// Session expiry, when the service knows it
    #[serde(default)]
    pub expire_time: Option<Time>,

    /// Fields the service sent that the client does not model
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl LoginStatus {
    /// A status reporting no active session.
    pub fn logged_out() -> Self {
        Self {
            is_logged_in: false,
            username: None,
            railway_username: None,
            login_time: None,
            expire_time: None,
            extra: serde_json::Map::new(),
        }
    }
}

/// QR code issued for scanning with the railway mobile app.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginQrCode {
    /// Handle used to poll the scan state
    pub uuid: String,

    /// PNG image, base64 encoded
    pub image_base64: String,
}

/// Scan state of a login QR code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QrScanState {
    /// Not scanned yet
    Waiting,
    /// Scanned, waiting for confirmation on the phone
    Scanned,
    /// Confirmed; the session is established
    Confirmed,
    /// Code expired; request a new one
    Expired,
    /// Service-side failure
    Error,
}

impl QrScanState {
    /// Map the service's numeric code.
    pub fn from_code(code: i64) -> Self {
        match code {
            0 => Self::Waiting,
            1 => Self::Scanned,
            2 => Self::Confirmed,
            3 => Self::Expired,
            _ => Self::Error,
        }
    }

    /// No further polling is useful.
    pub fn is_final(self) -> bool {
        matches!(self, Self::Confirmed | Self::Expired | Self::Error)
    }
}

impl std::fmt::Display for QrScanState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QrScanState::Waiting => write!(f, "waiting"),
            QrScanState::Scanned => write!(f, "scanned"),
            QrScanState::Confirmed => write!(f, "confirmed"),
            QrScanState::Expired => write!(f, "expired"),
            QrScanState::Error => write!(f, "error"),
        }
    }
}

/// Result of polling a login QR code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QrPoll {
    /// Numeric scan state as sent by the service
    pub status: i64,

    /// Human-readable state
    #[serde(default)]
    pub message: String,

    /// Login completed
    #[serde(default)]
    pub is_success: bool,
}

impl QrPoll {
    /// Typed scan state.
    pub fn state(&self) -> QrScanState {
        if self.is_success {
            QrScanState::Confirmed
        } else {
            QrScanState::from_code(self.status)
        }
    }
}
