//! Durable cache trait abstraction.

use railpilot_core::AccountId;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Error type for cache operations.
pub type Result<T> = std::result::Result<T, CacheError>;

/// Errors that can occur during cache operations.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A writer panicked while holding the cache
    #[error("cache lock poisoned")]
    Poisoned,
}

/// Well-known cache entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheKey {
    /// Id of the selected account
    SelectedAccountId,
    /// Serialized selected account
    SelectedAccount,
    /// Serialized login status of one account
    LoginStatus(AccountId),
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheKey::SelectedAccountId => write!(f, "selected_account_id"),
            CacheKey::SelectedAccount => write!(f, "selected_account"),
            CacheKey::LoginStatus(id) => write!(f, "login_status/{id}"),
        }
    }
}

/// Synchronous string key/value store that survives restarts.
///
/// Writes are immediate and last-write-wins.
pub trait Cache: Send + Sync {
    /// Read an entry.
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Write an entry.
    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Remove an entry. Removing a missing key is not an error.
    fn remove(&self, key: &str) -> Result<()>;

    /// Remove several entries in a single write.
    fn remove_all(&self, keys: &[&str]) -> Result<()>;
}

/// Typed access on top of [`Cache`].
pub trait CacheExt: Cache {
    /// Read and decode an entry.
    fn load<T: DeserializeOwned>(&self, key: CacheKey) -> Result<Option<T>> {
        match self.get(&key.to_string())? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    /// Encode and write an entry.
    fn store<T: Serialize + ?Sized>(&self, key: CacheKey, value: &T) -> Result<()> {
        let raw = serde_json::to_string(value)?;
        self.set(&key.to_string(), &raw)
    }

    /// Remove one entry.
    fn forget(&self, key: CacheKey) -> Result<()> {
        self.remove(&key.to_string())
    }

    /// Remove several entries in one write.
    fn forget_all(&self, keys: &[CacheKey]) -> Result<()> {
        let names: Vec<String> = keys.iter().map(ToString::to_string).collect();
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();
        self.remove_all(&refs)
    }
}

impl<C: Cache + ?Sized> CacheExt for C {}
