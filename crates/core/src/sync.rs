//! Result type for read paths.
//!
//! Read operations (list, refresh, detail, logs, restore) never fail at the
//! type level. When the remote call fails they hand back the last-known-good
//! value tagged [`Freshness::Stale`] instead.

/// How current a read result is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Freshness {
    /// Confirmed by the service during this call
    Fresh,
    /// Refresh failed; value is the previously held state
    Stale {
        /// Why the refresh failed
        reason: String,
    },
}

/// A read-path value plus its freshness.
#[derive(Debug, Clone, PartialEq)]
#[must_use]
pub struct Synced<T> {
    /// The value now held locally
    pub value: T,
    /// Whether it was confirmed during this call
    pub freshness: Freshness,
}

impl<T> Synced<T> {
    /// A value just confirmed by the service.
    pub fn fresh(value: T) -> Self {
        Self { value, freshness: Freshness::Fresh }
    }

    /// A retained value after a failed refresh.
    pub fn stale(value: T, reason: impl Into<String>) -> Self {
        Self { value, freshness: Freshness::Stale { reason: reason.into() } }
    }

    /// Whether the refresh succeeded.
    pub fn is_fresh(&self) -> bool {
        matches!(self.freshness, Freshness::Fresh)
    }

    /// Failure reason, if stale.
    pub fn stale_reason(&self) -> Option<&str> {
        match &self.freshness {
            Freshness::Fresh => None,
            Freshness::Stale { reason } => Some(reason),
        }
    }

    /// Transform the value, keeping freshness.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Synced<U> {
        Synced { value: f(self.value), freshness: self.freshness }
    }

    /// Drop the freshness tag.
    pub fn into_inner(self) -> T {
        self.value
    }
}
