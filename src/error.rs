//! Error types for the visit-recording pipeline.
//!
//! Two layers of errors exist:
//!
//! - [`StoreError`] is returned by every [`RecordStore`](crate::store::RecordStore)
//!   implementation and describes what went wrong talking to the backend.
//! - [`Error`] is returned by the record manager, the counter engine and the
//!   visit logger. It distinguishes the failures the dispatcher treats
//!   differently (an unreachable store, a corrupted counter, a record that
//!   could not be provisioned).
//!
//! None of these errors ever reaches a visitor: the dispatcher logs them and
//! the HTTP layer serves the pixel regardless.

use thiserror::Error;

/// Errors raised by a storage adapter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Network, authentication, throttling or server-side failure.
    ///
    /// These are the only failures worth retrying.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// A record with this name already exists.
    #[error("record already exists: {0}")]
    AlreadyExists(String),

    /// The named record does not exist.
    #[error("record not found: {0}")]
    NotFound(String),

    /// The store refused the request (invalid name, invalid range, ...).
    #[error("rejected by store: {0}")]
    Rejected(String),
}

impl StoreError {
    /// Returns `true` if retrying the same call may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

/// Errors raised by the recording components.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// The backend could not be reached.
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    /// The counter cell holds something that is not a non-negative integer.
    ///
    /// This is a data-integrity failure: the stored value is reported as-is
    /// and the counter is never reset.
    #[error("malformed counter for `{resource}`: {value:?}")]
    MalformedCounter { resource: String, value: String },

    /// The record does not exist and could not be provisioned.
    #[error("record not found: `{resource}`")]
    RecordNotFound { resource: String },

    /// Any other adapter failure.
    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for Error {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Unavailable(msg) => Error::StoreUnavailable(msg),
            StoreError::NotFound(resource) => Error::RecordNotFound { resource },
            other => Error::Store(other),
        }
    }
}

/// Result type for the recording components.
pub type Result<T> = std::result::Result<T, Error>;
