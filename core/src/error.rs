//! Error types for the todo client.
//!
//! # Design
//! `ApiError` classifies what went wrong on a single round trip with the
//! remote store. The four kinds a caller reacts to (`NetworkFailure`,
//! `AuthRejected`, `ValidationFailure`, `NotFound`) get dedicated variants;
//! any other non-2xx response lands in `HttpError` with the raw status code
//! and body for debugging.
//!
//! `SyncError` is what the synchronizer returns: either a local guard that
//! refused the operation before any request was built, or a wrapped
//! `ApiError` from the completion of a request.
//!
//! All variants carry owned strings so errors can be cloned into
//! `CollectionState::Error` and compared in tests.

use thiserror::Error;

use crate::types::TodoId;

/// Errors returned by `TodoClient` parse methods and transports.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    /// The request could not be sent or no response arrived.
    #[error("network failure: {0}")]
    NetworkFailure(String),

    /// The server returned 401 or 403: the credential is invalid or expired.
    #[error("authentication rejected: {0}")]
    AuthRejected(String),

    /// The server rejected the payload (400, 409 or 422).
    #[error("rejected by server: {0}")]
    ValidationFailure(String),

    /// The server returned 404: the requested todo does not exist.
    #[error("resource not found")]
    NotFound,

    /// The server returned a non-2xx status not covered above.
    #[error("HTTP {status}: {body}")]
    HttpError { status: u16, body: String },

    /// The response body could not be deserialized into the expected type.
    #[error("deserialization failed: {0}")]
    DeserializationError(String),

    /// The request payload could not be serialized to JSON.
    #[error("serialization failed: {0}")]
    SerializationError(String),
}

impl ApiError {
    /// True when the remote store no longer accepts the credential. Callers
    /// usually answer this with `SessionManager::logout`.
    pub fn is_auth_rejected(&self) -> bool {
        matches!(self, ApiError::AuthRejected(_))
    }
}

/// A transport could not complete the HTTP round trip.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct TransportError(pub String);

impl From<TransportError> for ApiError {
    fn from(err: TransportError) -> Self {
        ApiError::NetworkFailure(err.0)
    }
}

/// Errors returned by `TodoSync` operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    #[error("not signed in")]
    Unauthenticated,

    #[error("todo list is not loaded")]
    NotReady,

    #[error("todo list is already loading")]
    LoadInFlight,

    #[error("title must not be empty")]
    EmptyTitle,

    #[error("no todo with id {0}")]
    UnknownTodo(TodoId),

    #[error("no edit in progress")]
    NoActiveDraft,

    /// The response belongs to a session that has since ended or changed.
    #[error("response arrived for a previous session")]
    Stale,

    #[error(transparent)]
    Api(#[from] ApiError),
}

impl SyncError {
    /// The remote error behind this failure, if a request was involved.
    pub fn api_error(&self) -> Option<&ApiError> {
        match self {
            SyncError::Api(err) => Some(err),
            _ => None,
        }
    }

    pub fn is_auth_rejected(&self) -> bool {
        self.api_error().is_some_and(ApiError::is_auth_rejected)
    }
}

/// Errors from reading or writing a persisted credential.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("credential store I/O failed: {0}")]
    Io(#[from] std::io::Error),
}
