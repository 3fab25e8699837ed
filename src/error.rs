//! The error taxonomy shared by the store, the projector, the remote adapter and the sync engine.

use thiserror::Error;

/// The message surfaced when the server cannot be reached or does not answer with JSON.
pub const SERVER_NOT_AVAILABLE: &str = "Server not available. Try again later";

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// An entity lookup missed.
    #[error("{entity} '{id}' was not found")]
    NotFound { entity: &'static str, id: String },

    /// Two amounts with different currency codes were combined.
    #[error("cannot combine an amount in {left} with an amount in {right}")]
    CurrencyMismatch { left: String, right: String },

    /// A recurrence rule uses a frequency or interval the projector cannot step through.
    #[error("unsupported recurrence: {0}")]
    UnsupportedFrequency(String),

    /// A local update attempted to flip a category between expense and income.
    #[error("the kind of category '{id}' cannot be changed from {from} to {to}")]
    ImmutableCategoryKind {
        id: String,
        from: String,
        to: String,
    },

    /// A value failed validation before it reached the store.
    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },

    /// The request never produced an HTTP response.
    #[error("{message}")]
    NetworkUnavailable { message: String },

    /// The server answered with a non-success status.
    #[error("{message} (status {status})")]
    Server { status: u16, message: String },

    /// The server rejected the bearer token with a 403.
    #[error("the session has expired, please log in again")]
    SessionExpired,

    /// `sync` was called while another cycle was still running.
    #[error("a sync cycle is already in progress")]
    SyncInProgress,

    #[error(transparent)]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    pub(crate) fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Error::NotFound {
            entity,
            id: id.into(),
        }
    }

    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Error::Invalid {
            field,
            reason: reason.into(),
        }
    }

    pub(crate) fn network_unavailable() -> Self {
        Error::NetworkUnavailable {
            message: SERVER_NOT_AVAILABLE.to_string(),
        }
    }

    /// The HTTP status associated with this error, if it came from (or failed to reach) a server.
    /// Pure network failures report 500.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::NetworkUnavailable { .. } => Some(500),
            Error::Server { status, .. } => Some(*status),
            Error::SessionExpired => Some(403),
            _ => None,
        }
    }

    /// Whether a whole sync cycle may be attempted again after this error.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::NetworkUnavailable { .. } | Error::Server { .. }
        )
    }
}
