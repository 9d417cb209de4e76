//! Error taxonomy for the storage adapter surface.

use std::time::Duration;

/// Failures surfaced by a [`crate::StorageAdapter`].
///
/// `Timeout` maps to the conceptual `storage_timeout` code; everything else
/// that reaches a caller maps to `storage_failure`. Results derived from a
/// failed call are never cached.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The call exceeded its deadline.
    #[error("storage call exceeded deadline of {deadline:?}")]
    Timeout { deadline: Duration },

    /// The backend is unreachable or refused the connection.
    #[error("storage unavailable: {reason}")]
    Unavailable { reason: String },

    /// The backend rejected the statement.
    #[error("query failed: {message}")]
    Query { message: String },

    /// The statement violated the parametrization contract.
    #[error("invalid sql: {reason}")]
    InvalidSql { reason: String },

    /// A stored value could not be decoded.
    #[error("stored value could not be decoded: {reason}")]
    Codec { reason: String },
}

impl StorageError {
    /// Conceptual error code for audit and the service boundary.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Timeout { .. } => "storage_timeout",
            Self::Unavailable { .. } | Self::Query { .. } | Self::Codec { .. } => {
                "storage_failure"
            }
            Self::InvalidSql { .. } => "invalid_request",
        }
    }
}
