//! Domain errors for the ReBAC layer.

use authrim_storage::StorageError;

use super::expression::ExpressionParseError;

/// Internal domain errors.
#[derive(Debug, thiserror::Error)]
pub enum RebacError {
    /// Storage failed underneath an evaluation; never cached.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// A relation expression submitted for persistence is malformed.
    /// (Broken expressions already stored degrade to `direct` instead.)
    #[error("invalid relation expression: {0}")]
    InvalidExpression(#[from] ExpressionParseError),

    /// A value could not be read as a `type:id` object reference.
    #[error("not an object reference: {value}")]
    InvalidObject { value: String },

    /// Tuple uniqueness violated (the 6-tuple already exists).
    #[error("relationship tuple already exists")]
    DuplicateTuple,
}

impl RebacError {
    /// Conceptual code for audit and the service boundary.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Storage(e) => e.code(),
            Self::InvalidExpression(_) | Self::InvalidObject { .. } | Self::DuplicateTuple => {
                "invalid_request"
            }
        }
    }
}
