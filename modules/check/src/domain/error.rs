//! Domain errors for the check service.

use authrim_rebac::RebacError;
use authrim_storage::StorageError;

/// Internal domain errors.
#[derive(Debug, thiserror::Error)]
pub enum CheckError {
    #[error("malformed permission: {reason}")]
    InvalidPermission { reason: String },

    #[error("check service is disabled")]
    FeatureDisabled,

    #[error("batch of {len} exceeds the maximum of {max}")]
    BatchTooLarge { len: usize, max: usize },

    #[error(transparent)]
    Rebac(#[from] RebacError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl CheckError {
    /// Conceptual code for audit and the service boundary.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidPermission { .. } | Self::BatchTooLarge { .. } => "invalid_request",
            Self::FeatureDisabled => "feature_disabled",
            Self::Rebac(e) => e.code(),
            Self::Storage(e) => e.code(),
        }
    }
}
