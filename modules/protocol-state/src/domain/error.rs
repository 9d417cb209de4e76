//! Error taxonomy for the protocol-state stores.
//!
//! `not_found`, `expired`, and `single_use_violation` are deliberately
//! distinct so the audit trail can tell a replayed key from a stale one.

/// Failures from the consume-once stores.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SingleUseError {
    #[error("key not found")]
    NotFound,

    #[error("key expired")]
    Expired,

    /// Already consumed, or presented by the wrong client.
    #[error("single-use violation")]
    SingleUseViolation,

    /// `store` hit an existing key.
    #[error("key already exists")]
    KeyExists,
}

impl SingleUseError {
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::Expired => "expired",
            Self::SingleUseViolation => "single_use_violation",
            Self::KeyExists => "invalid_request",
        }
    }
}

/// Failures from the refresh-token rotation store.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RotationError {
    #[error("token not found")]
    NotFound,

    #[error("token expired")]
    Expired,

    /// The presented pair does not belong to the same client and subject.
    #[error("token owner mismatch")]
    OwnerMismatch,

    /// The family was revoked earlier.
    #[error("token family {family_id} is revoked")]
    FamilyRevoked { family_id: String },

    /// A rotated token was replayed; the whole family is now revoked.
    #[error("token reuse detected; family {family_id} revoked")]
    ReuseDetected {
        family_id: String,
        revoked_tokens: Vec<String>,
    },

    #[error("token id already exists")]
    TokenExists,
}

impl RotationError {
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::Expired => "expired",
            Self::OwnerMismatch => "forbidden",
            Self::FamilyRevoked { .. } => "single_use_violation",
            Self::ReuseDetected { .. } => "reuse_detected",
            Self::TokenExists => "invalid_request",
        }
    }
}
