//! Domain errors for the policy engine.

/// Internal domain errors.
#[derive(Debug, thiserror::Error)]
pub enum PolicyError {
    /// A rule arrived with a condition the registry does not know.
    #[error("rule does not parse: {reason}")]
    InvalidRule { reason: String },

    /// A rule id was not found.
    #[error("no rule with id {id}")]
    RuleNotFound { id: uuid::Uuid },
}
