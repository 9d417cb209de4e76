//! Configuration for the policy engine.

use serde::Deserialize;

use crate::domain::model::Effect;

/// Configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PolicyConfig {
    /// Decision returned when no rule matches.
    pub default_decision: Effect,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            default_decision: Effect::Deny,
        }
    }
}
