//! Policy decision engine.
//!
//! An ordered rule list over a typed condition vocabulary. Rules are
//! scanned priority-descending with insertion order as the tiebreak; the
//! first rule whose conditions all hold decides. With no match the engine
//! falls back to the configured default, which is deny.
//!
//! Every condition evaluator is a pure function of the rule parameters and
//! the [`PolicyContext`]; missing data evaluates to `false` (negative
//! predicates to `true`).

pub mod config;
pub mod domain;

pub use config::PolicyConfig;
pub use domain::condition::PolicyCondition;
pub use domain::engine::PolicyEngine;
pub use domain::error::PolicyError;
pub use domain::model::{
    Decision, Effect, Environment, PolicyContext, PolicyRule, ResourceAttributes, Role,
    RoleAssignment, RoleScope, SubjectAttributes, SubjectRelationship, VerifiedAttribute,
};
