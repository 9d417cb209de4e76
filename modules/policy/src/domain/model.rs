//! Policy rules, decisions, and the evaluation context.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::condition::PolicyCondition;

/// Rule effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Effect {
    Allow,
    Deny,
}

/// A policy rule. Rules are totally ordered by descending priority with
/// insertion order breaking ties.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyRule {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub priority: i32,
    pub effect: Effect,
    #[serde(default)]
    pub conditions: Vec<PolicyCondition>,
}

impl PolicyRule {
    #[must_use]
    pub fn new(name: impl Into<String>, priority: i32, effect: Effect) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            description: String::new(),
            priority,
            effect,
            conditions: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_condition(mut self, condition: PolicyCondition) -> Self {
        self.conditions.push(condition);
        self
    }
}

/// Outcome of one policy evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decision {
    pub allowed: bool,
    pub reason: String,
    /// Rule name that decided, or `default`.
    pub decided_by: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// A named role carrying permission strings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Role {
    pub id: Uuid,
    pub tenant: String,
    /// Unique per tenant.
    pub name: String,
    pub permissions: HashSet<String>,
    pub created_at: DateTime<Utc>,
}

/// Scope a role assignment applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoleScope {
    Global,
    Org,
    Resource,
}

/// A role granted to a subject.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleAssignment {
    pub role: String,
    pub scope: RoleScope,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope_target: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl RoleAssignment {
    /// Active iff `expires_at` is absent or in the future.
    #[must_use]
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }

    /// Does this assignment satisfy a query for `(name, scope, target)`?
    ///
    /// A query for the `global` scope is satisfied only by `global`
    /// assignments; any other scope requires an exact scope match, and an
    /// exact `scope_target` match when the query names one.
    #[must_use]
    pub fn matches(
        &self,
        name: &str,
        scope: RoleScope,
        scope_target: Option<&str>,
        now: DateTime<Utc>,
    ) -> bool {
        if self.role != name || !self.is_active(now) || self.scope != scope {
            return false;
        }
        match scope_target {
            Some(target) => self.scope_target.as_deref() == Some(target),
            None => true,
        }
    }
}

/// An attribute vouched for by a verifier, with optional expiry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifiedAttribute {
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl VerifiedAttribute {
    #[must_use]
    pub fn is_live(&self, now: DateTime<Utc>, check_expiry: bool) -> bool {
        !check_expiry || self.expires_at.is_none_or(|at| at > now)
    }
}

/// A relationship the subject holds toward another principal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubjectRelationship {
    pub relationship_type: String,
    /// The other principal's id.
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

/// Everything known about the requesting subject.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubjectAttributes {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub org_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan: Option<String>,
    #[serde(default)]
    pub roles: Vec<RoleAssignment>,
    #[serde(default)]
    pub attributes: HashMap<String, VerifiedAttribute>,
    #[serde(default)]
    pub relationships: Vec<SubjectRelationship>,
}

/// Everything known about the target resource.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResourceAttributes {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub org_id: Option<String>,
    #[serde(default)]
    pub properties: HashMap<String, serde_json::Value>,
}

/// Request environment: network origin and rate counters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Environment {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    /// ISO 3166 alpha-2.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(default)]
    pub request_counts: HashMap<String, u64>,
}

/// The evaluation context handed to every condition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyContext {
    pub subject: SubjectAttributes,
    #[serde(default)]
    pub resource: ResourceAttributes,
    pub action: String,
    #[serde(default)]
    pub environment: Environment,
    pub timestamp: DateTime<Utc>,
}

impl PolicyContext {
    #[must_use]
    pub fn new(subject: SubjectAttributes, action: impl Into<String>) -> Self {
        Self {
            subject,
            resource: ResourceAttributes::default(),
            action: action.into(),
            environment: Environment::default(),
            timestamp: Utc::now(),
        }
    }
}
