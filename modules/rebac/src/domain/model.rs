//! Relationship models and identifier normalization.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Default subject type assumed when a bare id is given.
pub const DEFAULT_SUBJECT_TYPE: &str = "user";

/// A typed object reference (`document:doc_456`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectRef {
    pub object_type: String,
    pub object_id: String,
}

impl ObjectRef {
    #[must_use]
    pub fn new(object_type: impl Into<String>, object_id: impl Into<String>) -> Self {
        Self {
            object_type: object_type.into(),
            object_id: object_id.into(),
        }
    }

    /// Parse a `type:id` reference. A bare value with `fallback_type`
    /// present becomes `fallback_type:value`.
    #[must_use]
    pub fn parse(value: &str, fallback_type: Option<&str>) -> Option<Self> {
        match value.split_once(':') {
            Some((object_type, object_id)) if !object_type.is_empty() && !object_id.is_empty() => {
                Some(Self::new(object_type, object_id))
            }
            Some(_) => None,
            None => fallback_type.map(|t| Self::new(t, value)),
        }
    }
}

impl std::fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.object_type, self.object_id)
    }
}

/// A normalized subject (`user:user_123`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubjectRef {
    pub subject_type: String,
    pub subject_id: String,
}

impl SubjectRef {
    #[must_use]
    pub fn new(subject_type: impl Into<String>, subject_id: impl Into<String>) -> Self {
        Self {
            subject_type: subject_type.into(),
            subject_id: subject_id.into(),
        }
    }

    /// Normalize a raw subject string: accepts `type:id` and bare ids
    /// (which get the `user` type).
    #[must_use]
    pub fn normalize(raw: &str) -> Self {
        match raw.split_once(':') {
            Some((subject_type, subject_id)) if !subject_type.is_empty() => {
                Self::new(subject_type, subject_id)
            }
            _ => Self::new(DEFAULT_SUBJECT_TYPE, raw),
        }
    }
}

impl std::fmt::Display for SubjectRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.subject_type, self.subject_id)
    }
}

/// A stored relationship tuple. Immutable; updates are delete + insert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipTuple {
    pub tenant: String,
    pub from_type: String,
    pub from_id: String,
    pub relation: String,
    pub to_type: String,
    pub to_id: String,
    pub created_at: DateTime<Utc>,
}

impl RelationshipTuple {
    #[must_use]
    pub fn from_ref(&self) -> ObjectRef {
        ObjectRef::new(self.from_type.clone(), self.from_id.clone())
    }

    #[must_use]
    pub fn to_ref(&self) -> ObjectRef {
        ObjectRef::new(self.to_type.clone(), self.to_id.clone())
    }
}

/// A per-request relationship considered before any stored tuple.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextTuple {
    /// Subject, bare or `type:id`.
    pub subject: String,
    pub relation: String,
    /// Object as `type:id`.
    pub object: String,
}

impl ContextTuple {
    /// Canonical `subject|relation|object` form used for fingerprints and
    /// equality checks.
    #[must_use]
    pub fn normalized(&self) -> Option<String> {
        let subject = SubjectRef::normalize(&self.subject);
        let object = ObjectRef::parse(&self.object, None)?;
        Some(format!("{subject}|{}|{object}", self.relation))
    }
}

/// A versioned rewrite rule for `(object_type, relation)`.
///
/// `expression` holds the raw JSON; it is parsed on use so a broken stored
/// definition degrades instead of failing checks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationDefinition {
    pub tenant: String,
    pub object_type: String,
    pub relation_name: String,
    pub expression: String,
    pub updated_at: DateTime<Utc>,
}

/// How a check was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolvedVia {
    Context,
    Cache,
    Closure,
    Evaluation,
}

impl ResolvedVia {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Context => "context",
            Self::Cache => "cache",
            Self::Closure => "closure",
            Self::Evaluation => "evaluation",
        }
    }
}

impl std::fmt::Display for ResolvedVia {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one ReBAC check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckOutcome {
    pub allowed: bool,
    pub resolved_via: ResolvedVia,
    /// Ordered markers describing how the decision was reached.
    pub path: Vec<String>,
}

impl CheckOutcome {
    #[must_use]
    pub fn new(allowed: bool, resolved_via: ResolvedVia, path: Vec<String>) -> Self {
        Self {
            allowed,
            resolved_via,
            path,
        }
    }
}
