//! Check requests, permissions, and results.

use serde::{Deserialize, Serialize};

use authrim_policy::Environment;
use authrim_rebac::ContextTuple;

use super::error::CheckError;

/// A parsed permission string: `"<resource>:<id?>:<action>"`, with
/// `resource::action` (empty id) and `resource:action` (no id segment)
/// both meaning type-level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
    pub resource: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub action: String,
}

impl Permission {
    /// Parse a permission string.
    ///
    /// # Errors
    ///
    /// [`CheckError::InvalidPermission`] for more than two colons, or an
    /// empty resource/action. Colons inside ids are not supported.
    pub fn parse(raw: &str) -> Result<Self, CheckError> {
        let parts: Vec<&str> = raw.split(':').collect();
        let (resource, id, action) = match parts.as_slice() {
            [resource, action] => (*resource, None, *action),
            [resource, id, action] => {
                let id = if id.is_empty() { None } else { Some(*id) };
                (*resource, id, *action)
            }
            _ => {
                return Err(CheckError::InvalidPermission {
                    reason: format!("expected resource[:id]:action, got {} segments", parts.len()),
                });
            }
        };
        if resource.is_empty() || action.is_empty() {
            return Err(CheckError::InvalidPermission {
                reason: "resource and action must be non-empty".to_owned(),
            });
        }
        Ok(Self {
            resource: resource.to_owned(),
            id: id.map(ToOwned::to_owned),
            action: action.to_owned(),
        })
    }
}

/// The ReBAC leg of a check request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RebacQuery {
    pub relation: String,
    /// Object as `type:id`, or a bare id with `object_type` set.
    pub object: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object_type: Option<String>,
    #[serde(default)]
    pub context_tuples: Vec<ContextTuple>,
}

/// Resource and environment facts supplied by the caller.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResourceContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub org_id: Option<String>,
    #[serde(default)]
    pub properties: std::collections::HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub environment: Environment,
}

/// One authorization question.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckRequest {
    pub subject_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject_type: Option<String>,
    /// `"<resource>:<id?>:<action>"`.
    pub permission: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_context: Option<ResourceContext>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rebac: Option<RebacQuery>,
}

/// One decision with its evidence trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckResult {
    pub allowed: bool,
    /// Ordered evidence sources (`context`, `cache`, `closure`,
    /// `evaluation`, `policy:<rule>`, `default`, `storage_error`).
    pub resolved_via: Vec<String>,
    /// `allow` or `deny`.
    pub final_decision: String,
    /// Seconds the decision may be reused.
    pub cache_ttl: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debug: Option<serde_json::Value>,
}

impl CheckResult {
    #[must_use]
    pub fn denied(resolved_via: Vec<String>, cache_ttl: u64) -> Self {
        Self {
            allowed: false,
            resolved_via,
            final_decision: "deny".to_owned(),
            cache_ttl,
            debug: None,
        }
    }
}

/// A batch of checks evaluated in order under one request cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchRequest {
    pub checks: Vec<CheckRequest>,
    #[serde(default)]
    pub stop_on_deny: bool,
}

/// Batch outcome; partial when `stop_on_deny` tripped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchResult {
    pub results: Vec<CheckResult>,
    /// Index of the deny that halted the batch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stopped_at: Option<usize>,
}
