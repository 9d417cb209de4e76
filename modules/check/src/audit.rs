//! Audit event types and emission.
//!
//! Event names live in per-category tables. A few short keys (`CREATED`,
//! `DELETED`, `UPDATED`) exist in more than one category; the merged
//! lookup resolves them to the client category, so callers that care
//! should use the category tables directly.

use tracing::info;

use crate::domain::model::CheckResult;

/// Client lifecycle events.
pub mod client_events {
    pub const CREATED: &str = "client.created";
    pub const UPDATED: &str = "client.updated";
    pub const DELETED: &str = "client.deleted";
    pub const SECRET_ROTATED: &str = "client.secret_rotated";
}

/// User lifecycle events.
pub mod user_events {
    pub const CREATED: &str = "user.created";
    pub const UPDATED: &str = "user.updated";
    pub const DELETED: &str = "user.deleted";
    pub const LOCKED: &str = "user.locked";
}

/// Token and protocol-state events.
pub mod token_events {
    pub const ISSUED: &str = "token.issued";
    pub const ROTATED: &str = "token.rotated";
    pub const REUSE_DETECTED: &str = "token.reuse_detected";
    pub const FAMILY_REVOKED: &str = "token.family_revoked";
    pub const SINGLE_USE_VIOLATION: &str = "token.single_use_violation";
}

/// Authorization decision events.
pub mod decision_events {
    pub const CHECKED: &str = "authz.checked";
    pub const DENIED: &str = "authz.denied";
}

/// Merged lookup by bare key. Categories are merged client-first, so a
/// key present in several categories resolves to the client table.
#[must_use]
pub fn event_type(key: &str) -> Option<&'static str> {
    let client = [
        ("CREATED", client_events::CREATED),
        ("UPDATED", client_events::UPDATED),
        ("DELETED", client_events::DELETED),
        ("SECRET_ROTATED", client_events::SECRET_ROTATED),
    ];
    let user = [
        ("CREATED", user_events::CREATED),
        ("UPDATED", user_events::UPDATED),
        ("DELETED", user_events::DELETED),
        ("LOCKED", user_events::LOCKED),
    ];
    let token = [
        ("ISSUED", token_events::ISSUED),
        ("ROTATED", token_events::ROTATED),
        ("REUSE_DETECTED", token_events::REUSE_DETECTED),
        ("FAMILY_REVOKED", token_events::FAMILY_REVOKED),
        ("SINGLE_USE_VIOLATION", token_events::SINGLE_USE_VIOLATION),
    ];

    client
        .iter()
        .chain(user.iter())
        .chain(token.iter())
        .find(|(k, _)| *k == key)
        .map(|(_, v)| *v)
}

/// Emit a structured decision event.
pub fn emit_decision(tenant: &str, subject_id: &str, permission: &str, result: &CheckResult) {
    let event = if result.allowed {
        decision_events::CHECKED
    } else {
        decision_events::DENIED
    };
    info!(
        target: "authrim::audit",
        event,
        tenant,
        subject_id,
        permission,
        allowed = result.allowed,
        resolved_via = ?result.resolved_via,
    );
}
