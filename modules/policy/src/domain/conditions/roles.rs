//! Role, ownership, organization, and relationship evaluators.

use crate::domain::model::{PolicyContext, RoleScope};

/// Any active assignment satisfying the `(name, scope, target)` query.
#[must_use]
pub fn has_role(
    ctx: &PolicyContext,
    role: &str,
    scope: RoleScope,
    scope_target: Option<&str>,
) -> bool {
    ctx.subject
        .roles
        .iter()
        .any(|assignment| assignment.matches(role, scope, scope_target, ctx.timestamp))
}

/// `subject.id == resource.owner_id`.
#[must_use]
pub fn is_resource_owner(ctx: &PolicyContext) -> bool {
    ctx.resource
        .owner_id
        .as_deref()
        .is_some_and(|owner| owner == ctx.subject.id)
}

/// Both org ids present and equal.
#[must_use]
pub fn same_organization(ctx: &PolicyContext) -> bool {
    match (ctx.subject.org_id.as_deref(), ctx.resource.org_id.as_deref()) {
        (Some(subject_org), Some(resource_org)) => subject_org == resource_org,
        _ => false,
    }
}

/// A non-expired relationship to the resource owner whose type is in the
/// allowlist.
#[must_use]
pub fn has_relationship(ctx: &PolicyContext, allowed_types: &[String]) -> bool {
    let Some(owner) = ctx.resource.owner_id.as_deref() else {
        return false;
    };
    ctx.subject.relationships.iter().any(|relationship| {
        relationship.target == owner
            && relationship
                .expires_at
                .is_none_or(|at| at > ctx.timestamp)
            && allowed_types
                .iter()
                .any(|t| *t == relationship.relationship_type)
    })
}
