//! Subject profile loading.
//!
//! The policy engine needs the subject's effective roles, verified
//! attributes, and relationships. They come through this seam: a SQL
//! implementation over the storage adapter, and an in-memory directory
//! for tests and embedded use.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;

use authrim_policy::{RoleAssignment, RoleScope, SubjectAttributes, SubjectRelationship, VerifiedAttribute};
use authrim_storage::{DEFAULT_STORAGE_DEADLINE, Row, StorageAdapter, with_deadline};

use super::error::CheckError;

const ROLES_QUERY: &str = "SELECT role_name, scope, scope_target, expires_at FROM role_assignments WHERE tenant = ? AND subject_id = ?";
const ATTRIBUTES_QUERY: &str = "SELECT name, value, expires_at FROM verified_attributes WHERE tenant = ? AND subject_id = ?";
const RELATIONSHIPS_QUERY: &str = "SELECT relationship_type, target, expires_at FROM subject_relationships WHERE tenant = ? AND subject_id = ?";
const PROFILE_QUERY: &str = "SELECT user_type, org_id, plan FROM subjects WHERE tenant = ? AND subject_id = ? LIMIT 1";

/// Loads a subject's effective profile.
#[async_trait]
pub trait SubjectDirectory: Send + Sync {
    async fn load(&self, tenant: &str, subject_id: &str) -> Result<SubjectAttributes, CheckError>;
}

/// SQL-backed directory.
pub struct SqlSubjectDirectory {
    adapter: Arc<dyn StorageAdapter>,
    deadline: Duration,
}

impl SqlSubjectDirectory {
    #[must_use]
    pub fn new(adapter: Arc<dyn StorageAdapter>) -> Self {
        Self {
            adapter,
            deadline: DEFAULT_STORAGE_DEADLINE,
        }
    }

    fn role_from_row(row: &Row) -> Option<RoleAssignment> {
        let scope = match row.get_text("scope")? {
            "global" => RoleScope::Global,
            "org" => RoleScope::Org,
            "resource" => RoleScope::Resource,
            _ => return None,
        };
        Some(RoleAssignment {
            role: row.get_text("role_name")?.to_owned(),
            scope,
            scope_target: row.get_text("scope_target").map(ToOwned::to_owned),
            expires_at: row.get_datetime("expires_at"),
        })
    }
}

#[async_trait]
impl SubjectDirectory for SqlSubjectDirectory {
    async fn load(&self, tenant: &str, subject_id: &str) -> Result<SubjectAttributes, CheckError> {
        let params = [tenant.into(), subject_id.into()];

        let profile = with_deadline(self.deadline, self.adapter.query(PROFILE_QUERY, &params))
            .await?;
        let roles = with_deadline(self.deadline, self.adapter.query(ROLES_QUERY, &params)).await?;
        let attributes =
            with_deadline(self.deadline, self.adapter.query(ATTRIBUTES_QUERY, &params)).await?;
        let relationships = with_deadline(
            self.deadline,
            self.adapter.query(RELATIONSHIPS_QUERY, &params),
        )
        .await?;

        let mut subject = SubjectAttributes {
            id: subject_id.to_owned(),
            ..Default::default()
        };
        if let Some(row) = profile.first() {
            subject.user_type = row.get_text("user_type").map(ToOwned::to_owned);
            subject.org_id = row.get_text("org_id").map(ToOwned::to_owned);
            subject.plan = row.get_text("plan").map(ToOwned::to_owned);
        }
        subject.roles = roles.iter().filter_map(Self::role_from_row).collect();
        subject.attributes = attributes
            .iter()
            .filter_map(|row| {
                Some((
                    row.get_text("name")?.to_owned(),
                    VerifiedAttribute {
                        value: row.get_text("value")?.to_owned(),
                        expires_at: row.get_datetime("expires_at"),
                    },
                ))
            })
            .collect();
        subject.relationships = relationships
            .iter()
            .filter_map(|row| {
                Some(SubjectRelationship {
                    relationship_type: row.get_text("relationship_type")?.to_owned(),
                    target: row.get_text("target")?.to_owned(),
                    expires_at: row.get_datetime("expires_at"),
                })
            })
            .collect();
        Ok(subject)
    }
}

/// In-memory directory keyed by `(tenant, subject_id)`.
#[derive(Default)]
pub struct MemorySubjectDirectory {
    profiles: RwLock<HashMap<(String, String), SubjectAttributes>>,
}

impl MemorySubjectDirectory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, tenant: &str, profile: SubjectAttributes) {
        self.profiles
            .write()
            .insert((tenant.to_owned(), profile.id.clone()), profile);
    }
}

#[async_trait]
impl SubjectDirectory for MemorySubjectDirectory {
    async fn load(&self, tenant: &str, subject_id: &str) -> Result<SubjectAttributes, CheckError> {
        Ok(self
            .profiles
            .read()
            .get(&(tenant.to_owned(), subject_id.to_owned()))
            .cloned()
            .unwrap_or_else(|| SubjectAttributes {
                id: subject_id.to_owned(),
                ..Default::default()
            }))
    }
}
