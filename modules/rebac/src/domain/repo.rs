//! Repository traits the evaluator and services depend on.
//!
//! Implementations live in `infra`: SQL-backed over the storage adapter,
//! plus in-memory stores that double as embedded backends and test
//! fixtures.

use async_trait::async_trait;

use super::error::RebacError;
use super::model::{ObjectRef, RelationDefinition, RelationshipTuple, SubjectRef};

/// Read/write access to relationship tuples.
#[async_trait]
pub trait TupleStore: Send + Sync {
    /// Does the exact tuple `(subject, relation, object)` exist?
    async fn has_direct(
        &self,
        tenant: &str,
        subject: &SubjectRef,
        relation: &str,
        object: &ObjectRef,
    ) -> Result<bool, RebacError>;

    /// Objects reached from `object` through `tupleset_relation`, i.e. the
    /// `to` side of tuples `(object, tupleset_relation, X)`.
    async fn parents_via(
        &self,
        tenant: &str,
        tupleset_relation: &str,
        object: &ObjectRef,
    ) -> Result<Vec<ObjectRef>, RebacError>;

    /// Every `(from, to)` edge carried by `relation` in the tenant.
    /// Used to reseed closure materialization.
    async fn edges_for_relation(
        &self,
        tenant: &str,
        relation: &str,
    ) -> Result<Vec<(ObjectRef, ObjectRef)>, RebacError>;

    async fn write(&self, tuple: &RelationshipTuple) -> Result<(), RebacError>;

    /// Delete one tuple; returns whether it existed.
    async fn delete(
        &self,
        tenant: &str,
        from: &ObjectRef,
        relation: &str,
        to: &ObjectRef,
    ) -> Result<bool, RebacError>;
}

/// Access to relation definitions.
#[async_trait]
pub trait DefinitionStore: Send + Sync {
    async fn find(
        &self,
        tenant: &str,
        object_type: &str,
        relation: &str,
    ) -> Result<Option<RelationDefinition>, RebacError>;

    async fn upsert(&self, definition: &RelationDefinition) -> Result<(), RebacError>;
}

/// Row-level access to materialized closure entries.
#[async_trait]
pub trait ClosureRepo: Send + Sync {
    /// Ancestors of `descendant` with their depths, self-edge included.
    async fn ancestors_of(
        &self,
        tenant: &str,
        relation: &str,
        descendant: &ObjectRef,
    ) -> Result<Vec<(ObjectRef, i64)>, RebacError>;

    /// Descendants of `ancestor` with their depths, self-edge included.
    async fn descendants_of(
        &self,
        tenant: &str,
        relation: &str,
        ancestor: &ObjectRef,
    ) -> Result<Vec<(ObjectRef, i64)>, RebacError>;

    /// Insert an entry, keeping the minimum depth on conflict.
    async fn insert(
        &self,
        tenant: &str,
        relation: &str,
        ancestor: &ObjectRef,
        descendant: &ObjectRef,
        depth: i64,
    ) -> Result<(), RebacError>;

    /// Drop every entry materialized for `relation` in the tenant.
    async fn clear_relation(&self, tenant: &str, relation: &str) -> Result<(), RebacError>;
}
