//! In-memory stores.
//!
//! Small deployments embed these directly; tests use them as fixtures.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;

use authrim_storage::StorageError;

use crate::domain::error::RebacError;
use crate::domain::model::{ObjectRef, RelationDefinition, RelationshipTuple, SubjectRef};
use crate::domain::repo::{ClosureRepo, DefinitionStore, TupleStore};

/// Tuple store over a plain vector.
#[derive(Default)]
pub struct MemoryTupleStore {
    tuples: RwLock<Vec<RelationshipTuple>>,
    fail_next: AtomicBool,
}

impl MemoryTupleStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next read fail with a storage error.
    pub fn fail_next(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    fn take_failure(&self) -> Result<(), RebacError> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(RebacError::Storage(StorageError::Unavailable {
                reason: "injected".to_owned(),
            }));
        }
        Ok(())
    }
}

#[async_trait]
impl TupleStore for MemoryTupleStore {
    async fn has_direct(
        &self,
        tenant: &str,
        subject: &SubjectRef,
        relation: &str,
        object: &ObjectRef,
    ) -> Result<bool, RebacError> {
        self.take_failure()?;
        Ok(self.tuples.read().iter().any(|t| {
            t.tenant == tenant
                && t.from_type == subject.subject_type
                && t.from_id == subject.subject_id
                && t.relation == relation
                && t.to_type == object.object_type
                && t.to_id == object.object_id
        }))
    }

    async fn parents_via(
        &self,
        tenant: &str,
        tupleset_relation: &str,
        object: &ObjectRef,
    ) -> Result<Vec<ObjectRef>, RebacError> {
        self.take_failure()?;
        Ok(self
            .tuples
            .read()
            .iter()
            .filter(|t| {
                t.tenant == tenant
                    && t.relation == tupleset_relation
                    && t.from_type == object.object_type
                    && t.from_id == object.object_id
            })
            .map(RelationshipTuple::to_ref)
            .collect())
    }

    async fn edges_for_relation(
        &self,
        tenant: &str,
        relation: &str,
    ) -> Result<Vec<(ObjectRef, ObjectRef)>, RebacError> {
        self.take_failure()?;
        Ok(self
            .tuples
            .read()
            .iter()
            .filter(|t| t.tenant == tenant && t.relation == relation)
            .map(|t| (t.from_ref(), t.to_ref()))
            .collect())
    }

    async fn write(&self, tuple: &RelationshipTuple) -> Result<(), RebacError> {
        let mut tuples = self.tuples.write();
        let duplicate = tuples.iter().any(|t| {
            t.tenant == tuple.tenant
                && t.from_type == tuple.from_type
                && t.from_id == tuple.from_id
                && t.relation == tuple.relation
                && t.to_type == tuple.to_type
                && t.to_id == tuple.to_id
        });
        if duplicate {
            return Err(RebacError::DuplicateTuple);
        }
        tuples.push(tuple.clone());
        Ok(())
    }

    async fn delete(
        &self,
        tenant: &str,
        from: &ObjectRef,
        relation: &str,
        to: &ObjectRef,
    ) -> Result<bool, RebacError> {
        let mut tuples = self.tuples.write();
        let before = tuples.len();
        tuples.retain(|t| {
            !(t.tenant == tenant
                && t.from_type == from.object_type
                && t.from_id == from.object_id
                && t.relation == relation
                && t.to_type == to.object_type
                && t.to_id == to.object_id)
        });
        Ok(tuples.len() != before)
    }
}

/// Definition store over a map keyed by `(tenant, object_type, relation)`.
#[derive(Default)]
pub struct MemoryDefinitionStore {
    definitions: RwLock<HashMap<(String, String, String), RelationDefinition>>,
}

impl MemoryDefinitionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DefinitionStore for MemoryDefinitionStore {
    async fn find(
        &self,
        tenant: &str,
        object_type: &str,
        relation: &str,
    ) -> Result<Option<RelationDefinition>, RebacError> {
        Ok(self
            .definitions
            .read()
            .get(&(tenant.to_owned(), object_type.to_owned(), relation.to_owned()))
            .cloned())
    }

    async fn upsert(&self, definition: &RelationDefinition) -> Result<(), RebacError> {
        self.definitions.write().insert(
            (
                definition.tenant.clone(),
                definition.object_type.clone(),
                definition.relation_name.clone(),
            ),
            definition.clone(),
        );
        Ok(())
    }
}

type ClosureKey = (String, String, ObjectRef, ObjectRef);

/// Closure rows over a map, minimum depth kept on conflict.
#[derive(Default)]
pub struct MemoryClosureRepo {
    entries: RwLock<HashMap<ClosureKey, i64>>,
}

impl MemoryClosureRepo {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ClosureRepo for MemoryClosureRepo {
    async fn ancestors_of(
        &self,
        tenant: &str,
        relation: &str,
        descendant: &ObjectRef,
    ) -> Result<Vec<(ObjectRef, i64)>, RebacError> {
        let mut ancestors: Vec<(ObjectRef, i64)> = self
            .entries
            .read()
            .iter()
            .filter(|((t, r, _, d), _)| t == tenant && r == relation && d == descendant)
            .map(|((_, _, a, _), depth)| (a.clone(), *depth))
            .collect();
        ancestors.sort_by_key(|(_, depth)| *depth);
        Ok(ancestors)
    }

    async fn descendants_of(
        &self,
        tenant: &str,
        relation: &str,
        ancestor: &ObjectRef,
    ) -> Result<Vec<(ObjectRef, i64)>, RebacError> {
        let mut descendants: Vec<(ObjectRef, i64)> = self
            .entries
            .read()
            .iter()
            .filter(|((t, r, a, _), _)| t == tenant && r == relation && a == ancestor)
            .map(|((_, _, _, d), depth)| (d.clone(), *depth))
            .collect();
        descendants.sort_by_key(|(_, depth)| *depth);
        Ok(descendants)
    }

    async fn insert(
        &self,
        tenant: &str,
        relation: &str,
        ancestor: &ObjectRef,
        descendant: &ObjectRef,
        depth: i64,
    ) -> Result<(), RebacError> {
        let key = (
            tenant.to_owned(),
            relation.to_owned(),
            ancestor.clone(),
            descendant.clone(),
        );
        let mut entries = self.entries.write();
        entries
            .entry(key)
            .and_modify(|existing| *existing = (*existing).min(depth))
            .or_insert(depth);
        Ok(())
    }

    async fn clear_relation(&self, tenant: &str, relation: &str) -> Result<(), RebacError> {
        self.entries
            .write()
            .retain(|(t, r, _, _), _| !(t == tenant && r == relation));
        Ok(())
    }
}
