//! Relationship mutation service.
//!
//! Writers never touch caches directly during a check; this service is the
//! single place where tuple and definition mutations schedule the matching
//! cache invalidations and closure maintenance after the storage commit.

use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use tracing::{info, instrument};

use authrim_cache::CacheManager;

use crate::config::RebacConfig;

use super::closure::ClosureStore;
use super::error::RebacError;
use super::expression::RelationExpression;
use super::model::{ObjectRef, RelationDefinition, RelationshipTuple, SubjectRef};
use super::repo::{DefinitionStore, TupleStore};

/// Service over tuple and definition writes.
pub struct RelationshipService {
    tuples: Arc<dyn TupleStore>,
    definitions: Arc<dyn DefinitionStore>,
    closure: Arc<ClosureStore>,
    cache: Arc<CacheManager>,
    config: RebacConfig,
}

impl RelationshipService {
    #[must_use]
    pub fn new(
        tuples: Arc<dyn TupleStore>,
        definitions: Arc<dyn DefinitionStore>,
        closure: Arc<ClosureStore>,
        cache: Arc<CacheManager>,
        config: RebacConfig,
    ) -> Self {
        Self {
            tuples,
            definitions,
            closure,
            cache,
            config,
        }
    }

    /// Insert a relationship tuple and schedule the follow-up work:
    /// cache invalidation for both ends and closure materialization when
    /// the relation is marked for it.
    ///
    /// # Errors
    ///
    /// [`RebacError::DuplicateTuple`] when the 6-tuple already exists,
    /// [`RebacError::InvalidObject`] for an unparseable object, storage
    /// errors otherwise.
    #[instrument(skip(self), fields(%tenant, %relation))]
    pub async fn write_tuple(
        &self,
        tenant: &str,
        from: &str,
        relation: &str,
        to: &str,
    ) -> Result<RelationshipTuple, RebacError> {
        let subject = SubjectRef::normalize(from);
        let object = ObjectRef::parse(to, None).ok_or_else(|| RebacError::InvalidObject {
            value: to.to_owned(),
        })?;

        let tuple = RelationshipTuple {
            tenant: tenant.to_owned(),
            from_type: subject.subject_type.clone(),
            from_id: subject.subject_id.clone(),
            relation: relation.to_owned(),
            to_type: object.object_type.clone(),
            to_id: object.object_id.clone(),
            created_at: Utc::now(),
        };
        self.tuples.write(&tuple).await?;
        info!("relationship tuple written");

        self.invalidate_ends(&tuple).await;

        if self.config.closure_relations.contains(relation) {
            self.closure
                .add_edge(tenant, relation, &tuple.from_ref(), &tuple.to_ref())
                .await?;
        }
        Ok(tuple)
    }

    /// Delete a tuple; returns whether it existed. Closure-materialized
    /// relations are reseeded from the surviving edges.
    ///
    /// # Errors
    ///
    /// [`RebacError::InvalidObject`] for an unparseable object, storage
    /// errors otherwise.
    #[instrument(skip(self), fields(%tenant, %relation))]
    pub async fn delete_tuple(
        &self,
        tenant: &str,
        from: &str,
        relation: &str,
        to: &str,
    ) -> Result<bool, RebacError> {
        let subject = SubjectRef::normalize(from);
        let from_ref = ObjectRef::new(subject.subject_type.clone(), subject.subject_id.clone());
        let object = ObjectRef::parse(to, None).ok_or_else(|| RebacError::InvalidObject {
            value: to.to_owned(),
        })?;

        let existed = self.tuples.delete(tenant, &from_ref, relation, &object).await?;
        if !existed {
            return Ok(false);
        }

        let tuple = RelationshipTuple {
            tenant: tenant.to_owned(),
            from_type: from_ref.object_type.clone(),
            from_id: from_ref.object_id.clone(),
            relation: relation.to_owned(),
            to_type: object.object_type.clone(),
            to_id: object.object_id.clone(),
            created_at: Utc::now(),
        };
        self.invalidate_ends(&tuple).await;

        if self.config.closure_relations.contains(relation) {
            let seeds = self.tuples.edges_for_relation(tenant, relation).await?;
            self.closure.rebuild(tenant, relation, &seeds).await?;
        }
        Ok(true)
    }

    /// Validate and persist a relation definition, then force cache misses
    /// everywhere: a rewrite change can flip any decision under the type.
    ///
    /// # Errors
    ///
    /// [`RebacError::InvalidExpression`] when the expression does not
    /// parse, storage errors otherwise.
    #[instrument(skip(self, expression), fields(%tenant, %object_type, %relation))]
    pub async fn define_relation(
        &self,
        tenant: &str,
        object_type: &str,
        relation: &str,
        expression: &Value,
    ) -> Result<(), RebacError> {
        RelationExpression::parse_value(expression, self.config.expression_depth_limit)?;

        self.definitions
            .upsert(&RelationDefinition {
                tenant: tenant.to_owned(),
                object_type: object_type.to_owned(),
                relation_name: relation.to_owned(),
                expression: expression.to_string(),
                updated_at: Utc::now(),
            })
            .await?;
        info!("relation definition updated");

        self.cache.bump_generation();
        Ok(())
    }

    /// Invalidate both ends. The `from` side is dropped both as a subject
    /// and as an object: for object-to-object edges (parent links) the
    /// affected cached checks are the ones *on* the `from` object.
    async fn invalidate_ends(&self, tuple: &RelationshipTuple) {
        let subject = format!("{}:{}", tuple.from_type, tuple.from_id);
        self.cache
            .invalidate_subject(&tuple.tenant, &subject)
            .await;
        self.cache
            .invalidate_object(&tuple.tenant, &tuple.from_type, &tuple.from_id)
            .await;
        self.cache
            .invalidate_object(&tuple.tenant, &tuple.to_type, &tuple.to_id)
            .await;
    }
}
