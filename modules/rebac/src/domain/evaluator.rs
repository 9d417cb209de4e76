//! Bounded-depth evaluator over the relation algebra.

use std::collections::HashSet;
use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::{debug, instrument, warn};

use authrim_cache::{CacheManager, CheckKey, RequestCache};

use crate::config::RebacConfig;

use super::closure::ClosureStore;
use super::error::RebacError;
use super::expression::RelationExpression;
use super::model::{CheckOutcome, ContextTuple, ObjectRef, ResolvedVia, SubjectRef};
use super::repo::{DefinitionStore, TupleStore};

/// One ReBAC check request.
#[derive(Debug, Clone)]
pub struct RebacCheck {
    pub tenant: String,
    /// Subject, bare (`user_123`) or typed (`user:user_123`).
    pub subject: String,
    pub relation: String,
    /// Object as `type:id`, or a bare id when `object_type` is given.
    pub object: String,
    pub object_type: Option<String>,
    pub context_tuples: Vec<ContextTuple>,
}

impl RebacCheck {
    fn object_ref(&self) -> Result<ObjectRef, RebacError> {
        ObjectRef::parse(&self.object, self.object_type.as_deref()).ok_or_else(|| {
            RebacError::InvalidObject {
                value: self.object.clone(),
            }
        })
    }
}

/// Traversal state carried through one evaluation.
struct EvalState {
    path: Vec<String>,
    /// `(expression node, object)` pairs already visited; breaks cycles.
    visited: HashSet<(String, String)>,
    used_closure: bool,
}

/// The relation-tree evaluator.
pub struct RebacEvaluator {
    tuples: Arc<dyn TupleStore>,
    definitions: Arc<dyn DefinitionStore>,
    closure: Arc<ClosureStore>,
    cache: Arc<CacheManager>,
    config: RebacConfig,
}

impl RebacEvaluator {
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

    /// Run one check.
    ///
    /// Contextual tuples win before anything is read from storage; then the
    /// request memo and the shared cache are probed; only then is the
    /// relation tree walked. Storage failures propagate and are never
    /// cached.
    ///
    /// # Errors
    ///
    /// [`RebacError::InvalidObject`] for an unparseable object reference,
    /// [`RebacError::Storage`] when the adapter fails underneath.
    #[instrument(skip_all, fields(tenant = %req.tenant, relation = %req.relation, object = %req.object))]
    pub async fn check(
        &self,
        req: &RebacCheck,
        request_cache: Option<&RequestCache>,
    ) -> Result<CheckOutcome, RebacError> {
        let subject = SubjectRef::normalize(&req.subject);
        let object = req.object_ref()?;

        // 1. Contextual tuples, normalized, first match wins.
        let target = format!("{subject}|{}|{object}", req.relation);
        let mut normalized_context = Vec::with_capacity(req.context_tuples.len());
        for tuple in &req.context_tuples {
            if let Some(normalized) = tuple.normalized() {
                if normalized == target {
                    debug!("allowed by contextual tuple");
                    return Ok(CheckOutcome::new(
                        true,
                        ResolvedVia::Context,
                        vec!["contextual_tuple".to_owned()],
                    ));
                }
                normalized_context.push(normalized);
            }
        }

        // 2. Cache probes.
        let key = CheckKey::new(
            req.tenant.clone(),
            subject.to_string(),
            req.relation.clone(),
            object.object_type.clone(),
            object.object_id.clone(),
        )
        .with_context_tuples(normalized_context);
        let fingerprint = key.fingerprint();

        if let Some(memo) = request_cache.and_then(|rc| rc.get(&fingerprint)) {
            return Ok(CheckOutcome::new(memo.allowed, ResolvedVia::Cache, memo.path));
        }
        if let Some(hit) = self.cache.get(&key).await {
            if let Some(rc) = request_cache {
                rc.insert(&fingerprint, hit.clone());
            }
            return Ok(CheckOutcome::new(hit.allowed, ResolvedVia::Cache, hit.path));
        }

        // 3.–7. Walk the relation tree.
        let mut state = EvalState {
            path: Vec::new(),
            visited: HashSet::new(),
            used_closure: false,
        };
        let allowed = self
            .check_relation(&req.tenant, &subject, &req.relation, &object, 0, &mut state)
            .await?;

        let resolved_via = if allowed && state.used_closure {
            ResolvedVia::Closure
        } else {
            ResolvedVia::Evaluation
        };
        let outcome = CheckOutcome::new(allowed, resolved_via, state.path);

        // 8. Store with TTL; errors above never reach this point.
        let cached = self
            .cache
            .store(
                &key,
                outcome.allowed,
                resolved_via.as_str(),
                outcome.path.clone(),
                Some(self.config.cache_ttl),
            )
            .await;
        if let Some(rc) = request_cache {
            rc.insert(&fingerprint, cached);
        }
        Ok(outcome)
    }

    /// Resolve `relation`'s definition on `object` and evaluate it.
    fn check_relation<'a>(
        &'a self,
        tenant: &'a str,
        subject: &'a SubjectRef,
        relation: &'a str,
        object: &'a ObjectRef,
        depth: usize,
        state: &'a mut EvalState,
    ) -> BoxFuture<'a, Result<bool, RebacError>> {
        Box::pin(async move {
            if depth >= self.config.max_depth {
                state.path.push("max_depth_exceeded".to_owned());
                return Ok(false);
            }

            let node_key = format!("{}#{relation}", object.object_type);
            if !state
                .visited
                .insert((node_key.clone(), object.to_string()))
            {
                return Ok(false);
            }

            let expression = match self
                .definitions
                .find(tenant, &object.object_type, relation)
                .await?
            {
                None => RelationExpression::Direct,
                Some(definition) => match RelationExpression::parse_str(
                    &definition.expression,
                    self.config.expression_depth_limit,
                ) {
                    Ok(expression) => expression,
                    Err(err) => {
                        warn!(
                            object_type = %object.object_type,
                            relation,
                            error = %err,
                            "broken relation definition; treating as direct"
                        );
                        state.path.push("definition_parse_warning".to_owned());
                        RelationExpression::Direct
                    }
                },
            };

            self.eval_node(tenant, subject, relation, &expression, node_key, object, depth, state)
                .await
        })
    }

    /// Evaluate one expression node. Children are visited left to right;
    /// union and intersection short-circuit; exclusion checks base before
    /// subtract.
    #[allow(clippy::too_many_arguments)]
    fn eval_node<'a>(
        &'a self,
        tenant: &'a str,
        subject: &'a SubjectRef,
        relation: &'a str,
        expression: &'a RelationExpression,
        node_key: String,
        object: &'a ObjectRef,
        depth: usize,
        state: &'a mut EvalState,
    ) -> BoxFuture<'a, Result<bool, RebacError>> {
        Box::pin(async move {
            match expression {
                RelationExpression::Direct | RelationExpression::This => {
                    let hit = self
                        .tuples
                        .has_direct(tenant, subject, relation, object)
                        .await?;
                    if hit {
                        state.path.push(format!("direct:{object}"));
                    }
                    Ok(hit)
                }
                RelationExpression::Union { children } => {
                    for (index, child) in children.iter().enumerate() {
                        let child_key = format!("{node_key}/{index}");
                        if self
                            .eval_node(
                                tenant, subject, relation, child, child_key, object, depth,
                                &mut *state,
                            )
                            .await?
                        {
                            return Ok(true);
                        }
                    }
                    Ok(false)
                }
                RelationExpression::Intersection { children } => {
                    for (index, child) in children.iter().enumerate() {
                        let child_key = format!("{node_key}/{index}");
                        if !self
                            .eval_node(
                                tenant, subject, relation, child, child_key, object, depth,
                                &mut *state,
                            )
                            .await?
                        {
                            return Ok(false);
                        }
                    }
                    Ok(true)
                }
                RelationExpression::Exclusion { base, subtract } => {
                    let base_hit = self
                        .eval_node(
                            tenant,
                            subject,
                            relation,
                            base,
                            format!("{node_key}/base"),
                            object,
                            depth,
                            &mut *state,
                        )
                        .await?;
                    if !base_hit {
                        return Ok(false);
                    }
                    let subtracted = self
                        .eval_node(
                            tenant,
                            subject,
                            relation,
                            subtract,
                            format!("{node_key}/subtract"),
                            object,
                            depth,
                            &mut *state,
                        )
                        .await?;
                    Ok(!subtracted)
                }
                RelationExpression::TupleToUserset {
                    tupleset_relation,
                    computed_userset_relation,
                } => {
                    self.eval_tuple_to_userset(
                        tenant,
                        subject,
                        tupleset_relation,
                        computed_userset_relation,
                        object,
                        depth,
                        state,
                    )
                    .await
                }
            }
        })
    }

    /// Tuple-to-userset: walk to the objects reached through the tupleset
    /// relation and check the computed relation there. Relations marked for
    /// materialization answer from the closure store instead of recursing.
    #[allow(clippy::too_many_arguments)]
    async fn eval_tuple_to_userset(
        &self,
        tenant: &str,
        subject: &SubjectRef,
        tupleset_relation: &str,
        computed_relation: &str,
        object: &ObjectRef,
        depth: usize,
        state: &mut EvalState,
    ) -> Result<bool, RebacError> {
        if self.config.closure_relations.contains(tupleset_relation) {
            state.used_closure = true;
            let ancestors = self
                .closure
                .ancestors_of(tenant, tupleset_relation, object)
                .await?;
            for (ancestor, ancestor_depth) in ancestors {
                if ancestor_depth == 0 {
                    continue;
                }
                if self
                    .tuples
                    .has_direct(tenant, subject, computed_relation, &ancestor)
                    .await?
                {
                    state.path.push(format!("closure:{ancestor}"));
                    return Ok(true);
                }
            }
            return Ok(false);
        }

        let parents = self
            .tuples
            .parents_via(tenant, tupleset_relation, object)
            .await?;
        for parent in parents {
            state
                .path
                .push(format!("ttu:{tupleset_relation}->{computed_relation}@{parent}"));
            if self
                .check_relation(tenant, subject, computed_relation, &parent, depth + 1, state)
                .await?
            {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::memory::{MemoryClosureRepo, MemoryDefinitionStore, MemoryTupleStore};
    use authrim_storage::MemoryAdapter;
    use chrono::Utc;
    use serde_json::json;

    struct Fixture {
        tuples: Arc<MemoryTupleStore>,
        definitions: Arc<MemoryDefinitionStore>,
        closure: Arc<ClosureStore>,
        evaluator: RebacEvaluator,
    }

    fn fixture(config: RebacConfig) -> Fixture {
        let tuples = Arc::new(MemoryTupleStore::new());
        let definitions = Arc::new(MemoryDefinitionStore::new());
        let closure = Arc::new(ClosureStore::new(Arc::new(MemoryClosureRepo::new())));
        let cache = Arc::new(CacheManager::new(Arc::new(MemoryAdapter::new())));
        let evaluator = RebacEvaluator::new(
            tuples.clone(),
            definitions.clone(),
            closure.clone(),
            cache,
            config,
        );
        Fixture {
            tuples,
            definitions,
            closure,
            evaluator,
        }
    }

    fn check(subject: &str, relation: &str, object: &str) -> RebacCheck {
        RebacCheck {
            tenant: "t1".to_owned(),
            subject: subject.to_owned(),
            relation: relation.to_owned(),
            object: object.to_owned(),
            object_type: None,
            context_tuples: Vec::new(),
        }
    }

    fn ctx(subject: &str, relation: &str, object: &str) -> ContextTuple {
        ContextTuple {
            subject: subject.to_owned(),
            relation: relation.to_owned(),
            object: object.to_owned(),
        }
    }

    async fn grant(tuples: &MemoryTupleStore, from: &str, relation: &str, to: &str) {
        let from = ObjectRef::parse(from, Some("user")).unwrap();
        let to = ObjectRef::parse(to, None).unwrap();
        tuples
            .write(&crate::domain::model::RelationshipTuple {
                tenant: "t1".to_owned(),
                from_type: from.object_type,
                from_id: from.object_id,
                relation: relation.to_owned(),
                to_type: to.object_type,
                to_id: to.object_id,
                created_at: Utc::now(),
            })
            .await
            .unwrap();
    }

    async fn define(definitions: &MemoryDefinitionStore, object_type: &str, relation: &str, expr: serde_json::Value) {
        definitions
            .upsert(&crate::domain::model::RelationDefinition {
                tenant: "t1".to_owned(),
                object_type: object_type.to_owned(),
                relation_name: relation.to_owned(),
                expression: expr.to_string(),
                updated_at: Utc::now(),
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn contextual_tuple_allows_with_empty_storage() {
        let f = fixture(RebacConfig::default());
        let mut req = check("user_123", "viewer", "document:doc_456");
        req.context_tuples = vec![ctx("user_123", "viewer", "document:doc_456")];

        let outcome = f.evaluator.check(&req, None).await.unwrap();
        assert!(outcome.allowed);
        assert_eq!(outcome.resolved_via, ResolvedVia::Context);
        assert_eq!(outcome.path, vec!["contextual_tuple".to_owned()]);
    }

    #[tokio::test]
    async fn mismatched_context_tuple_falls_through() {
        let f = fixture(RebacConfig::default());
        let mut req = check("user_123", "viewer", "document:doc_456");
        req.context_tuples = vec![ctx("user_999", "viewer", "document:doc_456")];

        let outcome = f.evaluator.check(&req, None).await.unwrap();
        assert!(!outcome.allowed);
        assert_ne!(outcome.resolved_via, ResolvedVia::Context);
    }

    #[tokio::test]
    async fn subject_prefix_is_normalized() {
        let f = fixture(RebacConfig::default());
        let mut req = check("user:user_123", "viewer", "document:doc_456");
        req.context_tuples = vec![ctx("user_123", "viewer", "document:doc_456")];

        let outcome = f.evaluator.check(&req, None).await.unwrap();
        assert!(outcome.allowed);
        assert_eq!(outcome.resolved_via, ResolvedVia::Context);
    }

    #[tokio::test]
    async fn absent_definition_behaves_as_direct() {
        let f = fixture(RebacConfig::default());
        grant(&f.tuples, "user_123", "viewer", "document:doc_456").await;

        let outcome = f
            .evaluator
            .check(&check("user_123", "viewer", "document:doc_456"), None)
            .await
            .unwrap();
        assert!(outcome.allowed);
        assert_eq!(outcome.resolved_via, ResolvedVia::Evaluation);
    }

    #[tokio::test]
    async fn broken_definition_degrades_to_direct_with_warning() {
        let f = fixture(RebacConfig::default());
        f.definitions
            .upsert(&crate::domain::model::RelationDefinition {
                tenant: "t1".to_owned(),
                object_type: "document".to_owned(),
                relation_name: "viewer".to_owned(),
                expression: "{\"type\":\"no_such_kind\"}".to_owned(),
                updated_at: Utc::now(),
            })
            .await
            .unwrap();
        grant(&f.tuples, "user_123", "viewer", "document:doc_456").await;

        let outcome = f
            .evaluator
            .check(&check("user_123", "viewer", "document:doc_456"), None)
            .await
            .unwrap();
        assert!(outcome.allowed);
        assert!(outcome.path.contains(&"definition_parse_warning".to_owned()));
    }

    #[tokio::test]
    async fn union_short_circuits_left_to_right() {
        let f = fixture(RebacConfig::default());
        define(
            &f.definitions,
            "document",
            "viewer",
            json!({"type": "union", "children": [
                {"type": "direct"},
                {"type": "tuple_to_userset", "tupleset_relation": "parent", "computed_userset_relation": "viewer"}
            ]}),
        )
        .await;
        grant(&f.tuples, "user_123", "viewer", "document:doc_456").await;

        let outcome = f
            .evaluator
            .check(&check("user_123", "viewer", "document:doc_456"), None)
            .await
            .unwrap();
        assert!(outcome.allowed);
        assert_eq!(outcome.path, vec!["direct:document:doc_456".to_owned()]);
    }

    #[tokio::test]
    async fn intersection_requires_every_child() {
        let f = fixture(RebacConfig::default());
        define(
            &f.definitions,
            "document",
            "editor",
            json!({"type": "intersection", "children": [
                {"type": "direct"},
                {"type": "tuple_to_userset", "tupleset_relation": "parent", "computed_userset_relation": "member"}
            ]}),
        )
        .await;
        grant(&f.tuples, "user_123", "editor", "document:doc_456").await;

        // Direct holds but the parent membership leg does not.
        let outcome = f
            .evaluator
            .check(&check("user_123", "editor", "document:doc_456"), None)
            .await
            .unwrap();
        assert!(!outcome.allowed);

        grant(&f.tuples, "document:doc_456", "parent", "folder:f1").await;
        grant(&f.tuples, "user_123", "member", "folder:f1").await;
        let outcome = f
            .evaluator
            .check(&check("user_123", "editor", "document:doc_456"), None)
            .await
            .unwrap();
        assert!(outcome.allowed);
    }

    #[tokio::test]
    async fn exclusion_subtracts_banned_subjects() {
        let f = fixture(RebacConfig::default());
        define(
            &f.definitions,
            "document",
            "viewer",
            json!({"type": "exclusion",
                "base": {"type": "direct"},
                "subtract": {"type": "tuple_to_userset", "tupleset_relation": "parent", "computed_userset_relation": "banned"}
            }),
        )
        .await;
        grant(&f.tuples, "user_123", "viewer", "document:doc_456").await;

        let outcome = f
            .evaluator
            .check(&check("user_123", "viewer", "document:doc_456"), None)
            .await
            .unwrap();
        assert!(outcome.allowed);

        grant(&f.tuples, "document:doc_456", "parent", "folder:f1").await;
        grant(&f.tuples, "user_123", "banned", "folder:f1").await;
        let outcome = f
            .evaluator
            .check(&check("user_123", "viewer", "document:doc_456"), None)
            .await
            .unwrap();
        assert!(!outcome.allowed);
    }

    #[tokio::test]
    async fn tuple_to_userset_walks_parents() {
        let f = fixture(RebacConfig::default());
        define(
            &f.definitions,
            "document",
            "viewer",
            json!({"type": "tuple_to_userset", "tupleset_relation": "parent", "computed_userset_relation": "viewer"}),
        )
        .await;
        grant(&f.tuples, "document:doc_child", "parent", "document:doc_root").await;
        grant(&f.tuples, "user_123", "viewer", "document:doc_root").await;

        let outcome = f
            .evaluator
            .check(&check("user_123", "viewer", "document:doc_child"), None)
            .await
            .unwrap();
        assert!(outcome.allowed);
        assert_eq!(outcome.resolved_via, ResolvedVia::Evaluation);
    }

    #[tokio::test]
    async fn depth_limit_stops_deep_chains() {
        let mut config = RebacConfig::default();
        config.max_depth = 2;
        let f = fixture(config);
        define(
            &f.definitions,
            "document",
            "viewer",
            json!({"type": "tuple_to_userset", "tupleset_relation": "parent", "computed_userset_relation": "viewer"}),
        )
        .await;
        // d0 -> d1 -> d2 -> d3; the grant sits three levels up.
        grant(&f.tuples, "document:d0", "parent", "document:d1").await;
        grant(&f.tuples, "document:d1", "parent", "document:d2").await;
        grant(&f.tuples, "document:d2", "parent", "document:d3").await;
        grant(&f.tuples, "user_123", "viewer", "document:d3").await;

        let outcome = f
            .evaluator
            .check(&check("user_123", "viewer", "document:d0"), None)
            .await
            .unwrap();
        assert!(!outcome.allowed);
        assert!(outcome.path.contains(&"max_depth_exceeded".to_owned()));
    }

    #[tokio::test]
    async fn cyclic_parent_graphs_terminate() {
        let f = fixture(RebacConfig::default());
        define(
            &f.definitions,
            "document",
            "viewer",
            json!({"type": "tuple_to_userset", "tupleset_relation": "parent", "computed_userset_relation": "viewer"}),
        )
        .await;
        grant(&f.tuples, "document:a", "parent", "document:b").await;
        grant(&f.tuples, "document:b", "parent", "document:a").await;

        let outcome = f
            .evaluator
            .check(&check("user_123", "viewer", "document:a"), None)
            .await
            .unwrap();
        assert!(!outcome.allowed);
    }

    #[tokio::test]
    async fn closure_shortcut_answers_without_recursion() {
        let mut config = RebacConfig::default();
        config.closure_relations.insert("parent".to_owned());
        // Depth 1 would make recursive tuple-to-userset fail; the closure
        // path must still answer.
        config.max_depth = 1;
        let f = fixture(config);
        define(
            &f.definitions,
            "document",
            "viewer",
            json!({"type": "tuple_to_userset", "tupleset_relation": "parent", "computed_userset_relation": "viewer"}),
        )
        .await;
        grant(&f.tuples, "user_123", "viewer", "document:doc_root").await;
        f.closure
            .add_edge(
                "t1",
                "parent",
                &ObjectRef::new("document", "doc_child"),
                &ObjectRef::new("document", "doc_root"),
            )
            .await
            .unwrap();

        let outcome = f
            .evaluator
            .check(&check("user_123", "viewer", "document:doc_child"), None)
            .await
            .unwrap();
        assert!(outcome.allowed);
        assert_eq!(outcome.resolved_via, ResolvedVia::Closure);
        assert!(outcome.path.iter().any(|p| p.starts_with("closure:")));
    }

    #[tokio::test]
    async fn warm_cache_preserves_the_decision() {
        let f = fixture(RebacConfig::default());
        grant(&f.tuples, "user_123", "viewer", "document:doc_456").await;
        let req = check("user_123", "viewer", "document:doc_456");

        let cold = f.evaluator.check(&req, None).await.unwrap();
        let warm = f.evaluator.check(&req, None).await.unwrap();
        assert_eq!(cold.allowed, warm.allowed);
        assert_eq!(warm.resolved_via, ResolvedVia::Cache);
    }

    #[tokio::test]
    async fn request_cache_memoizes_within_a_batch() {
        let f = fixture(RebacConfig::default());
        grant(&f.tuples, "user_123", "viewer", "document:doc_456").await;
        let req = check("user_123", "viewer", "document:doc_456");
        let rc = RequestCache::new();

        let first = f.evaluator.check(&req, Some(&rc)).await.unwrap();
        assert!(first.allowed);
        assert_eq!(rc.len(), 1);

        let second = f.evaluator.check(&req, Some(&rc)).await.unwrap();
        assert_eq!(second.resolved_via, ResolvedVia::Cache);
    }

    #[tokio::test]
    async fn storage_failures_are_not_cached() {
        let tuples = Arc::new(MemoryTupleStore::new());
        let definitions = Arc::new(MemoryDefinitionStore::new());
        let closure = Arc::new(ClosureStore::new(Arc::new(MemoryClosureRepo::new())));
        let cache_adapter = Arc::new(MemoryAdapter::new());
        let cache = Arc::new(CacheManager::new(cache_adapter));
        let evaluator = RebacEvaluator::new(
            tuples.clone(),
            definitions,
            closure,
            cache.clone(),
            RebacConfig::default(),
        );

        tuples.fail_next();
        let req = check("user_123", "viewer", "document:doc_456");
        let err = evaluator.check(&req, None).await.unwrap_err();
        assert!(matches!(err, RebacError::Storage(_)));

        // Nothing was stored: the next check evaluates cleanly.
        let outcome = evaluator.check(&req, None).await.unwrap();
        assert_eq!(outcome.resolved_via, ResolvedVia::Evaluation);
    }
}
