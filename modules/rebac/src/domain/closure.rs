//! Materialized reflexive-transitive closure.
//!
//! For relations marked in [`crate::RebacConfig::closure_relations`] the
//! ancestry graph is kept flat: one row per `(ancestor, descendant)` pair
//! with its depth, self-edges at depth 0. Tuple-to-userset over such a
//! relation becomes one `ancestors_of` lookup instead of a recursive walk.
//!
//! Entries are derived data. Edge removal reseeds the whole relation from
//! the surviving tuples rather than trying to subtract paths.

use std::sync::Arc;

use tracing::{debug, instrument};

use super::error::RebacError;
use super::model::ObjectRef;
use super::repo::ClosureRepo;

/// Closure maintenance and lookup over a [`ClosureRepo`].
pub struct ClosureStore {
    repo: Arc<dyn ClosureRepo>,
}

impl ClosureStore {
    #[must_use]
    pub fn new(repo: Arc<dyn ClosureRepo>) -> Self {
        Self { repo }
    }

    /// Ancestors of `descendant` (self-edge included, depth 0 first as the
    /// repo orders by depth).
    ///
    /// # Errors
    ///
    /// Storage errors from the underlying repo.
    pub async fn ancestors_of(
        &self,
        tenant: &str,
        relation: &str,
        descendant: &ObjectRef,
    ) -> Result<Vec<(ObjectRef, i64)>, RebacError> {
        self.repo.ancestors_of(tenant, relation, descendant).await
    }

    /// Constant-depth ancestry test.
    ///
    /// # Errors
    ///
    /// Storage errors from the underlying repo.
    pub async fn is_ancestor(
        &self,
        tenant: &str,
        relation: &str,
        descendant: &ObjectRef,
        ancestor: &ObjectRef,
    ) -> Result<bool, RebacError> {
        Ok(self
            .repo
            .ancestors_of(tenant, relation, descendant)
            .await?
            .iter()
            .any(|(candidate, _)| candidate == ancestor))
    }

    /// Materialize a new seed edge `child --relation--> parent`.
    ///
    /// Inserts self-edges for both ends, then the cross product of the
    /// parent's ancestors and the child's descendants.
    ///
    /// # Errors
    ///
    /// Storage errors from the underlying repo.
    #[instrument(skip_all, fields(%relation, child = %child, parent = %parent))]
    pub async fn add_edge(
        &self,
        tenant: &str,
        relation: &str,
        child: &ObjectRef,
        parent: &ObjectRef,
    ) -> Result<(), RebacError> {
        self.repo.insert(tenant, relation, child, child, 0).await?;
        self.repo
            .insert(tenant, relation, parent, parent, 0)
            .await?;

        let ancestors = self.repo.ancestors_of(tenant, relation, parent).await?;
        let descendants = self.repo.descendants_of(tenant, relation, child).await?;

        for (ancestor, up) in &ancestors {
            for (descendant, down) in &descendants {
                self.repo
                    .insert(tenant, relation, ancestor, descendant, up + down + 1)
                    .await?;
            }
        }
        debug!(
            pairs = ancestors.len() * descendants.len(),
            "closure edge materialized"
        );
        Ok(())
    }

    /// Rebuild the relation's closure from scratch out of seed edges.
    ///
    /// # Errors
    ///
    /// Storage errors from the underlying repo.
    #[instrument(skip_all, fields(%relation, seeds = seeds.len()))]
    pub async fn rebuild(
        &self,
        tenant: &str,
        relation: &str,
        seeds: &[(ObjectRef, ObjectRef)],
    ) -> Result<(), RebacError> {
        self.repo.clear_relation(tenant, relation).await?;
        for (child, parent) in seeds {
            self.add_edge(tenant, relation, child, parent).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::memory::MemoryClosureRepo;

    fn doc(id: &str) -> ObjectRef {
        ObjectRef::new("document", id)
    }

    fn store() -> ClosureStore {
        ClosureStore::new(Arc::new(MemoryClosureRepo::new()))
    }

    #[tokio::test]
    async fn single_edge_produces_self_edges_and_pair() {
        let store = store();
        store
            .add_edge("t1", "parent", &doc("child"), &doc("root"))
            .await
            .unwrap();

        let ancestors = store
            .ancestors_of("t1", "parent", &doc("child"))
            .await
            .unwrap();
        assert!(ancestors.contains(&(doc("child"), 0)));
        assert!(ancestors.contains(&(doc("root"), 1)));
    }

    #[tokio::test]
    async fn chains_compose_transitively() {
        let store = store();
        store
            .add_edge("t1", "parent", &doc("leaf"), &doc("mid"))
            .await
            .unwrap();
        store
            .add_edge("t1", "parent", &doc("mid"), &doc("root"))
            .await
            .unwrap();

        assert!(
            store
                .is_ancestor("t1", "parent", &doc("leaf"), &doc("root"))
                .await
                .unwrap()
        );
        let ancestors = store
            .ancestors_of("t1", "parent", &doc("leaf"))
            .await
            .unwrap();
        assert!(ancestors.contains(&(doc("root"), 2)));
    }

    #[tokio::test]
    async fn rebuild_drops_stale_paths() {
        let store = store();
        store
            .add_edge("t1", "parent", &doc("child"), &doc("root"))
            .await
            .unwrap();

        // The edge was deleted upstream; only an unrelated edge survives.
        store
            .rebuild("t1", "parent", &[(doc("other"), doc("root"))])
            .await
            .unwrap();

        assert!(
            !store
                .is_ancestor("t1", "parent", &doc("child"), &doc("root"))
                .await
                .unwrap()
        );
        assert!(
            store
                .is_ancestor("t1", "parent", &doc("other"), &doc("root"))
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn tenants_are_isolated() {
        let store = store();
        store
            .add_edge("t1", "parent", &doc("child"), &doc("root"))
            .await
            .unwrap();

        assert!(
            !store
                .is_ancestor("t2", "parent", &doc("child"), &doc("root"))
                .await
                .unwrap()
        );
    }
}
