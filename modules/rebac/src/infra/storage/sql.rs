//! SQL-backed repositories over the storage adapter.
//!
//! Expected tables:
//!
//! ```sql
//! relationship_tuples(tenant, from_type, from_id, relation, to_type, to_id, created_at)
//! relation_definitions(tenant, object_type, relation_name, expression, updated_at)
//! closure_entries(tenant, relation, ancestor_type, ancestor_id,
//!                 descendant_type, descendant_id, depth)
//! ```
//!
//! Every statement is fully parameterized and runs under the storage
//! deadline. Upserts are single idempotent statements; the adapter never
//! sees a transaction.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use authrim_storage::{
    DEFAULT_STORAGE_DEADLINE, Row, SqlParam, StorageAdapter, with_deadline,
};

use crate::domain::error::RebacError;
use crate::domain::model::{ObjectRef, RelationDefinition, RelationshipTuple, SubjectRef};
use crate::domain::repo::{ClosureRepo, DefinitionStore, TupleStore};

const TUPLE_EXISTS: &str = "SELECT from_id FROM relationship_tuples WHERE tenant = ? AND from_type = ? AND from_id = ? AND relation = ? AND to_type = ? AND to_id = ? LIMIT 1";
const TUPLE_PARENTS: &str = "SELECT to_type, to_id FROM relationship_tuples WHERE tenant = ? AND from_type = ? AND from_id = ? AND relation = ? ORDER BY to_type, to_id";
const TUPLE_EDGES: &str = "SELECT from_type, from_id, to_type, to_id FROM relationship_tuples WHERE tenant = ? AND relation = ? ORDER BY from_type, from_id";
const TUPLE_INSERT: &str = "INSERT INTO relationship_tuples (tenant, from_type, from_id, relation, to_type, to_id, created_at) VALUES (?, ?, ?, ?, ?, ?, ?)";
const TUPLE_DELETE: &str = "DELETE FROM relationship_tuples WHERE tenant = ? AND from_type = ? AND from_id = ? AND relation = ? AND to_type = ? AND to_id = ?";

const DEFINITION_FIND: &str = "SELECT tenant, object_type, relation_name, expression, updated_at FROM relation_definitions WHERE tenant = ? AND object_type = ? AND relation_name = ? LIMIT 1";
const DEFINITION_UPSERT: &str = "INSERT INTO relation_definitions (tenant, object_type, relation_name, expression, updated_at) VALUES (?, ?, ?, ?, ?) ON CONFLICT (tenant, object_type, relation_name) DO UPDATE SET expression = excluded.expression, updated_at = excluded.updated_at";

const CLOSURE_ANCESTORS: &str = "SELECT ancestor_type, ancestor_id, depth FROM closure_entries WHERE tenant = ? AND relation = ? AND descendant_type = ? AND descendant_id = ? ORDER BY depth";
const CLOSURE_DESCENDANTS: &str = "SELECT descendant_type, descendant_id, depth FROM closure_entries WHERE tenant = ? AND relation = ? AND ancestor_type = ? AND ancestor_id = ? ORDER BY depth";
const CLOSURE_INSERT: &str = "INSERT INTO closure_entries (tenant, relation, ancestor_type, ancestor_id, descendant_type, descendant_id, depth) VALUES (?, ?, ?, ?, ?, ?, ?) ON CONFLICT (tenant, relation, ancestor_type, ancestor_id, descendant_type, descendant_id) DO UPDATE SET depth = MIN(closure_entries.depth, excluded.depth)";
const CLOSURE_CLEAR: &str = "DELETE FROM closure_entries WHERE tenant = ? AND relation = ?";

fn object_from_row(row: &Row, type_col: &str, id_col: &str) -> Option<ObjectRef> {
    Some(ObjectRef::new(
        row.get_text(type_col)?.to_owned(),
        row.get_text(id_col)?.to_owned(),
    ))
}

/// Tuple store over `relationship_tuples`.
pub struct SqlTupleStore {
    adapter: Arc<dyn StorageAdapter>,
    deadline: Duration,
}

impl SqlTupleStore {
    #[must_use]
    pub fn new(adapter: Arc<dyn StorageAdapter>) -> Self {
        Self {
            adapter,
            deadline: DEFAULT_STORAGE_DEADLINE,
        }
    }

    #[must_use]
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }
}

#[async_trait]
impl TupleStore for SqlTupleStore {
    async fn has_direct(
        &self,
        tenant: &str,
        subject: &SubjectRef,
        relation: &str,
        object: &ObjectRef,
    ) -> Result<bool, RebacError> {
        let rows = with_deadline(
            self.deadline,
            self.adapter.query(
                TUPLE_EXISTS,
                &[
                    tenant.into(),
                    subject.subject_type.as_str().into(),
                    subject.subject_id.as_str().into(),
                    relation.into(),
                    object.object_type.as_str().into(),
                    object.object_id.as_str().into(),
                ],
            ),
        )
        .await?;
        Ok(!rows.is_empty())
    }

    async fn parents_via(
        &self,
        tenant: &str,
        tupleset_relation: &str,
        object: &ObjectRef,
    ) -> Result<Vec<ObjectRef>, RebacError> {
        let rows = with_deadline(
            self.deadline,
            self.adapter.query(
                TUPLE_PARENTS,
                &[
                    tenant.into(),
                    object.object_type.as_str().into(),
                    object.object_id.as_str().into(),
                    tupleset_relation.into(),
                ],
            ),
        )
        .await?;
        Ok(rows
            .iter()
            .filter_map(|row| object_from_row(row, "to_type", "to_id"))
            .collect())
    }

    async fn edges_for_relation(
        &self,
        tenant: &str,
        relation: &str,
    ) -> Result<Vec<(ObjectRef, ObjectRef)>, RebacError> {
        let rows = with_deadline(
            self.deadline,
            self.adapter
                .query(TUPLE_EDGES, &[tenant.into(), relation.into()]),
        )
        .await?;
        Ok(rows
            .iter()
            .filter_map(|row| {
                Some((
                    object_from_row(row, "from_type", "from_id")?,
                    object_from_row(row, "to_type", "to_id")?,
                ))
            })
            .collect())
    }

    async fn write(&self, tuple: &RelationshipTuple) -> Result<(), RebacError> {
        let existing = with_deadline(
            self.deadline,
            self.adapter.query(
                TUPLE_EXISTS,
                &[
                    tuple.tenant.as_str().into(),
                    tuple.from_type.as_str().into(),
                    tuple.from_id.as_str().into(),
                    tuple.relation.as_str().into(),
                    tuple.to_type.as_str().into(),
                    tuple.to_id.as_str().into(),
                ],
            ),
        )
        .await?;
        if !existing.is_empty() {
            return Err(RebacError::DuplicateTuple);
        }

        with_deadline(
            self.deadline,
            self.adapter.execute(
                TUPLE_INSERT,
                &[
                    tuple.tenant.as_str().into(),
                    tuple.from_type.as_str().into(),
                    tuple.from_id.as_str().into(),
                    tuple.relation.as_str().into(),
                    tuple.to_type.as_str().into(),
                    tuple.to_id.as_str().into(),
                    tuple.created_at.into(),
                ],
            ),
        )
        .await?;
        Ok(())
    }

    async fn delete(
        &self,
        tenant: &str,
        from: &ObjectRef,
        relation: &str,
        to: &ObjectRef,
    ) -> Result<bool, RebacError> {
        let result = with_deadline(
            self.deadline,
            self.adapter.execute(
                TUPLE_DELETE,
                &[
                    tenant.into(),
                    from.object_type.as_str().into(),
                    from.object_id.as_str().into(),
                    relation.into(),
                    to.object_type.as_str().into(),
                    to.object_id.as_str().into(),
                ],
            ),
        )
        .await?;
        Ok(result.changes > 0)
    }
}

/// Definition store over `relation_definitions`.
pub struct SqlDefinitionStore {
    adapter: Arc<dyn StorageAdapter>,
    deadline: Duration,
}

impl SqlDefinitionStore {
    #[must_use]
    pub fn new(adapter: Arc<dyn StorageAdapter>) -> Self {
        Self {
            adapter,
            deadline: DEFAULT_STORAGE_DEADLINE,
        }
    }
}

#[async_trait]
impl DefinitionStore for SqlDefinitionStore {
    async fn find(
        &self,
        tenant: &str,
        object_type: &str,
        relation: &str,
    ) -> Result<Option<RelationDefinition>, RebacError> {
        let rows = with_deadline(
            self.deadline,
            self.adapter.query(
                DEFINITION_FIND,
                &[tenant.into(), object_type.into(), relation.into()],
            ),
        )
        .await?;
        Ok(rows.first().and_then(|row| {
            Some(RelationDefinition {
                tenant: row.get_text("tenant")?.to_owned(),
                object_type: row.get_text("object_type")?.to_owned(),
                relation_name: row.get_text("relation_name")?.to_owned(),
                expression: row.get_text("expression")?.to_owned(),
                updated_at: row.get_datetime("updated_at").unwrap_or_else(Utc::now),
            })
        }))
    }

    async fn upsert(&self, definition: &RelationDefinition) -> Result<(), RebacError> {
        with_deadline(
            self.deadline,
            self.adapter.execute(
                DEFINITION_UPSERT,
                &[
                    definition.tenant.as_str().into(),
                    definition.object_type.as_str().into(),
                    definition.relation_name.as_str().into(),
                    definition.expression.as_str().into(),
                    definition.updated_at.into(),
                ],
            ),
        )
        .await?;
        Ok(())
    }
}

/// Closure rows over `closure_entries`.
pub struct SqlClosureRepo {
    adapter: Arc<dyn StorageAdapter>,
    deadline: Duration,
}

impl SqlClosureRepo {
    #[must_use]
    pub fn new(adapter: Arc<dyn StorageAdapter>) -> Self {
        Self {
            adapter,
            deadline: DEFAULT_STORAGE_DEADLINE,
        }
    }

    fn entry_from_row(row: &Row, type_col: &str, id_col: &str) -> Option<(ObjectRef, i64)> {
        Some((object_from_row(row, type_col, id_col)?, row.get_i64("depth")?))
    }
}

#[async_trait]
impl ClosureRepo for SqlClosureRepo {
    async fn ancestors_of(
        &self,
        tenant: &str,
        relation: &str,
        descendant: &ObjectRef,
    ) -> Result<Vec<(ObjectRef, i64)>, RebacError> {
        let rows = with_deadline(
            self.deadline,
            self.adapter.query(
                CLOSURE_ANCESTORS,
                &[
                    tenant.into(),
                    relation.into(),
                    descendant.object_type.as_str().into(),
                    descendant.object_id.as_str().into(),
                ],
            ),
        )
        .await?;
        Ok(rows
            .iter()
            .filter_map(|row| Self::entry_from_row(row, "ancestor_type", "ancestor_id"))
            .collect())
    }

    async fn descendants_of(
        &self,
        tenant: &str,
        relation: &str,
        ancestor: &ObjectRef,
    ) -> Result<Vec<(ObjectRef, i64)>, RebacError> {
        let rows = with_deadline(
            self.deadline,
            self.adapter.query(
                CLOSURE_DESCENDANTS,
                &[
                    tenant.into(),
                    relation.into(),
                    ancestor.object_type.as_str().into(),
                    ancestor.object_id.as_str().into(),
                ],
            ),
        )
        .await?;
        Ok(rows
            .iter()
            .filter_map(|row| Self::entry_from_row(row, "descendant_type", "descendant_id"))
            .collect())
    }

    async fn insert(
        &self,
        tenant: &str,
        relation: &str,
        ancestor: &ObjectRef,
        descendant: &ObjectRef,
        depth: i64,
    ) -> Result<(), RebacError> {
        with_deadline(
            self.deadline,
            self.adapter.execute(
                CLOSURE_INSERT,
                &[
                    tenant.into(),
                    relation.into(),
                    ancestor.object_type.as_str().into(),
                    ancestor.object_id.as_str().into(),
                    descendant.object_type.as_str().into(),
                    descendant.object_id.as_str().into(),
                    SqlParam::Int(depth),
                ],
            ),
        )
        .await?;
        Ok(())
    }

    async fn clear_relation(&self, tenant: &str, relation: &str) -> Result<(), RebacError> {
        with_deadline(
            self.deadline,
            self.adapter
                .execute(CLOSURE_CLEAR, &[tenant.into(), relation.into()]),
        )
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use authrim_storage::{ExecResult, MemoryAdapter, SqlValue};

    #[tokio::test]
    async fn has_direct_binds_all_six_fields() {
        let adapter = Arc::new(MemoryAdapter::new());
        adapter.on_query("SELECT from_id FROM relationship_tuples", |params| {
            assert_eq!(params.len(), 6);
            vec![Row::from_pairs([("from_id", SqlValue::Text("user_123".to_owned()))])]
        });
        let store = SqlTupleStore::new(adapter);

        let hit = store
            .has_direct(
                "t1",
                &SubjectRef::new("user", "user_123"),
                "viewer",
                &ObjectRef::new("document", "doc_456"),
            )
            .await
            .unwrap();
        assert!(hit);
    }

    #[tokio::test]
    async fn write_rejects_duplicates_before_insert() {
        let adapter = Arc::new(MemoryAdapter::new());
        adapter.on_query("SELECT from_id FROM relationship_tuples", |_| {
            vec![Row::from_pairs([("from_id", SqlValue::Text("user_123".to_owned()))])]
        });
        let store = SqlTupleStore::new(adapter.clone());

        let err = store
            .write(&RelationshipTuple {
                tenant: "t1".to_owned(),
                from_type: "user".to_owned(),
                from_id: "user_123".to_owned(),
                relation: "viewer".to_owned(),
                to_type: "document".to_owned(),
                to_id: "doc_456".to_owned(),
                created_at: Utc::now(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, RebacError::DuplicateTuple));
        // Only the existence probe ran.
        assert_eq!(adapter.statements().len(), 1);
    }

    #[tokio::test]
    async fn delete_reports_whether_a_row_went_away() {
        let adapter = Arc::new(MemoryAdapter::new());
        adapter.on_execute("DELETE FROM relationship_tuples", |_| ExecResult {
            changes: 1,
            last_row_id: None,
        });
        let store = SqlTupleStore::new(adapter);

        let existed = store
            .delete(
                "t1",
                &ObjectRef::new("user", "user_123"),
                "viewer",
                &ObjectRef::new("document", "doc_456"),
            )
            .await
            .unwrap();
        assert!(existed);
    }

    #[tokio::test]
    async fn definition_round_trips_through_rows() {
        let adapter = Arc::new(MemoryAdapter::new());
        adapter.on_query("SELECT tenant, object_type", |_| {
            vec![Row::from_pairs([
                ("tenant", SqlValue::Text("t1".to_owned())),
                ("object_type", SqlValue::Text("document".to_owned())),
                ("relation_name", SqlValue::Text("viewer".to_owned())),
                (
                    "expression",
                    SqlValue::Text("{\"type\":\"direct\"}".to_owned()),
                ),
                (
                    "updated_at",
                    SqlValue::Text("2026-03-01T00:00:00+00:00".to_owned()),
                ),
            ])]
        });
        let store = SqlDefinitionStore::new(adapter);

        let definition = store.find("t1", "document", "viewer").await.unwrap().unwrap();
        assert_eq!(definition.relation_name, "viewer");
        assert_eq!(definition.expression, "{\"type\":\"direct\"}");
    }

    #[tokio::test]
    async fn closure_rows_map_to_entries() {
        let adapter = Arc::new(MemoryAdapter::new());
        adapter.on_query("SELECT ancestor_type", |_| {
            vec![
                Row::from_pairs([
                    ("ancestor_type", SqlValue::Text("document".to_owned())),
                    ("ancestor_id", SqlValue::Text("doc_child".to_owned())),
                    ("depth", SqlValue::Int(0)),
                ]),
                Row::from_pairs([
                    ("ancestor_type", SqlValue::Text("document".to_owned())),
                    ("ancestor_id", SqlValue::Text("doc_root".to_owned())),
                    ("depth", SqlValue::Int(1)),
                ]),
            ]
        });
        let repo = SqlClosureRepo::new(adapter);

        let ancestors = repo
            .ancestors_of("t1", "parent", &ObjectRef::new("document", "doc_child"))
            .await
            .unwrap();
        assert_eq!(ancestors.len(), 2);
        assert_eq!(ancestors[1], (ObjectRef::new("document", "doc_root"), 1));
    }
}
