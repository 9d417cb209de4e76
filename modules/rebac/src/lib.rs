//! Relationship-based access control.
//!
//! A Zanzibar-style relation algebra: relationship tuples in the storage
//! adapter, per-`(object_type, relation)` rewrite expressions, a
//! bounded-depth evaluator with contextual-tuple precedence and cycle
//! detection, and a materialized closure store that answers common
//! inheritance queries in one lookup.

pub mod config;
pub mod domain;
pub mod infra;

pub use config::RebacConfig;
pub use domain::closure::ClosureStore;
pub use domain::error::RebacError;
pub use domain::evaluator::{RebacCheck, RebacEvaluator};
pub use domain::expression::{ExpressionParseError, RelationExpression};
pub use domain::model::{
    CheckOutcome, ContextTuple, ObjectRef, RelationDefinition, RelationshipTuple, ResolvedVia,
    SubjectRef,
};
pub use domain::repo::{ClosureRepo, DefinitionStore, TupleStore};
pub use domain::service::RelationshipService;
pub use infra::memory::{MemoryClosureRepo, MemoryDefinitionStore, MemoryTupleStore};
pub use infra::storage::{SqlClosureRepo, SqlDefinitionStore, SqlTupleStore};
