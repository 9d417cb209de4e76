pub mod sql;

pub use sql::{SqlClosureRepo, SqlDefinitionStore, SqlTupleStore};
