//! The storage adapter trait and its value types.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::StorageError;

/// A positional statement parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlParam {
    Text(String),
    Int(i64),
    Real(f64),
    Bool(bool),
    Blob(Vec<u8>),
    Null,
}

impl From<&str> for SqlParam {
    fn from(v: &str) -> Self {
        Self::Text(v.to_owned())
    }
}

impl From<String> for SqlParam {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<i64> for SqlParam {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<bool> for SqlParam {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<DateTime<Utc>> for SqlParam {
    fn from(v: DateTime<Utc>) -> Self {
        Self::Text(v.to_rfc3339())
    }
}

/// A single column value in a result row.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Text(String),
    Int(i64),
    Real(f64),
    Bool(bool),
    Blob(Vec<u8>),
    Null,
}

/// One result row, keyed by column name.
#[derive(Debug, Clone, Default)]
pub struct Row {
    columns: HashMap<String, SqlValue>,
}

impl Row {
    #[must_use]
    pub fn new(columns: HashMap<String, SqlValue>) -> Self {
        Self { columns }
    }

    /// Build a row from `(column, value)` pairs.
    pub fn from_pairs<I, K>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, SqlValue)>,
        K: Into<String>,
    {
        Self {
            columns: pairs.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }

    #[must_use]
    pub fn get(&self, column: &str) -> Option<&SqlValue> {
        self.columns.get(column)
    }

    #[must_use]
    pub fn get_text(&self, column: &str) -> Option<&str> {
        match self.columns.get(column) {
            Some(SqlValue::Text(s)) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn get_i64(&self, column: &str) -> Option<i64> {
        match self.columns.get(column) {
            Some(SqlValue::Int(v)) => Some(*v),
            _ => None,
        }
    }

    #[must_use]
    pub fn get_f64(&self, column: &str) -> Option<f64> {
        match self.columns.get(column) {
            Some(SqlValue::Real(v)) => Some(*v),
            Some(SqlValue::Int(v)) => {
                // SQLite-style backends report integral reals as integers.
                #[allow(clippy::cast_precision_loss)]
                let as_real = *v as f64;
                Some(as_real)
            }
            _ => None,
        }
    }

    #[must_use]
    pub fn get_bool(&self, column: &str) -> Option<bool> {
        match self.columns.get(column) {
            Some(SqlValue::Bool(v)) => Some(*v),
            Some(SqlValue::Int(v)) => Some(*v != 0),
            _ => None,
        }
    }

    /// Read a column as an RFC 3339 timestamp.
    #[must_use]
    pub fn get_datetime(&self, column: &str) -> Option<DateTime<Utc>> {
        self.get_text(column)
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))
    }
}

/// Outcome of an `execute` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecResult {
    /// Rows changed by the statement.
    pub changes: u64,
    /// Backend-assigned row id of the last insert, when the backend has one.
    pub last_row_id: Option<i64>,
}

/// Capability surface the core consumes.
///
/// Contracts: `query` is read-only and side-effect free; `execute` is atomic
/// for a single statement; there are no transactions — higher-level
/// atomicity comes from single-statement idempotent updates and the
/// single-owner stores. Binding is positional and the adapter rejects SQL
/// carrying literal user input (see [`reject_literal_input`]).
#[async_trait]
pub trait StorageAdapter: Send + Sync {
    /// Run a read-only statement and return its rows in backend order.
    async fn query(&self, sql: &str, params: &[SqlParam]) -> Result<Vec<Row>, StorageError>;

    /// Run a single mutating statement atomically.
    async fn execute(&self, sql: &str, params: &[SqlParam]) -> Result<ExecResult, StorageError>;

    async fn kv_get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;

    async fn kv_put(
        &self,
        key: &str,
        value: &[u8],
        ttl: Option<Duration>,
    ) -> Result<(), StorageError>;

    async fn kv_delete(&self, key: &str) -> Result<(), StorageError>;

    /// The wall clock every TTL decision against this adapter uses.
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Reject SQL that embeds literal user input.
///
/// The core always parametrizes, so a statement reaching an adapter must not
/// contain quoted string literals or statement separators.
///
/// # Errors
///
/// [`StorageError::InvalidSql`] when the statement text carries a quote
/// character or a `;` separator.
pub fn reject_literal_input(sql: &str) -> Result<(), StorageError> {
    if sql.contains('\'') || sql.contains('"') {
        return Err(StorageError::InvalidSql {
            reason: "statement contains a quoted literal; bind it instead".to_owned(),
        });
    }
    if sql.contains(';') {
        return Err(StorageError::InvalidSql {
            reason: "multi-statement text is not accepted".to_owned(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_typed_getters() {
        let row = Row::from_pairs([
            ("name", SqlValue::Text("viewer".to_owned())),
            ("depth", SqlValue::Int(2)),
            ("consumed", SqlValue::Int(1)),
            ("score", SqlValue::Real(0.5)),
        ]);
        assert_eq!(row.get_text("name"), Some("viewer"));
        assert_eq!(row.get_i64("depth"), Some(2));
        assert_eq!(row.get_bool("consumed"), Some(true));
        assert_eq!(row.get_f64("score"), Some(0.5));
        assert_eq!(row.get_text("missing"), None);
    }

    #[test]
    fn row_parses_rfc3339_timestamps() {
        let row = Row::from_pairs([(
            "created_at",
            SqlValue::Text("2026-03-01T10:30:00+00:00".to_owned()),
        )]);
        let dt = row.get_datetime("created_at").unwrap();
        assert_eq!(dt.to_rfc3339(), "2026-03-01T10:30:00+00:00");
    }

    #[test]
    fn literal_input_is_rejected() {
        assert!(reject_literal_input("SELECT * FROM tuples WHERE tenant = ?").is_ok());
        assert!(reject_literal_input("SELECT * FROM tuples WHERE tenant = 'acme'").is_err());
        assert!(reject_literal_input("DELETE FROM tuples; DROP TABLE tuples").is_err());
    }
}
