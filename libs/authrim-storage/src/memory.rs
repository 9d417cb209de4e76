//! In-memory adapter double.
//!
//! The KV side is a real implementation (TTL enforced against the adapter
//! clock). The relational side is scripted: tests register handlers per
//! statement prefix and the double records every statement it sees.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::adapter::{ExecResult, Row, SqlParam, StorageAdapter, reject_literal_input};
use crate::clock::{Clock, ManualClock};
use crate::error::StorageError;

type QueryHandler = Box<dyn Fn(&[SqlParam]) -> Vec<Row> + Send + Sync>;
type ExecHandler = Box<dyn Fn(&[SqlParam]) -> ExecResult + Send + Sync>;

/// Failure injection for storage-error paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FailureMode {
    None,
    Unavailable,
    Timeout,
}

struct KvEntry {
    value: Vec<u8>,
    expires_at: Option<DateTime<Utc>>,
}

#[derive(Default)]
struct Scripts {
    queries: Vec<(String, QueryHandler)>,
    execs: Vec<(String, ExecHandler)>,
}

/// Scriptable in-memory [`StorageAdapter`].
pub struct MemoryAdapter {
    clock: ManualClock,
    kv: Mutex<HashMap<String, KvEntry>>,
    scripts: Mutex<Scripts>,
    statements: Mutex<Vec<(String, Vec<SqlParam>)>>,
    failure: Mutex<FailureMode>,
}

impl Default for MemoryAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryAdapter {
    #[must_use]
    pub fn new() -> Self {
        Self {
            clock: ManualClock::new(Utc::now()),
            kv: Mutex::new(HashMap::new()),
            scripts: Mutex::new(Scripts::default()),
            statements: Mutex::new(Vec::new()),
            failure: Mutex::new(FailureMode::None),
        }
    }

    /// The settable clock backing [`StorageAdapter::now`].
    #[must_use]
    pub fn clock(&self) -> ManualClock {
        self.clock.clone()
    }

    /// Register a query handler for statements starting with `prefix`.
    /// Unmatched queries return no rows.
    pub fn on_query<F>(&self, prefix: &str, handler: F)
    where
        F: Fn(&[SqlParam]) -> Vec<Row> + Send + Sync + 'static,
    {
        self.scripts
            .lock()
            .queries
            .push((prefix.to_owned(), Box::new(handler)));
    }

    /// Register an execute handler for statements starting with `prefix`.
    /// Unmatched statements report zero changes.
    pub fn on_execute<F>(&self, prefix: &str, handler: F)
    where
        F: Fn(&[SqlParam]) -> ExecResult + Send + Sync + 'static,
    {
        self.scripts
            .lock()
            .execs
            .push((prefix.to_owned(), Box::new(handler)));
    }

    /// Every statement seen so far, in order.
    #[must_use]
    pub fn statements(&self) -> Vec<(String, Vec<SqlParam>)> {
        self.statements.lock().clone()
    }

    /// Make subsequent calls fail as `storage_failure`.
    pub fn fail_unavailable(&self) {
        *self.failure.lock() = FailureMode::Unavailable;
    }

    /// Make subsequent calls fail as `storage_timeout`.
    pub fn fail_timeout(&self) {
        *self.failure.lock() = FailureMode::Timeout;
    }

    /// Clear failure injection.
    pub fn heal(&self) {
        *self.failure.lock() = FailureMode::None;
    }

    fn check_failure(&self) -> Result<(), StorageError> {
        match *self.failure.lock() {
            FailureMode::None => Ok(()),
            FailureMode::Unavailable => Err(StorageError::Unavailable {
                reason: "injected".to_owned(),
            }),
            FailureMode::Timeout => Err(StorageError::Timeout {
                deadline: Duration::from_secs(5),
            }),
        }
    }

    fn record(&self, sql: &str, params: &[SqlParam]) {
        self.statements
            .lock()
            .push((sql.to_owned(), params.to_vec()));
    }

    fn live_value(&self, key: &str) -> Option<Vec<u8>> {
        let now = self.clock.now();
        let mut kv = self.kv.lock();
        match kv.get(key) {
            Some(entry) => {
                if entry.expires_at.is_some_and(|at| at <= now) {
                    kv.remove(key);
                    None
                } else {
                    Some(entry.value.clone())
                }
            }
            None => None,
        }
    }
}

#[async_trait]
impl StorageAdapter for MemoryAdapter {
    async fn query(&self, sql: &str, params: &[SqlParam]) -> Result<Vec<Row>, StorageError> {
        self.check_failure()?;
        reject_literal_input(sql)?;
        self.record(sql, params);
        let scripts = self.scripts.lock();
        for (prefix, handler) in &scripts.queries {
            if sql.starts_with(prefix.as_str()) {
                return Ok(handler(params));
            }
        }
        Ok(Vec::new())
    }

    async fn execute(&self, sql: &str, params: &[SqlParam]) -> Result<ExecResult, StorageError> {
        self.check_failure()?;
        reject_literal_input(sql)?;
        self.record(sql, params);
        let scripts = self.scripts.lock();
        for (prefix, handler) in &scripts.execs {
            if sql.starts_with(prefix.as_str()) {
                return Ok(handler(params));
            }
        }
        Ok(ExecResult::default())
    }

    async fn kv_get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        self.check_failure()?;
        Ok(self.live_value(key))
    }

    async fn kv_put(
        &self,
        key: &str,
        value: &[u8],
        ttl: Option<Duration>,
    ) -> Result<(), StorageError> {
        self.check_failure()?;
        let expires_at = ttl.and_then(|ttl| {
            chrono::Duration::from_std(ttl)
                .ok()
                .map(|d| self.clock.now() + d)
        });
        self.kv.lock().insert(
            key.to_owned(),
            KvEntry {
                value: value.to_vec(),
                expires_at,
            },
        );
        Ok(())
    }

    async fn kv_delete(&self, key: &str) -> Result<(), StorageError> {
        self.check_failure()?;
        self.kv.lock().remove(key);
        Ok(())
    }

    fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }
}
