//! Durability/audit journal.
//!
//! Every state mutation emits a [`StateEvent`] after the owning critical
//! section commits. The store does not know the sink: embedders plug a
//! KV-backed journal for durability or the in-memory one for tests.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use authrim_storage::StorageAdapter;

/// One journaled state transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum StateEvent {
    Stored {
        kind: String,
        key: String,
        at: DateTime<Utc>,
    },
    Consumed {
        kind: String,
        key: String,
        client_id: String,
        at: DateTime<Utc>,
    },
    Violation {
        kind: String,
        key: String,
        code: String,
        at: DateTime<Utc>,
    },
    Rotated {
        family_id: String,
        old_token: String,
        new_token: String,
        at: DateTime<Utc>,
    },
    FamilyRevoked {
        family_id: String,
        tokens: Vec<String>,
        at: DateTime<Utc>,
    },
}

/// A sink for state events.
#[async_trait]
pub trait StateJournal: Send + Sync {
    async fn record(&self, event: StateEvent);
}

/// Journal into the adapter KV, one entry per event.
pub struct KvJournal {
    adapter: Arc<dyn StorageAdapter>,
}

impl KvJournal {
    #[must_use]
    pub fn new(adapter: Arc<dyn StorageAdapter>) -> Self {
        Self { adapter }
    }
}

#[async_trait]
impl StateJournal for KvJournal {
    async fn record(&self, event: StateEvent) {
        let key = format!("statelog:{}", Uuid::new_v4());
        match serde_json::to_vec(&event) {
            Ok(bytes) => {
                if let Err(err) = self.adapter.kv_put(&key, &bytes, None).await {
                    warn!(error = %err, "state journal write failed");
                }
            }
            Err(err) => warn!(error = %err, "state event not serializable"),
        }
    }
}

/// In-memory journal for tests and embedded use.
#[derive(Default)]
pub struct MemoryJournal {
    events: Mutex<Vec<StateEvent>>,
}

impl MemoryJournal {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn events(&self) -> Vec<StateEvent> {
        self.events.lock().clone()
    }
}

#[async_trait]
impl StateJournal for MemoryJournal {
    async fn record(&self, event: StateEvent) {
        self.events.lock().push(event);
    }
}
