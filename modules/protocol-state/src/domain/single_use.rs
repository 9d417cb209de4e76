//! The generic consume-once store.

use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::debug;

use authrim_storage::Clock;

use super::error::SingleUseError;
use super::journal::{StateEvent, StateJournal};
use super::model::StoreHealth;

struct Entry<T> {
    data: T,
    client_id: String,
    expires_at: DateTime<Utc>,
    consumed: bool,
}

/// A consume-once keyed store.
///
/// Every key hashes to exactly one shard mutex — its single owner. All
/// verdicts (`not_found` / `expired` / `single_use_violation` / success)
/// are decided inside that owner's critical section, so concurrent
/// consumers of one key see exactly one success. Consumed and expired
/// entries stay behind as tombstones until [`Self::purge_expired`] so
/// audit can tell replay from expiry.
pub struct SingleUseStore<T> {
    kind: &'static str,
    shards: Vec<Mutex<HashMap<String, Entry<T>>>>,
    clock: Arc<dyn Clock>,
    journal: Arc<dyn StateJournal>,
}

impl<T: Clone + Send + Sync> SingleUseStore<T> {
    #[must_use]
    pub fn new(
        kind: &'static str,
        shards: usize,
        clock: Arc<dyn Clock>,
        journal: Arc<dyn StateJournal>,
    ) -> Self {
        let shards = shards.max(1);
        Self {
            kind,
            shards: (0..shards).map(|_| Mutex::new(HashMap::new())).collect(),
            clock,
            journal,
        }
    }

    fn shard(&self, key: &str) -> &Mutex<HashMap<String, Entry<T>>> {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        let index = usize::try_from(hasher.finish()).unwrap_or(0) % self.shards.len();
        &self.shards[index]
    }

    /// Insert a key. Collision with any existing entry, tombstoned or
    /// live, is an error.
    ///
    /// # Errors
    ///
    /// [`SingleUseError::KeyExists`].
    pub async fn store(
        &self,
        key: &str,
        client_id: &str,
        data: T,
        ttl: Duration,
    ) -> Result<(), SingleUseError> {
        let expires_at = self.clock.now()
            + chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::seconds(600));
        {
            let mut shard = self.shard(key).lock();
            if shard.contains_key(key) {
                return Err(SingleUseError::KeyExists);
            }
            shard.insert(
                key.to_owned(),
                Entry {
                    data,
                    client_id: client_id.to_owned(),
                    expires_at,
                    consumed: false,
                },
            );
        }
        self.journal
            .record(StateEvent::Stored {
                kind: self.kind.to_owned(),
                key: key.to_owned(),
                at: self.clock.now(),
            })
            .await;
        Ok(())
    }

    /// Atomic check-and-consume.
    ///
    /// # Errors
    ///
    /// [`SingleUseError::NotFound`] for an unknown key,
    /// [`SingleUseError::Expired`] past its TTL, and
    /// [`SingleUseError::SingleUseViolation`] when already consumed or
    /// presented by a different client.
    pub async fn consume(&self, key: &str, client_id: &str) -> Result<T, SingleUseError> {
        let now = self.clock.now();
        let verdict = {
            let mut shard = self.shard(key).lock();
            match shard.get_mut(key) {
                None => Err(SingleUseError::NotFound),
                Some(entry) if entry.consumed => Err(SingleUseError::SingleUseViolation),
                Some(entry) if entry.expires_at <= now => Err(SingleUseError::Expired),
                Some(entry) if entry.client_id != client_id => {
                    Err(SingleUseError::SingleUseViolation)
                }
                Some(entry) => {
                    entry.consumed = true;
                    Ok(entry.data.clone())
                }
            }
        };

        match &verdict {
            Ok(_) => {
                debug!(kind = self.kind, key, "key consumed");
                self.journal
                    .record(StateEvent::Consumed {
                        kind: self.kind.to_owned(),
                        key: key.to_owned(),
                        client_id: client_id.to_owned(),
                        at: now,
                    })
                    .await;
            }
            Err(err) => {
                self.journal
                    .record(StateEvent::Violation {
                        kind: self.kind.to_owned(),
                        key: key.to_owned(),
                        code: err.code().to_owned(),
                        at: now,
                    })
                    .await;
            }
        }
        verdict
    }

    /// Read without consuming; for validation only. Tombstones and
    /// expired entries are invisible.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<T> {
        let now = self.clock.now();
        let shard = self.shard(key).lock();
        shard
            .get(key)
            .filter(|entry| !entry.consumed && entry.expires_at > now)
            .map(|entry| entry.data.clone())
    }

    /// Remove a key outright; returns whether it existed.
    pub fn delete(&self, key: &str) -> bool {
        self.shard(key).lock().remove(key).is_some()
    }

    /// Counters over every shard.
    #[must_use]
    pub fn health(&self) -> StoreHealth {
        let now = self.clock.now();
        let mut health = StoreHealth::default();
        for shard in &self.shards {
            for entry in shard.lock().values() {
                if entry.consumed {
                    health.consumed += 1;
                } else if entry.expires_at <= now {
                    health.expired += 1;
                } else {
                    health.active += 1;
                }
            }
        }
        health
    }

    /// Drop tombstones whose TTL has passed; returns how many went away.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let mut removed = 0;
        for shard in &self.shards {
            let mut shard = shard.lock();
            let before = shard.len();
            shard.retain(|_, entry| entry.expires_at > now);
            removed += before - shard.len();
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::journal::MemoryJournal;
    use authrim_storage::ManualClock;

    fn store() -> (ManualClock, Arc<MemoryJournal>, SingleUseStore<String>) {
        let clock = ManualClock::new(Utc::now());
        let journal = Arc::new(MemoryJournal::new());
        let store = SingleUseStore::new("par", 16, Arc::new(clock.clone()), journal.clone());
        (clock, journal, store)
    }

    #[tokio::test]
    async fn store_get_consume_then_violation() {
        let (_, _, store) = store();
        store
            .store("req_uri_1", "client_a", "data".to_owned(), Duration::from_secs(600))
            .await
            .unwrap();

        assert_eq!(store.get("req_uri_1"), Some("data".to_owned()));
        assert_eq!(
            store.consume("req_uri_1", "client_a").await.unwrap(),
            "data"
        );
        assert_eq!(
            store.consume("req_uri_1", "client_a").await.unwrap_err(),
            SingleUseError::SingleUseViolation
        );
    }

    #[tokio::test]
    async fn unknown_key_is_not_found() {
        let (_, _, store) = store();
        assert_eq!(
            store.consume("nope", "client_a").await.unwrap_err(),
            SingleUseError::NotFound
        );
    }

    #[tokio::test]
    async fn expiry_is_distinguished_from_replay() {
        let (clock, _, store) = store();
        store
            .store("req_uri_1", "client_a", "data".to_owned(), Duration::from_secs(600))
            .await
            .unwrap();

        clock.advance(chrono::Duration::seconds(601));
        assert_eq!(
            store.consume("req_uri_1", "client_a").await.unwrap_err(),
            SingleUseError::Expired
        );
        assert_eq!(store.get("req_uri_1"), None);
    }

    #[tokio::test]
    async fn client_mismatch_is_a_single_use_violation() {
        let (_, _, store) = store();
        store
            .store("req_uri_1", "client_a", "data".to_owned(), Duration::from_secs(600))
            .await
            .unwrap();
        assert_eq!(
            store.consume("req_uri_1", "client_b").await.unwrap_err(),
            SingleUseError::SingleUseViolation
        );
        // The rightful client can still pick it up.
        assert!(store.consume("req_uri_1", "client_a").await.is_ok());
    }

    #[tokio::test]
    async fn key_collision_is_an_error() {
        let (_, _, store) = store();
        store
            .store("k", "client_a", "one".to_owned(), Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(
            store
                .store("k", "client_a", "two".to_owned(), Duration::from_secs(60))
                .await
                .unwrap_err(),
            SingleUseError::KeyExists
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn concurrent_consumers_produce_exactly_one_winner() {
        let (_, _, store) = store();
        let store = Arc::new(store);
        store
            .store("req_uri_1", "client_a", "data".to_owned(), Duration::from_secs(600))
            .await
            .unwrap();

        let mut handles = Vec::new();
        for _ in 0..16 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.consume("req_uri_1", "client_a").await
            }));
        }

        let mut wins = 0;
        let mut violations = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => wins += 1,
                Err(SingleUseError::SingleUseViolation) => violations += 1,
                Err(other) => panic!("unexpected verdict: {other:?}"),
            }
        }
        assert_eq!(wins, 1);
        assert_eq!(violations, 15);
    }

    #[tokio::test]
    async fn health_and_purge() {
        let (clock, _, store) = store();
        store
            .store("live", "c", "1".to_owned(), Duration::from_secs(3600))
            .await
            .unwrap();
        store
            .store("used", "c", "2".to_owned(), Duration::from_secs(600))
            .await
            .unwrap();
        store
            .store("stale", "c", "3".to_owned(), Duration::from_secs(10))
            .await
            .unwrap();
        store.consume("used", "c").await.unwrap();
        clock.advance(chrono::Duration::seconds(11));

        let health = store.health();
        assert_eq!(health.active, 1);
        assert_eq!(health.consumed, 1);
        assert_eq!(health.expired, 1);

        // 'used' and 'stale' both have passed TTLs by then.
        clock.advance(chrono::Duration::seconds(600));
        assert_eq!(store.purge_expired(), 2);
        assert_eq!(store.health().active, 1);
    }

    #[tokio::test]
    async fn journal_sees_the_lifecycle() {
        let (_, journal, store) = store();
        store
            .store("k", "client_a", "v".to_owned(), Duration::from_secs(60))
            .await
            .unwrap();
        store.consume("k", "client_a").await.unwrap();
        let _ = store.consume("k", "client_a").await;

        let events = journal.events();
        assert!(matches!(events[0], StateEvent::Stored { .. }));
        assert!(matches!(events[1], StateEvent::Consumed { .. }));
        assert!(
            matches!(&events[2], StateEvent::Violation { code, .. } if code == "single_use_violation")
        );
    }
}
