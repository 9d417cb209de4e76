//! Process-wide cache manager.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use authrim_storage::StorageAdapter;

use crate::fingerprint::{CheckFingerprint, CheckKey};

const VALUE_PREFIX: &str = "authz:check:";
const SUBJECT_INDEX_PREFIX: &str = "authz:idx:subject:";
const OBJECT_INDEX_PREFIX: &str = "authz:idx:object:";

/// A cached check decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedDecision {
    pub allowed: bool,
    pub resolved_via: String,
    pub path: Vec<String>,
    pub generation: u64,
    pub stored_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl CachedDecision {
    /// Build an entry for tests and request-tier memoization.
    #[must_use]
    pub fn hit(
        allowed: bool,
        resolved_via: impl Into<String>,
        path: Vec<String>,
        generation: u64,
    ) -> Self {
        let now = Utc::now();
        Self {
            allowed,
            resolved_via: resolved_via.into(),
            path,
            generation,
            stored_at: now,
            expires_at: now + chrono::Duration::seconds(60),
        }
    }
}

/// Process/edge tier: a concurrent front map written through to the adapter
/// KV, with per-subject and per-object key indexes for invalidation.
///
/// Pattern invalidation sweeps the keys this process has observed; the
/// cross-process hammer is [`CacheManager::bump_generation`], which forces
/// misses everywhere without deleting data.
pub struct CacheManager {
    adapter: Arc<dyn StorageAdapter>,
    front: DashMap<String, CachedDecision>,
    subject_index: DashMap<String, HashSet<String>>,
    object_index: DashMap<String, HashSet<String>>,
    generation: AtomicU64,
    default_ttl: Duration,
}

impl CacheManager {
    #[must_use]
    pub fn new(adapter: Arc<dyn StorageAdapter>) -> Self {
        Self {
            adapter,
            front: DashMap::new(),
            subject_index: DashMap::new(),
            object_index: DashMap::new(),
            generation: AtomicU64::new(0),
            default_ttl: Duration::from_secs(60),
        }
    }

    #[must_use]
    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    #[must_use]
    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Relaxed)
    }

    /// Force a miss for every existing entry without deleting data.
    pub fn bump_generation(&self) {
        let gen_now = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
        debug!(generation = gen_now, "cache generation bumped");
    }

    /// Probe both shared tiers.
    ///
    /// Storage failures degrade to a miss; a cached decision is never
    /// required for correctness.
    pub async fn get(&self, key: &CheckKey) -> Option<CachedDecision> {
        let fp = key.fingerprint();
        let storage_key = Self::value_key(&fp);
        let now = self.adapter.now();
        let generation = self.generation();

        if let Some(entry) = self.front.get(&storage_key) {
            if entry.expires_at > now && entry.generation == generation {
                return Some(entry.clone());
            }
            drop(entry);
            self.front.remove(&storage_key);
        }

        let bytes = match self.adapter.kv_get(&storage_key).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return None,
            Err(err) => {
                warn!(error = %err, "cache probe failed; treating as miss");
                return None;
            }
        };

        match serde_json::from_slice::<CachedDecision>(&bytes) {
            Ok(decision) if decision.expires_at > now && decision.generation == generation => {
                self.front.insert(storage_key, decision.clone());
                Some(decision)
            }
            Ok(_) => None,
            Err(err) => {
                warn!(error = %err, "cache entry undecodable; treating as miss");
                None
            }
        }
    }

    /// Store a decision under the key's fingerprint and maintain the
    /// secondary indexes.
    pub async fn store(
        &self,
        key: &CheckKey,
        allowed: bool,
        resolved_via: impl Into<String>,
        path: Vec<String>,
        ttl: Option<Duration>,
    ) -> CachedDecision {
        let ttl = ttl.unwrap_or(self.default_ttl);
        let now = self.adapter.now();
        let decision = CachedDecision {
            allowed,
            resolved_via: resolved_via.into(),
            path,
            generation: self.generation(),
            stored_at: now,
            expires_at: now
                + chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::seconds(60)),
        };

        let fp = key.fingerprint();
        let storage_key = Self::value_key(&fp);
        self.front.insert(storage_key.clone(), decision.clone());

        match serde_json::to_vec(&decision) {
            Ok(bytes) => {
                if let Err(err) = self.adapter.kv_put(&storage_key, &bytes, Some(ttl)).await {
                    warn!(error = %err, "cache write-through failed; keeping front entry");
                }
            }
            Err(err) => warn!(error = %err, "cache entry not serializable"),
        }

        self.index_key(&Self::subject_index_key(&key.tenant, &key.subject), &storage_key)
            .await;
        self.index_key(
            &Self::object_index_key(&key.tenant, &key.object_type, &key.object_id),
            &storage_key,
        )
        .await;

        decision
    }

    /// Remove the single entry for `(tenant, subject, relation, object)`
    /// with no contextual tuples.
    pub async fn invalidate(&self, key: &CheckKey) {
        let fp = CheckKey {
            context_tuples: Vec::new(),
            ..key.clone()
        }
        .fingerprint();
        self.remove_value_key(&Self::value_key(&fp)).await;
    }

    /// Remove every key indexed under the subject.
    pub async fn invalidate_subject(&self, tenant: &str, subject: &str) {
        let index_key = Self::subject_index_key(tenant, subject);
        let keys = self.drain_index(&self.subject_index, &index_key).await;
        for storage_key in keys {
            self.remove_value_key(&storage_key).await;
        }
    }

    /// Remove every key indexed under the object.
    pub async fn invalidate_object(&self, tenant: &str, object_type: &str, object_id: &str) {
        let index_key = Self::object_index_key(tenant, object_type, object_id);
        let keys = self.drain_index(&self.object_index, &index_key).await;
        for storage_key in keys {
            self.remove_value_key(&storage_key).await;
        }
    }

    /// Bulk removal for admin and migration use.
    ///
    /// `pattern` matches full storage keys with a single `*` wildcard.
    /// Sweeps the keys observed by this process; pair with
    /// [`Self::bump_generation`] for fleet-wide effect.
    pub async fn invalidate_pattern(&self, pattern: &str) -> usize {
        let Some(re) = Self::pattern_to_regex(pattern) else {
            warn!(pattern, "unusable invalidation pattern");
            return 0;
        };

        let matching: Vec<String> = self
            .front
            .iter()
            .map(|entry| entry.key().clone())
            .filter(|key| re.is_match(key))
            .collect();

        for storage_key in &matching {
            self.remove_value_key(storage_key).await;
        }
        debug!(pattern, removed = matching.len(), "pattern invalidation");
        matching.len()
    }

    fn pattern_to_regex(pattern: &str) -> Option<regex::Regex> {
        let escaped: Vec<String> = pattern.split('*').map(|part| regex::escape(part)).collect();
        regex::Regex::new(&format!("^{}$", escaped.join(".*"))).ok()
    }

    fn value_key(fp: &CheckFingerprint) -> String {
        format!("{VALUE_PREFIX}{fp}")
    }

    fn subject_index_key(tenant: &str, subject: &str) -> String {
        format!("{SUBJECT_INDEX_PREFIX}{tenant}:{subject}")
    }

    fn object_index_key(tenant: &str, object_type: &str, object_id: &str) -> String {
        format!("{OBJECT_INDEX_PREFIX}{tenant}:{object_type}:{object_id}")
    }

    async fn remove_value_key(&self, storage_key: &str) {
        self.front.remove(storage_key);
        if let Err(err) = self.adapter.kv_delete(storage_key).await {
            warn!(error = %err, key = storage_key, "cache delete failed");
        }
    }

    /// Add `storage_key` to the index set under `index_key`, in both tiers.
    /// Index writes are last-writer-wins.
    async fn index_key(&self, index_key: &str, storage_key: &str) {
        self.subject_or_object_index(index_key)
            .entry(index_key.to_owned())
            .or_default()
            .insert(storage_key.to_owned());

        let mut merged: HashSet<String> = match self.adapter.kv_get(index_key).await {
            Ok(Some(bytes)) => serde_json::from_slice(&bytes).unwrap_or_default(),
            _ => HashSet::new(),
        };
        merged.insert(storage_key.to_owned());
        if let Ok(bytes) = serde_json::to_vec(&merged) {
            if let Err(err) = self.adapter.kv_put(index_key, &bytes, None).await {
                warn!(error = %err, key = index_key, "index write failed");
            }
        }
    }

    /// Snapshot and clear an index set from both tiers.
    async fn drain_index(
        &self,
        local: &DashMap<String, HashSet<String>>,
        index_key: &str,
    ) -> HashSet<String> {
        let mut keys: HashSet<String> = local
            .remove(index_key)
            .map(|(_, set)| set)
            .unwrap_or_default();

        if let Ok(Some(bytes)) = self.adapter.kv_get(index_key).await {
            if let Ok(remote) = serde_json::from_slice::<HashSet<String>>(&bytes) {
                keys.extend(remote);
            }
        }
        if let Err(err) = self.adapter.kv_delete(index_key).await {
            warn!(error = %err, key = index_key, "index delete failed");
        }
        keys
    }

    fn subject_or_object_index(&self, index_key: &str) -> &DashMap<String, HashSet<String>> {
        if index_key.starts_with(SUBJECT_INDEX_PREFIX) {
            &self.subject_index
        } else {
            &self.object_index
        }
    }
}
