//! Request-scoped memoization.

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::fingerprint::CheckFingerprint;
use crate::manager::CachedDecision;

/// Per-request memo.
///
/// Allocated when a check (or batch) starts and dropped with it; never
/// visible across requests. Interior mutability keeps the evaluator's
/// recursive probes borrow-free.
#[derive(Default)]
pub struct RequestCache {
    entries: Mutex<HashMap<String, CachedDecision>>,
}

impl RequestCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, fingerprint: &CheckFingerprint) -> Option<CachedDecision> {
        self.entries.lock().get(fingerprint.as_str()).cloned()
    }

    pub fn insert(&self, fingerprint: &CheckFingerprint, decision: CachedDecision) {
        self.entries
            .lock()
            .insert(fingerprint.as_str().to_owned(), decision);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}
