//! Check fingerprints.
//!
//! The concatenation order and the `\0` separator are frozen: admins
//! invalidate by pattern against these keys, so the layout is part of the
//! external contract and stable across minor versions.

use sha2::{Digest, Sha256};

/// The identifying parts of one authorization check.
///
/// `context_tuples` holds contextual tuples in their normalized
/// `subject|relation|object_type:object_id` form; the fingerprint sorts them
/// so tuple order never changes the key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckKey {
    pub tenant: String,
    pub subject: String,
    pub relation: String,
    pub object_type: String,
    pub object_id: String,
    pub context_tuples: Vec<String>,
}

impl CheckKey {
    #[must_use]
    pub fn new(
        tenant: impl Into<String>,
        subject: impl Into<String>,
        relation: impl Into<String>,
        object_type: impl Into<String>,
        object_id: impl Into<String>,
    ) -> Self {
        Self {
            tenant: tenant.into(),
            subject: subject.into(),
            relation: relation.into(),
            object_type: object_type.into(),
            object_id: object_id.into(),
            context_tuples: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_context_tuples(mut self, tuples: Vec<String>) -> Self {
        self.context_tuples = tuples;
        self
    }

    /// Derive the frozen fingerprint for this check.
    #[must_use]
    pub fn fingerprint(&self) -> CheckFingerprint {
        let mut hasher = Sha256::new();
        hasher.update(self.tenant.as_bytes());
        hasher.update([0u8]);
        hasher.update(self.subject.as_bytes());
        hasher.update([0u8]);
        hasher.update(self.relation.as_bytes());
        hasher.update([0u8]);
        hasher.update(self.object_type.as_bytes());
        hasher.update([0u8]);
        hasher.update(self.object_id.as_bytes());
        hasher.update([0u8]);

        let mut sorted = self.context_tuples.clone();
        sorted.sort();
        for tuple in &sorted {
            hasher.update(tuple.as_bytes());
            hasher.update([0u8]);
        }

        CheckFingerprint(hex::encode(hasher.finalize()))
    }
}

/// Hex digest identifying one check under the frozen layout.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CheckFingerprint(String);

impl CheckFingerprint {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CheckFingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> CheckKey {
        CheckKey::new("t1", "user_123", "viewer", "document", "doc_456")
    }

    #[test]
    fn fingerprint_is_deterministic() {
        assert_eq!(key().fingerprint(), key().fingerprint());
    }

    #[test]
    fn context_tuple_order_does_not_matter() {
        let a = key().with_context_tuples(vec![
            "u1|viewer|document:d1".to_owned(),
            "u2|editor|document:d2".to_owned(),
        ]);
        let b = key().with_context_tuples(vec![
            "u2|editor|document:d2".to_owned(),
            "u1|viewer|document:d1".to_owned(),
        ]);
        assert_eq!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn every_field_feeds_the_digest() {
        let base = key().fingerprint();
        let mut other = key();
        other.object_id = "doc_457".to_owned();
        assert_ne!(base, other.fingerprint());

        let mut other = key();
        other.subject = "user_124".to_owned();
        assert_ne!(base, other.fingerprint());

        let with_ctx = key().with_context_tuples(vec!["u|r|t:i".to_owned()]);
        assert_ne!(base, with_ctx.fingerprint());
    }

    #[test]
    fn separator_prevents_field_bleed() {
        // ("ab", "c") and ("a", "bc") must not collide.
        let a = CheckKey::new("t", "ab", "c", "o", "i").fingerprint();
        let b = CheckKey::new("t", "a", "bc", "o", "i").fingerprint();
        assert_ne!(a, b);
    }
}
