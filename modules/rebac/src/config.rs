//! Configuration for the ReBAC evaluator.

use std::collections::HashSet;
use std::time::Duration;

use serde::Deserialize;

/// Configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RebacConfig {
    /// Maximum recursion depth for one check.
    pub max_depth: usize,

    /// Maximum nesting depth a relation expression may have.
    pub expression_depth_limit: usize,

    /// TTL for cached decisions.
    #[serde(with = "humantime_secs")]
    pub cache_ttl: Duration,

    /// Tupleset relations whose ancestry is materialized in the closure
    /// store. Tuple-to-userset over these skips recursion entirely.
    pub closure_relations: HashSet<String>,
}

impl Default for RebacConfig {
    fn default() -> Self {
        Self {
            max_depth: 5,
            expression_depth_limit: 16,
            cache_ttl: Duration::from_secs(60),
            closure_relations: HashSet::new(),
        }
    }
}

mod humantime_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_limits() {
        let cfg = RebacConfig::default();
        assert_eq!(cfg.max_depth, 5);
        assert_eq!(cfg.expression_depth_limit, 16);
        assert_eq!(cfg.cache_ttl, Duration::from_secs(60));
        assert!(cfg.closure_relations.is_empty());
    }

    #[test]
    fn deserializes_from_seconds() {
        let cfg: RebacConfig =
            serde_json::from_str(r#"{"max_depth":8,"cache_ttl":120,"closure_relations":["parent"]}"#)
                .unwrap();
        assert_eq!(cfg.max_depth, 8);
        assert_eq!(cfg.cache_ttl, Duration::from_secs(120));
        assert!(cfg.closure_relations.contains("parent"));
    }
}
