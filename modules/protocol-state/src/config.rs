//! Configuration for the protocol-state stores.

use serde::Deserialize;

/// Configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProtocolStateConfig {
    /// Shard count for the per-key owner registries.
    pub shards: usize,
    /// Default TTL for pushed authorization requests, seconds.
    pub par_ttl_secs: u64,
    /// Default TTL for authorization codes, seconds.
    pub code_ttl_secs: u64,
}

impl Default for ProtocolStateConfig {
    fn default() -> Self {
        Self {
            shards: 16,
            par_ttl_secs: 600,
            code_ttl_secs: 60,
        }
    }
}
