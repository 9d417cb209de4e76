//! Two-tier decision cache keyed by check fingerprints.
//!
//! Tier one is a request-scoped memo discarded with the request; tier two is
//! a process-wide map written through to the adapter KV so co-located
//! workers share decisions. Secondary indexes per subject and per object
//! make targeted invalidation possible without scanning.
//!
//! The cache is best-effort: the canonical source is always the storage
//! adapter, and writers schedule invalidations after successful commits.

pub mod fingerprint;
pub mod manager;
pub mod request;

pub use fingerprint::{CheckFingerprint, CheckKey};
pub use manager::{CacheManager, CachedDecision};
pub use request::RequestCache;
