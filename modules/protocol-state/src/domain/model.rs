//! Protocol-state payloads.

use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// A pushed authorization request awaiting pickup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParRequest {
    pub request_uri: String,
    pub client_id: String,
    /// The pushed authorization parameters, opaque to the store.
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// An authorization code awaiting redemption.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthCode {
    pub code: String,
    pub client_id: String,
    pub subject: String,
    pub redirect_uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pkce_challenge: Option<String>,
    pub scope: HashSet<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// One member of a refresh-token family.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshToken {
    pub token_id: String,
    pub family_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_id: Option<String>,
    pub client_id: String,
    pub subject: String,
    pub issued_at: DateTime<Utc>,
    pub ttl_secs: u64,
    #[serde(default)]
    pub consumed: bool,
    #[serde(default)]
    pub reuse_detected: bool,
    #[serde(default)]
    pub revoked: bool,
}

impl RefreshToken {
    #[must_use]
    pub fn expires_at(&self) -> DateTime<Utc> {
        let secs = i64::try_from(self.ttl_secs).unwrap_or(i64::MAX);
        self.issued_at + Duration::seconds(secs)
    }

    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at() <= now
    }
}

/// Store health counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreHealth {
    pub active: usize,
    pub consumed: usize,
    pub expired: usize,
}
