//! Pushed Authorization Request store.
//!
//! The RPC surface a durable front end exposes per request URI:
//! `store_request` / `consume_request` / `get_request` / `delete_request` /
//! `get_health`.

use std::sync::Arc;

use tracing::instrument;

use authrim_storage::Clock;

use crate::config::ProtocolStateConfig;

use super::error::SingleUseError;
use super::journal::StateJournal;
use super::model::{ParRequest, StoreHealth};
use super::single_use::SingleUseStore;

/// Consume-once store for PAR request URIs.
pub struct ParStore {
    inner: SingleUseStore<ParRequest>,
    clock: Arc<dyn Clock>,
}

impl ParStore {
    #[must_use]
    pub fn new(
        config: &ProtocolStateConfig,
        clock: Arc<dyn Clock>,
        journal: Arc<dyn StateJournal>,
    ) -> Self {
        Self {
            inner: SingleUseStore::new("par", config.shards, clock.clone(), journal),
            clock,
        }
    }

    /// Store a pushed request under its request URI.
    ///
    /// # Errors
    ///
    /// [`SingleUseError::KeyExists`] on URI collision,
    /// [`SingleUseError::Expired`] when the request is already past its
    /// own expiry.
    #[instrument(skip_all, fields(request_uri = %request.request_uri, client_id = %request.client_id))]
    pub async fn store_request(&self, request: ParRequest) -> Result<(), SingleUseError> {
        let ttl = (request.expires_at - self.clock.now())
            .to_std()
            .map_err(|_| SingleUseError::Expired)?;
        let request_uri = request.request_uri.clone();
        let client_id = request.client_id.clone();
        self.inner.store(&request_uri, &client_id, request, ttl).await
    }

    /// Atomically consume a request URI on behalf of `client_id`.
    ///
    /// # Errors
    ///
    /// `not_found` / `expired` / `single_use_violation` as enumerated on
    /// [`SingleUseError`].
    pub async fn consume_request(
        &self,
        request_uri: &str,
        client_id: &str,
    ) -> Result<ParRequest, SingleUseError> {
        self.inner.consume(request_uri, client_id).await
    }

    /// Read without consuming; for validation only.
    #[must_use]
    pub fn get_request(&self, request_uri: &str) -> Option<ParRequest> {
        self.inner.get(request_uri)
    }

    pub fn delete_request(&self, request_uri: &str) -> bool {
        self.inner.delete(request_uri)
    }

    #[must_use]
    pub fn get_health(&self) -> StoreHealth {
        self.inner.health()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::journal::MemoryJournal;
    use authrim_storage::ManualClock;
    use chrono::{Duration, Utc};
    use serde_json::json;

    fn par(clock: &ManualClock, uri: &str, client: &str, ttl_secs: i64) -> ParRequest {
        let now = clock.now();
        ParRequest {
            request_uri: uri.to_owned(),
            client_id: client.to_owned(),
            payload: json!({"scope": "openid"}),
            created_at: now,
            expires_at: now + Duration::seconds(ttl_secs),
        }
    }

    fn store() -> (ManualClock, ParStore) {
        let clock = ManualClock::new(Utc::now());
        let store = ParStore::new(
            &ProtocolStateConfig::default(),
            Arc::new(clock.clone()),
            Arc::new(MemoryJournal::new()),
        );
        (clock, store)
    }

    #[tokio::test]
    async fn single_use_lifecycle() {
        let (clock, store) = store();
        let request = par(&clock, "urn:ietf:params:oauth:request_uri:req_1", "client_a", 600);
        store.store_request(request.clone()).await.unwrap();

        let consumed = store
            .consume_request("urn:ietf:params:oauth:request_uri:req_1", "client_a")
            .await
            .unwrap();
        assert_eq!(consumed, request);

        assert_eq!(
            store
                .consume_request("urn:ietf:params:oauth:request_uri:req_1", "client_a")
                .await
                .unwrap_err(),
            SingleUseError::SingleUseViolation
        );
    }

    #[tokio::test]
    async fn wrong_client_cannot_pick_up() {
        let (clock, store) = store();
        store
            .store_request(par(&clock, "uri_1", "client_a", 600))
            .await
            .unwrap();
        assert_eq!(
            store.consume_request("uri_1", "client_b").await.unwrap_err(),
            SingleUseError::SingleUseViolation
        );
    }

    #[tokio::test]
    async fn already_expired_requests_are_refused_at_store() {
        let (clock, store) = store();
        let request = par(&clock, "uri_1", "client_a", -5);
        assert_eq!(
            store.store_request(request).await.unwrap_err(),
            SingleUseError::Expired
        );
    }

    #[tokio::test]
    async fn health_counts_states() {
        let (clock, store) = store();
        store
            .store_request(par(&clock, "uri_1", "client_a", 600))
            .await
            .unwrap();
        store
            .store_request(par(&clock, "uri_2", "client_a", 600))
            .await
            .unwrap();
        store.consume_request("uri_1", "client_a").await.unwrap();

        let health = store.get_health();
        assert_eq!(health.active, 1);
        assert_eq!(health.consumed, 1);
    }
}
