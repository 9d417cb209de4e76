//! Authorization-code store.

use std::sync::Arc;

use tracing::instrument;

use authrim_storage::Clock;

use crate::config::ProtocolStateConfig;

use super::error::SingleUseError;
use super::journal::StateJournal;
use super::model::{AuthCode, StoreHealth};
use super::single_use::SingleUseStore;

/// Consume-once store for authorization codes.
pub struct AuthCodeStore {
    inner: SingleUseStore<AuthCode>,
    clock: Arc<dyn Clock>,
}

impl AuthCodeStore {
    #[must_use]
    pub fn new(
        config: &ProtocolStateConfig,
        clock: Arc<dyn Clock>,
        journal: Arc<dyn StateJournal>,
    ) -> Self {
        Self {
            inner: SingleUseStore::new("auth_code", config.shards, clock.clone(), journal),
            clock,
        }
    }

    /// Store a freshly issued code.
    ///
    /// # Errors
    ///
    /// [`SingleUseError::KeyExists`] on code collision,
    /// [`SingleUseError::Expired`] when the code is already past its
    /// expiry.
    #[instrument(skip_all, fields(client_id = %code.client_id))]
    pub async fn store(&self, code: AuthCode) -> Result<(), SingleUseError> {
        let ttl = (code.expires_at - self.clock.now())
            .to_std()
            .map_err(|_| SingleUseError::Expired)?;
        let key = code.code.clone();
        let client_id = code.client_id.clone();
        self.inner.store(&key, &client_id, code, ttl).await
    }

    /// Atomically redeem a code for `client_id`.
    ///
    /// # Errors
    ///
    /// `not_found` / `expired` / `single_use_violation` as enumerated on
    /// [`SingleUseError`].
    pub async fn consume(&self, code: &str, client_id: &str) -> Result<AuthCode, SingleUseError> {
        self.inner.consume(code, client_id).await
    }

    /// Read without consuming; for validation only.
    #[must_use]
    pub fn get(&self, code: &str) -> Option<AuthCode> {
        self.inner.get(code)
    }

    pub fn delete(&self, code: &str) -> bool {
        self.inner.delete(code)
    }

    #[must_use]
    pub fn health(&self) -> StoreHealth {
        self.inner.health()
    }
}
