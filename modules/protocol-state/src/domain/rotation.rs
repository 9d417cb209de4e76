//! Refresh-token rotation with family tracking.
//!
//! Tokens form families preserved across rotation. Rotation consumes the
//! old token and links the new one through `previous_id`. Presenting an
//! already-rotated token is treated as theft: the store flags the token,
//! revokes the entire family, and reports which family died so higher
//! layers can terminate sessions.
//!
//! Family state lives under one owner (the family's shard mutex); a
//! token-id index routes presented tokens to their family.

use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::{instrument, warn};

use authrim_storage::Clock;

use crate::config::ProtocolStateConfig;

use super::error::RotationError;
use super::journal::{StateEvent, StateJournal};
use super::model::RefreshToken;

#[derive(Default)]
struct FamilyState {
    tokens: HashMap<String, RefreshToken>,
    revoked: bool,
}

/// The rotation store.
pub struct RotationStore {
    shards: Vec<Mutex<HashMap<String, FamilyState>>>,
    /// token id -> family id.
    token_families: DashMap<String, String>,
    clock: Arc<dyn Clock>,
    journal: Arc<dyn StateJournal>,
}

impl RotationStore {
    #[must_use]
    pub fn new(
        config: &ProtocolStateConfig,
        clock: Arc<dyn Clock>,
        journal: Arc<dyn StateJournal>,
    ) -> Self {
        let shards = config.shards.max(1);
        Self {
            shards: (0..shards).map(|_| Mutex::new(HashMap::new())).collect(),
            token_families: DashMap::new(),
            clock,
            journal,
        }
    }

    fn shard(&self, family_id: &str) -> &Mutex<HashMap<String, FamilyState>> {
        let mut hasher = DefaultHasher::new();
        family_id.hash(&mut hasher);
        let index = usize::try_from(hasher.finish()).unwrap_or(0) % self.shards.len();
        &self.shards[index]
    }

    /// Register the root token of a new family (or an additional token of
    /// an existing one, e.g. on import).
    ///
    /// # Errors
    ///
    /// [`RotationError::TokenExists`] when the token id is taken.
    pub async fn insert(&self, token: RefreshToken) -> Result<(), RotationError> {
        if self.token_families.contains_key(&token.token_id) {
            return Err(RotationError::TokenExists);
        }
        let family_id = token.family_id.clone();
        let token_id = token.token_id.clone();
        {
            let mut shard = self.shard(&family_id).lock();
            let family = shard.entry(family_id.clone()).or_default();
            family.tokens.insert(token_id.clone(), token);
        }
        self.token_families.insert(token_id, family_id);
        Ok(())
    }

    /// Rotate `old_token_id` into `new_token` atomically.
    ///
    /// On success the old token is consumed and the new token joins the
    /// family with `previous_id` set. A replay of a consumed token revokes
    /// the family and surfaces [`RotationError::ReuseDetected`].
    ///
    /// # Errors
    ///
    /// [`RotationError::NotFound`], [`RotationError::Expired`],
    /// [`RotationError::OwnerMismatch`], [`RotationError::FamilyRevoked`],
    /// [`RotationError::ReuseDetected`], [`RotationError::TokenExists`].
    #[instrument(skip_all, fields(old = %old_token_id, new = %new_token.token_id))]
    pub async fn rotate(
        &self,
        old_token_id: &str,
        mut new_token: RefreshToken,
    ) -> Result<RefreshToken, RotationError> {
        let Some(family_id) = self
            .token_families
            .get(old_token_id)
            .map(|entry| entry.value().clone())
        else {
            return Err(RotationError::NotFound);
        };
        if self.token_families.contains_key(&new_token.token_id) {
            return Err(RotationError::TokenExists);
        }
        let now = self.clock.now();

        let verdict = {
            let mut shard = self.shard(&family_id).lock();
            let family = shard
                .get_mut(&family_id)
                .ok_or(RotationError::NotFound)?;

            if family.revoked {
                Err(RotationError::FamilyRevoked {
                    family_id: family_id.clone(),
                })
            } else {
                let old = family
                    .tokens
                    .get_mut(old_token_id)
                    .ok_or(RotationError::NotFound)?;

                if old.consumed {
                    // Replay of a rotated token: revoke everything.
                    old.reuse_detected = true;
                    family.revoked = true;
                    let revoked_tokens: Vec<String> = family.tokens.keys().cloned().collect();
                    for token in family.tokens.values_mut() {
                        token.revoked = true;
                    }
                    Err(RotationError::ReuseDetected {
                        family_id: family_id.clone(),
                        revoked_tokens,
                    })
                } else if old.is_expired(now) {
                    Err(RotationError::Expired)
                } else if old.client_id != new_token.client_id
                    || old.subject != new_token.subject
                {
                    Err(RotationError::OwnerMismatch)
                } else {
                    old.consumed = true;
                    new_token.family_id = family_id.clone();
                    new_token.previous_id = Some(old_token_id.to_owned());
                    family
                        .tokens
                        .insert(new_token.token_id.clone(), new_token.clone());
                    Ok(new_token)
                }
            }
        };

        match &verdict {
            Ok(new_token) => {
                self.token_families
                    .insert(new_token.token_id.clone(), family_id.clone());
                self.journal
                    .record(StateEvent::Rotated {
                        family_id,
                        old_token: old_token_id.to_owned(),
                        new_token: new_token.token_id.clone(),
                        at: now,
                    })
                    .await;
            }
            Err(RotationError::ReuseDetected { revoked_tokens, .. }) => {
                warn!(family_id = %family_id, "refresh token reuse; family revoked");
                self.journal
                    .record(StateEvent::FamilyRevoked {
                        family_id,
                        tokens: revoked_tokens.clone(),
                        at: now,
                    })
                    .await;
            }
            Err(_) => {}
        }
        verdict
    }

    /// Is the token currently usable (known, unconsumed, unrevoked, not
    /// expired)?
    #[must_use]
    pub fn is_active(&self, token_id: &str) -> bool {
        let Some(family_id) = self
            .token_families
            .get(token_id)
            .map(|entry| entry.value().clone())
        else {
            return false;
        };
        let shard = self.shard(&family_id).lock();
        let Some(family) = shard.get(&family_id) else {
            return false;
        };
        if family.revoked {
            return false;
        }
        family.tokens.get(token_id).is_some_and(|token| {
            !token.consumed && !token.revoked && !token.is_expired(self.clock.now())
        })
    }

    /// Revoke a family outright (logout, admin action). Returns the
    /// token ids that died.
    pub async fn revoke_family(&self, family_id: &str) -> Vec<String> {
        let now = self.clock.now();
        let revoked: Vec<String> = {
            let mut shard = self.shard(family_id).lock();
            match shard.get_mut(family_id) {
                Some(family) => {
                    family.revoked = true;
                    for token in family.tokens.values_mut() {
                        token.revoked = true;
                    }
                    family.tokens.keys().cloned().collect()
                }
                None => Vec::new(),
            }
        };
        if !revoked.is_empty() {
            self.journal
                .record(StateEvent::FamilyRevoked {
                    family_id: family_id.to_owned(),
                    tokens: revoked.clone(),
                    at: now,
                })
                .await;
        }
        revoked
    }
}
