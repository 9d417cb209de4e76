//! Boundary authentication: prefix-qualified API keys or bearer JWTs.
//!
//! API keys are `chk_…` values checked against configured SHA-256
//! digests; each key carries explicit `check`/`batch` scopes. Anything
//! else in the bearer slot is validated as an HS256 JWT whose optional
//! `scope` claim narrows what it may call.

use std::collections::HashSet;

use http::HeaderMap;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use secrecy::ExposeSecret;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::config::{ApiKeyConfig, CheckConfig, JwtConfig, KeyScope};

/// Authentication failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("missing or invalid credentials")]
    Unauthenticated,

    #[error("credentials lack the required scope")]
    Forbidden,
}

/// Who is calling, and with which scopes.
#[derive(Debug, Clone)]
pub struct Caller {
    pub scopes: HashSet<KeyScope>,
    /// JWT subject; absent for API keys.
    pub subject: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Claims {
    #[serde(default)]
    sub: Option<String>,
    /// Space-separated scope names.
    #[serde(default)]
    scope: Option<String>,
}

/// Verifier for the check boundary.
pub struct ApiAuth {
    keys: Vec<ApiKeyConfig>,
    jwt: Option<JwtConfig>,
}

impl ApiAuth {
    #[must_use]
    pub fn from_config(config: &CheckConfig) -> Self {
        Self {
            keys: config.api_keys.clone(),
            jwt: config.jwt.clone(),
        }
    }

    /// Authenticate the request and require `scope`.
    ///
    /// # Errors
    ///
    /// [`AuthError::Unauthenticated`] without acceptable credentials,
    /// [`AuthError::Forbidden`] when they lack the scope.
    pub fn authenticate(&self, headers: &HeaderMap, scope: KeyScope) -> Result<Caller, AuthError> {
        let token = bearer_token(headers).ok_or(AuthError::Unauthenticated)?;
        if token.starts_with("chk_") {
            self.verify_api_key(token, scope)
        } else {
            self.verify_jwt(token, scope)
        }
    }

    fn verify_api_key(&self, token: &str, scope: KeyScope) -> Result<Caller, AuthError> {
        let digest = hex::encode(Sha256::digest(token.as_bytes()));
        let entry = self
            .keys
            .iter()
            .find(|key| key.digest.eq_ignore_ascii_case(&digest))
            .ok_or(AuthError::Unauthenticated)?;
        if !entry.scopes.contains(&scope) {
            return Err(AuthError::Forbidden);
        }
        Ok(Caller {
            scopes: entry.scopes.iter().copied().collect(),
            subject: None,
        })
    }

    fn verify_jwt(&self, token: &str, scope: KeyScope) -> Result<Caller, AuthError> {
        let Some(jwt) = &self.jwt else {
            return Err(AuthError::Unauthenticated);
        };

        let mut validation = Validation::new(Algorithm::HS256);
        if let Some(issuer) = &jwt.issuer {
            validation.set_issuer(&[issuer]);
        }
        match &jwt.audience {
            Some(audience) => validation.set_audience(&[audience]),
            None => validation.validate_aud = false,
        }

        let key = DecodingKey::from_secret(jwt.secret.expose_secret().as_bytes());
        let data = decode::<Claims>(token, &key, &validation).map_err(|err| {
            debug!(error = %err, "bearer jwt rejected");
            AuthError::Unauthenticated
        })?;

        let scopes = jwt_scopes(data.claims.scope.as_deref());
        if !scopes.contains(&scope) {
            return Err(AuthError::Forbidden);
        }
        Ok(Caller {
            scopes,
            subject: data.claims.sub,
        })
    }
}

/// A JWT without a `scope` claim may call everything; otherwise only the
/// named scopes.
fn jwt_scopes(claim: Option<&str>) -> HashSet<KeyScope> {
    match claim {
        None => HashSet::from([KeyScope::Check, KeyScope::Batch]),
        Some(raw) => raw
            .split_whitespace()
            .filter_map(|name| match name {
                "check" => Some(KeyScope::Check),
                "batch" => Some(KeyScope::Batch),
                _ => None,
            })
            .collect(),
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(http::header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer ").map(str::trim))
}
