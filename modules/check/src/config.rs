//! Configuration for the check service and its boundary.

use secrecy::SecretString;
use serde::Deserialize;

/// How ReBAC and policy evidence combine into the final decision.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CombinationMode {
    /// Allow iff any contributing evaluator allows and no explicit deny
    /// rule fired.
    #[default]
    AnyAllowNoDeny,
    /// Every requested evaluator must allow (and no explicit deny).
    AllMustAllow,
}

/// Scope carried by an API key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyScope {
    Check,
    Batch,
}

/// One accepted API key, stored as a SHA-256 digest of the full
/// `chk_…` value.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiKeyConfig {
    /// Hex SHA-256 of the key.
    pub digest: String,
    pub scopes: Vec<KeyScope>,
}

/// Bearer-JWT verification settings (HS256).
#[derive(Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: SecretString,
    #[serde(default)]
    pub issuer: Option<String>,
    #[serde(default)]
    pub audience: Option<String>,
}

impl std::fmt::Debug for JwtConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtConfig")
            .field("secret", &"<redacted>")
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .finish()
    }
}

/// Configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CheckConfig {
    /// Feature gate; disabled deployments answer `feature_disabled`.
    pub enabled: bool,
    /// When set, storage failures become deny decisions with
    /// `resolved_via = [storage_error]` instead of bubbling up.
    pub strict_storage: bool,
    pub combination: CombinationMode,
    /// TTL advertised with each decision, seconds.
    pub cache_ttl_secs: u64,
    /// Hard cap on batch size.
    pub max_batch: usize,
    /// Default tenant when the request names none.
    pub default_tenant: String,
    pub api_keys: Vec<ApiKeyConfig>,
    pub jwt: Option<JwtConfig>,
}

impl Default for CheckConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            strict_storage: false,
            combination: CombinationMode::default(),
            cache_ttl_secs: 60,
            max_batch: 100,
            default_tenant: "default".to_owned(),
            api_keys: Vec::new(),
            jwt: None,
        }
    }
}
