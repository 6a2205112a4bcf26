/*
 * Responsibility
 * - API key format: `{prefix}_{keyId}_{secret}`
 * - Issue keys (only the secret hash is persisted)
 * - Validate presented keys against the ApiKeyStore
 */
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::Duration as ChronoDuration;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use thiserror::Error;

use crate::services::authz::error::{AuthError, CredentialError};
use crate::services::authz::permission::PermissionSet;
use crate::services::clock::Clock;
use crate::services::store::{ApiKeyMetadata, ApiKeyStore};

pub const DEFAULT_API_KEY_HEADER: &str = "x-api-key";
pub const DEFAULT_API_KEY_PREFIX: &str = "fsk";

const SECRET_BYTES: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiKeySettings {
    pub header_name: String,
    pub key_prefix: String,
}

impl Default for ApiKeySettings {
    fn default() -> Self {
        Self {
            header_name: DEFAULT_API_KEY_HEADER.to_string(),
            key_prefix: DEFAULT_API_KEY_PREFIX.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedApiKey<'a> {
    pub key_id: &'a str,
    pub secret: &'a str,
}

/// Split a raw key into id and secret.
///
/// The key id never contains `_`; the secret may (URL-safe base64).
pub fn parse_api_key<'a>(raw: &'a str, prefix: &str) -> Result<ParsedApiKey<'a>, CredentialError> {
    let rest = raw
        .strip_prefix(prefix)
        .and_then(|r| r.strip_prefix('_'))
        .ok_or(CredentialError::MalformedApiKey)?;
    let (key_id, secret) = rest
        .split_once('_')
        .ok_or(CredentialError::MalformedApiKey)?;

    let id_ok = !key_id.is_empty()
        && key_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-');
    if !id_ok || secret.is_empty() {
        return Err(CredentialError::MalformedApiKey);
    }
    Ok(ParsedApiKey { key_id, secret })
}

pub fn format_api_key(prefix: &str, key_id: &str, secret: &str) -> String {
    format!("{prefix}_{key_id}_{secret}")
}

/// sha256(secret) as lowercase hex.
pub fn hash_secret(secret: &str) -> String {
    hex::encode(Sha256::digest(secret.as_bytes()))
}

fn hashes_match(presented: &str, stored: &str) -> bool {
    presented.as_bytes().ct_eq(stored.as_bytes()).into()
}

/// What the API key strategy hands to the unifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiKeyPrincipal {
    pub key_id: String,
    pub tenant_id: String,
    pub subject_id: String,
    pub permissions: PermissionSet,
}

#[derive(Clone)]
pub struct ApiKeyVerifier {
    prefix: String,
    store: Arc<dyn ApiKeyStore>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for ApiKeyVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiKeyVerifier")
            .field("prefix", &self.prefix)
            .finish()
    }
}

impl ApiKeyVerifier {
    pub fn new(settings: &ApiKeySettings, store: Arc<dyn ApiKeyStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            prefix: settings.key_prefix.clone(),
            store,
            clock,
        }
    }

    /// Cheap shape check used when a key arrives in the bearer slot.
    pub fn looks_like_key(&self, raw: &str) -> bool {
        raw.strip_prefix(self.prefix.as_str())
            .is_some_and(|rest| rest.starts_with('_'))
    }

    pub async fn validate(&self, raw: &str) -> Result<ApiKeyPrincipal, AuthError> {
        let parsed = parse_api_key(raw.trim(), &self.prefix)?;

        let metadata = self.store.get(parsed.key_id).await.map_err(|e| {
            tracing::error!(key_id = parsed.key_id, error = %e, "api key store lookup failed");
            AuthError::upstream(e)
        })?;
        let Some(metadata) = metadata else {
            tracing::debug!(key_id = parsed.key_id, "unknown api key");
            return Err(CredentialError::UnknownApiKey.into());
        };

        if !hashes_match(&hash_secret(parsed.secret), &metadata.secret_hash) {
            tracing::warn!(key_id = parsed.key_id, "api key secret mismatch");
            return Err(CredentialError::ApiKeyMismatch.into());
        }
        if metadata.is_revoked() {
            return Err(CredentialError::ApiKeyRevoked.into());
        }
        if metadata.is_expired(self.clock.now()) {
            return Err(CredentialError::ApiKeyExpired.into());
        }
        if metadata.permissions.is_empty() {
            return Err(CredentialError::ApiKeyHasNoPermissions.into());
        }
        if metadata.tenant_id.trim().is_empty() {
            return Err(CredentialError::MissingTenant.into());
        }
        if metadata.subject_id.trim().is_empty() {
            return Err(CredentialError::MissingSubject.into());
        }

        Ok(ApiKeyPrincipal {
            key_id: metadata.key_id,
            tenant_id: metadata.tenant_id,
            subject_id: metadata.subject_id,
            permissions: metadata.permissions,
        })
    }
}

#[derive(Debug, Error)]
pub enum ApiKeyIssueError {
    #[error("tenant id and subject id are required")]
    MissingIdentity,
    #[error("an api key must carry at least one permission")]
    EmptyPermissions,
    #[error("random source failed: {0}")]
    Random(String),
}

/// A freshly issued key. `key` is shown once; only `metadata` is persisted.
#[derive(Debug, Clone)]
pub struct IssuedApiKey {
    pub key: String,
    pub metadata: ApiKeyMetadata,
}

#[derive(Clone)]
pub struct ApiKeyIssuer {
    prefix: String,
    clock: Arc<dyn Clock>,
}

impl ApiKeyIssuer {
    pub fn new(settings: &ApiKeySettings, clock: Arc<dyn Clock>) -> Self {
        Self {
            prefix: settings.key_prefix.clone(),
            clock,
        }
    }

    pub fn issue(
        &self,
        tenant_id: &str,
        subject_id: &str,
        permissions: PermissionSet,
        ttl: Option<ChronoDuration>,
        name: Option<String>,
    ) -> Result<IssuedApiKey, ApiKeyIssueError> {
        if tenant_id.trim().is_empty() || subject_id.trim().is_empty() {
            return Err(ApiKeyIssueError::MissingIdentity);
        }
        if permissions.is_empty() {
            return Err(ApiKeyIssueError::EmptyPermissions);
        }

        let key_id = uuid::Uuid::new_v4().simple().to_string();
        let secret = generate_secret()?;
        let now = self.clock.now();

        let metadata = ApiKeyMetadata {
            key_id: key_id.clone(),
            tenant_id: tenant_id.to_string(),
            subject_id: subject_id.to_string(),
            secret_hash: hash_secret(&secret),
            permissions,
            name,
            created_at: now,
            expires_at: ttl.map(|ttl| now + ttl),
            revoked_at: None,
        };

        Ok(IssuedApiKey {
            key: format_api_key(&self.prefix, &key_id, &secret),
            metadata,
        })
    }
}

fn generate_secret() -> Result<String, ApiKeyIssueError> {
    // 32 bytes of entropy -> URL-safe base64 without padding.
    let mut bytes = [0u8; SECRET_BYTES];
    getrandom::fill(&mut bytes).map_err(|e| ApiKeyIssueError::Random(e.to_string()))?;
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}
