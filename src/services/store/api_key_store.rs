use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::services::authz::permission::PermissionSet;
use crate::services::cache::CacheClient;
use crate::services::store::StoreError;

/// Stored record of an issued API key.
///
/// NOTE: only the SHA-256 (hex) of the secret is stored; the raw key never
/// reaches a store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiKeyMetadata {
    pub key_id: String,
    pub tenant_id: String,
    pub subject_id: String,
    pub secret_hash: String,
    pub permissions: PermissionSet,
    #[serde(default)]
    pub name: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub revoked_at: Option<DateTime<Utc>>,
}

impl ApiKeyMetadata {
    pub fn is_revoked(&self) -> bool {
        self.revoked_at.is_some()
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|exp| exp <= now)
    }
}

/// Key metadata lookup by id. Writes replace the whole record.
#[async_trait]
pub trait ApiKeyStore: Send + Sync {
    async fn get(&self, key_id: &str) -> Result<Option<ApiKeyMetadata>, StoreError>;

    async fn set(&self, metadata: ApiKeyMetadata) -> Result<(), StoreError>;
}

#[derive(Debug, Default, Clone)]
pub struct InMemoryApiKeyStore {
    keys: Arc<DashMap<String, ApiKeyMetadata>>,
}

impl InMemoryApiKeyStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ApiKeyStore for InMemoryApiKeyStore {
    async fn get(&self, key_id: &str) -> Result<Option<ApiKeyMetadata>, StoreError> {
        Ok(self.keys.get(key_id).map(|e| e.value().clone()))
    }

    async fn set(&self, metadata: ApiKeyMetadata) -> Result<(), StoreError> {
        self.keys.insert(metadata.key_id.clone(), metadata);
        Ok(())
    }
}

/// API key metadata stored as JSON in a cache backend (Valkey).
#[derive(Clone)]
pub struct CacheApiKeyStore<C: CacheClient> {
    cache: Arc<C>,
    // Key prefix to avoid collisions across environments
    prefix: String,
}

impl<C: CacheClient> std::fmt::Debug for CacheApiKeyStore<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheApiKeyStore")
            .field("backend", &self.cache.backend_name())
            .field("prefix", &self.prefix)
            .finish()
    }
}

impl<C: CacheClient> CacheApiKeyStore<C> {
    pub fn new(cache: Arc<C>, prefix: impl Into<String>) -> Self {
        Self {
            cache,
            prefix: prefix.into(),
        }
    }

    pub fn key(&self, key_id: &str) -> String {
        format!("{}:{}", self.prefix, key_id)
    }
}

#[async_trait]
impl<C: CacheClient> ApiKeyStore for CacheApiKeyStore<C> {
    async fn get(&self, key_id: &str) -> Result<Option<ApiKeyMetadata>, StoreError> {
        let Some(raw) = self.cache.get_string(&self.key(key_id)).await? else {
            return Ok(None);
        };
        Ok(Some(serde_json::from_str(&raw)?))
    }

    async fn set(&self, metadata: ApiKeyMetadata) -> Result<(), StoreError> {
        let raw = serde_json::to_string(&metadata)?;
        self.cache
            .set_string(&self.key(&metadata.key_id), &raw)
            .await?;
        Ok(())
    }
}
