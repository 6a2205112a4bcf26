//! Capabilities the core consumes: API key metadata and tenant records.
pub mod api_key_store;
pub mod tenant_store;

use thiserror::Error;

use crate::services::cache::CacheError;

pub use api_key_store::{ApiKeyMetadata, ApiKeyStore, CacheApiKeyStore, InMemoryApiKeyStore};
pub use tenant_store::{InMemoryTenantStore, TenantStore};

/// Backend failure of a store. Always surfaced as `UpstreamUnavailable`.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store backend error: {0}")]
    Backend(String),

    #[error("stored value is not valid json: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Cache(#[from] CacheError),
}
