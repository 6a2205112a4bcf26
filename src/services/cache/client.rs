//! Cache client interface used by the shared stores (API key metadata).
use async_trait::async_trait;
use thiserror::Error;

/// Result type for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;

/// Cache-layer errors (connection/command).
///
/// Kept independent from `AuthError`; the stores built on top decide how a
/// backend failure surfaces (always `UpstreamUnavailable` for auth).
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache connection error: {0}")]
    BackendConnection(String),
    #[error("cache command error: {0}")]
    BackendCommand(String),
}

/// A minimal string-keyed cache interface.
///
/// API key metadata only needs plain `GET`/`SET`; keep the surface small.
/// Implementations must be cheap to clone (typically `Arc<...>` inside).
#[async_trait]
pub trait CacheClient: Clone + Send + Sync + 'static {
    // Returns the cache backend name (for logging).
    fn backend_name(&self) -> &'static str;

    // Get UTF-8 string value.
    async fn get_string(&self, key: &str) -> CacheResult<Option<String>>;

    // Set (overwrite) a value without expiry.
    async fn set_string(&self, key: &str, value: &str) -> CacheResult<()>;
}
