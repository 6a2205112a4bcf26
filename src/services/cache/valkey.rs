use async_trait::async_trait;

use crate::services::cache::client::{CacheClient, CacheError, CacheResult};

/// Valkey/Redis-backed cache client.
///
/// Only what the API key store needs: `GET` and `SET`. A single `SET` is
/// atomic per key, which is what makes revocation visible to the next read.
#[derive(Clone, Debug)]
pub struct ValkeyClient {
    manager: redis::aio::ConnectionManager,
}

impl ValkeyClient {
    // Create a Valkey client from a URL like `redis://localhost:6379`
    pub async fn new(url: &str) -> Result<Self, CacheError> {
        let client =
            redis::Client::open(url).map_err(|e| CacheError::BackendConnection(e.to_string()))?;

        let manager = client
            .get_connection_manager()
            .await
            .map_err(|e| CacheError::BackendConnection(e.to_string()))?;

        Ok(Self { manager })
    }
}

#[async_trait]
impl CacheClient for ValkeyClient {
    fn backend_name(&self) -> &'static str {
        "valkey"
    }

    async fn get_string(&self, key: &str) -> CacheResult<Option<String>> {
        let mut conn = self.manager.clone();

        redis::cmd("GET")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| CacheError::BackendCommand(e.to_string()))
    }

    async fn set_string(&self, key: &str, value: &str) -> CacheResult<()> {
        let mut conn = self.manager.clone();

        redis::cmd("SET")
            .arg(key)
            .arg(value)
            .query_async::<()>(&mut conn)
            .await
            .map_err(|e| CacheError::BackendCommand(e.to_string()))
    }
}
