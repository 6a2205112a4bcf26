/*
 * Responsibility
 * - Postgres-backed TenantStore
 * - Read-only from the authorizer's point of view (provisioning lives elsewhere)
 */
use async_trait::async_trait;
use sqlx::PgPool;

use crate::repos::error::RepoError;
use crate::services::authz::context::{Tenant, TenantStatus};
use crate::services::store::{StoreError, TenantStore};

/// Schema assumed:
///   tenants.tenant_id (text, pk)
///   tenants.root_path (text)
///   tenants.status    (text: active | suspended | deleted)
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TenantRow {
    pub tenant_id: String,
    pub root_path: String,
    pub status: String,
}

impl TryFrom<TenantRow> for Tenant {
    type Error = RepoError;

    fn try_from(row: TenantRow) -> Result<Self, Self::Error> {
        let status: TenantStatus = row
            .status
            .parse()
            .map_err(|_| RepoError::InvalidRow(format!("unknown tenant status '{}'", row.status)))?;
        Ok(Tenant {
            tenant_id: row.tenant_id,
            root_path: row.root_path,
            status,
        })
    }
}

#[derive(Debug, Clone)]
pub struct PgTenantStore {
    pool: PgPool,
}

impl PgTenantStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn find(&self, tenant_id: &str) -> Result<Option<Tenant>, RepoError> {
        let row = sqlx::query_as::<_, TenantRow>(
            r#"
            SELECT tenant_id, root_path, status
            FROM tenants
            WHERE tenant_id = $1
            "#,
        )
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Tenant::try_from).transpose()
    }
}

#[async_trait]
impl TenantStore for PgTenantStore {
    async fn get(&self, tenant_id: &str) -> Result<Option<Tenant>, StoreError> {
        self.find(tenant_id).await.map_err(|e| {
            tracing::error!(tenant_id, error = ?e, "tenant lookup failed");
            StoreError::Backend(e.to_string())
        })
    }
}
