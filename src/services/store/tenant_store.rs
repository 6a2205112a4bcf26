use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;

use crate::services::authz::context::{Tenant, TenantStatus, TenantTransitionError};
use crate::services::authz::error::AuthError;
use crate::services::authz::tenant_path::TenantPathResolver;
use crate::services::store::StoreError;

/// Tenant lookup. `Ok(None)` is treated as a denial by the authorizer.
#[async_trait]
pub trait TenantStore: Send + Sync {
    async fn get(&self, tenant_id: &str) -> Result<Option<Tenant>, StoreError>;
}

#[derive(Debug, Default, Clone)]
pub struct InMemoryTenantStore {
    tenants: Arc<DashMap<String, Tenant>>,
}

impl InMemoryTenantStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, tenant: Tenant) {
        self.tenants.insert(tenant.tenant_id.clone(), tenant);
    }

    /// Create an active tenant on first provisioning; later calls return the
    /// existing record untouched.
    pub fn provision(
        &self,
        tenant_id: &str,
        paths: &TenantPathResolver,
    ) -> Result<Tenant, AuthError> {
        let root = paths.root_for(tenant_id)?;
        let entry = self
            .tenants
            .entry(tenant_id.to_string())
            .or_insert_with(|| Tenant::new(tenant_id, root));
        Ok(entry.value().clone())
    }

    /// Apply a lifecycle transition. Returns `Ok(false)` for unknown tenants.
    pub fn set_status(
        &self,
        tenant_id: &str,
        status: TenantStatus,
    ) -> Result<bool, TenantTransitionError> {
        match self.tenants.get_mut(tenant_id) {
            Some(mut tenant) => tenant.transition(status).map(|_| true),
            None => Ok(false),
        }
    }
}

#[async_trait]
impl TenantStore for InMemoryTenantStore {
    async fn get(&self, tenant_id: &str) -> Result<Option<Tenant>, StoreError> {
        Ok(self.tenants.get(tenant_id).map(|t| t.value().clone()))
    }
}
