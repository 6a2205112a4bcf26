//! Principal, tenant and the per-request authorization context.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::services::authz::error::AuthError;
use crate::services::authz::permission::PermissionSet;
use crate::services::authz::roles::Role;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
    Jwt,
    ApiKey,
    #[serde(rename = "oauth")]
    OAuth,
}

impl AuthMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Jwt => "jwt",
            Self::ApiKey => "api_key",
            Self::OAuth => "oauth",
        }
    }
}

impl fmt::Display for AuthMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuthMethod {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "jwt" => Ok(Self::Jwt),
            "api_key" | "apikey" | "api-key" => Ok(Self::ApiKey),
            "oauth" => Ok(Self::OAuth),
            _ => Err(()),
        }
    }
}

/// The authenticated identity derived from a credential.
///
/// When `explicit_permissions` is present it is authoritative; otherwise the
/// role is expanded. Neither means no access.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Principal {
    pub tenant_id: String,
    pub subject_id: String,
    pub auth_method: AuthMethod,
    pub role: Option<Role>,
    pub explicit_permissions: Option<PermissionSet>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TenantStatus {
    Active,
    Suspended,
    Deleted,
}

impl TenantStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Suspended => "suspended",
            Self::Deleted => "deleted",
        }
    }

    /// `active ⇄ suspended`, and either may move to `deleted` (terminal).
    pub fn can_transition_to(&self, next: TenantStatus) -> bool {
        use TenantStatus::*;
        matches!(
            (self, next),
            (Active, Suspended) | (Suspended, Active) | (Active, Deleted) | (Suspended, Deleted)
        )
    }
}

impl fmt::Display for TenantStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TenantStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "suspended" => Ok(Self::Suspended),
            "deleted" => Ok(Self::Deleted),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid tenant transition: {from} -> {to}")]
pub struct TenantTransitionError {
    pub from: TenantStatus,
    pub to: TenantStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tenant {
    pub tenant_id: String,
    pub root_path: String,
    pub status: TenantStatus,
}

impl Tenant {
    pub fn new(tenant_id: impl Into<String>, root_path: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            root_path: root_path.into(),
            status: TenantStatus::Active,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == TenantStatus::Active
    }

    pub fn transition(&mut self, next: TenantStatus) -> Result<(), TenantTransitionError> {
        if !self.status.can_transition_to(next) {
            return Err(TenantTransitionError {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }
}

/// Resolved, immutable per-request value.
///
/// Only the authorizer builds these; fields are read through getters.
#[derive(Debug, Clone)]
pub struct AuthContext {
    principal: Principal,
    tenant: Tenant,
    effective_permissions: PermissionSet,
}

impl AuthContext {
    pub(crate) fn new(
        principal: Principal,
        tenant: Tenant,
        effective_permissions: PermissionSet,
    ) -> Self {
        Self {
            principal,
            tenant,
            effective_permissions,
        }
    }

    pub fn principal(&self) -> &Principal {
        &self.principal
    }

    pub fn tenant(&self) -> &Tenant {
        &self.tenant
    }

    pub fn tenant_id(&self) -> &str {
        &self.principal.tenant_id
    }

    pub fn subject_id(&self) -> &str {
        &self.principal.subject_id
    }

    pub fn effective_permissions(&self) -> &PermissionSet {
        &self.effective_permissions
    }
}

/// Marker for a request that presented no credential while auth is optional.
///
/// Never an `AuthContext` with empty permissions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UnauthenticatedContext;

/// What the middleware publishes for each request.
#[derive(Debug, Clone)]
pub enum RequestAuth {
    Authenticated(Arc<AuthContext>),
    Unauthenticated(UnauthenticatedContext),
}

impl RequestAuth {
    pub fn context(&self) -> Option<&Arc<AuthContext>> {
        match self {
            Self::Authenticated(ctx) => Some(ctx),
            Self::Unauthenticated(_) => None,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated(_))
    }

    pub fn require_context(&self) -> Result<&Arc<AuthContext>, AuthError> {
        self.context().ok_or(AuthError::Unauthenticated)
    }

    pub fn require_tenant_id(&self) -> Result<&str, AuthError> {
        self.require_context().map(|ctx| ctx.tenant_id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tenant_lifecycle() {
        let mut tenant = Tenant::new("t1", "/tenants/t1");
        assert!(tenant.is_active());

        tenant.transition(TenantStatus::Suspended).unwrap();
        assert!(!tenant.is_active());
        tenant.transition(TenantStatus::Active).unwrap();
        tenant.transition(TenantStatus::Deleted).unwrap();

        let err = tenant.transition(TenantStatus::Active).unwrap_err();
        assert_eq!(err.from, TenantStatus::Deleted);
        assert!(tenant.transition(TenantStatus::Suspended).is_err());
    }

    #[test]
    fn test_self_transition_is_rejected() {
        let mut tenant = Tenant::new("t1", "/tenants/t1");
        assert!(tenant.transition(TenantStatus::Active).is_err());
    }

    #[test]
    fn test_unauthenticated_has_no_tenant() {
        let auth = RequestAuth::Unauthenticated(UnauthenticatedContext);
        assert!(!auth.is_authenticated());
        assert!(matches!(
            auth.require_tenant_id(),
            Err(AuthError::Unauthenticated)
        ));
    }

    #[test]
    fn test_auth_method_names() {
        assert_eq!("apiKey".parse::<AuthMethod>(), Ok(AuthMethod::ApiKey));
        assert_eq!("OAuth".parse::<AuthMethod>(), Ok(AuthMethod::OAuth));
        assert!("basic".parse::<AuthMethod>().is_err());
    }
}
