/*
 * Responsibility
 * - Turn raw credentials into a RequestAuth (credential -> principal -> context)
 * - Path and tool authorization against an AuthContext
 *
 * Order for every path decision:
 *   tenant active -> resolve -> structural guard -> evaluate on relative form
 */
use std::sync::Arc;

use crate::services::authz::context::{
    AuthContext, Principal, RequestAuth, UnauthenticatedContext,
};
use crate::services::authz::error::{AuthError, CredentialError};
use crate::services::authz::permission::{
    self, Decision, DenyReason, PermissionSet, PermissionType,
};
use crate::services::authz::roles;
use crate::services::authz::tenant_path::TenantPathResolver;
use crate::services::authz::tools::ToolCatalog;
use crate::services::credentials::{CredentialResolver, RawCredentials};
use crate::services::store::TenantStore;

/// A path that passed every check, in both of its forms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizedPath {
    /// Where the filesystem layer should operate.
    pub absolute: String,
    /// What the tenant sees and what grants were matched against.
    pub relative: String,
}

pub struct Authorizer {
    credentials: CredentialResolver,
    tenants: Arc<dyn TenantStore>,
    paths: TenantPathResolver,
    tools: Arc<dyn ToolCatalog>,
    required: bool,
}

impl std::fmt::Debug for Authorizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Authorizer")
            .field("credentials", &self.credentials)
            .field("paths", &self.paths)
            .field("required", &self.required)
            .finish()
    }
}

impl Authorizer {
    pub fn new(
        credentials: CredentialResolver,
        tenants: Arc<dyn TenantStore>,
        paths: TenantPathResolver,
        tools: Arc<dyn ToolCatalog>,
        required: bool,
    ) -> Self {
        Self {
            credentials,
            tenants,
            paths,
            tools,
            required,
        }
    }

    pub fn paths(&self) -> &TenantPathResolver {
        &self.paths
    }

    pub fn is_required(&self) -> bool {
        self.required
    }

    pub async fn authenticate(&self, creds: &RawCredentials) -> Result<RequestAuth, AuthError> {
        match self.credentials.resolve(creds).await? {
            Some(resolved) => {
                let ctx = self.assemble(resolved.into_principal()).await?;
                Ok(RequestAuth::Authenticated(Arc::new(ctx)))
            }
            None if self.required => {
                tracing::debug!("no credential presented, authentication required");
                Err(AuthError::Unauthenticated)
            }
            None => Ok(RequestAuth::Unauthenticated(UnauthenticatedContext)),
        }
    }

    /// Attach tenant and effective permissions to a verified principal.
    pub async fn assemble(&self, principal: Principal) -> Result<AuthContext, AuthError> {
        if principal.tenant_id.trim().is_empty() {
            return Err(CredentialError::MissingTenant.into());
        }
        if principal.subject_id.trim().is_empty() {
            return Err(CredentialError::MissingSubject.into());
        }

        let tenant = self
            .tenants
            .get(&principal.tenant_id)
            .await
            .map_err(|e| {
                tracing::error!(tenant_id = %principal.tenant_id, error = %e, "tenant lookup failed");
                AuthError::upstream(e)
            })?
            .ok_or_else(|| {
                tracing::warn!(tenant_id = %principal.tenant_id, "unknown tenant");
                AuthError::PermissionDenied(DenyReason::UnknownTenant)
            })?;

        let effective = if tenant.is_active() {
            roles::effective_permissions(&principal)
        } else {
            tracing::info!(tenant_id = %tenant.tenant_id, status = %tenant.status, "tenant inactive, no permissions");
            PermissionSet::empty()
        };

        tracing::debug!(
            tenant_id = %principal.tenant_id,
            subject_id = %principal.subject_id,
            method = %principal.auth_method,
            grants = effective.len(),
            "auth context assembled"
        );
        Ok(AuthContext::new(principal, tenant, effective))
    }

    pub fn authorize_path(
        &self,
        ctx: &AuthContext,
        caller_path: &str,
        operation: PermissionType,
    ) -> Result<AuthorizedPath, AuthError> {
        ensure_active(ctx)?;

        let tenant_id = ctx.tenant_id();
        let absolute = self.paths.resolve(tenant_id, caller_path)?;
        self.guard_access(ctx, &absolute)?;
        let relative = self.paths.to_relative(tenant_id, &absolute)?;

        permission::require_permission(ctx.effective_permissions(), &relative, operation)
            .inspect_err(|e| {
                tracing::info!(
                    tenant_id,
                    subject_id = ctx.subject_id(),
                    path = %relative,
                    op = %operation,
                    reason = e.reason_code(),
                    "permission denied"
                );
            })?;

        Ok(AuthorizedPath { absolute, relative })
    }

    /// Non-raising variant of [`authorize_path`](Self::authorize_path).
    pub fn check_path(
        &self,
        ctx: &AuthContext,
        caller_path: &str,
        operation: PermissionType,
    ) -> Decision {
        match self.authorize_path(ctx, caller_path, operation) {
            Ok(_) => Decision::Allow,
            Err(err) => Decision::Deny(deny_reason(err)),
        }
    }

    /// Last check before the filesystem is touched.
    pub fn guard_access(&self, ctx: &AuthContext, absolute_path: &str) -> Result<(), AuthError> {
        if self.paths.is_within_tenant(ctx.tenant_id(), absolute_path) {
            return Ok(());
        }
        tracing::warn!(
            tenant_id = ctx.tenant_id(),
            path = absolute_path,
            "access outside tenant namespace blocked"
        );
        Err(AuthError::path_escape(format!(
            "'{}' is outside the tenant root",
            absolute_path
        )))
    }

    /// Authorize a named tool invocation on `caller_path`.
    pub fn authorize_tool(
        &self,
        ctx: &AuthContext,
        tool: &str,
        caller_path: &str,
    ) -> Result<(PermissionType, AuthorizedPath), AuthError> {
        let operation = self.tools.operation_for(tool).ok_or_else(|| {
            tracing::info!(tenant_id = ctx.tenant_id(), tool, "unknown tool");
            AuthError::PermissionDenied(DenyReason::UnknownTool(tool.to_string()))
        })?;
        let path = self.authorize_path(ctx, caller_path, operation)?;
        Ok((operation, path))
    }
}

fn ensure_active(ctx: &AuthContext) -> Result<(), AuthError> {
    let tenant = ctx.tenant();
    if tenant.is_active() {
        return Ok(());
    }
    Err(AuthError::TenantInactive {
        tenant_id: tenant.tenant_id.clone(),
        status: tenant.status,
    })
}

fn deny_reason(err: AuthError) -> DenyReason {
    match err {
        AuthError::PermissionDenied(reason) => reason,
        AuthError::TenantInactive { .. } => DenyReason::TenantInactive,
        AuthError::PathEscape(_) => DenyReason::PathOutsideTenant,
        other => DenyReason::Failed(other.code()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::authz::context::{AuthMethod, TenantStatus};
    use crate::services::authz::error::AuthErrorCode;
    use crate::services::authz::permission::Permission;
    use crate::services::authz::roles::Role;
    use crate::services::authz::tools::StaticToolCatalog;
    use crate::services::clock::SystemClock;
    use crate::services::credentials::{
        ApiKeyIssuer, ApiKeySettings, AuthConfig, JwtSettings, ResolverDeps,
    };
    use crate::services::store::{ApiKeyStore, InMemoryApiKeyStore, InMemoryTenantStore};
    use jsonwebtoken::{Algorithm, EncodingKey, Header};
    use serde_json::json;

    const SECRET: &str = "authorizer-test-secret-0123456789";

    struct Fixture {
        authorizer: Authorizer,
        tenants: InMemoryTenantStore,
        keys: InMemoryApiKeyStore,
    }

    fn fixture(required: bool) -> Fixture {
        let tenants = InMemoryTenantStore::new();
        let paths = TenantPathResolver::default();
        tenants.provision("t1", &paths).unwrap();
        tenants.provision("t2", &paths).unwrap();

        let keys = InMemoryApiKeyStore::new();
        let config = AuthConfig {
            required,
            method: None,
            jwt: Some(JwtSettings::hs256(SECRET)),
            api_key: Some(ApiKeySettings::default()),
            oauth: None,
        };
        let credentials = CredentialResolver::new(
            &config,
            ResolverDeps {
                api_keys: Some(Arc::new(keys.clone())),
                oauth_verifier: None,
                clock: Arc::new(SystemClock),
            },
        )
        .unwrap();

        Fixture {
            authorizer: Authorizer::new(
                credentials,
                Arc::new(tenants.clone()),
                paths,
                Arc::new(StaticToolCatalog::filesystem()),
                required,
            ),
            tenants,
            keys,
        }
    }

    fn jwt(tenant: &str, role: &str, exp_offset: i64) -> String {
        let claims = json!({
            "sub": "u1", "tenant_id": tenant, "role": role,
            "exp": chrono::Utc::now().timestamp() + exp_offset,
        });
        jsonwebtoken::encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap()
    }

    async fn context(f: &Fixture, creds: RawCredentials) -> Arc<AuthContext> {
        match f.authorizer.authenticate(&creds).await.unwrap() {
            RequestAuth::Authenticated(ctx) => ctx,
            RequestAuth::Unauthenticated(_) => panic!("expected an authenticated context"),
        }
    }

    #[tokio::test]
    async fn test_viewer_cannot_write() {
        let f = fixture(true);
        let ctx = context(&f, RawCredentials::bearer(jwt("t1", "viewer", 600))).await;

        let ok = f.authorizer.authorize_path(&ctx, "/docs/a.txt", PermissionType::Read).unwrap();
        assert_eq!(ok.absolute, "/tenants/t1/docs/a.txt");
        assert_eq!(ok.relative, "/docs/a.txt");

        let err = f
            .authorizer
            .authorize_path(&ctx, "/docs/a.txt", PermissionType::Write)
            .unwrap_err();
        assert_eq!(err.code(), AuthErrorCode::PermissionDenied);
    }

    #[tokio::test]
    async fn test_api_key_scoped_to_data() {
        let f = fixture(true);
        let issuer = ApiKeyIssuer::new(&ApiKeySettings::default(), Arc::new(SystemClock));
        let perms: PermissionSet = vec![Permission::new(PermissionType::Write, "/data/**")].into();
        let issued = issuer.issue("t1", "svc", perms, None, None).unwrap();
        f.keys.set(issued.metadata).await.unwrap();

        let ctx = context(&f, RawCredentials::api_key(issued.key)).await;
        assert_eq!(ctx.principal().auth_method, AuthMethod::ApiKey);

        assert!(f.authorizer.check_path(&ctx, "/data/x.json", PermissionType::Write).is_allowed());
        assert_eq!(
            f.authorizer.check_path(&ctx, "/other/x.json", PermissionType::Write),
            Decision::Deny(DenyReason::NoMatchingScope)
        );
    }

    #[tokio::test]
    async fn test_expired_jwt_is_invalid_credential() {
        let f = fixture(true);
        let err = f
            .authorizer
            .authenticate(&RawCredentials::bearer(jwt("t1", "admin", -3600)))
            .await
            .unwrap_err();
        assert_eq!(err.code(), AuthErrorCode::InvalidCredential);
    }

    #[tokio::test]
    async fn test_missing_credentials() {
        let err = fixture(true)
            .authorizer
            .authenticate(&RawCredentials::default())
            .await
            .unwrap_err();
        assert_eq!(err.code(), AuthErrorCode::Unauthenticated);

        let auth = fixture(false)
            .authorizer
            .authenticate(&RawCredentials::default())
            .await
            .unwrap();
        assert!(!auth.is_authenticated());
        assert!(auth.require_tenant_id().is_err());
    }

    #[tokio::test]
    async fn test_escape_and_cross_tenant_paths() {
        let f = fixture(true);
        let ctx = context(&f, RawCredentials::bearer(jwt("t1", "admin", 600))).await;

        let err = f
            .authorizer
            .authorize_path(&ctx, "../t2/secret", PermissionType::Read)
            .unwrap_err();
        assert_eq!(err.code(), AuthErrorCode::PathEscape);

        // An absolute-looking path is still interpreted inside the tenant.
        let ok = f
            .authorizer
            .authorize_path(&ctx, "/tenants/t2/secret", PermissionType::Read)
            .unwrap();
        assert_eq!(ok.absolute, "/tenants/t1/tenants/t2/secret");

        assert!(f.authorizer.guard_access(&ctx, "/tenants/t2/secret").is_err());
        assert!(f.authorizer.guard_access(&ctx, "/tenants/t1/../t2").is_err());
        assert!(f.authorizer.guard_access(&ctx, "/tenants/t1/ok").is_ok());
        assert_eq!(
            f.authorizer.check_path(&ctx, "a/../../..", PermissionType::Read),
            Decision::Deny(DenyReason::PathOutsideTenant)
        );
    }

    #[test]
    fn test_deny_reason_mapping() {
        assert_eq!(
            deny_reason(AuthError::PermissionDenied(DenyReason::NoMatchingScope)),
            DenyReason::NoMatchingScope
        );
        assert_eq!(
            deny_reason(AuthError::path_escape("'../x' leaves the tenant root")),
            DenyReason::PathOutsideTenant
        );
        assert_eq!(
            deny_reason(AuthError::upstream("store down")),
            DenyReason::Failed(AuthErrorCode::UpstreamUnavailable)
        );
        assert_eq!(
            deny_reason(AuthError::Unauthenticated),
            DenyReason::Failed(AuthErrorCode::Unauthenticated)
        );
    }

    #[tokio::test]
    async fn test_inactive_and_unknown_tenants() {
        let f = fixture(true);
        f.tenants.set_status("t1", TenantStatus::Suspended).unwrap();

        let ctx = context(&f, RawCredentials::bearer(jwt("t1", "admin", 600))).await;
        assert!(ctx.effective_permissions().is_empty());
        let err = f
            .authorizer
            .authorize_path(&ctx, "/x", PermissionType::Read)
            .unwrap_err();
        assert_eq!(err.code(), AuthErrorCode::TenantInactive);
        assert_eq!(
            f.authorizer.check_path(&ctx, "/x", PermissionType::Read),
            Decision::Deny(DenyReason::TenantInactive)
        );

        let err = f
            .authorizer
            .authenticate(&RawCredentials::bearer(jwt("ghost", "admin", 600)))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::PermissionDenied(DenyReason::UnknownTenant)));
    }

    #[tokio::test]
    async fn test_assemble_rejects_blank_tenant() {
        let f = fixture(true);
        let principal = Principal {
            tenant_id: " ".into(),
            subject_id: "u".into(),
            auth_method: AuthMethod::Jwt,
            role: Some(Role::Admin),
            explicit_permissions: None,
        };
        let err = f.authorizer.assemble(principal).await.unwrap_err();
        assert!(matches!(
            err,
            AuthError::InvalidCredential(CredentialError::MissingTenant)
        ));
    }

    #[tokio::test]
    async fn test_tools() {
        let f = fixture(true);
        let ctx = context(&f, RawCredentials::bearer(jwt("t1", "editor", 600))).await;

        let (op, path) = f.authorizer.authorize_tool(&ctx, "write_file", "notes.md").unwrap();
        assert_eq!(op, PermissionType::Write);
        assert_eq!(path.relative, "/notes.md");

        let err = f.authorizer.authorize_tool(&ctx, "delete_file", "notes.md").unwrap_err();
        assert_eq!(err.code(), AuthErrorCode::PermissionDenied);

        let err = f.authorizer.authorize_tool(&ctx, "format_disk", "/").unwrap_err();
        assert!(matches!(
            err,
            AuthError::PermissionDenied(DenyReason::UnknownTool(ref t)) if t == "format_disk"
        ));
    }
}
