//! OAuth bearer tokens verified by an external verifier (typically RFC 7662
//! introspection). Positive results are cached per token hash until the
//! configured TTL or the token's own expiry, whichever is sooner.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::services::authz::error::{AuthError, CredentialError};
use crate::services::authz::permission::{Permission, PermissionSet, PermissionType};
use crate::services::cache::TtlCache;
use crate::services::clock::Clock;

pub const DEFAULT_OAUTH_HEADER: &str = "x-oauth-token";
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OAuthClaims {
    pub subject: Option<String>,
    pub tenant_id: Option<String>,
    pub client_id: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuthVerification {
    pub valid: bool,
    pub claims: OAuthClaims,
    pub scopes: Vec<String>,
}

impl OAuthVerification {
    pub fn inactive() -> Self {
        Self {
            valid: false,
            claims: OAuthClaims::default(),
            scopes: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum VerifierError {
    #[error("verifier unreachable: {0}")]
    Transport(String),
    #[error("verifier returned an invalid response: {0}")]
    InvalidResponse(String),
}

/// Anything that can say whether an opaque token is active.
#[async_trait]
pub trait OAuthVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Result<OAuthVerification, VerifierError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScopeMappingError {
    #[error("missing '=' in scope mapping entry '{0}'")]
    MissingSeparator(String),
    #[error("missing ':' in scope mapping grant '{0}'")]
    MissingGrantType(String),
    #[error("unknown permission type '{0}'")]
    UnknownPermissionType(String),
    #[error("empty scope or path in '{0}'")]
    EmptyField(String),
}

/// Scope string to permission grants. Unknown scopes grant nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeMapping {
    entries: BTreeMap<String, Vec<Permission>>,
}

impl Default for ScopeMapping {
    fn default() -> Self {
        Self::empty()
            .with("read:files", Permission::new(PermissionType::Read, "/**"))
            .with("write:files", Permission::new(PermissionType::Write, "/**"))
            .with("delete:files", Permission::new(PermissionType::Delete, "/**"))
            .with("admin:files", Permission::new(PermissionType::Admin, "/**"))
    }
}

impl ScopeMapping {
    pub fn empty() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    pub fn with(mut self, scope: impl Into<String>, permission: Permission) -> Self {
        self.entries.entry(scope.into()).or_default().push(permission);
        self
    }

    /// Grants of `other` are added to the scopes they name.
    pub fn merge(mut self, other: ScopeMapping) -> Self {
        for (scope, grants) in other.entries {
            for grant in grants {
                self = self.with(scope.clone(), grant);
            }
        }
        self
    }

    /// Parse `scope=type:pattern` pairs separated by `;`, e.g.
    /// `read:files=read:/**;docs:rw=write:/docs/**`.
    pub fn parse(raw: &str) -> Result<Self, ScopeMappingError> {
        let mut mapping = Self::empty();
        for entry in raw.split(';').map(str::trim).filter(|e| !e.is_empty()) {
            let (scope, grant) = entry
                .split_once('=')
                .ok_or_else(|| ScopeMappingError::MissingSeparator(entry.to_string()))?;
            let (kind, path) = grant
                .split_once(':')
                .ok_or_else(|| ScopeMappingError::MissingGrantType(grant.to_string()))?;
            let kind: PermissionType = kind
                .trim()
                .parse()
                .map_err(|_| ScopeMappingError::UnknownPermissionType(kind.trim().to_string()))?;
            if scope.trim().is_empty() || path.trim().is_empty() {
                return Err(ScopeMappingError::EmptyField(entry.to_string()));
            }
            mapping = mapping.with(scope.trim(), Permission::new(kind, path.trim()));
        }
        Ok(mapping)
    }

    pub fn permissions_for<S: AsRef<str>>(&self, scopes: &[S]) -> PermissionSet {
        let mut out: Vec<Permission> = Vec::new();
        for scope in scopes {
            for grant in self.entries.get(scope.as_ref()).into_iter().flatten() {
                if !out.contains(grant) {
                    out.push(grant.clone());
                }
            }
        }
        out.into()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuthSettings {
    pub header_name: String,
    /// Zero disables caching.
    pub cache_ttl: Duration,
    pub scope_mapping: ScopeMapping,
}

impl Default for OAuthSettings {
    fn default() -> Self {
        Self {
            header_name: DEFAULT_OAUTH_HEADER.to_string(),
            cache_ttl: DEFAULT_CACHE_TTL,
            scope_mapping: ScopeMapping::default(),
        }
    }
}

/// What the OAuth strategy hands to the unifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuthPrincipal {
    pub subject: String,
    pub tenant_id: String,
    pub client_id: Option<String>,
    pub scopes: Vec<String>,
    pub permissions: PermissionSet,
}

pub struct OAuthResolver {
    verifier: Arc<dyn OAuthVerifier>,
    cache: Option<TtlCache<OAuthVerification>>,
    ttl: chrono::Duration,
    clock: Arc<dyn Clock>,
    scope_mapping: ScopeMapping,
}

impl std::fmt::Debug for OAuthResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthResolver")
            .field("cache", &self.cache)
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl OAuthResolver {
    pub fn new(
        settings: &OAuthSettings,
        verifier: Arc<dyn OAuthVerifier>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let ttl = chrono::Duration::from_std(settings.cache_ttl).unwrap_or(chrono::Duration::MAX);
        let cache = (!settings.cache_ttl.is_zero()).then(|| TtlCache::new(clock.clone()));
        Self {
            verifier,
            cache,
            ttl,
            clock,
            scope_mapping: settings.scope_mapping.clone(),
        }
    }

    pub async fn resolve(&self, token: &str) -> Result<OAuthPrincipal, AuthError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(CredentialError::MissingToken.into());
        }

        let verification = self.verify_cached(token).await?;
        let now = self.clock.now();

        if !verification.valid {
            return Err(CredentialError::OAuthTokenInactive.into());
        }
        if verification.claims.expires_at.is_some_and(|exp| exp <= now) {
            return Err(CredentialError::TokenExpired.into());
        }

        let claims = verification.claims;
        let non_blank = |v: &Option<String>| v.clone().filter(|s| !s.trim().is_empty());
        let subject = non_blank(&claims.subject)
            .or_else(|| non_blank(&claims.client_id))
            .ok_or(CredentialError::MissingSubject)?;
        let tenant_id = claims
            .tenant_id
            .filter(|s| !s.trim().is_empty())
            .ok_or(CredentialError::MissingTenant)?;

        let permissions = self.scope_mapping.permissions_for(&verification.scopes);
        if permissions.is_empty() {
            tracing::debug!(%subject, scopes = ?verification.scopes, "no scope maps to a permission");
        }

        Ok(OAuthPrincipal {
            subject,
            tenant_id,
            client_id: claims.client_id,
            scopes: verification.scopes,
            permissions,
        })
    }

    async fn verify_cached(&self, token: &str) -> Result<OAuthVerification, AuthError> {
        let key = cache_key(token);

        if let Some(hit) = self.cache.as_ref().and_then(|c| c.get(&key)) {
            tracing::debug!("oauth verification cache hit");
            return Ok(hit);
        }

        let verification = self.verifier.verify(token).await.map_err(|e| {
            tracing::error!(error = %e, "oauth verification failed");
            AuthError::upstream(e)
        })?;

        // Positive results only.
        if let Some(cache) = self.cache.as_ref().filter(|_| verification.valid) {
            let by_ttl = self.clock.now().checked_add_signed(self.ttl);
            let until = match (by_ttl, verification.claims.expires_at) {
                (Some(ttl), Some(exp)) => ttl.min(exp),
                (Some(ttl), None) => ttl,
                (None, Some(exp)) => exp,
                (None, None) => DateTime::<Utc>::MAX_UTC,
            };
            cache.insert_until(key, verification.clone(), until);
        }

        Ok(verification)
    }
}

fn cache_key(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::clock::ManualClock;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingVerifier {
        calls: AtomicUsize,
        response: Result<OAuthVerification, VerifierError>,
    }

    impl CountingVerifier {
        fn new(response: Result<OAuthVerification, VerifierError>) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                response,
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl OAuthVerifier for CountingVerifier {
        async fn verify(&self, _token: &str) -> Result<OAuthVerification, VerifierError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.response.clone()
        }
    }

    fn active(expires_at: Option<DateTime<Utc>>) -> OAuthVerification {
        OAuthVerification {
            valid: true,
            claims: OAuthClaims {
                subject: Some("user-9".into()),
                tenant_id: Some("t1".into()),
                client_id: Some("cli".into()),
                expires_at,
            },
            scopes: vec!["read:files".into(), "profile".into()],
        }
    }

    fn resolver(
        verifier: Arc<CountingVerifier>,
        clock: Arc<ManualClock>,
        ttl_secs: u64,
    ) -> OAuthResolver {
        let settings = OAuthSettings {
            cache_ttl: Duration::from_secs(ttl_secs),
            ..OAuthSettings::default()
        };
        OAuthResolver::new(&settings, verifier, clock)
    }

    #[tokio::test]
    async fn test_active_token_maps_scopes() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let verifier = CountingVerifier::new(Ok(active(None)));
        let p = resolver(verifier, clock, 60).resolve("opaque").await.unwrap();

        assert_eq!(p.subject, "user-9");
        assert_eq!(p.tenant_id, "t1");
        assert_eq!(
            p.permissions,
            PermissionSet::from(vec![Permission::new(PermissionType::Read, "/**")])
        );
    }

    #[tokio::test]
    async fn test_cache_hit_then_expiry() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let verifier = CountingVerifier::new(Ok(active(None)));
        let r = resolver(verifier.clone(), clock.clone(), 60);

        r.resolve("opaque").await.unwrap();
        r.resolve("opaque").await.unwrap();
        assert_eq!(verifier.calls(), 1);

        clock.advance(chrono::Duration::seconds(61));
        r.resolve("opaque").await.unwrap();
        assert_eq!(verifier.calls(), 2);
    }

    #[tokio::test]
    async fn test_cache_never_outlives_token() {
        let start = Utc::now();
        let clock = Arc::new(ManualClock::new(start));
        let verifier = CountingVerifier::new(Ok(active(Some(start + chrono::Duration::seconds(10)))));
        let r = resolver(verifier.clone(), clock.clone(), 300);

        r.resolve("opaque").await.unwrap();
        clock.advance(chrono::Duration::seconds(11));
        let err = r.resolve("opaque").await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredential(CredentialError::TokenExpired)));
        assert_eq!(verifier.calls(), 2);
    }

    #[tokio::test]
    async fn test_inactive_is_not_cached() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let verifier = CountingVerifier::new(Ok(OAuthVerification::inactive()));
        let r = resolver(verifier.clone(), clock, 60);

        for _ in 0..2 {
            let err = r.resolve("opaque").await.unwrap_err();
            assert!(matches!(
                err,
                AuthError::InvalidCredential(CredentialError::OAuthTokenInactive)
            ));
        }
        assert_eq!(verifier.calls(), 2);
    }

    #[tokio::test]
    async fn test_zero_ttl_disables_cache() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let verifier = CountingVerifier::new(Ok(active(None)));
        let r = resolver(verifier.clone(), clock, 0);
        r.resolve("a").await.unwrap();
        r.resolve("a").await.unwrap();
        assert_eq!(verifier.calls(), 2);
    }

    #[tokio::test]
    async fn test_verifier_outage_is_upstream() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let verifier = CountingVerifier::new(Err(VerifierError::Transport("timeout".into())));
        let err = resolver(verifier, clock, 60).resolve("a").await.unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_client_credentials_token_uses_client_id() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let mut v = active(None);
        v.claims.subject = None;
        let p = resolver(CountingVerifier::new(Ok(v)), clock.clone(), 60)
            .resolve("a")
            .await
            .unwrap();
        assert_eq!(p.subject, "cli");

        let mut v = active(None);
        v.claims.tenant_id = None;
        let err = resolver(CountingVerifier::new(Ok(v)), clock, 60)
            .resolve("a")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredential(CredentialError::MissingTenant)));
    }

    #[tokio::test]
    async fn test_blank_subject_falls_back_to_client_id() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let mut v = active(None);
        v.claims.subject = Some("  ".into());
        let p = resolver(CountingVerifier::new(Ok(v)), clock.clone(), 60)
            .resolve("a")
            .await
            .unwrap();
        assert_eq!(p.subject, "cli");

        let mut v = active(None);
        v.claims.subject = Some("".into());
        v.claims.client_id = Some(" ".into());
        let err = resolver(CountingVerifier::new(Ok(v)), clock, 60)
            .resolve("a")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredential(CredentialError::MissingSubject)));
    }

    #[test]
    fn test_scope_mapping_parse() {
        let m = ScopeMapping::parse("docs=read:/docs/**; docs=write:/docs/drafts/**").unwrap();
        let set = m.permissions_for(&["docs", "unknown"]);
        assert_eq!(set.len(), 2);
        assert!(m.permissions_for(&["unknown"]).is_empty());

        assert_eq!(
            ScopeMapping::parse("docs"),
            Err(ScopeMappingError::MissingSeparator("docs".into()))
        );
        assert_eq!(
            ScopeMapping::parse("docs=fly:/x"),
            Err(ScopeMappingError::UnknownPermissionType("fly".into()))
        );
        assert_eq!(
            ScopeMapping::parse("docs=read:"),
            Err(ScopeMappingError::EmptyField("docs=read:".into()))
        );
        assert_eq!(ScopeMapping::parse("").unwrap(), ScopeMapping::empty());
    }
}
