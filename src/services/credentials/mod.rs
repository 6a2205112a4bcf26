//! Credential resolution: pick exactly one strategy for a request and turn
//! what it verified into a `Principal`.
//!
//! Selection order when no method is pinned: JWT, then API key, then OAuth,
//! among the configured methods only. A bearer value carrying the API key
//! prefix is treated as an API key. When OAuth is configured as well, a bearer
//! value goes to JWT only if it has the three-segment compact shape.

pub mod api_key;
pub mod introspection;
pub mod jwt;
pub mod oauth;

use std::sync::Arc;

use thiserror::Error;

use crate::services::authz::context::{AuthMethod, Principal};
use crate::services::authz::error::{AuthError, CredentialError};
use crate::services::clock::Clock;
use crate::services::store::ApiKeyStore;

pub use api_key::{ApiKeyIssuer, ApiKeyPrincipal, ApiKeySettings, ApiKeyVerifier};
pub use jwt::{JwtKey, JwtPrincipal, JwtSettings, JwtVerifier};
pub use oauth::{
    OAuthPrincipal, OAuthResolver, OAuthSettings, OAuthVerifier, ScopeMapping, ScopeMappingError,
};

/// Credentials as read off the transport, before any verification.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawCredentials {
    pub bearer: Option<String>,
    pub api_key: Option<String>,
    pub oauth_token: Option<String>,
}

impl RawCredentials {
    pub fn bearer(token: impl Into<String>) -> Self {
        Self {
            bearer: Some(token.into()),
            ..Self::default()
        }
    }

    pub fn api_key(key: impl Into<String>) -> Self {
        Self {
            api_key: Some(key.into()),
            ..Self::default()
        }
    }

    pub fn oauth(token: impl Into<String>) -> Self {
        Self {
            oauth_token: Some(token.into()),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        [&self.bearer, &self.api_key, &self.oauth_token]
            .into_iter()
            .all(|v| non_blank(v).is_none())
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// The credential chosen for verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentedCredential<'a> {
    Jwt(&'a str),
    ApiKey(&'a str),
    OAuth(&'a str),
}

impl PresentedCredential<'_> {
    pub fn method(&self) -> AuthMethod {
        match self {
            Self::Jwt(_) => AuthMethod::Jwt,
            Self::ApiKey(_) => AuthMethod::ApiKey,
            Self::OAuth(_) => AuthMethod::OAuth,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedPrincipal {
    Jwt(JwtPrincipal),
    ApiKey(ApiKeyPrincipal),
    OAuth(OAuthPrincipal),
}

impl ResolvedPrincipal {
    pub fn method(&self) -> AuthMethod {
        match self {
            Self::Jwt(_) => AuthMethod::Jwt,
            Self::ApiKey(_) => AuthMethod::ApiKey,
            Self::OAuth(_) => AuthMethod::OAuth,
        }
    }

    pub fn into_principal(self) -> Principal {
        match self {
            Self::Jwt(p) => Principal {
                tenant_id: p.tenant_id,
                subject_id: p.subject,
                auth_method: AuthMethod::Jwt,
                role: p.role,
                explicit_permissions: p.permissions,
            },
            Self::ApiKey(p) => Principal {
                tenant_id: p.tenant_id,
                subject_id: p.subject_id,
                auth_method: AuthMethod::ApiKey,
                role: None,
                explicit_permissions: Some(p.permissions),
            },
            Self::OAuth(p) => Principal {
                tenant_id: p.tenant_id,
                subject_id: p.subject,
                auth_method: AuthMethod::OAuth,
                role: None,
                explicit_permissions: Some(p.permissions),
            },
        }
    }
}

/// Library-facing auth configuration. Built from env by `Config`, or
/// directly by embedders and tests.
#[derive(Debug, Clone, Default)]
pub struct AuthConfig {
    pub required: bool,
    /// Pin a single method; `None` means "any configured method".
    pub method: Option<AuthMethod>,
    pub jwt: Option<JwtSettings>,
    pub api_key: Option<ApiKeySettings>,
    pub oauth: Option<OAuthSettings>,
}

#[derive(Debug, Error)]
pub enum AuthConfigError {
    #[error("authentication is required but no method is configured")]
    NoMethodConfigured,
    #[error("method {0} is pinned but not configured")]
    MethodNotConfigured(AuthMethod),
    #[error("{0} is configured but its backing capability was not provided")]
    MissingCapability(&'static str),
    #[error("jwt: {0}")]
    Jwt(#[from] jwt::JwtConfigError),
}

impl AuthConfig {
    pub fn configured_methods(&self) -> Vec<AuthMethod> {
        let mut out = Vec::new();
        if self.jwt.is_some() {
            out.push(AuthMethod::Jwt);
        }
        if self.api_key.is_some() {
            out.push(AuthMethod::ApiKey);
        }
        if self.oauth.is_some() {
            out.push(AuthMethod::OAuth);
        }
        out
    }

    pub fn validate(&self) -> Result<(), AuthConfigError> {
        let methods = self.configured_methods();
        if let Some(method) = self.method.filter(|m| !methods.contains(m)) {
            return Err(AuthConfigError::MethodNotConfigured(method));
        }
        if self.required && methods.is_empty() {
            return Err(AuthConfigError::NoMethodConfigured);
        }
        Ok(())
    }
}

/// Capabilities the strategies need at runtime.
#[derive(Clone)]
pub struct ResolverDeps {
    pub api_keys: Option<Arc<dyn ApiKeyStore>>,
    pub oauth_verifier: Option<Arc<dyn OAuthVerifier>>,
    pub clock: Arc<dyn Clock>,
}

#[derive(Debug)]
pub struct CredentialResolver {
    method: Option<AuthMethod>,
    jwt: Option<JwtVerifier>,
    api_key: Option<ApiKeyVerifier>,
    oauth: Option<OAuthResolver>,
}

impl CredentialResolver {
    pub fn new(config: &AuthConfig, deps: ResolverDeps) -> Result<Self, AuthConfigError> {
        config.validate()?;

        let jwt = config.jwt.as_ref().map(JwtVerifier::new).transpose()?;

        let api_key = match &config.api_key {
            Some(settings) => {
                let store = deps
                    .api_keys
                    .ok_or(AuthConfigError::MissingCapability("api key store"))?;
                Some(ApiKeyVerifier::new(settings, store, deps.clock.clone()))
            }
            None => None,
        };

        let oauth = match &config.oauth {
            Some(settings) => {
                let verifier = deps
                    .oauth_verifier
                    .ok_or(AuthConfigError::MissingCapability("oauth verifier"))?;
                Some(OAuthResolver::new(settings, verifier, deps.clock.clone()))
            }
            None => None,
        };

        Ok(Self {
            method: config.method,
            jwt,
            api_key,
            oauth,
        })
    }

    /// Pick the single credential to verify, if any.
    pub fn select<'a>(&self, creds: &'a RawCredentials) -> Option<PresentedCredential<'a>> {
        let bearer = non_blank(&creds.bearer);
        let api_header = non_blank(&creds.api_key);
        let oauth_header = non_blank(&creds.oauth_token);

        let bearer_is_key = bearer
            .zip(self.api_key.as_ref())
            .is_some_and(|(b, v)| v.looks_like_key(b));

        let jwt = || {
            self.jwt.as_ref()?;
            let b = bearer?;
            let pinned = self.method == Some(AuthMethod::Jwt);
            let shaped = self.oauth.is_none() || looks_like_compact_jws(b);
            (pinned || (!bearer_is_key && shaped)).then_some(PresentedCredential::Jwt(b))
        };
        let api_key = || {
            self.api_key.as_ref()?;
            let pinned = self.method == Some(AuthMethod::ApiKey);
            api_header
                .or(bearer.filter(|_| pinned || bearer_is_key))
                .map(PresentedCredential::ApiKey)
        };
        let oauth = || {
            self.oauth.as_ref()?;
            let pinned = self.method == Some(AuthMethod::OAuth);
            oauth_header
                .or(bearer.filter(|_| pinned || !bearer_is_key))
                .map(PresentedCredential::OAuth)
        };

        match self.method {
            Some(AuthMethod::Jwt) => jwt(),
            Some(AuthMethod::ApiKey) => api_key(),
            Some(AuthMethod::OAuth) => oauth(),
            None => jwt().or_else(api_key).or_else(oauth),
        }
    }

    /// `Ok(None)` means no usable credential was presented.
    pub async fn resolve(
        &self,
        creds: &RawCredentials,
    ) -> Result<Option<ResolvedPrincipal>, AuthError> {
        let Some(presented) = self.select(creds) else {
            if !creds.is_empty() {
                tracing::debug!("credentials presented only for unconfigured methods");
            }
            return Ok(None);
        };

        let method = presented.method();
        let resolved = self.verify(presented).await.inspect_err(|e| {
            tracing::warn!(%method, reason = e.reason_code(), "credential rejected");
        })?;
        Ok(Some(resolved))
    }

    async fn verify(&self, presented: PresentedCredential<'_>) -> Result<ResolvedPrincipal, AuthError> {
        // select() only yields methods whose verifier exists
        let unconfigured = || AuthError::from(CredentialError::MissingToken);
        match presented {
            PresentedCredential::Jwt(token) => {
                let jwt = self.jwt.as_ref().ok_or_else(unconfigured)?;
                Ok(ResolvedPrincipal::Jwt(jwt.resolve(token)?))
            }
            PresentedCredential::ApiKey(key) => {
                let verifier = self.api_key.as_ref().ok_or_else(unconfigured)?;
                Ok(ResolvedPrincipal::ApiKey(verifier.validate(key).await?))
            }
            PresentedCredential::OAuth(token) => {
                let oauth = self.oauth.as_ref().ok_or_else(unconfigured)?;
                Ok(ResolvedPrincipal::OAuth(oauth.resolve(token).await?))
            }
        }
    }
}

/// `header.payload.signature`, all segments non-empty.
fn looks_like_compact_jws(token: &str) -> bool {
    let mut parts = token.split('.');
    let shaped = parts.by_ref().take(3).filter(|p| !p.is_empty()).count() == 3;
    shaped && parts.next().is_none()
}
