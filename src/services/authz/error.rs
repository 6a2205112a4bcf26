//! Error taxonomy of the authorization core.
//!
//! `AuthError` is what crosses module boundaries. Each variant maps to one
//! coarse `AuthErrorCode`; the finer `reason_code()` is for the service's own
//! logs and never reaches untrusted callers.

use std::fmt;

use thiserror::Error;

use crate::services::authz::context::TenantStatus;
use crate::services::authz::permission::DenyReason;

/// Coarse error class surfaced to the boundary layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthErrorCode {
    Unauthenticated,
    InvalidCredential,
    PermissionDenied,
    PathEscape,
    TenantInactive,
    UpstreamUnavailable,
}

impl AuthErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unauthenticated => "UNAUTHENTICATED",
            Self::InvalidCredential => "INVALID_CREDENTIAL",
            Self::PermissionDenied => "PERMISSION_DENIED",
            Self::PathEscape => "PATH_ESCAPE",
            Self::TenantInactive => "TENANT_INACTIVE",
            Self::UpstreamUnavailable => "UPSTREAM_UNAVAILABLE",
        }
    }
}

impl fmt::Display for AuthErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a presented credential was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CredentialError {
    #[error("missing token")]
    MissingToken,
    #[error("malformed token")]
    MalformedToken,
    #[error("token expired")]
    TokenExpired,
    #[error("token not yet valid")]
    TokenNotYetValid,
    #[error("signature mismatch")]
    SignatureMismatch,
    #[error("issuer mismatch")]
    IssuerMismatch,
    #[error("audience mismatch")]
    AudienceMismatch,
    #[error("missing or empty subject")]
    MissingSubject,
    #[error("missing or empty tenant")]
    MissingTenant,
    #[error("malformed api key")]
    MalformedApiKey,
    #[error("unknown api key")]
    UnknownApiKey,
    #[error("api key secret mismatch")]
    ApiKeyMismatch,
    #[error("api key expired")]
    ApiKeyExpired,
    #[error("api key revoked")]
    ApiKeyRevoked,
    #[error("api key has no permissions")]
    ApiKeyHasNoPermissions,
    #[error("oauth token inactive")]
    OAuthTokenInactive,
}

impl CredentialError {
    pub fn reason_code(&self) -> &'static str {
        match self {
            Self::MissingToken => "MISSING_TOKEN",
            Self::MalformedToken => "MALFORMED_TOKEN",
            Self::TokenExpired => "TOKEN_EXPIRED",
            Self::TokenNotYetValid => "TOKEN_NOT_YET_VALID",
            Self::SignatureMismatch => "SIGNATURE_MISMATCH",
            Self::IssuerMismatch => "ISSUER_MISMATCH",
            Self::AudienceMismatch => "AUDIENCE_MISMATCH",
            Self::MissingSubject => "MISSING_SUBJECT",
            Self::MissingTenant => "MISSING_TENANT",
            Self::MalformedApiKey => "MALFORMED_API_KEY",
            Self::UnknownApiKey => "UNKNOWN_API_KEY",
            Self::ApiKeyMismatch => "API_KEY_MISMATCH",
            Self::ApiKeyExpired => "API_KEY_EXPIRED",
            Self::ApiKeyRevoked => "API_KEY_REVOKED",
            Self::ApiKeyHasNoPermissions => "API_KEY_NO_PERMISSIONS",
            Self::OAuthTokenInactive => "OAUTH_TOKEN_INACTIVE",
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum AuthError {
    #[error("authentication required")]
    Unauthenticated,

    #[error("invalid credential: {0}")]
    InvalidCredential(#[from] CredentialError),

    #[error("permission denied: {0}")]
    PermissionDenied(DenyReason),

    #[error("path escapes tenant namespace: {0}")]
    PathEscape(String),

    #[error("tenant {tenant_id} is {status}")]
    TenantInactive {
        tenant_id: String,
        status: TenantStatus,
    },

    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),
}

impl AuthError {
    pub fn path_escape(detail: impl Into<String>) -> Self {
        Self::PathEscape(detail.into())
    }

    pub fn upstream(detail: impl fmt::Display) -> Self {
        Self::UpstreamUnavailable(detail.to_string())
    }

    pub fn code(&self) -> AuthErrorCode {
        match self {
            Self::Unauthenticated => AuthErrorCode::Unauthenticated,
            Self::InvalidCredential(_) => AuthErrorCode::InvalidCredential,
            Self::PermissionDenied(_) => AuthErrorCode::PermissionDenied,
            Self::PathEscape(_) => AuthErrorCode::PathEscape,
            Self::TenantInactive { .. } => AuthErrorCode::TenantInactive,
            Self::UpstreamUnavailable(_) => AuthErrorCode::UpstreamUnavailable,
        }
    }

    /// Fine-grained reason for diagnostics.
    pub fn reason_code(&self) -> &'static str {
        match self {
            Self::InvalidCredential(e) => e.reason_code(),
            Self::PermissionDenied(reason) => reason.as_str(),
            other => other.code().as_str(),
        }
    }

    /// Only upstream failures may be retried by the calling layer.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::UpstreamUnavailable(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes() {
        let err = AuthError::from(CredentialError::TokenExpired);
        assert_eq!(err.code(), AuthErrorCode::InvalidCredential);
        assert_eq!(err.reason_code(), "TOKEN_EXPIRED");
        assert!(!err.is_retryable());

        let err = AuthError::upstream("store down");
        assert_eq!(err.code(), AuthErrorCode::UpstreamUnavailable);
        assert!(err.is_retryable());

        let err = AuthError::PermissionDenied(DenyReason::NoMatchingScope);
        assert_eq!(err.reason_code(), "NO_MATCHING_SCOPE");
    }
}
