use std::str::FromStr;

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::services::authz::error::CredentialError;
use crate::services::authz::permission::PermissionSet;
use crate::services::authz::roles::Role;

pub const DEFAULT_TENANT_CLAIM: &str = "tenant_id";
pub const DEFAULT_ROLE_CLAIM: &str = "role";
pub const PERMISSIONS_CLAIM: &str = "permissions";

/// Verification key material.
#[derive(Clone)]
pub enum JwtKey {
    /// Shared secret for HS256/384/512.
    Secret(String),
    /// PEM public key for RS*/PS*/ES*/EdDSA.
    PublicKeyPem(String),
}

/// JWT verification settings.
#[derive(Clone)]
pub struct JwtSettings {
    pub algorithm: Algorithm,
    pub key: JwtKey,
    pub issuer: Option<String>,
    pub audience: Option<String>,
    pub leeway_seconds: u64,
    pub tenant_claim: String,
    pub role_claim: String,
}

impl std::fmt::Debug for JwtSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Do not print key material
        f.debug_struct("JwtSettings")
            .field("algorithm", &self.algorithm)
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .field("leeway_seconds", &self.leeway_seconds)
            .field("tenant_claim", &self.tenant_claim)
            .field("role_claim", &self.role_claim)
            .finish()
    }
}

impl JwtSettings {
    pub fn new(algorithm: Algorithm, key: JwtKey) -> Self {
        Self {
            algorithm,
            key,
            issuer: None,
            audience: None,
            leeway_seconds: 60,
            tenant_claim: DEFAULT_TENANT_CLAIM.to_string(),
            role_claim: DEFAULT_ROLE_CLAIM.to_string(),
        }
    }

    pub fn hs256(secret: impl Into<String>) -> Self {
        Self::new(Algorithm::HS256, JwtKey::Secret(secret.into()))
    }

    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = Some(issuer.into());
        self
    }

    pub fn with_audience(mut self, audience: impl Into<String>) -> Self {
        self.audience = Some(audience.into());
        self
    }
}

pub fn parse_algorithm(name: &str) -> Option<Algorithm> {
    Algorithm::from_str(name.trim()).ok()
}

#[derive(Debug, thiserror::Error)]
pub enum JwtConfigError {
    #[error("algorithm {0:?} needs a shared secret")]
    SecretRequired(Algorithm),
    #[error("algorithm {0:?} needs a PEM public key")]
    PublicKeyRequired(Algorithm),
    #[error("invalid key: {0}")]
    InvalidKey(#[from] jsonwebtoken::errors::Error),
}

/// Raw claims. `aud` and custom claims land in `extra`.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenClaims {
    #[serde(default)]
    pub sub: Option<String>,
    pub exp: u64,
    #[serde(default)]
    pub iss: Option<String>,
    #[serde(default)]
    pub jti: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// What the JWT strategy hands to the unifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JwtPrincipal {
    pub subject: String,
    pub tenant_id: String,
    pub role: Option<Role>,
    pub permissions: Option<PermissionSet>,
    pub token_id: Option<String>,
}

#[derive(Clone)]
pub struct JwtVerifier {
    decoding_key: DecodingKey,
    validation: Validation,
    tenant_claim: String,
    role_claim: String,
}

impl std::fmt::Debug for JwtVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Do not print key material
        f.debug_struct("JwtVerifier")
            .field("validation", &self.validation)
            .finish()
    }
}

impl JwtVerifier {
    pub fn new(settings: &JwtSettings) -> Result<Self, JwtConfigError> {
        let decoding_key = decoding_key(settings.algorithm, &settings.key)?;

        let mut validation = Validation::new(settings.algorithm);
        validation.leeway = settings.leeway_seconds;
        if let Some(issuer) = &settings.issuer {
            validation.set_issuer(&[issuer]);
        }
        match &settings.audience {
            Some(audience) => validation.set_audience(&[audience]),
            None => validation.validate_aud = false,
        }

        Ok(Self {
            decoding_key,
            validation,
            tenant_claim: settings.tenant_claim.clone(),
            role_claim: settings.role_claim.clone(),
        })
    }

    /// Signature, `exp`/`nbf`, `iss` and `aud` checks.
    pub fn verify(&self, token: &str) -> Result<TokenClaims, CredentialError> {
        if token.trim().is_empty() {
            return Err(CredentialError::MissingToken);
        }
        jsonwebtoken::decode::<TokenClaims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| map_jwt_error(&e))
    }

    /// Verify, then map claims to a principal.
    pub fn resolve(&self, token: &str) -> Result<JwtPrincipal, CredentialError> {
        let claims = self.verify(token)?;

        let subject = claims
            .sub
            .filter(|s| !s.trim().is_empty())
            .ok_or(CredentialError::MissingSubject)?;

        let tenant_id = claims
            .extra
            .get(&self.tenant_claim)
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
            .map(str::to_owned)
            .ok_or(CredentialError::MissingTenant)?;

        let role = match claims.extra.get(&self.role_claim).and_then(Value::as_str) {
            Some(name) => {
                let role = Role::parse(name);
                if role.is_none() {
                    tracing::debug!(role = name, "unknown role claim, no permissions granted");
                }
                role
            }
            None => None,
        };

        let permissions = match claims.extra.get(PERMISSIONS_CLAIM) {
            Some(value) => Some(
                serde_json::from_value::<PermissionSet>(value.clone())
                    .map_err(|_| CredentialError::MalformedToken)?,
            ),
            None => None,
        };

        Ok(JwtPrincipal {
            subject,
            tenant_id,
            role,
            permissions,
            token_id: claims.jti,
        })
    }
}

fn decoding_key(algorithm: Algorithm, key: &JwtKey) -> Result<DecodingKey, JwtConfigError> {
    use Algorithm::*;

    match (algorithm, key) {
        (HS256 | HS384 | HS512, JwtKey::Secret(secret)) => {
            Ok(DecodingKey::from_secret(secret.as_bytes()))
        }
        (HS256 | HS384 | HS512, JwtKey::PublicKeyPem(_)) => {
            Err(JwtConfigError::SecretRequired(algorithm))
        }
        (_, JwtKey::Secret(_)) => Err(JwtConfigError::PublicKeyRequired(algorithm)),
        (RS256 | RS384 | RS512 | PS256 | PS384 | PS512, JwtKey::PublicKeyPem(pem)) => {
            Ok(DecodingKey::from_rsa_pem(pem.as_bytes())?)
        }
        (ES256 | ES384, JwtKey::PublicKeyPem(pem)) => Ok(DecodingKey::from_ec_pem(pem.as_bytes())?),
        (EdDSA, JwtKey::PublicKeyPem(pem)) => Ok(DecodingKey::from_ed_pem(pem.as_bytes())?),
    }
}

fn map_jwt_error(err: &jsonwebtoken::errors::Error) -> CredentialError {
    match err.kind() {
        ErrorKind::ExpiredSignature => CredentialError::TokenExpired,
        ErrorKind::ImmatureSignature => CredentialError::TokenNotYetValid,
        ErrorKind::InvalidSignature => CredentialError::SignatureMismatch,
        ErrorKind::InvalidIssuer => CredentialError::IssuerMismatch,
        ErrorKind::InvalidAudience => CredentialError::AudienceMismatch,
        ErrorKind::MissingRequiredClaim(claim) => match claim.as_str() {
            "iss" => CredentialError::IssuerMismatch,
            "aud" => CredentialError::AudienceMismatch,
            "sub" => CredentialError::MissingSubject,
            _ => CredentialError::MalformedToken,
        },
        _ => CredentialError::MalformedToken,
    }
}
