/*
 * Responsibility
 * - OAuthVerifier backed by an RFC 7662 token introspection endpoint
 * - Response parsing is a pure function so it can be tested without HTTP
 */
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use url::Url;

use crate::services::credentials::oauth::{
    OAuthClaims, OAuthVerification, OAuthVerifier, VerifierError,
};

#[derive(Clone)]
pub struct IntrospectionSettings {
    pub endpoint: String,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    /// Claim in the introspection response that carries the tenant.
    pub tenant_claim: String,
    pub timeout: Duration,
}

impl std::fmt::Debug for IntrospectionSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Do not print the client secret
        f.debug_struct("IntrospectionSettings")
            .field("endpoint", &self.endpoint)
            .field("client_id", &self.client_id)
            .field("tenant_claim", &self.tenant_claim)
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[derive(Clone)]
pub struct HttpIntrospectionVerifier {
    client: reqwest::Client,
    endpoint: Url,
    client_id: Option<String>,
    client_secret: Option<String>,
    tenant_claim: String,
}

impl std::fmt::Debug for HttpIntrospectionVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpIntrospectionVerifier")
            .field("endpoint", &self.endpoint.as_str())
            .field("client_id", &self.client_id)
            .finish()
    }
}

impl HttpIntrospectionVerifier {
    pub fn new(settings: &IntrospectionSettings) -> Result<Self, VerifierError> {
        let endpoint = Url::parse(&settings.endpoint)
            .map_err(|e| VerifierError::InvalidResponse(format!("bad introspection url: {e}")))?;
        let client = reqwest::Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|e| VerifierError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            endpoint,
            client_id: settings.client_id.clone(),
            client_secret: settings.client_secret.clone(),
            tenant_claim: settings.tenant_claim.clone(),
        })
    }
}

#[async_trait]
impl OAuthVerifier for HttpIntrospectionVerifier {
    async fn verify(&self, token: &str) -> Result<OAuthVerification, VerifierError> {
        let mut request = self
            .client
            .post(self.endpoint.clone())
            .form(&[("token", token), ("token_type_hint", "access_token")]);
        if let Some(client_id) = &self.client_id {
            request = request.basic_auth(client_id, self.client_secret.as_deref());
        }

        let response = request
            .send()
            .await
            .map_err(|e| VerifierError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(VerifierError::Transport(format!(
                "introspection endpoint returned {status}"
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| VerifierError::InvalidResponse(e.to_string()))?;

        parse_introspection(&body, &self.tenant_claim)
    }
}

/// Map an introspection response body to a verification result.
///
/// `active` is mandatory. `scope` is a space-separated list; `exp` is
/// seconds since the epoch.
pub fn parse_introspection(
    body: &Value,
    tenant_claim: &str,
) -> Result<OAuthVerification, VerifierError> {
    let obj = body
        .as_object()
        .ok_or_else(|| VerifierError::InvalidResponse("body is not an object".into()))?;

    let active = obj
        .get("active")
        .and_then(Value::as_bool)
        .ok_or_else(|| VerifierError::InvalidResponse("missing 'active'".into()))?;
    if !active {
        return Ok(OAuthVerification::inactive());
    }

    let text = |name: &str| obj.get(name).and_then(Value::as_str).map(str::to_owned);

    let expires_at = match obj.get("exp") {
        None | Some(Value::Null) => None,
        Some(v) => {
            let secs = v
                .as_i64()
                .ok_or_else(|| VerifierError::InvalidResponse("'exp' is not an integer".into()))?;
            Some(
                DateTime::<Utc>::from_timestamp(secs, 0)
                    .ok_or_else(|| VerifierError::InvalidResponse("'exp' out of range".into()))?,
            )
        }
    };

    let scopes = obj
        .get("scope")
        .and_then(Value::as_str)
        .map(|s| s.split_whitespace().map(str::to_owned).collect())
        .unwrap_or_default();

    Ok(OAuthVerification {
        valid: true,
        claims: OAuthClaims {
            subject: text("sub"),
            tenant_id: text(tenant_claim),
            client_id: text("client_id"),
            expires_at,
        },
        scopes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_active_response() {
        let body = json!({
            "active": true,
            "sub": "user-1",
            "client_id": "cli",
            "tenant_id": "t1",
            "scope": "read:files  write:files",
            "exp": 1_900_000_000,
        });
        let v = parse_introspection(&body, "tenant_id").unwrap();
        assert!(v.valid);
        assert_eq!(v.claims.subject.as_deref(), Some("user-1"));
        assert_eq!(v.claims.tenant_id.as_deref(), Some("t1"));
        assert_eq!(v.scopes, vec!["read:files", "write:files"]);
        assert_eq!(v.claims.expires_at.map(|t| t.timestamp()), Some(1_900_000_000));
    }

    #[test]
    fn test_inactive_response_drops_claims() {
        let body = json!({ "active": false, "sub": "user-1" });
        assert_eq!(
            parse_introspection(&body, "tenant_id").unwrap(),
            OAuthVerification::inactive()
        );
    }

    #[test]
    fn test_invalid_responses() {
        assert!(parse_introspection(&json!({}), "tenant_id").is_err());
        assert!(parse_introspection(&json!([true]), "tenant_id").is_err());
        assert!(parse_introspection(&json!({"active": true, "exp": "soon"}), "tenant_id").is_err());
    }

    #[test]
    fn test_custom_tenant_claim() {
        let body = json!({ "active": true, "org": "acme" });
        let v = parse_introspection(&body, "org").unwrap();
        assert_eq!(v.claims.tenant_id.as_deref(), Some("acme"));
        assert!(v.scopes.is_empty());
    }

    #[test]
    fn test_bad_endpoint_url() {
        let settings = IntrospectionSettings {
            endpoint: "not a url".into(),
            client_id: None,
            client_secret: None,
            tenant_claim: "tenant_id".into(),
            timeout: Duration::from_secs(1),
        };
        assert!(HttpIntrospectionVerifier::new(&settings).is_err());
    }
}
