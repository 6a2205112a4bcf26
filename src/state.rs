/*
 * Responsibility
 * - Shared context bound to the Router (AppState)
 *   - authorizer, credential header names, auth timeout
 * - Cheap to Clone (Arc inside)
 */
use std::sync::Arc;
use std::time::Duration;

use axum::http::HeaderName;

use crate::services::authz::Authorizer;

/// Where the middleware looks for each credential kind.
#[derive(Clone, Debug)]
pub struct CredentialHeaders {
    pub api_key: HeaderName,
    pub oauth_token: HeaderName,
}

impl Default for CredentialHeaders {
    fn default() -> Self {
        Self {
            api_key: HeaderName::from_static("x-api-key"),
            oauth_token: HeaderName::from_static("x-oauth-token"),
        }
    }
}

#[derive(Clone, Debug)]
pub struct AppState {
    pub authorizer: Arc<Authorizer>,
    pub headers: CredentialHeaders,
    pub auth_timeout: Duration,
}

impl AppState {
    pub fn new(authorizer: Arc<Authorizer>, headers: CredentialHeaders, auth_timeout: Duration) -> Self {
        Self {
            authorizer,
            headers,
            auth_timeout,
        }
    }
}
