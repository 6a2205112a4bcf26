//! Read credentials → Authorizer::authenticate → RequestAuth into extensions
//!
//! - `Authorization: Bearer <token>` (JWT, opaque OAuth token or API key)
//! - API key header (default `x-api-key`)
//! - OAuth token header (default `x-oauth-token`)
//!
//! Authentication runs under `AppState::auth_timeout`. On any failure the
//! request is answered here and nothing is published for handlers.

use axum::{
    Router,
    body::Body,
    extract::State,
    http::{HeaderMap, HeaderName, Request, header},
    middleware::{self, Next},
    response::Response,
};

use crate::error::AppError;
use crate::services::authz::error::{AuthError, CredentialError};
use crate::services::credentials::RawCredentials;
use crate::state::{AppState, CredentialHeaders};

/// Apply authentication to every route of `router`.
///
/// ```ignore
/// let protected = Router::new().route("/whoami", get(whoami));
/// let v1 = Router::new()
///     .route("/health", get(health))
///     .merge(middleware::auth::access::apply(protected, state.clone()));
/// ```
pub fn apply(router: Router<AppState>, state: AppState) -> Router<AppState> {
    // axum 0.8 from_fn cannot take a State extractor, so pass state explicitly.
    // route_layer: unmatched paths stay 404 instead of 401.
    router.route_layer(middleware::from_fn_with_state(state, access_middleware))
}

async fn access_middleware(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let creds = read_credentials(req.headers(), &state.headers).map_err(|err| {
        tracing::warn!(reason = err.reason_code(), "unreadable credential header");
        AppError::from(err)
    })?;

    let authenticated =
        tokio::time::timeout(state.auth_timeout, state.authorizer.authenticate(&creds)).await;

    let auth = match authenticated {
        Ok(Ok(auth)) => auth,
        Ok(Err(err)) => {
            tracing::warn!(
                code = %err.code(),
                reason = err.reason_code(),
                retryable = err.is_retryable(),
                "authentication failed"
            );
            return Err(err.into());
        }
        Err(_) => {
            tracing::warn!(
                timeout_ms = state.auth_timeout.as_millis() as u64,
                "authentication timed out"
            );
            return Err(AuthError::upstream("authentication timed out").into());
        }
    };

    // middleware → extractor
    req.extensions_mut().insert(auth);

    Ok(next.run(req).await)
}

/// Collect raw credentials from the request headers.
///
/// A present but unusable `Authorization` header (wrong scheme, not UTF-8) is
/// a malformed credential, not a missing one.
pub fn read_credentials(
    headers: &HeaderMap,
    names: &CredentialHeaders,
) -> Result<RawCredentials, AuthError> {
    let bearer = match headers.get(header::AUTHORIZATION) {
        None => None,
        Some(value) => {
            let value = value
                .to_str()
                .map_err(|_| CredentialError::MalformedToken)?;
            let (scheme, token) = value
                .trim()
                .split_once(' ')
                .ok_or(CredentialError::MalformedToken)?;
            if !scheme.eq_ignore_ascii_case("bearer") {
                return Err(CredentialError::MalformedToken.into());
            }
            Some(token.trim().to_string())
        }
    };

    Ok(RawCredentials {
        bearer,
        api_key: header_value(headers, &names.api_key)?,
        oauth_token: header_value(headers, &names.oauth_token)?,
    })
}

fn header_value(headers: &HeaderMap, name: &HeaderName) -> Result<Option<String>, AuthError> {
    headers
        .get(name)
        .map(|v| {
            v.to_str()
                .map(|s| s.trim().to_string())
                .map_err(|_| AuthError::from(CredentialError::MalformedToken))
        })
        .transpose()
}
