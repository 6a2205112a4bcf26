use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::error::AppError;
use crate::services::authz::context::RequestAuth;
use crate::services::authz::error::AuthError;

use super::types::{Authenticated, MaybeAuthenticated, TenantId};

/// RequestAuth published by the access middleware.
/// Missing means the middleware is not wired on this route; that is a 401,
/// never an implicit anonymous request.
fn request_auth(parts: &Parts) -> Result<&RequestAuth, AppError> {
    parts.extensions.get::<RequestAuth>().ok_or_else(|| {
        tracing::error!(uri = %parts.uri, "no RequestAuth in extensions, is the auth middleware applied?");
        AppError::from(AuthError::Unauthenticated)
    })
}

impl<S> FromRequestParts<S> for Authenticated
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let ctx = request_auth(parts)?.require_context()?;
        Ok(Authenticated(ctx.clone()))
    }
}

impl<S> FromRequestParts<S> for MaybeAuthenticated
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let auth = request_auth(parts)?;
        Ok(MaybeAuthenticated(auth.context().cloned()))
    }
}

impl<S> FromRequestParts<S> for TenantId
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let tenant_id = request_auth(parts)?.require_tenant_id()?;
        Ok(TenantId(tenant_id.to_string()))
    }
}
