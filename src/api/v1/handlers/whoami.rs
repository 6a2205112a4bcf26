/*
 * Responsibility
 * - GET /whoami: the resolved principal and its effective permissions
 * - GET /tenant: tenant of the caller (401 when unauthenticated)
 */
use axum::Json;

use crate::api::v1::dto::access::{PrincipalView, TenantResponse, WhoAmIResponse};
use crate::api::v1::extractors::{MaybeAuthenticated, TenantId};

pub async fn whoami(MaybeAuthenticated(ctx): MaybeAuthenticated) -> Json<WhoAmIResponse> {
    Json(WhoAmIResponse {
        authenticated: ctx.is_some(),
        principal: ctx.as_deref().map(PrincipalView::from),
    })
}

pub async fn tenant(TenantId(tenant_id): TenantId) -> Json<TenantResponse> {
    Json(TenantResponse { tenant_id })
}
