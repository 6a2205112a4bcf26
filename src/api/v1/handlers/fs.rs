/*
 * Responsibility
 * - GET | PUT | DELETE /fs/{*path}: authorize the operation on a tenant path
 * - No storage behind it; the response says what would be accessed
 */
use axum::{
    Json,
    extract::{Path, State},
};

use crate::api::v1::dto::access::AccessResponse;
use crate::api::v1::extractors::Authenticated;
use crate::error::AppError;
use crate::services::authz::permission::PermissionType;
use crate::state::AppState;

fn authorize(
    state: &AppState,
    auth: &Authenticated,
    path: &str,
    operation: PermissionType,
) -> Result<Json<AccessResponse>, AppError> {
    let authorized = state.authorizer.authorize_path(auth, path, operation)?;

    // Re-check right before the (would-be) filesystem call.
    state.authorizer.guard_access(auth, &authorized.absolute)?;

    tracing::debug!(
        tenant_id = auth.tenant_id(),
        op = %operation,
        path = %authorized.relative,
        "access granted"
    );
    Ok(Json(AccessResponse {
        operation,
        path: authorized.relative,
        allowed: true,
    }))
}

pub async fn read_root(
    State(state): State<AppState>,
    auth: Authenticated,
) -> Result<Json<AccessResponse>, AppError> {
    authorize(&state, &auth, "/", PermissionType::Read)
}

pub async fn read(
    State(state): State<AppState>,
    auth: Authenticated,
    Path(path): Path<String>,
) -> Result<Json<AccessResponse>, AppError> {
    authorize(&state, &auth, &path, PermissionType::Read)
}

pub async fn write(
    State(state): State<AppState>,
    auth: Authenticated,
    Path(path): Path<String>,
) -> Result<Json<AccessResponse>, AppError> {
    authorize(&state, &auth, &path, PermissionType::Write)
}

pub async fn delete(
    State(state): State<AppState>,
    auth: Authenticated,
    Path(path): Path<String>,
) -> Result<Json<AccessResponse>, AppError> {
    authorize(&state, &auth, &path, PermissionType::Delete)
}
