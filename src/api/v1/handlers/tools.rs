/*
 * Responsibility
 * - POST /tools/{tool}/check: may the caller run this tool on this path
 */
use axum::{
    Json,
    extract::{Path, State},
};

use crate::api::v1::dto::access::{AccessResponse, ToolCheckRequest, ToolCheckResponse};
use crate::api::v1::extractors::Authenticated;
use crate::error::AppError;
use crate::state::AppState;

pub async fn check_tool(
    State(state): State<AppState>,
    auth: Authenticated,
    Path(tool): Path<String>,
    Json(req): Json<ToolCheckRequest>,
) -> Result<Json<ToolCheckResponse>, AppError> {
    req.validate()
        .map_err(|msg| AppError::bad_request("INVALID_REQUEST", msg))?;

    let (operation, authorized) = state.authorizer.authorize_tool(&auth, &tool, &req.path)?;

    Ok(Json(ToolCheckResponse {
        tool,
        access: AccessResponse {
            operation,
            path: authorized.relative,
            allowed: true,
        },
    }))
}
