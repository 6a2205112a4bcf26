/*
 * Responsibility
 * - Application-wide AppError
 * - IntoResponse (HTTP status / JSON error body)
 * - Map AuthError to a generic client-facing error; details go to the logs only
 */
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::services::authz::error::{AuthError, AuthErrorCode};

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{code}: {message}")]
    BadRequest { code: &'static str, message: String },
    #[error("unauthorized")]
    Unauthorized,
    #[error("forbidden")]
    Forbidden,
    #[error("service unavailable")]
    Unavailable,
}

impl AppError {
    pub fn bad_request(code: &'static str, message: impl Into<String>) -> Self {
        Self::BadRequest {
            code,
            message: message.into(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            AppError::BadRequest { code, message } => (StatusCode::BAD_REQUEST, code, message),
            AppError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "UNAUTHORIZED",
                "unauthorized".into(),
            ),
            AppError::Forbidden => (StatusCode::FORBIDDEN, "FORBIDDEN", "forbidden".into()),
            AppError::Unavailable => (
                StatusCode::SERVICE_UNAVAILABLE,
                "SERVICE_UNAVAILABLE",
                "service unavailable".into(),
            ),
        };

        let body = ErrorResponse {
            error: ErrorBody { code, message },
        };

        (status, Json(body)).into_response()
    }
}

impl From<AuthError> for AppError {
    fn from(e: AuthError) -> Self {
        match e.code() {
            AuthErrorCode::Unauthenticated | AuthErrorCode::InvalidCredential => {
                AppError::Unauthorized
            }
            AuthErrorCode::PermissionDenied
            | AuthErrorCode::PathEscape
            | AuthErrorCode::TenantInactive => AppError::Forbidden,
            AuthErrorCode::UpstreamUnavailable => AppError::Unavailable,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::authz::error::CredentialError;
    use crate::services::authz::permission::DenyReason;

    #[test]
    fn test_auth_error_status_mapping() {
        let cases = [
            (AuthError::Unauthenticated, StatusCode::UNAUTHORIZED),
            (CredentialError::TokenExpired.into(), StatusCode::UNAUTHORIZED),
            (
                AuthError::PermissionDenied(DenyReason::NoMatchingScope),
                StatusCode::FORBIDDEN,
            ),
            (AuthError::path_escape("../x"), StatusCode::FORBIDDEN),
            (AuthError::upstream("store down"), StatusCode::SERVICE_UNAVAILABLE),
        ];
        for (err, status) in cases {
            assert_eq!(AppError::from(err).into_response().status(), status);
        }
    }
}
