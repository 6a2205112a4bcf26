/*
 * Responsibility
 * - Request/response DTOs of the auth demo endpoints
 * - Only tenant-relative paths go out; absolute storage paths stay internal
 */
use serde::{Deserialize, Serialize};

use crate::services::authz::context::{AuthContext, AuthMethod};
use crate::services::authz::permission::{PermissionSet, PermissionType};
use crate::services::authz::roles::Role;

#[derive(Debug, Serialize)]
pub struct WhoAmIResponse {
    pub authenticated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub principal: Option<PrincipalView>,
}

#[derive(Debug, Serialize)]
pub struct PrincipalView {
    pub tenant_id: String,
    pub subject_id: String,
    pub auth_method: AuthMethod,
    pub role: Option<Role>,
    pub permissions: PermissionSet,
}

impl From<&AuthContext> for PrincipalView {
    fn from(ctx: &AuthContext) -> Self {
        let principal = ctx.principal();
        Self {
            tenant_id: principal.tenant_id.clone(),
            subject_id: principal.subject_id.clone(),
            auth_method: principal.auth_method,
            role: principal.role,
            permissions: ctx.effective_permissions().clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TenantResponse {
    pub tenant_id: String,
}

#[derive(Debug, Serialize)]
pub struct AccessResponse {
    pub operation: PermissionType,
    /// Tenant-relative path the decision was made on.
    pub path: String,
    pub allowed: bool,
}

#[derive(Debug, Deserialize)]
pub struct ToolCheckRequest {
    pub path: String,
}

impl ToolCheckRequest {
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.path.trim().is_empty() {
            return Err("path is required");
        }
        Ok(())
    }
}

#[derive(Debug, Serialize)]
pub struct ToolCheckResponse {
    pub tool: String,
    #[serde(flatten)]
    pub access: AccessResponse,
}
