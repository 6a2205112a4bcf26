/*
 * Responsibility
 * - Authorization core: patterns, roles, permission evaluation, tenant paths
 * - Authorizer facade used by the middleware and handlers
 */
pub mod authorizer;
pub mod context;
pub mod error;
pub mod pattern;
pub mod permission;
pub mod roles;
pub mod tenant_path;
pub mod tools;

pub use authorizer::{AuthorizedPath, Authorizer};
pub use context::{AuthContext, AuthMethod, Principal, RequestAuth, Tenant, TenantStatus};
pub use error::{AuthError, AuthErrorCode, CredentialError};
pub use permission::{Decision, DenyReason, Permission, PermissionSet, PermissionType};
pub use roles::Role;
pub use tenant_path::TenantPathResolver;
pub use tools::{StaticToolCatalog, ToolCatalog, ToolCatalogError};
