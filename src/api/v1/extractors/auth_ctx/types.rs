/*
 * Responsibility
 * - What handlers see of authentication
 * - The middleware verifies and publishes RequestAuth; handlers only take these types
 */
use std::ops::Deref;
use std::sync::Arc;

use crate::services::authz::context::AuthContext;

/// An authenticated request. Rejects with 401 otherwise.
#[derive(Debug, Clone)]
pub struct Authenticated(pub Arc<AuthContext>);

impl Deref for Authenticated {
    type Target = AuthContext;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Authenticated or not; never rejects once the middleware ran.
#[derive(Debug, Clone)]
pub struct MaybeAuthenticated(pub Option<Arc<AuthContext>>);

/// Tenant of the authenticated principal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantId(pub String);
