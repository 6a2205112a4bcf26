/*!
 * Authentication context extractors
 *
 * Responsibility:
 * - Hand the per-request RequestAuth (published by the access middleware) to handlers
 * - axum specifics stay in core; the types live in types
 *
 * Public API:
 * - Authenticated
 * - MaybeAuthenticated
 * - TenantId
 */

mod core;
mod types;

pub use types::{Authenticated, MaybeAuthenticated, TenantId};
