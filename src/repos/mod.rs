/*
 * Responsibility
 * - Postgres access (sqlx)
 */
pub mod error;
pub mod tenant_repo;

pub use tenant_repo::PgTenantStore;
