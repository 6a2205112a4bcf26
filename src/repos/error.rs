/*
 * Responsibility
 * - What repos report upward
 */
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("db error")]
    Db(#[from] sqlx::Error),
    #[error("invalid row: {0}")]
    InvalidRow(String),
}
