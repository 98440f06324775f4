//! Database operations for `PostgreSQL`.
//!
//! ## Tables
//!
//! - `users` - Tenant accounts with encrypted API credentials
//! - `invoice_records` - Per-tenant invoice bookkeeping,
//!   UNIQUE(user_id, order_id)
//! - `sessions` - Session storage (tower-sessions)
//!
//! # Migrations
//!
//! Migrations are stored in `crates/server/migrations/` and run via:
//! ```bash
//! cargo run -p facturio-cli -- migrate
//! ```

pub mod invoices;
pub mod users;

use std::time::Duration;

use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

pub use invoices::InvoiceRepository;
pub use users::UserRepository;

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Requested entity was not found.
    #[error("not found")]
    NotFound,

    /// Constraint violation (e.g., unique username).
    #[error("constraint violation: {0}")]
    Conflict(String),

    /// An invoice record already exists for this (user, order) pair.
    #[error("invoice already exists for this order")]
    DuplicateInvoice,
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}

/// Map a sqlx error to `DuplicateInvoice` when it is a unique violation.
fn map_unique_violation(e: sqlx::Error, conflict: RepositoryError) -> RepositoryError {
    if let sqlx::Error::Database(ref db_err) = e
        && db_err.is_unique_violation()
    {
        return conflict;
    }
    RepositoryError::Database(e)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repository_error_display() {
        assert_eq!(RepositoryError::NotFound.to_string(), "not found");
        assert_eq!(
            RepositoryError::DuplicateInvoice.to_string(),
            "invoice already exists for this order"
        );
        assert_eq!(
            RepositoryError::Conflict("username taken".into()).to_string(),
            "constraint violation: username taken"
        );
    }
}
