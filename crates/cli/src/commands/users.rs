//! Account management commands.
//!
//! # Environment Variables
//!
//! - `DATABASE_URL` - `PostgreSQL` connection string
//! - `ENCRYPTION_KEY` - Base64-encoded 32-byte credential encryption key

use sqlx::PgPool;
use thiserror::Error;

use facturio_core::{CredentialBundle, Role};
use facturio_server::config::{ConfigError, EncryptionKey};
use facturio_server::db::users::{NewUser, UserRepository};
use facturio_server::db::RepositoryError;
use facturio_server::security::{FieldCipher, PasswordError, hash_password};

/// Errors that can occur during account operations.
#[derive(Debug, Error)]
pub enum UserError {
    /// Required environment variable is missing.
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(&'static str),

    /// Encryption key is malformed.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Database connection error.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Repository operation failed (e.g. username taken).
    #[error("{0}")]
    Repository(#[from] RepositoryError),

    /// Invalid role.
    #[error("Invalid role: {0}. Valid roles: user, admin")]
    InvalidRole(String),

    /// Password does not meet requirements.
    #[error(transparent)]
    Password(#[from] PasswordError),
}

/// Create a new account with no API credentials configured.
///
/// Credentials are entered later through the admin endpoints; this only
/// bootstraps the login.
///
/// # Errors
///
/// Returns `UserError` on validation or database failure.
pub async fn create(username: &str, password: &str, role: &str) -> Result<(), UserError> {
    dotenvy::dotenv().ok();

    let role: Role = role
        .parse()
        .map_err(|_| UserError::InvalidRole(role.to_owned()))?;

    let password_hash = hash_password(password)?;

    let database_url = std::env::var("DATABASE_URL")
        .map_err(|_| UserError::MissingEnvVar("DATABASE_URL"))?;
    let encryption_key = std::env::var("ENCRYPTION_KEY")
        .map_err(|_| UserError::MissingEnvVar("ENCRYPTION_KEY"))?;
    let cipher = FieldCipher::new(&EncryptionKey::from_base64("ENCRYPTION_KEY", &encryption_key)?);

    tracing::info!("Connecting to database...");
    let pool = PgPool::connect(&database_url).await?;

    let user = UserRepository::new(&pool)
        .create(
            &cipher,
            NewUser {
                username,
                password_hash: &password_hash,
                role,
                credentials: CredentialBundle::default(),
            },
        )
        .await?;

    tracing::info!(user_id = %user.id, username, role = %user.role, "account created");
    Ok(())
}
