//! User repository for database operations.
//!
//! Credential columns are ciphertext in the database; this repository is
//! the only place they cross the encryption boundary. Queries use the
//! runtime sqlx API.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use facturio_core::{CredentialBundle, Role, UserId};

use super::{RepositoryError, map_unique_violation};
use crate::models::User;
use crate::security::{CipherError, FieldCipher};

// =============================================================================
// Internal Row Types
// =============================================================================

/// Internal row type for user queries; credential columns still encrypted.
#[derive(Debug, sqlx::FromRow)]
struct UserRow {
    id: i32,
    username: String,
    role: Role,
    trendyol_api_key: Option<String>,
    trendyol_api_secret: Option<String>,
    trendyol_supplier_id: Option<String>,
    smartbill_token: Option<String>,
    smartbill_email: Option<String>,
    smartbill_company_cif: Option<String>,
    smartbill_warehouse: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

const USER_COLUMNS: &str = "id, username, role, \
     trendyol_api_key, trendyol_api_secret, trendyol_supplier_id, \
     smartbill_token, smartbill_email, smartbill_company_cif, smartbill_warehouse, \
     created_at, updated_at";

impl UserRow {
    /// Decrypt credential columns into a domain [`User`].
    fn into_user(self, cipher: &FieldCipher) -> Result<User, RepositoryError> {
        let decrypt = |v: Option<String>| -> Result<Option<String>, CipherError> {
            cipher.decrypt_opt(v.as_deref())
        };

        let credentials = CredentialBundle {
            trendyol_api_key: decrypt(self.trendyol_api_key).map_err(corrupt)?,
            trendyol_api_secret: decrypt(self.trendyol_api_secret).map_err(corrupt)?,
            trendyol_supplier_id: decrypt(self.trendyol_supplier_id).map_err(corrupt)?,
            smartbill_token: decrypt(self.smartbill_token).map_err(corrupt)?,
            smartbill_email: decrypt(self.smartbill_email).map_err(corrupt)?,
            smartbill_company_cif: decrypt(self.smartbill_company_cif).map_err(corrupt)?,
            smartbill_warehouse: decrypt(self.smartbill_warehouse).map_err(corrupt)?,
        };

        Ok(User {
            id: UserId::new(self.id),
            username: self.username,
            role: self.role,
            credentials,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

fn corrupt(e: CipherError) -> RepositoryError {
    RepositoryError::DataCorruption(format!("credential column cannot be decrypted: {e}"))
}

/// Input for creating a new user.
#[derive(Debug)]
pub struct NewUser<'a> {
    pub username: &'a str,
    pub password_hash: &'a str,
    pub role: Role,
    pub credentials: CredentialBundle,
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for tenant account database operations.
pub struct UserRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> UserRepository<'a> {
    /// Create a new user repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Create a new user; credential fields are encrypted before insert.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the username already exists.
    /// Returns `RepositoryError::DataCorruption` if encryption fails.
    pub async fn create(
        &self,
        cipher: &FieldCipher,
        new_user: NewUser<'_>,
    ) -> Result<User, RepositoryError> {
        let creds = &new_user.credentials;
        let enc = |v: Option<&String>| -> Result<Option<String>, RepositoryError> {
            cipher.encrypt_opt(v.map(String::as_str)).map_err(corrupt)
        };

        let sql = format!(
            "INSERT INTO users (username, password_hash, role, \
                 trendyol_api_key, trendyol_api_secret, trendyol_supplier_id, \
                 smartbill_token, smartbill_email, smartbill_company_cif, smartbill_warehouse) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
             RETURNING {USER_COLUMNS}"
        );

        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(new_user.username)
            .bind(new_user.password_hash)
            .bind(new_user.role)
            .bind(enc(creds.trendyol_api_key.as_ref())?)
            .bind(enc(creds.trendyol_api_secret.as_ref())?)
            .bind(enc(creds.trendyol_supplier_id.as_ref())?)
            .bind(enc(creds.smartbill_token.as_ref())?)
            .bind(enc(creds.smartbill_email.as_ref())?)
            .bind(enc(creds.smartbill_company_cif.as_ref())?)
            .bind(enc(creds.smartbill_warehouse.as_ref())?)
            .fetch_one(self.pool)
            .await
            .map_err(|e| {
                map_unique_violation(
                    e,
                    RepositoryError::Conflict("username already exists".to_owned()),
                )
            })?;

        row.into_user(cipher)
    }

    /// Get a user by ID with decrypted credentials.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    /// Returns `RepositoryError::DataCorruption` if decryption fails.
    pub async fn get_by_id(
        &self,
        cipher: &FieldCipher,
        id: UserId,
    ) -> Result<Option<User>, RepositoryError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(id.as_i32())
            .fetch_optional(self.pool)
            .await?;

        row.map(|r| r.into_user(cipher)).transpose()
    }

    /// Get a user plus their password hash by username, for login.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_with_password_hash(
        &self,
        cipher: &FieldCipher,
        username: &str,
    ) -> Result<Option<(User, String)>, RepositoryError> {
        #[derive(sqlx::FromRow)]
        struct HashRow {
            id: i32,
            password_hash: String,
        }

        let row = sqlx::query_as::<_, HashRow>(
            "SELECT id, password_hash FROM users WHERE username = $1",
        )
        .bind(username)
        .fetch_optional(self.pool)
        .await?;

        let Some(hash_row) = row else {
            return Ok(None);
        };

        let user = self
            .get_by_id(cipher, UserId::new(hash_row.id))
            .await?
            .ok_or(RepositoryError::NotFound)?;

        Ok(Some((user, hash_row.password_hash)))
    }

    /// List all users with decrypted credentials (admin only).
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    /// Returns `RepositoryError::DataCorruption` if decryption fails.
    pub async fn list_all(&self, cipher: &FieldCipher) -> Result<Vec<User>, RepositoryError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users ORDER BY created_at ASC");
        let rows = sqlx::query_as::<_, UserRow>(&sql).fetch_all(self.pool).await?;

        rows.into_iter().map(|r| r.into_user(cipher)).collect()
    }

    /// Update a user's username and role.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the user doesn't exist.
    /// Returns `RepositoryError::Conflict` if the username is taken.
    pub async fn update_account(
        &self,
        id: UserId,
        username: &str,
        role: Role,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "UPDATE users SET username = $1, role = $2, updated_at = NOW() WHERE id = $3",
        )
        .bind(username)
        .bind(role)
        .bind(id.as_i32())
        .execute(self.pool)
        .await
        .map_err(|e| {
            map_unique_violation(
                e,
                RepositoryError::Conflict("username already exists".to_owned()),
            )
        })?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    /// Replace a user's password hash.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the user doesn't exist.
    pub async fn update_password(
        &self,
        id: UserId,
        password_hash: &str,
    ) -> Result<(), RepositoryError> {
        let result =
            sqlx::query("UPDATE users SET password_hash = $1, updated_at = NOW() WHERE id = $2")
                .bind(password_hash)
                .bind(id.as_i32())
                .execute(self.pool)
                .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    /// Replace a user's credential bundle; fields are encrypted before write.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the user doesn't exist.
    /// Returns `RepositoryError::DataCorruption` if encryption fails.
    pub async fn update_credentials(
        &self,
        cipher: &FieldCipher,
        id: UserId,
        credentials: &CredentialBundle,
    ) -> Result<(), RepositoryError> {
        let enc = |v: Option<&String>| -> Result<Option<String>, RepositoryError> {
            cipher.encrypt_opt(v.map(String::as_str)).map_err(corrupt)
        };

        let result = sqlx::query(
            "UPDATE users SET \
                 trendyol_api_key = $1, trendyol_api_secret = $2, trendyol_supplier_id = $3, \
                 smartbill_token = $4, smartbill_email = $5, smartbill_company_cif = $6, \
                 smartbill_warehouse = $7, updated_at = NOW() \
             WHERE id = $8",
        )
        .bind(enc(credentials.trendyol_api_key.as_ref())?)
        .bind(enc(credentials.trendyol_api_secret.as_ref())?)
        .bind(enc(credentials.trendyol_supplier_id.as_ref())?)
        .bind(enc(credentials.smartbill_token.as_ref())?)
        .bind(enc(credentials.smartbill_email.as_ref())?)
        .bind(enc(credentials.smartbill_company_cif.as_ref())?)
        .bind(enc(credentials.smartbill_warehouse.as_ref())?)
        .bind(id.as_i32())
        .execute(self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    /// Delete a user. Their invoice records cascade.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the user doesn't exist.
    pub async fn delete(&self, id: UserId) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id.as_i32())
            .execute(self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }
}
