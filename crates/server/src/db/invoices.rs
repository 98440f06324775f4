//! Invoice record repository.
//!
//! Every non-admin query is scoped by the caller's user id; the
//! UNIQUE(user_id, order_id) constraint makes the same order id under two
//! tenants two independent rows and turns write races into a
//! deterministic [`RepositoryError::DuplicateInvoice`].

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use facturio_core::{InvoiceRecordId, InvoiceStatus, UserId};

use super::{RepositoryError, map_unique_violation};
use crate::models::{InvoiceRecord, InvoiceRecordWithUser};

// =============================================================================
// Internal Row Types
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct InvoiceRow {
    id: i32,
    user_id: i32,
    order_id: String,
    series: String,
    number: String,
    status: InvoiceStatus,
    pdf_path: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<InvoiceRow> for InvoiceRecord {
    fn from(row: InvoiceRow) -> Self {
        Self {
            id: InvoiceRecordId::new(row.id),
            user_id: UserId::new(row.user_id),
            order_id: row.order_id,
            series: row.series,
            number: row.number,
            status: row.status,
            pdf_path: row.pdf_path,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct InvoiceWithUserRow {
    id: i32,
    user_id: i32,
    order_id: String,
    series: String,
    number: String,
    status: InvoiceStatus,
    pdf_path: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    username: Option<String>,
}

impl From<InvoiceWithUserRow> for InvoiceRecordWithUser {
    fn from(row: InvoiceWithUserRow) -> Self {
        Self {
            record: InvoiceRecord {
                id: InvoiceRecordId::new(row.id),
                user_id: UserId::new(row.user_id),
                order_id: row.order_id,
                series: row.series,
                number: row.number,
                status: row.status,
                pdf_path: row.pdf_path,
                created_at: row.created_at,
                updated_at: row.updated_at,
            },
            username: row.username.unwrap_or_else(|| "unknown".to_owned()),
        }
    }
}

const INVOICE_COLUMNS: &str =
    "id, user_id, order_id, series, number, status, pdf_path, created_at, updated_at";

/// Fields for inserting or upserting an invoice record.
#[derive(Debug, Clone)]
pub struct NewInvoiceRecord<'a> {
    pub order_id: &'a str,
    pub series: &'a str,
    pub number: &'a str,
    pub status: InvoiceStatus,
    pub pdf_path: Option<&'a str>,
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for invoice record database operations.
pub struct InvoiceRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> InvoiceRepository<'a> {
    /// Create a new invoice repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Insert a new record for (user, order).
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::DuplicateInvoice` if a record already
    /// exists for this (user, order) pair.
    pub async fn insert(
        &self,
        user_id: UserId,
        record: NewInvoiceRecord<'_>,
    ) -> Result<InvoiceRecord, RepositoryError> {
        let sql = format!(
            "INSERT INTO invoice_records (user_id, order_id, series, number, status, pdf_path) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING {INVOICE_COLUMNS}"
        );

        let row = sqlx::query_as::<_, InvoiceRow>(&sql)
            .bind(user_id.as_i32())
            .bind(record.order_id)
            .bind(record.series)
            .bind(record.number)
            .bind(record.status)
            .bind(record.pdf_path)
            .fetch_one(self.pool)
            .await
            .map_err(|e| map_unique_violation(e, RepositoryError::DuplicateInvoice))?;

        Ok(row.into())
    }

    /// Insert or replace the record for (user, order).
    ///
    /// Used by forced regeneration: last writer wins on the conflict.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn upsert(
        &self,
        user_id: UserId,
        record: NewInvoiceRecord<'_>,
    ) -> Result<InvoiceRecord, RepositoryError> {
        let sql = format!(
            "INSERT INTO invoice_records (user_id, order_id, series, number, status, pdf_path) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             ON CONFLICT (user_id, order_id) DO UPDATE SET \
                 series = EXCLUDED.series, \
                 number = EXCLUDED.number, \
                 status = EXCLUDED.status, \
                 pdf_path = EXCLUDED.pdf_path, \
                 updated_at = NOW() \
             RETURNING {INVOICE_COLUMNS}"
        );

        let row = sqlx::query_as::<_, InvoiceRow>(&sql)
            .bind(user_id.as_i32())
            .bind(record.order_id)
            .bind(record.series)
            .bind(record.number)
            .bind(record.status)
            .bind(record.pdf_path)
            .fetch_one(self.pool)
            .await?;

        Ok(row.into())
    }

    /// Get the record for (user, order), if any.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get(
        &self,
        user_id: UserId,
        order_id: &str,
    ) -> Result<Option<InvoiceRecord>, RepositoryError> {
        let sql = format!(
            "SELECT {INVOICE_COLUMNS} FROM invoice_records \
             WHERE user_id = $1 AND order_id = $2"
        );
        let row = sqlx::query_as::<_, InvoiceRow>(&sql)
            .bind(user_id.as_i32())
            .bind(order_id)
            .fetch_optional(self.pool)
            .await?;

        Ok(row.map(Into::into))
    }

    /// Get a record by its id, scoped to the owning user.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_by_id(
        &self,
        user_id: UserId,
        id: InvoiceRecordId,
    ) -> Result<Option<InvoiceRecord>, RepositoryError> {
        let sql =
            format!("SELECT {INVOICE_COLUMNS} FROM invoice_records WHERE id = $1 AND user_id = $2");
        let row = sqlx::query_as::<_, InvoiceRow>(&sql)
            .bind(id.as_i32())
            .bind(user_id.as_i32())
            .fetch_optional(self.pool)
            .await?;

        Ok(row.map(Into::into))
    }

    /// List all records for one tenant, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_for_user(
        &self,
        user_id: UserId,
    ) -> Result<Vec<InvoiceRecord>, RepositoryError> {
        let sql = format!(
            "SELECT {INVOICE_COLUMNS} FROM invoice_records \
             WHERE user_id = $1 ORDER BY created_at DESC"
        );
        let rows = sqlx::query_as::<_, InvoiceRow>(&sql)
            .bind(user_id.as_i32())
            .fetch_all(self.pool)
            .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Search records across all tenants with owner attribution (admin).
    ///
    /// An empty query returns everything, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn search_all(
        &self,
        query: Option<&str>,
    ) -> Result<Vec<InvoiceRecordWithUser>, RepositoryError> {
        let rows = if let Some(q) = query.filter(|q| !q.trim().is_empty()) {
            let pattern = format!("%{}%", q.trim());
            sqlx::query_as::<_, InvoiceWithUserRow>(
                "SELECT i.id, i.user_id, i.order_id, i.series, i.number, i.status, \
                        i.pdf_path, i.created_at, i.updated_at, u.username \
                 FROM invoice_records i \
                 LEFT JOIN users u ON i.user_id = u.id \
                 WHERE i.order_id ILIKE $1 OR i.series ILIKE $1 OR i.number ILIKE $1 \
                 ORDER BY i.created_at DESC",
            )
            .bind(pattern)
            .fetch_all(self.pool)
            .await?
        } else {
            sqlx::query_as::<_, InvoiceWithUserRow>(
                "SELECT i.id, i.user_id, i.order_id, i.series, i.number, i.status, \
                        i.pdf_path, i.created_at, i.updated_at, u.username \
                 FROM invoice_records i \
                 LEFT JOIN users u ON i.user_id = u.id \
                 ORDER BY i.created_at DESC",
            )
            .fetch_all(self.pool)
            .await?
        };

        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Update the status of the record for (user, order).
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if no record exists.
    pub async fn update_status(
        &self,
        user_id: UserId,
        order_id: &str,
        status: InvoiceStatus,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "UPDATE invoice_records SET status = $1, updated_at = NOW() \
             WHERE user_id = $2 AND order_id = $3",
        )
        .bind(status)
        .bind(user_id.as_i32())
        .bind(order_id)
        .execute(self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    /// Record the stored PDF artifact path for (user, order).
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if no record exists.
    pub async fn set_pdf_path(
        &self,
        user_id: UserId,
        order_id: &str,
        pdf_path: Option<&str>,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "UPDATE invoice_records SET pdf_path = $1, updated_at = NOW() \
             WHERE user_id = $2 AND order_id = $3",
        )
        .bind(pdf_path)
        .bind(user_id.as_i32())
        .bind(order_id)
        .execute(self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    /// Rewrite the identifying fields of a record (admin edit).
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the record doesn't exist for
    /// this user, `RepositoryError::DuplicateInvoice` if the new order id
    /// collides with another record of the same user.
    pub async fn update_fields(
        &self,
        user_id: UserId,
        id: InvoiceRecordId,
        order_id: &str,
        series: &str,
        number: &str,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "UPDATE invoice_records \
             SET order_id = $1, series = $2, number = $3, updated_at = NOW() \
             WHERE id = $4 AND user_id = $5",
        )
        .bind(order_id)
        .bind(series)
        .bind(number)
        .bind(id.as_i32())
        .bind(user_id.as_i32())
        .execute(self.pool)
        .await
        .map_err(|e| map_unique_violation(e, RepositoryError::DuplicateInvoice))?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    /// Delete a record, scoped to the owning user.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the record doesn't exist or
    /// belongs to another user.
    pub async fn delete(&self, user_id: UserId, id: InvoiceRecordId) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM invoice_records WHERE id = $1 AND user_id = $2")
            .bind(id.as_i32())
            .bind(user_id.as_i32())
            .execute(self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    /// Records with a retained PDF artifact created before `cutoff`.
    ///
    /// Used by the storage janitor: retention is keyed to record creation
    /// time, not filesystem metadata.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn artifacts_older_than(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<InvoiceRecord>, RepositoryError> {
        let sql = format!(
            "SELECT {INVOICE_COLUMNS} FROM invoice_records \
             WHERE pdf_path IS NOT NULL AND created_at < $1"
        );
        let rows = sqlx::query_as::<_, InvoiceRow>(&sql)
            .bind(cutoff)
            .fetch_all(self.pool)
            .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Every artifact path currently referenced by any record.
    ///
    /// The janitor uses this to avoid touching files that a record — of
    /// any age — still points at.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn all_pdf_paths(&self) -> Result<Vec<String>, RepositoryError> {
        let paths: Vec<String> = sqlx::query_scalar(
            "SELECT pdf_path FROM invoice_records WHERE pdf_path IS NOT NULL",
        )
        .fetch_all(self.pool)
        .await?;

        Ok(paths)
    }

    /// Clear the artifact reference after the janitor deletes the file.
    ///
    /// The record itself survives; only the pdf_path is dropped.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn clear_pdf_path(&self, id: InvoiceRecordId) -> Result<(), RepositoryError> {
        sqlx::query(
            "UPDATE invoice_records SET pdf_path = NULL, updated_at = NOW() WHERE id = $1",
        )
        .bind(id.as_i32())
        .execute(self.pool)
        .await?;

        Ok(())
    }
}
