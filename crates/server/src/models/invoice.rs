//! Invoice record models.

use chrono::{DateTime, Utc};
use serde::Serialize;

use facturio_core::{InvoiceRecordId, InvoiceStatus, UserId};

/// The system's bookkeeping entry for one (tenant, order) pair.
#[derive(Debug, Clone, Serialize)]
pub struct InvoiceRecord {
    pub id: InvoiceRecordId,
    pub user_id: UserId,
    pub order_id: String,
    pub series: String,
    pub number: String,
    pub status: InvoiceStatus,
    /// Relative path of the stored PDF artifact, if one is retained.
    pub pdf_path: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl InvoiceRecord {
    /// Combined `SERIE0042`-style display identifier.
    #[must_use]
    pub fn display_number(&self) -> String {
        format!("{}{}", self.series, self.number)
    }
}

/// Invoice record with owner attribution, for the admin listing.
#[derive(Debug, Clone, Serialize)]
pub struct InvoiceRecordWithUser {
    #[serde(flatten)]
    pub record: InvoiceRecord,
    pub username: String,
}
