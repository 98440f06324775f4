//! Bulk invoice generation and upload.
//!
//! Both handlers run over the caller's current filter: fetch the full
//! filtered listing, select candidates, cap at the requested count, and
//! hand the ordered batch to the orchestrator. The response carries the
//! ordered per-item outcome list.

use std::collections::{HashMap, HashSet};

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use chrono::Utc;
use serde::Deserialize;
use tracing::instrument;

use facturio_core::InvoiceStatus;

use crate::db::InvoiceRepository;
use crate::error::AppError;
use crate::middleware::RequireUser;
use crate::routes::orders::{OrdersQuery, parse_filter};
use crate::services::builder::InvoiceProfile;
use crate::services::bulk::{self, BulkOutcome};
use crate::services::janitor;
use crate::state::AppState;

const DEFAULT_BATCH_CAP: usize = 10;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/bulk/generate", post(bulk_generate))
        .route("/api/bulk/upload", post(bulk_upload))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BulkRequest {
    /// Cap on how many orders this run may process.
    order_count: Option<usize>,
    status: Option<String>,
    start_date: Option<String>,
    end_date: Option<String>,
    order_number: Option<String>,
    sku: Option<String>,
    /// Regenerate/re-upload even when a record already exists.
    #[serde(default)]
    force: bool,
}

impl BulkRequest {
    fn cap(&self) -> usize {
        self.order_count.unwrap_or(DEFAULT_BATCH_CAP)
    }

    fn to_orders_query(&self) -> OrdersQuery {
        OrdersQuery {
            page: 0,
            size: None,
            status: self.status.clone(),
            start_date: self.start_date.clone(),
            end_date: self.end_date.clone(),
            order_number: self.order_number.clone(),
            sku: self.sku.clone(),
        }
    }
}

/// Generate invoices for up to `orderCount` filtered orders that have
/// none yet.
#[instrument(skip(user, state, input))]
async fn bulk_generate(
    RequireUser(user): RequireUser,
    State(state): State<AppState>,
    Json(input): Json<BulkRequest>,
) -> Result<Json<BulkOutcome>, AppError> {
    let filter = parse_filter(&input.to_orders_query())?;
    let account = state.load_user(user.id).await?;
    let trendyol = state.trendyol_client(&account.credentials)?;
    let smartbill = state.smartbill_client(&account.credentials)?;
    let invoices = InvoiceRepository::new(state.pool());

    // Orders that already have a record are not candidates unless the
    // run is forced; the orchestrator re-checks per item anyway.
    let existing: HashSet<String> = invoices
        .list_for_user(user.id)
        .await?
        .into_iter()
        .filter(|r| r.status != InvoiceStatus::Failed)
        .map(|r| r.order_id)
        .collect();

    let orders = trendyol.fetch_all_orders(&filter).await?;
    let batch: Vec<_> = orders
        .into_iter()
        .filter(|order| {
            input.force
                || (!existing.contains(&order.order_number) && order.invoice_link.is_none())
        })
        .take(input.cap())
        .collect();

    let series = smartbill
        .invoice_series_cached(state.series_cache(), user.id.as_i32())
        .await?;
    let Some(first_series) = series.first() else {
        return Err(AppError::NotFound(
            "no invoice series found in the invoicing account".to_owned(),
        ));
    };

    let profile = InvoiceProfile {
        company_vat_code: smartbill.company_cif().to_owned(),
        series_name: first_series.name.clone(),
        warehouse: smartbill.warehouse().map(ToOwned::to_owned),
    };

    let outcome = bulk::bulk_generate(
        &smartbill,
        &invoices,
        state.postal(),
        user.id,
        &batch,
        &profile,
        Utc::now().date_naive(),
        input.force,
    )
    .await;

    tracing::info!(
        total = outcome.total,
        successful = outcome.successful,
        failed = outcome.failed,
        "bulk generation finished"
    );

    Ok(Json(outcome))
}

/// Upload invoice PDFs for up to `orderCount` filtered orders with a
/// generated invoice.
#[instrument(skip(user, state, input))]
async fn bulk_upload(
    RequireUser(user): RequireUser,
    State(state): State<AppState>,
    Json(input): Json<BulkRequest>,
) -> Result<Json<BulkOutcome>, AppError> {
    let filter = parse_filter(&input.to_orders_query())?;
    let account = state.load_user(user.id).await?;
    let trendyol = state.trendyol_client(&account.credentials)?;
    let smartbill = state.smartbill_client(&account.credentials)?;
    let invoices = InvoiceRepository::new(state.pool());

    // Opportunistic retention sweep before any upload batch.
    let config = state.config();
    if let Err(e) = janitor::sweep(
        &invoices,
        &config.invoice_storage_dir,
        Utc::now(),
        config.retention_window(),
    )
    .await
    {
        tracing::warn!(error = %e, "storage sweep failed");
    }

    // Candidates: filtered orders with a generated (or, when forcing,
    // any) record and nothing already attached upstream.
    let records: HashMap<String, InvoiceStatus> = invoices
        .list_for_user(user.id)
        .await?
        .into_iter()
        .map(|r| (r.order_id, r.status))
        .collect();

    if records.is_empty() {
        return Err(AppError::BadRequest(
            "no generated invoices found to upload".to_owned(),
        ));
    }

    let orders = trendyol.fetch_all_orders(&filter).await?;
    let batch: Vec<_> = orders
        .into_iter()
        .filter(|order| {
            let Some(status) = records.get(&order.order_number) else {
                return false;
            };
            (input.force || *status != InvoiceStatus::Uploaded) && order.invoice_link.is_none()
        })
        .take(input.cap())
        .collect();

    let outcome = bulk::bulk_upload(
        &smartbill,
        &trendyol,
        &invoices,
        user.id,
        &batch,
        Some(config.invoice_storage_dir.as_path()),
        input.force,
    )
    .await;

    tracing::info!(
        total = outcome.total,
        successful = outcome.successful,
        failed = outcome.failed,
        "bulk upload finished"
    );

    Ok(Json(outcome))
}
