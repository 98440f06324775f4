//! Invoice record endpoints and the single-order upload flow.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use tracing::instrument;

use crate::clients::types::Order;
use crate::db::InvoiceRepository;
use crate::error::AppError;
use crate::middleware::RequireUser;
use crate::services::bulk::{self, ItemOutcome};
use crate::services::janitor;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/invoices", get(list_records))
        .route("/api/invoices/{order_id}", get(get_record))
        .route("/api/invoices/upload", post(upload_invoice))
        .route("/api/invoices/link", post(send_invoice_link))
}

/// The caller's invoice records.
#[instrument(skip(user, state))]
async fn list_records(
    RequireUser(user): RequireUser,
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, AppError> {
    let records = InvoiceRepository::new(state.pool())
        .list_for_user(user.id)
        .await?;

    Ok(Json(json!({ "invoices": records })))
}

/// Invoice bookkeeping for one order.
#[instrument(skip(user, state))]
async fn get_record(
    RequireUser(user): RequireUser,
    State(state): State<AppState>,
    Path(order_id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let record = InvoiceRepository::new(state.pool())
        .get(user.id, &order_id)
        .await?;

    Ok(Json(match record {
        Some(record) => json!({
            "hasInvoice": true,
            "series": record.series,
            "number": record.number,
            "status": record.status,
            "createdAt": record.created_at,
        }),
        None => json!({ "hasInvoice": false }),
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InvoiceLinkRequest {
    shipment_package_id: i64,
    invoice_link: String,
    invoice_number: Option<String>,
}

/// Attach an externally hosted invoice link to a shipment package.
///
/// Alternative to the file upload for tenants who host their PDFs
/// themselves; nothing is stored locally.
#[instrument(skip(user, state, input), fields(package = input.shipment_package_id))]
async fn send_invoice_link(
    RequireUser(user): RequireUser,
    State(state): State<AppState>,
    Json(input): Json<InvoiceLinkRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    if input.invoice_link.is_empty() {
        return Err(AppError::BadRequest("invoice link is required".to_owned()));
    }

    let account = state.load_user(user.id).await?;
    let trendyol = state.trendyol_client(&account.credentials)?;

    trendyol
        .send_invoice_link(
            input.shipment_package_id,
            &input.invoice_link,
            input.invoice_number.as_deref(),
            None,
        )
        .await?;

    Ok(Json(json!({
        "success": true,
        "message": format!(
            "Invoice link attached to shipment package {}",
            input.shipment_package_id
        ),
    })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadRequest {
    order_number: String,
    shipment_package_id: i64,
    #[serde(default)]
    force: bool,
}

/// Push one order's invoice PDF to the marketplace.
///
/// Downloads the PDF from the invoicing service and uploads it; the
/// stored record moves to `uploaded`. Runs the storage sweep first, as
/// all upload operations do.
#[instrument(skip(user, state, input), fields(order = %input.order_number))]
async fn upload_invoice(
    RequireUser(user): RequireUser,
    State(state): State<AppState>,
    Json(input): Json<UploadRequest>,
) -> Result<impl IntoResponse, AppError> {
    if input.order_number.is_empty() {
        return Err(AppError::BadRequest("order number is required".to_owned()));
    }

    let invoices = InvoiceRepository::new(state.pool());

    // Opportunistic retention sweep; failures must not block the upload.
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

    let account = state.load_user(user.id).await?;
    let smartbill = state.smartbill_client(&account.credentials)?;
    let trendyol = state.trendyol_client(&account.credentials)?;

    let order: Order = serde_json::from_value(json!({
        "id": input.shipment_package_id,
        "orderNumber": input.order_number,
    }))
    .map_err(|e| AppError::Internal(e.to_string()))?;

    let outcome = bulk::bulk_upload(
        &smartbill,
        &trendyol,
        &invoices,
        user.id,
        std::slice::from_ref(&order),
        Some(config.invoice_storage_dir.as_path()),
        input.force,
    )
    .await;

    // Single-item operation: the per-item outcome becomes the response.
    match outcome.items.into_iter().next() {
        Some(ItemOutcome::Uploaded { series, number, .. }) => Ok((
            StatusCode::OK,
            Json(json!({
                "success": true,
                "message": format!(
                    "Invoice {series}-{number} uploaded to the marketplace for package {}",
                    input.shipment_package_id
                ),
            })),
        )),
        Some(ItemOutcome::Skipped { reason, .. }) => Ok((
            StatusCode::CONFLICT,
            Json(json!({ "success": false, "error": reason })),
        )),
        Some(ItemOutcome::Failed { reason, .. }) => Ok((
            StatusCode::BAD_GATEWAY,
            Json(json!({ "success": false, "error": reason })),
        )),
        Some(ItemOutcome::Generated { .. }) | None => {
            Err(AppError::Internal("upload produced no outcome".to_owned()))
        }
    }
}
