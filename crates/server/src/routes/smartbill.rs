//! Invoicing API endpoints: series, invoice list, PDF, create, reverse.

use axum::extract::{Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use serde_json::json;
use tracing::instrument;

use facturio_core::InvoiceStatus;

use crate::clients::smartbill::{InvoiceDraft, InvoiceListFilter};
use crate::db::invoices::NewInvoiceRecord;
use crate::db::{InvoiceRepository, RepositoryError};
use crate::error::AppError;
use crate::middleware::RequireUser;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/smartbill/series", get(series))
        .route("/api/smartbill/next-invoice-number", get(next_invoice_number))
        .route("/api/smartbill/invoices", get(list_invoices).post(create_invoice))
        .route("/api/smartbill/invoice/pdf", get(invoice_pdf))
        .route("/api/smartbill/invoice/reverse", post(reverse_invoice))
}

#[derive(Debug, Deserialize)]
struct SeriesQuery {
    /// Document type: "f" invoice, "p" proforma, "c" receipt.
    #[serde(default = "default_series_kind", rename = "type")]
    kind: String,
}

fn default_series_kind() -> String {
    "f".to_owned()
}

/// List configured document series.
#[instrument(skip(user, state, query))]
async fn series(
    RequireUser(user): RequireUser,
    State(state): State<AppState>,
    Query(query): Query<SeriesQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    let account = state.load_user(user.id).await?;
    let client = state.smartbill_client(&account.credentials)?;

    let series = client.document_series(&query.kind).await?;
    Ok(Json(json!({
        "list": series
            .iter()
            .map(|s| json!({ "name": s.name, "nextNumber": s.next_number }))
            .collect::<Vec<_>>()
    })))
}

/// The series and next number the next invoice will get.
#[instrument(skip(user, state))]
async fn next_invoice_number(
    RequireUser(user): RequireUser,
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, AppError> {
    let account = state.load_user(user.id).await?;
    let client = state.smartbill_client(&account.credentials)?;

    let series = client
        .invoice_series_cached(state.series_cache(), user.id.as_i32())
        .await?;
    let Some(first) = series.first() else {
        return Err(AppError::NotFound(
            "no invoice series found in the invoicing account".to_owned(),
        ));
    };

    let next_number = first.padded_next_number();
    Ok(Json(json!({
        "seriesName": first.name,
        "nextNumber": next_number,
        "combined": format!("{}{next_number}", first.name),
        "cif": client.company_cif(),
    })))
}

#[derive(Debug, Deserialize)]
struct InvoiceListQuery {
    series: Option<String>,
    number: Option<String>,
    date: Option<String>,
}

/// List issued invoices from the invoicing service.
#[instrument(skip(user, state, query))]
async fn list_invoices(
    RequireUser(user): RequireUser,
    State(state): State<AppState>,
    Query(query): Query<InvoiceListQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    let account = state.load_user(user.id).await?;
    let client = state.smartbill_client(&account.credentials)?;

    let filter = InvoiceListFilter {
        series: query.series,
        number: query.number,
        issue_date: query.date,
    };
    Ok(Json(client.list_invoices(&filter).await?))
}

/// Create a single invoice from a caller-provided draft.
///
/// Guarded by the invoice store: an existing record for the order is a
/// 409, never a duplicate remote invoice.
#[instrument(skip(user, state, draft))]
async fn create_invoice(
    RequireUser(user): RequireUser,
    State(state): State<AppState>,
    Json(draft): Json<InvoiceDraft>,
) -> Result<Json<serde_json::Value>, AppError> {
    if draft.order_number.is_empty() {
        return Err(AppError::BadRequest("order number is required".to_owned()));
    }

    let account = state.load_user(user.id).await?;
    let client = state.smartbill_client(&account.credentials)?;
    let invoices = InvoiceRepository::new(state.pool());

    if let Some(existing) = invoices.get(user.id, &draft.order_number).await? {
        return Err(AppError::Database(RepositoryError::Conflict(format!(
            "invoice {} already exists for order {}",
            existing.display_number(),
            draft.order_number
        ))));
    }

    let issued = client.create_invoice(&draft).await?;

    let record = invoices
        .insert(
            user.id,
            NewInvoiceRecord {
                order_id: &draft.order_number,
                series: &issued.series,
                number: &issued.number,
                status: InvoiceStatus::Generated,
                pdf_path: None,
            },
        )
        .await?;

    tracing::info!(order_id = %record.order_id, invoice = %record.display_number(), "invoice created");

    Ok(Json(json!({
        "success": true,
        "series": issued.series,
        "number": issued.number,
        "message": format!("Invoice {}-{} created successfully", issued.series, issued.number),
    })))
}

#[derive(Debug, Deserialize)]
struct PdfQuery {
    series: String,
    number: String,
}

/// Download an invoice PDF from the invoicing service.
#[instrument(skip(user, state, query))]
async fn invoice_pdf(
    RequireUser(user): RequireUser,
    State(state): State<AppState>,
    Query(query): Query<PdfQuery>,
) -> Result<Response, AppError> {
    if query.series.is_empty() || query.number.is_empty() {
        return Err(AppError::BadRequest("both series and number are required".to_owned()));
    }

    let account = state.load_user(user.id).await?;
    let client = state.smartbill_client(&account.credentials)?;

    let pdf = client.invoice_pdf(&query.series, &query.number).await?;

    Ok((
        [
            (header::CONTENT_TYPE, "application/pdf".to_owned()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"invoice_{}_{}.pdf\"", query.series, query.number),
            ),
        ],
        pdf,
    )
        .into_response())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReverseRequest {
    series: String,
    number: String,
    issue_date: Option<String>,
}

/// Issue a reversal (storno) invoice.
#[instrument(skip(user, state, input))]
async fn reverse_invoice(
    RequireUser(user): RequireUser,
    State(state): State<AppState>,
    Json(input): Json<ReverseRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    if input.series.is_empty() || input.number.is_empty() {
        return Err(AppError::BadRequest("both series and number are required".to_owned()));
    }

    let issue_date = match input.issue_date.as_deref().filter(|d| !d.is_empty()) {
        Some(raw) => NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .map_err(|_| AppError::BadRequest(format!("invalid issue date: {raw}")))?,
        None => Utc::now().date_naive(),
    };

    let account = state.load_user(user.id).await?;
    let client = state.smartbill_client(&account.credentials)?;

    let result = client
        .reverse_invoice(&input.series, &input.number, issue_date)
        .await?;

    tracing::info!(series = %input.series, number = %input.number, "invoice reversed");
    Ok(Json(result))
}
