//! Administration endpoints: user management and cross-tenant invoice
//! records.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, put};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tracing::instrument;

use facturio_core::{CredentialBundle, InvoiceRecordId, InvoiceStatus, Role, UserId};

use crate::db::invoices::NewInvoiceRecord;
use crate::db::users::NewUser;
use crate::db::{InvoiceRepository, UserRepository};
use crate::error::AppError;
use crate::middleware::RequireAdmin;
use crate::models::User;
use crate::security::hash_password;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/admin/users", get(list_users).post(create_user))
        .route("/admin/users/{id}", put(update_user).delete(delete_user))
        .route("/admin/invoices", get(search_invoices).post(add_invoice))
        .route("/admin/invoices/{id}", put(edit_invoice).delete(delete_invoice))
}

/// Serialize a user for the admin listing: configuration flags only,
/// never decrypted credential values.
fn user_summary(user: &User) -> serde_json::Value {
    json!({
        "id": user.id,
        "username": user.username,
        "role": user.role,
        "trendyolConfigured": user.credentials.has_trendyol(),
        "smartbillConfigured": user.credentials.has_smartbill(),
        "createdAt": user.created_at,
    })
}

/// All tenant accounts.
#[instrument(skip(_admin, state))]
async fn list_users(
    RequireAdmin(_admin): RequireAdmin,
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, AppError> {
    let users = UserRepository::new(state.pool())
        .list_all(state.cipher())
        .await?;

    Ok(Json(json!({
        "users": users.iter().map(user_summary).collect::<Vec<_>>()
    })))
}

#[derive(Debug, Deserialize)]
struct CreateUserRequest {
    username: String,
    password: String,
    #[serde(default)]
    role: Option<String>,
    #[serde(flatten)]
    credentials: CredentialBundle,
}

/// Create a tenant account.
#[instrument(skip(_admin, state, input), fields(username = %input.username))]
async fn create_user(
    RequireAdmin(_admin): RequireAdmin,
    State(state): State<AppState>,
    Json(input): Json<CreateUserRequest>,
) -> Result<impl IntoResponse, AppError> {
    if input.username.trim().is_empty() {
        return Err(AppError::BadRequest("username is required".to_owned()));
    }

    let role: Role = match input.role.as_deref() {
        None | Some("") => Role::User,
        Some(raw) => raw.parse().map_err(AppError::BadRequest)?,
    };

    let password_hash = hash_password(&input.password)
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let user = UserRepository::new(state.pool())
        .create(
            state.cipher(),
            NewUser {
                username: input.username.trim(),
                password_hash: &password_hash,
                role,
                credentials: input.credentials,
            },
        )
        .await?;

    tracing::info!(user_id = %user.id, "user created");
    Ok((StatusCode::CREATED, Json(user_summary(&user))))
}

#[derive(Debug, Deserialize)]
struct UpdateUserRequest {
    username: Option<String>,
    password: Option<String>,
    role: Option<String>,
    #[serde(flatten)]
    credentials: CredentialBundle,
}

/// Update a tenant account. Absent fields are left unchanged, including
/// individual credential fields (a field can be rotated without
/// re-entering the rest).
#[instrument(skip(_admin, state, input))]
async fn update_user(
    RequireAdmin(_admin): RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(input): Json<UpdateUserRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    let id = UserId::new(id);
    let users = UserRepository::new(state.pool());

    let existing = users
        .get_by_id(state.cipher(), id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("user {id}")))?;

    let username = input
        .username
        .as_deref()
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .unwrap_or(&existing.username);
    let role: Role = match input.role.as_deref() {
        None | Some("") => existing.role,
        Some(raw) => raw.parse().map_err(AppError::BadRequest)?,
    };
    users.update_account(id, username, role).await?;

    if let Some(password) = input.password.as_deref().filter(|p| !p.is_empty()) {
        let hash = hash_password(password).map_err(|e| AppError::BadRequest(e.to_string()))?;
        users.update_password(id, &hash).await?;
    }

    let provided = input.credentials;
    let current = existing.credentials;
    let merged = CredentialBundle {
        trendyol_api_key: provided.trendyol_api_key.or(current.trendyol_api_key),
        trendyol_api_secret: provided.trendyol_api_secret.or(current.trendyol_api_secret),
        trendyol_supplier_id: provided.trendyol_supplier_id.or(current.trendyol_supplier_id),
        smartbill_token: provided.smartbill_token.or(current.smartbill_token),
        smartbill_email: provided.smartbill_email.or(current.smartbill_email),
        smartbill_company_cif: provided.smartbill_company_cif.or(current.smartbill_company_cif),
        smartbill_warehouse: provided.smartbill_warehouse.or(current.smartbill_warehouse),
    };
    users.update_credentials(state.cipher(), id, &merged).await?;

    tracing::info!(user_id = %id, "user updated");
    Ok(Json(json!({ "success": true })))
}

/// Delete a tenant account (their invoice records cascade).
#[instrument(skip(admin, state))]
async fn delete_user(
    RequireAdmin(admin): RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<serde_json::Value>, AppError> {
    let id = UserId::new(id);
    if id == admin.id {
        return Err(AppError::BadRequest("you cannot delete your own account".to_owned()));
    }

    UserRepository::new(state.pool()).delete(id).await?;

    tracing::info!(user_id = %id, "user deleted");
    Ok(Json(json!({ "success": true })))
}

#[derive(Debug, Deserialize)]
struct SearchQuery {
    q: Option<String>,
}

/// Search invoice records across all tenants, with owner attribution.
#[instrument(skip(_admin, state, query))]
async fn search_invoices(
    RequireAdmin(_admin): RequireAdmin,
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    let records = InvoiceRepository::new(state.pool())
        .search_all(query.q.as_deref())
        .await?;

    Ok(Json(json!({ "invoices": records })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AddInvoiceRequest {
    order_id: String,
    series: String,
    number: String,
    /// Defaults to the calling admin's own account.
    user_id: Option<i32>,
}

/// Manually register an invoice record (e.g. an invoice issued outside
/// this system).
#[instrument(skip(admin, state, input))]
async fn add_invoice(
    RequireAdmin(admin): RequireAdmin,
    State(state): State<AppState>,
    Json(input): Json<AddInvoiceRequest>,
) -> Result<impl IntoResponse, AppError> {
    if input.order_id.is_empty() || input.series.is_empty() || input.number.is_empty() {
        return Err(AppError::BadRequest("all fields are required".to_owned()));
    }

    let owner = input.user_id.map_or(admin.id, UserId::new);

    let record = InvoiceRepository::new(state.pool())
        .insert(
            owner,
            NewInvoiceRecord {
                order_id: &input.order_id,
                series: &input.series,
                number: &input.number,
                status: InvoiceStatus::Generated,
                pdf_path: None,
            },
        )
        .await?;

    Ok((StatusCode::CREATED, Json(json!({ "success": true, "id": record.id }))))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EditInvoiceRequest {
    order_id: String,
    series: String,
    number: String,
}

/// Rewrite an invoice record's identifying fields (own records only).
#[instrument(skip(admin, state, input))]
async fn edit_invoice(
    RequireAdmin(admin): RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(input): Json<EditInvoiceRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    if input.order_id.is_empty() || input.series.is_empty() || input.number.is_empty() {
        return Err(AppError::BadRequest("all fields are required".to_owned()));
    }

    InvoiceRepository::new(state.pool())
        .update_fields(
            admin.id,
            InvoiceRecordId::new(id),
            &input.order_id,
            &input.series,
            &input.number,
        )
        .await?;

    Ok(Json(json!({ "success": true })))
}

/// Delete an invoice record (own records only).
#[instrument(skip(admin, state))]
async fn delete_invoice(
    RequireAdmin(admin): RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<serde_json::Value>, AppError> {
    InvoiceRepository::new(state.pool())
        .delete(admin.id, InvoiceRecordId::new(id))
        .await?;

    Ok(Json(json!({ "success": true })))
}
