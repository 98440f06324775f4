//! Postal-code lookup endpoint.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;

use crate::middleware::RequireUser;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route("/api/postal-codes/{code}", get(lookup))
}

/// Resolve a postal code to city/county.
///
/// Lookup failures are a 404 with guidance, never a server error — the
/// scraped source is unreliable by nature and the result is advisory.
async fn lookup(
    RequireUser(_user): RequireUser,
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> impl IntoResponse {
    match state.postal().lookup(&code).await {
        Some(hint) => (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "city": hint.city,
                "county": hint.county,
            })),
        ),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({
                "success": false,
                "error": "Postal code not found. Please enter city and county manually.",
            })),
        ),
    }
}
