//! HTTP route handlers (JSON API).

pub mod admin;
pub mod auth;
pub mod bulk;
pub mod invoices;
pub mod orders;
pub mod postal;
pub mod smartbill;

use axum::Router;

use crate::state::AppState;

/// The full application router (health endpoints are wired in `main`).
pub fn routes() -> Router<AppState> {
    Router::new()
        .merge(auth::routes())
        .merge(orders::routes())
        .merge(invoices::routes())
        .merge(smartbill::routes())
        .merge(bulk::routes())
        .merge(postal::routes())
        .merge(admin::routes())
}
