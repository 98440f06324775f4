//! Order, product, and label endpoints (marketplace reads).

use axum::extract::{Path, Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use tracing::instrument;

use facturio_core::OrderStatus;

use crate::clients::OrderFilter;
use crate::clients::types::{Order, Paged, Product};
use crate::error::AppError;
use crate::middleware::RequireUser;
use crate::state::AppState;

const DEFAULT_PAGE_SIZE: u32 = 50;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/orders", get(list_orders))
        .route("/api/shipment-packages", get(list_shipment_packages))
        .route("/api/products", get(list_products))
        .route("/api/labels/{package_id}", get(download_label))
}

/// Query parameters shared by the order listings.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrdersQuery {
    #[serde(default)]
    pub page: u32,
    pub size: Option<u32>,
    /// One status or a comma-separated set.
    pub status: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub order_number: Option<String>,
    pub sku: Option<String>,
}

/// Build the typed filter, rejecting unknown statuses.
pub fn parse_filter(query: &OrdersQuery) -> Result<OrderFilter, AppError> {
    let statuses = match query.status.as_deref().filter(|s| !s.trim().is_empty()) {
        Some(raw) => raw
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| {
                s.parse::<OrderStatus>()
                    .map_err(AppError::BadRequest)
            })
            .collect::<Result<Vec<_>, _>>()?,
        None => Vec::new(),
    };

    let non_empty = |v: &Option<String>| v.clone().filter(|s| !s.trim().is_empty());

    Ok(OrderFilter {
        statuses,
        start_date: non_empty(&query.start_date),
        end_date: non_empty(&query.end_date),
        order_number: non_empty(&query.order_number),
        sku: non_empty(&query.sku),
    })
}

/// List marketplace orders for the caller's filter and page.
#[instrument(skip(user, state, query))]
async fn list_orders(
    RequireUser(user): RequireUser,
    State(state): State<AppState>,
    Query(query): Query<OrdersQuery>,
) -> Result<Json<Paged<Order>>, AppError> {
    let filter = parse_filter(&query)?;
    let account = state.load_user(user.id).await?;
    let client = state.trendyol_client(&account.credentials)?;

    let page = client
        .list_orders(&filter, query.page, query.size.unwrap_or(DEFAULT_PAGE_SIZE))
        .await?;

    Ok(Json(page))
}

/// List shipment packages.
#[instrument(skip(user, state, query))]
async fn list_shipment_packages(
    RequireUser(user): RequireUser,
    State(state): State<AppState>,
    Query(query): Query<OrdersQuery>,
) -> Result<Json<Paged<Order>>, AppError> {
    let filter = parse_filter(&query)?;
    let account = state.load_user(user.id).await?;
    let client = state.trendyol_client(&account.credentials)?;

    let page = client
        .list_shipment_packages(&filter, query.page, query.size.unwrap_or(DEFAULT_PAGE_SIZE))
        .await?;

    Ok(Json(page))
}

#[derive(Debug, Deserialize)]
struct ProductsQuery {
    #[serde(default)]
    page: u32,
    size: Option<u32>,
    barcode: Option<String>,
    approved: Option<bool>,
}

/// List product catalog entries.
#[instrument(skip(user, state, query))]
async fn list_products(
    RequireUser(user): RequireUser,
    State(state): State<AppState>,
    Query(query): Query<ProductsQuery>,
) -> Result<Json<Paged<Product>>, AppError> {
    let account = state.load_user(user.id).await?;
    let client = state.trendyol_client(&account.credentials)?;

    let page = client
        .list_products(
            query.page,
            query.size.unwrap_or(DEFAULT_PAGE_SIZE),
            query.barcode.as_deref(),
            query.approved,
        )
        .await?;

    Ok(Json(page))
}

/// Download the shipping label PDF for a shipment package.
#[instrument(skip(user, state))]
async fn download_label(
    RequireUser(user): RequireUser,
    State(state): State<AppState>,
    Path(package_id): Path<i64>,
) -> Result<Response, AppError> {
    let account = state.load_user(user.id).await?;
    let client = state.trendyol_client(&account.credentials)?;

    let pdf = client.shipping_label(package_id).await?;

    Ok((
        [
            (header::CONTENT_TYPE, "application/pdf".to_owned()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"label_{package_id}.pdf\""),
            ),
        ],
        pdf,
    )
        .into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(status: Option<&str>) -> OrdersQuery {
        OrdersQuery {
            page: 0,
            size: None,
            status: status.map(ToOwned::to_owned),
            start_date: None,
            end_date: None,
            order_number: None,
            sku: None,
        }
    }

    #[test]
    fn test_parse_filter_multi_status() {
        let filter = parse_filter(&query(Some("Created, Shipped"))).expect("filter");
        assert_eq!(
            filter.statuses,
            vec![OrderStatus::Created, OrderStatus::Shipped]
        );
    }

    #[test]
    fn test_parse_filter_empty_status() {
        let filter = parse_filter(&query(None)).expect("filter");
        assert!(filter.statuses.is_empty());

        let filter = parse_filter(&query(Some("  "))).expect("filter");
        assert!(filter.statuses.is_empty());
    }

    #[test]
    fn test_parse_filter_rejects_unknown_status() {
        let result = parse_filter(&query(Some("Created,Bogus")));
        assert!(matches!(result, Err(AppError::BadRequest(_))));
    }

    #[test]
    fn test_parse_filter_drops_empty_strings() {
        let mut q = query(None);
        q.sku = Some("  ".into());
        q.order_number = Some(String::new());
        let filter = parse_filter(&q).expect("filter");
        assert_eq!(filter.sku, None);
        assert_eq!(filter.order_number, None);
    }
}
