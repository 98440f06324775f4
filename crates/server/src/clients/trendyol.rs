//! Marketplace (Trendyol) REST client.
//!
//! Orders come from the integration API; labels, products, and shipment
//! packages from the legacy supplier API. Dates in filters are
//! interpreted in the tenant's timezone (Europe/Bucharest) and sent as
//! epoch milliseconds.
//!
//! The remote API accepts a single status per request. Multi-status
//! filters fan out one fetch sequence per status; results are merged,
//! de-duplicated by order id, and kept in the remote ordering
//! (creation date ascending) before local pagination.

use std::collections::HashSet;
use std::time::Duration;

use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, Weekday};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, USER_AGENT};
use serde::Serialize;

use facturio_core::{OrderStatus, TrendyolCredentials};

use super::types::{Order, Paged, Product};
use super::{ClientError, basic_auth, check_status};
use crate::config::TrendyolEndpoints;

/// Page size used when exhaustively fetching (remote maximum).
const FETCH_PAGE_SIZE: u32 = 200;

/// Per-request timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const CLIENT_USER_AGENT: &str = "facturio/0.1";

/// Filter for order listings.
#[derive(Debug, Clone, Default)]
pub struct OrderFilter {
    /// Statuses to include; empty means all.
    pub statuses: Vec<OrderStatus>,
    /// Start of the date range (`YYYY-MM-DD` or `YYYY-MM-DDTHH:MM:SS`).
    pub start_date: Option<String>,
    /// End of the date range, same formats.
    pub end_date: Option<String>,
    /// Exact order number.
    pub order_number: Option<String>,
    /// Substring match against line SKUs/barcodes (applied client-side;
    /// the remote API has no SKU filter).
    pub sku: Option<String>,
}

/// Marketplace API client for one tenant.
///
/// Constructed per request from the tenant's decrypted credentials;
/// authentication is stateless Basic auth on every call.
pub struct TrendyolClient {
    client: reqwest::Client,
    base_url: String,
    integration_base_url: String,
    credentials: TrendyolCredentials,
}

impl TrendyolClient {
    /// Create a client for the given tenant credentials.
    #[must_use]
    pub fn new(endpoints: &TrendyolEndpoints, credentials: TrendyolCredentials) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();

        Self {
            client,
            base_url: endpoints.base_url.clone(),
            integration_base_url: endpoints.integration_base_url.clone(),
            credentials,
        }
    }

    fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        let auth = basic_auth(&self.credentials.api_key, &self.credentials.api_secret);
        if let Ok(value) = HeaderValue::from_str(&auth) {
            headers.insert(AUTHORIZATION, value);
        }
        headers.insert(USER_AGENT, HeaderValue::from_static(CLIENT_USER_AGENT));
        headers
    }

    // =========================================================================
    // Orders
    // =========================================================================

    /// List orders for the given filter and page.
    ///
    /// Single-status filters map straight onto one upstream request.
    /// Multi-status and SKU filters require exhaustive fetching with
    /// local merge/filter/pagination.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Upstream` with the remote status on a
    /// non-2xx response, `ClientError::Http` on transport failure.
    pub async fn list_orders(
        &self,
        filter: &OrderFilter,
        page: u32,
        size: u32,
    ) -> Result<Paged<Order>, ClientError> {
        if filter.statuses.len() > 1 || filter.sku.is_some() {
            let orders = self.fetch_all_orders(filter).await?;
            return Ok(paginate(orders, page, size));
        }

        self.fetch_orders_page(filter, filter.statuses.first().copied(), page, size)
            .await
    }

    /// Fetch every order matching the filter (all pages, all statuses).
    ///
    /// This is the listing the bulk orchestrator runs over.
    ///
    /// # Errors
    ///
    /// Returns an error only if the very first page of a status fetch
    /// fails; later page failures degrade to partial results.
    pub async fn fetch_all_orders(&self, filter: &OrderFilter) -> Result<Vec<Order>, ClientError> {
        let statuses: Vec<Option<OrderStatus>> = if filter.statuses.is_empty() {
            vec![None]
        } else {
            filter.statuses.iter().copied().map(Some).collect()
        };

        let mut batches = Vec::with_capacity(statuses.len());
        for status in statuses {
            batches.push(self.fetch_all_for_status(filter, status).await?);
        }

        let mut orders = merge_status_batches(batches);
        if let Some(sku) = filter.sku.as_deref() {
            orders.retain(|order| order_matches_sku(order, sku));
        }

        Ok(orders)
    }

    /// Fetch all pages for one status.
    async fn fetch_all_for_status(
        &self,
        filter: &OrderFilter,
        status: Option<OrderStatus>,
    ) -> Result<Vec<Order>, ClientError> {
        let mut orders = Vec::new();
        let mut page = 0;

        loop {
            match self.fetch_orders_page(filter, status, page, FETCH_PAGE_SIZE).await {
                Ok(result) => {
                    let count = result.content.len();
                    orders.extend(result.content);
                    if count < FETCH_PAGE_SIZE as usize {
                        break;
                    }
                    page += 1;
                }
                Err(e) if page == 0 => return Err(e),
                Err(e) => {
                    // Later page failed: keep the partial result.
                    tracing::warn!(page, error = %e, "order page fetch failed, using partial results");
                    break;
                }
            }
        }

        Ok(orders)
    }

    /// One upstream order page.
    async fn fetch_orders_page(
        &self,
        filter: &OrderFilter,
        status: Option<OrderStatus>,
        page: u32,
        size: u32,
    ) -> Result<Paged<Order>, ClientError> {
        let url = format!(
            "{}/order/sellers/{}/orders",
            self.integration_base_url, self.credentials.supplier_id
        );

        let mut params: Vec<(&str, String)> = vec![
            ("page", page.to_string()),
            ("size", size.to_string()),
            ("orderByField", "CreatedDate".to_owned()),
            ("orderByDirection", "ASC".to_owned()),
        ];
        if let Some(status) = status {
            params.push(("status", status.as_str().to_owned()));
        }
        push_date_param(&mut params, "startDate", filter.start_date.as_deref());
        push_date_param(&mut params, "endDate", filter.end_date.as_deref());
        if let Some(order_number) = filter.order_number.as_deref().filter(|s| !s.is_empty()) {
            params.push(("orderNumber", order_number.to_owned()));
        }

        let response = self
            .client
            .get(&url)
            .headers(self.headers())
            .query(&params)
            .send()
            .await?;

        Ok(check_status(response).await?.json().await?)
    }

    // =========================================================================
    // Shipment packages, products, labels
    // =========================================================================

    /// List shipment packages (same page/filter parameters as orders).
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Upstream` / `ClientError::Http` on failure.
    pub async fn list_shipment_packages(
        &self,
        filter: &OrderFilter,
        page: u32,
        size: u32,
    ) -> Result<Paged<Order>, ClientError> {
        let url = format!(
            "{}/suppliers/{}/shipment-packages",
            self.base_url, self.credentials.supplier_id
        );

        let mut params: Vec<(&str, String)> =
            vec![("page", page.to_string()), ("size", size.to_string())];
        if let Some(status) = filter.statuses.first() {
            params.push(("status", status.as_str().to_owned()));
        }
        push_date_param(&mut params, "startDate", filter.start_date.as_deref());
        push_date_param(&mut params, "endDate", filter.end_date.as_deref());
        if let Some(order_number) = filter.order_number.as_deref().filter(|s| !s.is_empty()) {
            params.push(("orderNumber", order_number.to_owned()));
        }

        let response = self
            .client
            .get(&url)
            .headers(self.headers())
            .query(&params)
            .send()
            .await?;

        Ok(check_status(response).await?.json().await?)
    }

    /// List product catalog entries.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Upstream` / `ClientError::Http` on failure.
    pub async fn list_products(
        &self,
        page: u32,
        size: u32,
        barcode: Option<&str>,
        approved: Option<bool>,
    ) -> Result<Paged<Product>, ClientError> {
        let url = format!(
            "{}/suppliers/{}/products",
            self.base_url, self.credentials.supplier_id
        );

        let mut params: Vec<(&str, String)> =
            vec![("page", page.to_string()), ("size", size.to_string())];
        if let Some(barcode) = barcode.filter(|b| !b.is_empty()) {
            params.push(("barcode", barcode.to_owned()));
        }
        if let Some(approved) = approved {
            params.push(("approved", approved.to_string()));
        }

        let response = self
            .client
            .get(&url)
            .headers(self.headers())
            .query(&params)
            .send()
            .await?;

        Ok(check_status(response).await?.json().await?)
    }

    /// Download the shipping label PDF for a shipment package.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::NotFound` when no label exists yet,
    /// `ClientError::Upstream` / `ClientError::Http` otherwise.
    pub async fn shipping_label(&self, package_id: i64) -> Result<Vec<u8>, ClientError> {
        let url = format!(
            "{}/suppliers/{}/shipment-packages/{package_id}/cargo-label",
            self.base_url, self.credentials.supplier_id
        );

        let response = self.client.get(&url).headers(self.headers()).send().await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(ClientError::NotFound(format!("label for package {package_id}")));
        }
        let response = check_status(response).await?;
        if response.status() == reqwest::StatusCode::NO_CONTENT {
            return Err(ClientError::NotFound(format!("label for package {package_id}")));
        }

        Ok(response.bytes().await?.to_vec())
    }

    // =========================================================================
    // Invoice submission
    // =========================================================================

    /// Attach an externally hosted invoice link to a shipment package.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Upstream` / `ClientError::Http` on failure.
    pub async fn send_invoice_link(
        &self,
        package_id: i64,
        invoice_link: &str,
        invoice_number: Option<&str>,
        invoice_date_millis: Option<i64>,
    ) -> Result<(), ClientError> {
        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct InvoiceLinkPayload<'a> {
            shipment_package_id: i64,
            invoice_link: &'a str,
            #[serde(skip_serializing_if = "Option::is_none")]
            invoice_number: Option<&'a str>,
            #[serde(skip_serializing_if = "Option::is_none")]
            invoice_date_time: Option<i64>,
        }

        let url = format!(
            "{}/sellers/{}/seller-invoice-links",
            self.integration_base_url, self.credentials.supplier_id
        );

        let payload = InvoiceLinkPayload {
            shipment_package_id: package_id,
            invoice_link,
            invoice_number,
            invoice_date_time: invoice_date_millis,
        };

        let response = self
            .client
            .post(&url)
            .headers(self.headers())
            .json(&payload)
            .send()
            .await?;

        check_status(response).await?;
        Ok(())
    }

    /// Upload an invoice PDF to a shipment package.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Upstream` / `ClientError::Http` on failure.
    pub async fn upload_invoice_file(
        &self,
        package_id: i64,
        pdf: Vec<u8>,
        filename: &str,
        invoice_number: Option<&str>,
        invoice_date_millis: Option<i64>,
    ) -> Result<(), ClientError> {
        let url = format!(
            "{}/sellers/{}/seller-invoice-file",
            self.integration_base_url, self.credentials.supplier_id
        );

        let part = reqwest::multipart::Part::bytes(pdf)
            .file_name(filename.to_owned())
            .mime_str("application/pdf")?;

        let mut form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("shipmentPackageId", package_id.to_string());
        if let Some(number) = invoice_number {
            form = form.text("invoiceNumber", number.to_owned());
        }
        if let Some(millis) = invoice_date_millis {
            form = form.text("invoiceDateTime", millis.to_string());
        }

        let response = self
            .client
            .post(&url)
            .headers(self.headers())
            .multipart(form)
            .send()
            .await?;

        check_status(response).await?;
        Ok(())
    }
}

// =============================================================================
// Pure helpers (merge, pagination, SKU filter, timezone)
// =============================================================================

/// Merge per-status fetch batches: de-duplicate by order id keeping the
/// first occurrence, then restore the remote ordering (creation date
/// ascending; an order can surface under several statuses).
fn merge_status_batches(batches: Vec<Vec<Order>>) -> Vec<Order> {
    let mut seen = HashSet::new();
    let mut merged: Vec<Order> = batches
        .into_iter()
        .flatten()
        .filter(|order| seen.insert(order.id))
        .collect();

    merged.sort_by_key(|order| order.order_date);
    merged
}

/// Apply local pagination to a fully fetched listing.
fn paginate(orders: Vec<Order>, page: u32, size: u32) -> Paged<Order> {
    let total = orders.len() as u64;
    let total_pages = if size == 0 { 0 } else { total.div_ceil(u64::from(size)) as u32 };

    let start = (page as usize).saturating_mul(size as usize);
    let content: Vec<Order> = orders.into_iter().skip(start).take(size as usize).collect();

    Paged {
        size: content.len() as u32,
        content,
        page,
        total_elements: total,
        total_pages,
    }
}

/// Whether any line of the order matches the SKU substring filter.
fn order_matches_sku(order: &Order, sku: &str) -> bool {
    let needle = sku.to_lowercase();
    order.lines.iter().any(|line| {
        let matches = |v: Option<&String>| {
            v.is_some_and(|s| s.to_lowercase().contains(&needle))
        };
        matches(line.merchant_sku.as_ref()) || matches(line.barcode.as_ref())
    })
}

/// Push a date filter parameter as epoch millis, interpreted in the
/// tenant's timezone. Unparseable input is skipped.
fn push_date_param(params: &mut Vec<(&str, String)>, name: &'static str, value: Option<&str>) {
    let Some(raw) = value.filter(|v| !v.is_empty()) else {
        return;
    };
    match parse_date_input(raw) {
        Some(local) => params.push((name, bucharest_to_epoch_millis(local).to_string())),
        None => tracing::warn!(value = raw, param = name, "unparseable date filter, skipping"),
    }
}

/// Parse `YYYY-MM-DD` or `YYYY-MM-DDTHH:MM:SS` into a naive local time.
fn parse_date_input(value: &str) -> Option<NaiveDateTime> {
    if let Ok(dt) = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S") {
        return Some(dt);
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .map(|d| d.and_time(NaiveTime::MIN))
}

/// Last Sunday of a month, if the month is valid.
fn last_sunday_of(year: i32, month: u32) -> Option<NaiveDate> {
    (22..=31)
        .rev()
        .filter_map(|day| NaiveDate::from_ymd_opt(year, month, day))
        .find(|date| date.weekday() == Weekday::Sun)
}

/// UTC offset (hours) of Europe/Bucharest at a naive local time.
///
/// EET is UTC+2; EEST (UTC+3) runs from the last Sunday of March 03:00
/// local to the last Sunday of October 04:00 local (EU rule).
fn bucharest_offset_hours(local: NaiveDateTime) -> i64 {
    let year = local.date().year();
    let (Some(start_day), Some(end_day)) = (last_sunday_of(year, 3), last_sunday_of(year, 10))
    else {
        return 2;
    };

    let dst_start = start_day.and_hms_opt(3, 0, 0);
    let dst_end = end_day.and_hms_opt(4, 0, 0);
    match (dst_start, dst_end) {
        (Some(start), Some(end)) if local >= start && local < end => 3,
        _ => 2,
    }
}

/// Convert a naive Bucharest-local datetime to epoch milliseconds.
pub(crate) fn bucharest_to_epoch_millis(local: NaiveDateTime) -> i64 {
    let offset_ms = bucharest_offset_hours(local) * 3_600_000;
    local.and_utc().timestamp_millis() - offset_ms
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order(id: i64, number: &str, date: i64) -> Order {
        serde_json::from_value(serde_json::json!({
            "id": id,
            "orderNumber": number,
            "orderDate": date,
        }))
        .expect("order fixture")
    }

    fn order_with_line(id: i64, merchant_sku: &str, barcode: &str) -> Order {
        serde_json::from_value(serde_json::json!({
            "id": id,
            "orderNumber": id.to_string(),
            "lines": [{"merchantSku": merchant_sku, "barcode": barcode}],
        }))
        .expect("order fixture")
    }

    #[test]
    fn test_merge_deduplicates_and_preserves_remote_order() {
        // Order 2 appears under both statuses; union must contain it once,
        // sorted by creation date ascending like the remote listing.
        let created = vec![order(1, "A", 100), order(2, "B", 200)];
        let shipped = vec![order(2, "B", 200), order(3, "C", 150)];

        let merged = merge_status_batches(vec![created, shipped]);
        let ids: Vec<i64> = merged.iter().map(|o| o.id).collect();
        assert_eq!(ids, vec![1, 3, 2]);
    }

    #[test]
    fn test_merge_of_disjoint_batches_is_union() {
        let a = vec![order(1, "A", 10)];
        let b = vec![order(2, "B", 20)];
        let merged = merge_status_batches(vec![a, b]);
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn test_paginate_windows() {
        let orders: Vec<Order> = (0..5).map(|i| order(i, "N", i)).collect();
        let page = paginate(orders.clone(), 1, 2);
        assert_eq!(page.content.len(), 2);
        assert_eq!(page.content[0].id, 2);
        assert_eq!(page.total_elements, 5);
        assert_eq!(page.total_pages, 3);

        let past_end = paginate(orders, 9, 2);
        assert!(past_end.content.is_empty());
        assert_eq!(past_end.total_pages, 3);
    }

    #[test]
    fn test_sku_filter_matches_merchant_sku_and_barcode() {
        let o = order_with_line(1, "LAMP-RED-01", "5941234567890");
        assert!(order_matches_sku(&o, "lamp-red"));
        assert!(order_matches_sku(&o, "594123"));
        assert!(!order_matches_sku(&o, "chair"));
    }

    #[test]
    fn test_parse_date_input_formats() {
        assert_eq!(
            parse_date_input("2026-01-15"),
            NaiveDate::from_ymd_opt(2026, 1, 15).map(|d| d.and_time(NaiveTime::MIN))
        );
        assert!(parse_date_input("2026-01-15T10:30:00").is_some());
        assert!(parse_date_input("15.01.2026").is_none());
    }

    #[test]
    fn test_last_sunday() {
        // March 2026: Sundays fall on 1, 8, 15, 22, 29.
        assert_eq!(last_sunday_of(2026, 3), NaiveDate::from_ymd_opt(2026, 3, 29));
        // October 2026: last Sunday is the 25th.
        assert_eq!(last_sunday_of(2026, 10), NaiveDate::from_ymd_opt(2026, 10, 25));
    }

    #[test]
    fn test_bucharest_offset_winter_and_summer() {
        let winter = parse_date_input("2026-01-15").expect("date");
        assert_eq!(bucharest_offset_hours(winter), 2);

        let summer = parse_date_input("2026-07-15").expect("date");
        assert_eq!(bucharest_offset_hours(summer), 3);
    }

    #[test]
    fn test_bucharest_offset_dst_boundaries() {
        // Midnight on the switch day is still EET; past 03:00 local it is EEST.
        let before = parse_date_input("2026-03-29").expect("date");
        assert_eq!(bucharest_offset_hours(before), 2);

        let after = parse_date_input("2026-03-29T04:00:00").expect("date");
        assert_eq!(bucharest_offset_hours(after), 3);

        let autumn_end = parse_date_input("2026-10-25T05:00:00").expect("date");
        assert_eq!(bucharest_offset_hours(autumn_end), 2);
    }

    #[test]
    fn test_bucharest_to_epoch_millis() {
        // 2026-01-15 00:00 EET == 2026-01-14 22:00 UTC.
        let local = parse_date_input("2026-01-15").expect("date");
        let expected = NaiveDate::from_ymd_opt(2026, 1, 14)
            .and_then(|d| d.and_hms_opt(22, 0, 0))
            .expect("date")
            .and_utc()
            .timestamp_millis();
        assert_eq!(bucharest_to_epoch_millis(local), expected);
    }
}
