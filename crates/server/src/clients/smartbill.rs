//! Invoicing (SmartBill) REST client.
//!
//! Basic auth is `email:token` per request. Every endpoint also carries
//! the company CIF as a parameter. Document series are cached per tenant
//! for a short TTL because every bulk generation needs the active series.

use std::time::Duration;

use chrono::NaiveDate;
use moka::future::Cache;
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use facturio_core::SmartBillCredentials;

use super::{ClientError, basic_auth, check_status};
use crate::config::SmartBillEndpoint;

/// Per-request timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// How long cached document series stay fresh.
const SERIES_CACHE_TTL: Duration = Duration::from_secs(300);

/// Per-tenant cache of invoice document series.
pub type SeriesCache = Cache<i32, Vec<DocumentSeries>>;

/// Build the shared series cache.
#[must_use]
pub fn new_series_cache() -> SeriesCache {
    Cache::builder()
        .max_capacity(1_000)
        .time_to_live(SERIES_CACHE_TTL)
        .build()
}

// =============================================================================
// Wire types
// =============================================================================

/// Numeric-or-string fields: the invoicing API is inconsistent about
/// whether invoice numbers are JSON numbers or strings.
mod num_string {
    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<String, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum NumOrString {
            Num(i64),
            Str(String),
        }

        Ok(match NumOrString::deserialize(deserializer)? {
            NumOrString::Num(n) => n.to_string(),
            NumOrString::Str(s) => s,
        })
    }

    pub fn deserialize_opt<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct Wrapper(#[serde(deserialize_with = "deserialize")] String);

        Ok(Option::<Wrapper>::deserialize(deserializer)?.map(|w| w.0))
    }
}

/// A configured document series (e.g. invoice series "FCT").
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentSeries {
    pub name: String,
    #[serde(default, deserialize_with = "num_string::deserialize_opt")]
    pub next_number: Option<String>,
}

impl DocumentSeries {
    /// Next number zero-padded the way the invoicing UI displays it.
    #[must_use]
    pub fn padded_next_number(&self) -> String {
        format!("{:0>4}", self.next_number.as_deref().unwrap_or("1"))
    }
}

#[derive(Debug, Deserialize)]
struct SeriesListResponse {
    #[serde(default)]
    list: Vec<DocumentSeries>,
}

/// Response from invoice creation.
#[derive(Debug, Clone, Deserialize)]
pub struct IssuedInvoice {
    #[serde(default)]
    pub series: String,
    #[serde(default, deserialize_with = "num_string::deserialize")]
    pub number: String,
}

/// Filter for listing issued invoices.
#[derive(Debug, Clone, Default)]
pub struct InvoiceListFilter {
    pub series: Option<String>,
    pub number: Option<String>,
    /// Issue date, `YYYY-MM-DD`.
    pub issue_date: Option<String>,
}

/// A complete invoice payload for the invoicing API.
///
/// Produced by the invoice builder; this is the `submit` payload shape.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceDraft {
    pub company_vat_code: String,
    pub use_intra_cif: bool,
    pub series_name: String,
    pub client: DraftClient,
    /// Issue date, `YYYY-MM-DD`.
    pub issue_date: String,
    pub currency: String,
    pub use_stock: bool,
    pub products: Vec<DraftProduct>,
    pub order_number: String,
}

/// Invoice recipient.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DraftClient {
    pub name: String,
    pub vat_code: String,
    pub is_tax_payer: bool,
    pub address: String,
    pub city: String,
    pub county: String,
    pub country: String,
    pub email: String,
    pub save_to_db: bool,
}

/// One invoice line.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DraftProduct {
    pub code: String,
    pub name: String,
    pub product_description: String,
    pub measuring_unit_name: String,
    pub currency: String,
    pub quantity: u32,
    pub price: Decimal,
    pub is_tax_included: bool,
    pub tax_percentage: Decimal,
    pub save_to_db: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warehouse_name: Option<String>,
}

// =============================================================================
// Client
// =============================================================================

/// Invoicing API client for one tenant.
pub struct SmartBillClient {
    client: reqwest::Client,
    base_url: String,
    credentials: SmartBillCredentials,
}

impl SmartBillClient {
    /// Create a client for the given tenant credentials.
    #[must_use]
    pub fn new(endpoint: &SmartBillEndpoint, credentials: SmartBillCredentials) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();

        Self {
            client,
            base_url: endpoint.base_url.clone(),
            credentials,
        }
    }

    /// The tenant's configured warehouse name, if any.
    #[must_use]
    pub fn warehouse(&self) -> Option<&str> {
        self.credentials.warehouse.as_deref()
    }

    /// The tenant's company VAT code.
    #[must_use]
    pub fn company_cif(&self) -> &str {
        &self.credentials.company_cif
    }

    fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        let auth = basic_auth(&self.credentials.email, &self.credentials.token);
        if let Ok(value) = HeaderValue::from_str(&auth) {
            headers.insert(AUTHORIZATION, value);
        }
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers
    }

    /// Fetch document series of the given kind (`"f"` = invoice).
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Upstream` / `ClientError::Http` on failure.
    pub async fn document_series(&self, kind: &str) -> Result<Vec<DocumentSeries>, ClientError> {
        let url = format!("{}/series", self.base_url);

        let response = self
            .client
            .get(&url)
            .headers(self.headers())
            .query(&[("cif", self.credentials.company_cif.as_str()), ("type", kind)])
            .send()
            .await?;

        let body: SeriesListResponse = check_status(response).await?.json().await?;
        Ok(body.list)
    }

    /// Fetch invoice series, with per-tenant caching.
    ///
    /// # Errors
    ///
    /// Returns the underlying `ClientError` on a cache miss that fails.
    pub async fn invoice_series_cached(
        &self,
        cache: &SeriesCache,
        user_id: i32,
    ) -> Result<Vec<DocumentSeries>, ClientError> {
        if let Some(series) = cache.get(&user_id).await {
            return Ok(series);
        }

        let series = self.document_series("f").await?;
        cache.insert(user_id, series.clone()).await;
        Ok(series)
    }

    /// List issued invoices.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Upstream` / `ClientError::Http` on failure.
    pub async fn list_invoices(
        &self,
        filter: &InvoiceListFilter,
    ) -> Result<serde_json::Value, ClientError> {
        let url = format!("{}/invoice/list", self.base_url);

        let mut params: Vec<(&str, String)> =
            vec![("cif", self.credentials.company_cif.clone())];
        if let Some(series) = filter.series.as_deref().filter(|s| !s.is_empty()) {
            params.push(("seriesName", series.to_owned()));
        }
        if let Some(number) = filter.number.as_deref().filter(|s| !s.is_empty()) {
            params.push(("number", number.to_owned()));
        }
        if let Some(date) = filter.issue_date.as_deref().filter(|s| !s.is_empty()) {
            params.push(("issueDate", date.to_owned()));
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

    /// Create an invoice from a draft.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Upstream` with the remote status and body on
    /// rejection (bad data, auth, plan limits).
    pub async fn create_invoice(&self, draft: &InvoiceDraft) -> Result<IssuedInvoice, ClientError> {
        let url = format!("{}/invoice", self.base_url);

        let response = self
            .client
            .post(&url)
            .headers(self.headers())
            .json(draft)
            .send()
            .await?;

        Ok(check_status(response).await?.json().await?)
    }

    /// Download an invoice PDF.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::NotFound` when the invoice does not exist,
    /// `ClientError::Upstream` / `ClientError::Http` otherwise.
    pub async fn invoice_pdf(&self, series: &str, number: &str) -> Result<Vec<u8>, ClientError> {
        let url = format!("{}/invoice/pdf", self.base_url);

        let mut headers = self.headers();
        headers.insert(ACCEPT, HeaderValue::from_static("application/octet-stream"));

        let response = self
            .client
            .get(&url)
            .headers(headers)
            .query(&[
                ("cif", self.credentials.company_cif.as_str()),
                ("seriesname", series),
                ("number", number),
            ])
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(ClientError::NotFound(format!("invoice {series}-{number}")));
        }

        Ok(check_status(response).await?.bytes().await?.to_vec())
    }

    /// Issue a reversal (storno) invoice.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::NotFound` when the invoice does not exist,
    /// `ClientError::Upstream` / `ClientError::Http` otherwise.
    pub async fn reverse_invoice(
        &self,
        series: &str,
        number: &str,
        issue_date: NaiveDate,
    ) -> Result<serde_json::Value, ClientError> {
        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct ReversePayload<'a> {
            company_vat_code: &'a str,
            series_name: &'a str,
            number: &'a str,
            issue_date: String,
        }

        let url = format!("{}/invoice/reverse", self.base_url);

        let payload = ReversePayload {
            company_vat_code: &self.credentials.company_cif,
            series_name: series,
            number,
            issue_date: issue_date.format("%Y-%m-%d").to_string(),
        };

        let response = self
            .client
            .post(&url)
            .headers(self.headers())
            .json(&payload)
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(ClientError::NotFound(format!("invoice {series}-{number}")));
        }

        Ok(check_status(response).await?.json().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_series_parses_numeric_next_number() {
        let body = r#"{"list": [{"name": "FCT", "nextNumber": 17}]}"#;
        let parsed: SeriesListResponse = serde_json::from_str(body).expect("parse");
        assert_eq!(parsed.list[0].name, "FCT");
        assert_eq!(parsed.list[0].next_number.as_deref(), Some("17"));
        assert_eq!(parsed.list[0].padded_next_number(), "0017");
    }

    #[test]
    fn test_series_parses_string_next_number() {
        let body = r#"{"list": [{"name": "FCT", "nextNumber": "0042"}]}"#;
        let parsed: SeriesListResponse = serde_json::from_str(body).expect("parse");
        assert_eq!(parsed.list[0].padded_next_number(), "0042");
    }

    #[test]
    fn test_issued_invoice_parses_either_number_form() {
        let issued: IssuedInvoice =
            serde_json::from_str(r#"{"series": "FCT", "number": 12}"#).expect("parse");
        assert_eq!(issued.number, "12");

        let issued: IssuedInvoice =
            serde_json::from_str(r#"{"series": "FCT", "number": "0012"}"#).expect("parse");
        assert_eq!(issued.number, "0012");
    }

    #[test]
    fn test_draft_serializes_camel_case() {
        let draft = InvoiceDraft {
            company_vat_code: "RO123".into(),
            use_intra_cif: false,
            series_name: "FCT".into(),
            client: DraftClient {
                name: "Ion Popescu".into(),
                vat_code: "-".into(),
                is_tax_payer: false,
                address: "Str. Lunga 1".into(),
                city: "Brasov".into(),
                county: "Brasov".into(),
                country: "RO".into(),
                email: String::new(),
                save_to_db: true,
            },
            issue_date: "2026-03-01".into(),
            currency: "RON".into(),
            use_stock: false,
            products: vec![],
            order_number: "80300246".into(),
        };

        let json = serde_json::to_value(&draft).expect("serialize");
        assert_eq!(json["companyVatCode"], "RO123");
        assert_eq!(json["seriesName"], "FCT");
        assert_eq!(json["client"]["saveToDb"], true);
        assert_eq!(json["orderNumber"], "80300246");
    }

    #[test]
    fn test_draft_product_omits_absent_warehouse() {
        let product = DraftProduct {
            code: "C1".into(),
            name: "Lamp".into(),
            product_description: String::new(),
            measuring_unit_name: "buc".into(),
            currency: "RON".into(),
            quantity: 1,
            price: Decimal::new(1205, 1),
            is_tax_included: true,
            tax_percentage: Decimal::new(19, 0),
            save_to_db: false,
            warehouse_name: None,
        };

        let json = serde_json::to_value(&product).expect("serialize");
        assert!(json.get("warehouseName").is_none());
        assert_eq!(json["measuringUnitName"], "buc");
    }
}
