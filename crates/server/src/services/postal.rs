//! Romanian postal-code lookup.
//!
//! Backed by scraping a public lookup page, which is not a stable API:
//! any fetch or parse failure degrades to `None`. The result is advisory
//! only; invoice generation proceeds with blank address fields when the
//! lookup fails.

use std::time::Duration;

use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};

const DEFAULT_BASE_URL: &str = "https://www.coduripostale.net";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Browser-like agent: the lookup page rejects obvious bots.
const LOOKUP_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

/// City and county resolved from a postal code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressHint {
    pub city: String,
    pub county: String,
}

/// Scraper-backed postal code directory.
#[derive(Clone)]
pub struct PostalLookup {
    client: reqwest::Client,
    base_url: String,
}

impl Default for PostalLookup {
    fn default() -> Self {
        Self::new()
    }
}

impl PostalLookup {
    /// Create a lookup against the public page.
    #[must_use]
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    /// Create a lookup against a custom base URL (tests).
    #[must_use]
    pub fn with_base_url(base_url: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(LOOKUP_USER_AGENT)
            .build()
            .unwrap_or_default();

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_owned(),
        }
    }

    /// Resolve a postal code to city/county.
    ///
    /// Returns `None` for unknown codes, malformed markup, or any
    /// transport failure.
    pub async fn lookup(&self, postal_code: &str) -> Option<AddressHint> {
        let code = postal_code.trim();
        if code.is_empty() || !code.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }

        let url = format!("{}/{code}", self.base_url);
        let response = match self.client.get(&url).send().await {
            Ok(r) if r.status().is_success() => r,
            Ok(r) => {
                tracing::debug!(code, status = %r.status(), "postal lookup non-success");
                return None;
            }
            Err(e) => {
                tracing::debug!(code, error = %e, "postal lookup request failed");
                return None;
            }
        };

        let html = response.text().await.ok()?;
        parse_hint(&html)
    }
}

/// Extract the hint from the lookup page markup.
///
/// The result table's second row carries the city in column 3 and the
/// county in column 4; anything else is treated as "not found".
fn parse_hint(html: &str) -> Option<AddressHint> {
    let document = Html::parse_document(html);
    let table_sel = Selector::parse("table").ok()?;
    let row_sel = Selector::parse("tr").ok()?;
    let cell_sel = Selector::parse("td").ok()?;

    let table = document.select(&table_sel).next()?;
    let row = table.select(&row_sel).nth(1)?;
    let cells: Vec<String> = row
        .select(&cell_sel)
        .map(|cell| cell.text().collect::<String>().trim().to_owned())
        .collect();

    if cells.len() < 4 {
        return None;
    }

    let city = cells[2].clone();
    let county = cells[3].clone();
    if city.is_empty() && county.is_empty() {
        return None;
    }

    Some(AddressHint { city, county })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_PAGE: &str = r#"
        <html><body>
        <table>
            <tr><th>Cod</th><th>Strada</th><th>Localitate</th><th>Judet</th></tr>
            <tr><td>010101</td><td>Str. Victoriei</td><td> Bucuresti </td><td>Sector 1</td></tr>
        </table>
        </body></html>
    "#;

    #[test]
    fn test_parse_hint_from_result_table() {
        let hint = parse_hint(SAMPLE_PAGE).expect("hint");
        assert_eq!(hint.city, "Bucuresti");
        assert_eq!(hint.county, "Sector 1");
    }

    #[test]
    fn test_parse_hint_missing_table() {
        assert_eq!(parse_hint("<html><body><p>no results</p></body></html>"), None);
    }

    #[test]
    fn test_parse_hint_header_only_table() {
        let html = "<table><tr><th>Cod</th></tr></table>";
        assert_eq!(parse_hint(html), None);
    }

    #[test]
    fn test_parse_hint_too_few_columns() {
        let html = "<table><tr><th>a</th></tr><tr><td>1</td><td>2</td></tr></table>";
        assert_eq!(parse_hint(html), None);
    }

    #[test]
    fn test_parse_hint_tolerates_broken_markup() {
        // Unclosed tags still parse; missing cells still mean not-found.
        let html = "<table><tr><td>1<td>2<tr><td>only";
        assert_eq!(parse_hint(html), None);
    }

    #[tokio::test]
    async fn test_lookup_rejects_non_numeric_codes() {
        let lookup = PostalLookup::with_base_url("http://127.0.0.1:9");
        assert_eq!(lookup.lookup("abc123").await, None);
        assert_eq!(lookup.lookup("").await, None);
    }

    #[tokio::test]
    async fn test_lookup_degrades_on_connection_failure() {
        // Port 9 (discard) refuses connections; lookup must return None,
        // never an error.
        let lookup = PostalLookup::with_base_url("http://127.0.0.1:9");
        assert_eq!(lookup.lookup("010101").await, None);
    }
}
