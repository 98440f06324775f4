//! Invoice draft builder.
//!
//! Pure transformation from a marketplace order (plus advisory address
//! hint and tenant profile) into the invoicing API's payload. No I/O and
//! no clock access: the issue date is an input, so identical inputs give
//! identical drafts and bulk runs are reproducible.

use chrono::NaiveDate;

use crate::clients::smartbill::{DraftClient, DraftProduct, InvoiceDraft};
use crate::clients::types::Order;
use crate::services::postal::AddressHint;

/// Unit name used on every invoice line ("bucata" = piece).
const MEASURING_UNIT: &str = "buc";

/// Tenant-level invoicing profile.
#[derive(Debug, Clone)]
pub struct InvoiceProfile {
    /// Company VAT code (CIF) the invoice is issued under.
    pub company_vat_code: String,
    /// Active invoice series name, without the OSS suffix.
    pub series_name: String,
    /// Warehouse ("gestiune") for stock tracking; `None` disables stock.
    pub warehouse: Option<String>,
}

/// Build an invoice draft for one order.
///
/// Address resolution: the order's invoice address wins, falling back to
/// the shipment address; the postal hint fills the city only when the
/// order has none and always supplies the county when present. A missing
/// hint leaves the fields blank for manual completion.
///
/// Non-RON orders are treated as OSS sales: the series gets an `-OSS`
/// suffix and `useIntraCif` is set.
#[must_use]
pub fn build_draft(
    order: &Order,
    hint: Option<&AddressHint>,
    profile: &InvoiceProfile,
    issue_date: NaiveDate,
) -> InvoiceDraft {
    let currency = order.currency().to_owned();
    let is_oss = currency != "RON";

    let series_name = if is_oss {
        format!("{}-OSS", profile.series_name.trim_end_matches("-OSS"))
    } else {
        profile.series_name.clone()
    };

    let address = order.billing_address();
    let mut city = address
        .and_then(|a| a.city.clone())
        .unwrap_or_default();
    let mut county = address
        .and_then(|a| a.district.clone())
        .unwrap_or_default();
    if let Some(hint) = hint {
        if city.is_empty() {
            city.clone_from(&hint.city);
        }
        county.clone_from(&hint.county);
    }

    let products = order
        .lines
        .iter()
        .map(|line| DraftProduct {
            code: line.invoice_code(),
            name: line.product_name.clone().unwrap_or_default(),
            product_description: format!("Numar comanda Trendyol:{}", order.order_number),
            measuring_unit_name: MEASURING_UNIT.to_owned(),
            currency: currency.clone(),
            quantity: line.quantity,
            price: line.price,
            is_tax_included: true,
            tax_percentage: line.vat_rate,
            save_to_db: false,
            warehouse_name: profile.warehouse.clone(),
        })
        .collect();

    InvoiceDraft {
        company_vat_code: profile.company_vat_code.clone(),
        use_intra_cif: is_oss,
        series_name,
        client: DraftClient {
            name: order.customer_name(),
            // Marketplace buyers are consumers; the identity number the
            // marketplace sends is a redacted placeholder.
            vat_code: "-".to_owned(),
            is_tax_payer: false,
            address: address.and_then(|a| a.address1.clone()).unwrap_or_default(),
            city,
            county,
            country: address
                .and_then(|a| a.country_code.clone())
                .unwrap_or_else(|| "RO".to_owned()),
            email: order.customer_email.clone().unwrap_or_default(),
            save_to_db: true,
        },
        issue_date: issue_date.format("%Y-%m-%d").to_string(),
        currency,
        use_stock: profile.warehouse.is_some(),
        products,
        order_number: order.order_number.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture_order() -> Order {
        serde_json::from_value(serde_json::json!({
            "id": 11650604,
            "orderNumber": "80300246",
            "orderDate": 1542801149863_i64,
            "currencyCode": "RON",
            "customerFirstName": "Ion",
            "customerLastName": "Popescu",
            "customerEmail": "ion@example.com",
            "invoiceAddress": {
                "address1": "Str. Lunga 12",
                "city": "Brasov",
                "district": "Brasov",
                "countryCode": "RO",
                "postalCode": "500035"
            },
            "lines": [
                {"merchantSku": "LAMP-01", "productName": "Veioza", "quantity": 2,
                 "price": 120.5, "vatRate": 19},
                {"barcode": "5941234567890", "productName": "Bec", "quantity": 1,
                 "price": 15.0, "vatRate": 19}
            ]
        }))
        .expect("order fixture")
    }

    fn profile() -> InvoiceProfile {
        InvoiceProfile {
            company_vat_code: "RO12345678".into(),
            series_name: "FCT".into(),
            warehouse: Some("Depozit central".into()),
        }
    }

    fn issue_date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 1).expect("date")
    }

    #[test]
    fn test_build_is_deterministic() {
        let order = fixture_order();
        let a = build_draft(&order, None, &profile(), issue_date());
        let b = build_draft(&order, None, &profile(), issue_date());
        assert_eq!(a, b);
    }

    #[test]
    fn test_line_mapping() {
        let draft = build_draft(&fixture_order(), None, &profile(), issue_date());

        assert_eq!(draft.products.len(), 2);
        let first = &draft.products[0];
        assert_eq!(first.code, "LAMP-01");
        assert_eq!(first.quantity, 2);
        assert_eq!(first.measuring_unit_name, "buc");
        assert!(first.is_tax_included);
        assert_eq!(first.product_description, "Numar comanda Trendyol:80300246");
        assert_eq!(first.warehouse_name.as_deref(), Some("Depozit central"));

        // Barcode-only line falls back to the barcode as product code.
        assert_eq!(draft.products[1].code, "5941234567890");
    }

    #[test]
    fn test_stock_follows_warehouse_presence() {
        let with = build_draft(&fixture_order(), None, &profile(), issue_date());
        assert!(with.use_stock);

        let mut no_warehouse = profile();
        no_warehouse.warehouse = None;
        let without = build_draft(&fixture_order(), None, &no_warehouse, issue_date());
        assert!(!without.use_stock);
        assert_eq!(without.products[0].warehouse_name, None);
    }

    #[test]
    fn test_address_from_order_wins_city_hint_wins_county() {
        let hint = AddressHint {
            city: "Alt oras".into(),
            county: "Judetul corect".into(),
        };
        let draft = build_draft(&fixture_order(), Some(&hint), &profile(), issue_date());

        // Order already has a city, so the hint does not replace it,
        // but the county from the lookup is authoritative.
        assert_eq!(draft.client.city, "Brasov");
        assert_eq!(draft.client.county, "Judetul corect");
    }

    #[test]
    fn test_missing_lookup_leaves_blank_address_fields() {
        let order: Order = serde_json::from_value(serde_json::json!({
            "id": 1,
            "orderNumber": "X1",
            "lines": []
        }))
        .expect("order");

        let draft = build_draft(&order, None, &profile(), issue_date());
        assert_eq!(draft.client.city, "");
        assert_eq!(draft.client.county, "");
        assert_eq!(draft.client.address, "");
        assert_eq!(draft.client.country, "RO");
        assert_eq!(draft.client.name, "N/A");
    }

    #[test]
    fn test_oss_series_for_foreign_currency() {
        let mut order = fixture_order();
        order.currency_code = Some("EUR".into());

        let draft = build_draft(&order, None, &profile(), issue_date());
        assert_eq!(draft.series_name, "FCT-OSS");
        assert!(draft.use_intra_cif);
        assert_eq!(draft.currency, "EUR");

        // An already-suffixed series is not doubled.
        let mut oss_profile = profile();
        oss_profile.series_name = "FCT-OSS".into();
        let draft = build_draft(&order, None, &oss_profile, issue_date());
        assert_eq!(draft.series_name, "FCT-OSS");
    }

    #[test]
    fn test_ron_order_keeps_plain_series() {
        let draft = build_draft(&fixture_order(), None, &profile(), issue_date());
        assert_eq!(draft.series_name, "FCT");
        assert!(!draft.use_intra_cif);
        assert_eq!(draft.issue_date, "2026-03-01");
    }
}
