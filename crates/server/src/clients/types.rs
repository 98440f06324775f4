//! Wire types for the marketplace API.
//!
//! Field names follow the remote JSON (camelCase). Most fields are
//! optional on the wire; defaults keep deserialization tolerant of
//! payload evolution.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One page of a paginated marketplace response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Paged<T> {
    #[serde(default = "Vec::new")]
    pub content: Vec<T>,
    #[serde(default)]
    pub page: u32,
    #[serde(default)]
    pub size: u32,
    #[serde(default)]
    pub total_elements: u64,
    #[serde(default)]
    pub total_pages: u32,
}

impl<T> Paged<T> {
    /// Whether a further page exists after this one.
    #[must_use]
    pub fn has_more(&self) -> bool {
        self.page + 1 < self.total_pages
    }
}

/// A marketplace order (shipment package) snapshot.
///
/// Read-only: fetched from the marketplace, never stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    /// Shipment package id; the upload endpoints key on this.
    pub id: i64,
    pub order_number: String,
    #[serde(default)]
    pub status: Option<String>,
    /// Order creation time, epoch milliseconds.
    #[serde(default)]
    pub order_date: i64,
    #[serde(default)]
    pub currency_code: Option<String>,
    #[serde(default)]
    pub customer_first_name: Option<String>,
    #[serde(default)]
    pub customer_last_name: Option<String>,
    #[serde(default)]
    pub customer_email: Option<String>,
    #[serde(default)]
    pub identity_number: Option<String>,
    #[serde(default)]
    pub invoice_address: Option<Address>,
    #[serde(default)]
    pub shipment_address: Option<Address>,
    #[serde(default)]
    pub lines: Vec<OrderLine>,
    /// Present when an invoice has already been attached upstream.
    #[serde(default)]
    pub invoice_link: Option<String>,
}

impl Order {
    /// Buyer display name, `"N/A"` when the marketplace redacts it.
    #[must_use]
    pub fn customer_name(&self) -> String {
        let name = format!(
            "{} {}",
            self.customer_first_name.as_deref().unwrap_or(""),
            self.customer_last_name.as_deref().unwrap_or(""),
        );
        let name = name.trim();
        if name.is_empty() { "N/A".to_owned() } else { name.to_owned() }
    }

    /// The address to invoice: invoice address, falling back to shipment.
    #[must_use]
    pub fn billing_address(&self) -> Option<&Address> {
        self.invoice_address.as_ref().or(self.shipment_address.as_ref())
    }

    /// Order currency, defaulting to RON.
    #[must_use]
    pub fn currency(&self) -> &str {
        self.currency_code.as_deref().unwrap_or("RON")
    }
}

/// Postal address attached to an order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    #[serde(default)]
    pub address1: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    /// County-level field (the marketplace calls it district).
    #[serde(default)]
    pub district: Option<String>,
    #[serde(default)]
    pub postal_code: Option<String>,
    #[serde(default)]
    pub country_code: Option<String>,
}

/// One order line.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderLine {
    #[serde(default)]
    pub sku: Option<String>,
    #[serde(default)]
    pub merchant_sku: Option<String>,
    #[serde(default)]
    pub barcode: Option<String>,
    #[serde(default)]
    pub product_name: Option<String>,
    #[serde(default = "default_quantity")]
    pub quantity: u32,
    #[serde(default)]
    pub price: Decimal,
    #[serde(default)]
    pub vat_rate: Decimal,
}

const fn default_quantity() -> u32 {
    1
}

impl OrderLine {
    /// The product code to invoice under: merchant SKU, else barcode,
    /// else the marketplace SKU.
    #[must_use]
    pub fn invoice_code(&self) -> String {
        let pick = |v: Option<&String>| v.filter(|s| !s.trim().is_empty()).cloned();
        pick(self.merchant_sku.as_ref())
            .or_else(|| pick(self.barcode.as_ref()))
            .or_else(|| pick(self.sku.as_ref()))
            .unwrap_or_default()
    }
}

/// A marketplace product catalog entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub barcode: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub stock_code: Option<String>,
    #[serde(default)]
    pub quantity: Option<i64>,
    #[serde(default)]
    pub sale_price: Option<Decimal>,
    #[serde(default)]
    pub approved: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_deserializes_from_wire_json() {
        let json = r#"{
            "id": 11650604,
            "orderNumber": "80300246",
            "status": "Created",
            "orderDate": 1542801149863,
            "currencyCode": "TRY",
            "customerFirstName": "Ion",
            "customerLastName": "Popescu",
            "invoiceAddress": {"city": "Bucuresti", "district": "Sector 1", "postalCode": "010101"},
            "lines": [
                {"merchantSku": "ABC-1", "barcode": "5941234567890", "productName": "Lamp", "quantity": 2, "price": 120.5, "vatRate": 19}
            ]
        }"#;

        let order: Order = serde_json::from_str(json).expect("deserialize order");
        assert_eq!(order.id, 11_650_604);
        assert_eq!(order.order_number, "80300246");
        assert_eq!(order.customer_name(), "Ion Popescu");
        assert_eq!(order.currency(), "TRY");
        assert_eq!(order.lines.len(), 1);
        assert_eq!(order.lines[0].quantity, 2);
        assert_eq!(order.lines[0].invoice_code(), "ABC-1");
    }

    #[test]
    fn test_order_tolerates_missing_fields() {
        let order: Order =
            serde_json::from_str(r#"{"id": 1, "orderNumber": "X"}"#).expect("minimal order");
        assert_eq!(order.customer_name(), "N/A");
        assert_eq!(order.currency(), "RON");
        assert!(order.billing_address().is_none());
        assert!(order.lines.is_empty());
    }

    #[test]
    fn test_billing_address_falls_back_to_shipment() {
        let order: Order = serde_json::from_str(
            r#"{"id": 1, "orderNumber": "X", "shipmentAddress": {"city": "Cluj-Napoca"}}"#,
        )
        .expect("order");
        assert_eq!(
            order.billing_address().and_then(|a| a.city.as_deref()),
            Some("Cluj-Napoca")
        );
    }

    #[test]
    fn test_invoice_code_fallback_chain() {
        let mut line = OrderLine {
            sku: Some("TYB123".into()),
            merchant_sku: Some(String::new()),
            barcode: Some("594000111".into()),
            product_name: None,
            quantity: 1,
            price: Decimal::ZERO,
            vat_rate: Decimal::ZERO,
        };
        // Blank merchant SKU falls through to barcode.
        assert_eq!(line.invoice_code(), "594000111");

        line.barcode = None;
        assert_eq!(line.invoice_code(), "TYB123");
    }

    #[test]
    fn test_paged_has_more() {
        let page: Paged<Order> = Paged {
            content: vec![],
            page: 0,
            size: 50,
            total_elements: 120,
            total_pages: 3,
        };
        assert!(page.has_more());

        let last: Paged<Order> = Paged {
            content: vec![],
            page: 2,
            size: 50,
            total_elements: 120,
            total_pages: 3,
        };
        assert!(!last.has_more());
    }
}
