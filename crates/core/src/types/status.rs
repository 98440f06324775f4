//! Status enums for orders, invoice records, and users.

use serde::{Deserialize, Serialize};

/// Trendyol order status.
///
/// Maps to the status values the marketplace API reports on shipment
/// packages. The wire format is the PascalCase variant name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderStatus {
    Created,
    Picking,
    Invoiced,
    Shipped,
    Delivered,
    UnDelivered,
    UnSupplied,
    Cancelled,
    Returned,
    Repack,
}

impl OrderStatus {
    /// The status name as sent to the marketplace API.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "Created",
            Self::Picking => "Picking",
            Self::Invoiced => "Invoiced",
            Self::Shipped => "Shipped",
            Self::Delivered => "Delivered",
            Self::UnDelivered => "UnDelivered",
            Self::UnSupplied => "UnSupplied",
            Self::Cancelled => "Cancelled",
            Self::Returned => "Returned",
            Self::Repack => "Repack",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Created" => Ok(Self::Created),
            "Picking" => Ok(Self::Picking),
            "Invoiced" => Ok(Self::Invoiced),
            "Shipped" => Ok(Self::Shipped),
            "Delivered" => Ok(Self::Delivered),
            "UnDelivered" => Ok(Self::UnDelivered),
            "UnSupplied" => Ok(Self::UnSupplied),
            "Cancelled" => Ok(Self::Cancelled),
            "Returned" => Ok(Self::Returned),
            "Repack" => Ok(Self::Repack),
            _ => Err(format!("invalid order status: {s}")),
        }
    }
}

/// Lifecycle status of an invoice record.
///
/// `generated` means the invoice exists in the invoicing service;
/// `uploaded` means its PDF has been pushed to the marketplace;
/// `failed` records the last attempted transition going wrong.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "invoice_status", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    Generated,
    Uploaded,
    Failed,
}

impl std::fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Generated => write!(f, "generated"),
            Self::Uploaded => write!(f, "uploaded"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// User role with different permission levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "user_role", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Regular tenant: sees only their own orders and invoice records.
    User,
    /// Administrator: manages users and sees all invoice records.
    Admin,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Admin => write!(f, "admin"),
        }
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "admin" => Ok(Self::Admin),
            _ => Err(format!("invalid role: {s}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_order_status_roundtrip() {
        for status in [
            OrderStatus::Created,
            OrderStatus::Picking,
            OrderStatus::Invoiced,
            OrderStatus::Shipped,
            OrderStatus::Delivered,
            OrderStatus::UnDelivered,
            OrderStatus::UnSupplied,
            OrderStatus::Cancelled,
            OrderStatus::Returned,
            OrderStatus::Repack,
        ] {
            let parsed = OrderStatus::from_str(status.as_str()).expect("roundtrip");
            assert_eq!(parsed, status);
        }
    }

    #[test]
    fn test_order_status_wire_names() {
        // The marketplace spells these with internal capitals.
        assert_eq!(OrderStatus::UnDelivered.as_str(), "UnDelivered");
        assert_eq!(OrderStatus::UnSupplied.as_str(), "UnSupplied");
    }

    #[test]
    fn test_order_status_rejects_unknown() {
        assert!(OrderStatus::from_str("Teleported").is_err());
    }

    #[test]
    fn test_invoice_status_display() {
        assert_eq!(InvoiceStatus::Generated.to_string(), "generated");
        assert_eq!(InvoiceStatus::Uploaded.to_string(), "uploaded");
        assert_eq!(InvoiceStatus::Failed.to_string(), "failed");
    }

    #[test]
    fn test_role_parse() {
        assert_eq!(Role::from_str("admin").expect("parse"), Role::Admin);
        assert_eq!(Role::from_str("user").expect("parse"), Role::User);
        assert!(Role::from_str("root").is_err());
    }
}
