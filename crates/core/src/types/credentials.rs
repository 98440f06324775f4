//! Per-tenant API credential value types.
//!
//! Credentials are stored encrypted and only decrypted into these value
//! types for the duration of an outbound call. Both remote APIs require a
//! complete credential set before any request is attempted; a partially
//! configured tenant fails fast with [`CredentialError::Incomplete`].

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error raised when a tenant's credentials cannot be used.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CredentialError {
    /// A required credential field is missing or empty.
    #[error("incomplete {api} credentials: {field} is missing")]
    Incomplete {
        /// Which API the credentials are for ("trendyol" or "smartbill").
        api: &'static str,
        /// The missing field name.
        field: &'static str,
    },
}

/// Marketplace API credentials (key/secret pair plus seller id).
#[derive(Clone, PartialEq, Eq)]
pub struct TrendyolCredentials {
    /// API key (Basic auth username).
    pub api_key: String,
    /// API secret (Basic auth password).
    pub api_secret: String,
    /// Seller/supplier id embedded in endpoint paths.
    pub supplier_id: String,
}

impl std::fmt::Debug for TrendyolCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrendyolCredentials")
            .field("api_key", &"[REDACTED]")
            .field("api_secret", &"[REDACTED]")
            .field("supplier_id", &self.supplier_id)
            .finish()
    }
}

/// Invoicing API credentials (token + account email + company VAT code).
#[derive(Clone, PartialEq, Eq)]
pub struct SmartBillCredentials {
    /// API token (Basic auth password).
    pub token: String,
    /// Account email (Basic auth username).
    pub email: String,
    /// Company CIF (Romanian VAT code) sent with every request.
    pub company_cif: String,
    /// Optional warehouse name ("gestiune") for stock tracking.
    pub warehouse: Option<String>,
}

impl std::fmt::Debug for SmartBillCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmartBillCredentials")
            .field("token", &"[REDACTED]")
            .field("email", &self.email)
            .field("company_cif", &self.company_cif)
            .field("warehouse", &self.warehouse)
            .finish()
    }
}

/// Decrypted credential fields for one tenant.
///
/// Fields are `None` when the tenant has not configured them yet. Use
/// [`CredentialBundle::trendyol`] / [`CredentialBundle::smartbill`] to
/// obtain a validated credential set for an outbound call.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialBundle {
    pub trendyol_api_key: Option<String>,
    pub trendyol_api_secret: Option<String>,
    pub trendyol_supplier_id: Option<String>,
    pub smartbill_token: Option<String>,
    pub smartbill_email: Option<String>,
    pub smartbill_company_cif: Option<String>,
    pub smartbill_warehouse: Option<String>,
}

impl std::fmt::Debug for CredentialBundle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialBundle")
            .field("trendyol_api_key", &self.trendyol_api_key.as_ref().map(|_| "[REDACTED]"))
            .field(
                "trendyol_api_secret",
                &self.trendyol_api_secret.as_ref().map(|_| "[REDACTED]"),
            )
            .field("trendyol_supplier_id", &self.trendyol_supplier_id)
            .field("smartbill_token", &self.smartbill_token.as_ref().map(|_| "[REDACTED]"))
            .field("smartbill_email", &self.smartbill_email)
            .field("smartbill_company_cif", &self.smartbill_company_cif)
            .field("smartbill_warehouse", &self.smartbill_warehouse)
            .finish()
    }
}

fn required(
    value: Option<&String>,
    api: &'static str,
    field: &'static str,
) -> Result<String, CredentialError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v.clone()),
        _ => Err(CredentialError::Incomplete { api, field }),
    }
}

impl CredentialBundle {
    /// Validated marketplace credentials.
    ///
    /// # Errors
    ///
    /// Returns [`CredentialError::Incomplete`] if any required field is
    /// missing or empty. Checked before any network call is attempted.
    pub fn trendyol(&self) -> Result<TrendyolCredentials, CredentialError> {
        Ok(TrendyolCredentials {
            api_key: required(self.trendyol_api_key.as_ref(), "trendyol", "api_key")?,
            api_secret: required(self.trendyol_api_secret.as_ref(), "trendyol", "api_secret")?,
            supplier_id: required(self.trendyol_supplier_id.as_ref(), "trendyol", "supplier_id")?,
        })
    }

    /// Validated invoicing credentials.
    ///
    /// # Errors
    ///
    /// Returns [`CredentialError::Incomplete`] if any required field is
    /// missing or empty. The warehouse field is optional.
    pub fn smartbill(&self) -> Result<SmartBillCredentials, CredentialError> {
        Ok(SmartBillCredentials {
            token: required(self.smartbill_token.as_ref(), "smartbill", "token")?,
            email: required(self.smartbill_email.as_ref(), "smartbill", "email")?,
            company_cif: required(self.smartbill_company_cif.as_ref(), "smartbill", "company_cif")?,
            warehouse: self
                .smartbill_warehouse
                .as_ref()
                .filter(|w| !w.trim().is_empty())
                .cloned(),
        })
    }

    /// True when the marketplace credential set is complete.
    #[must_use]
    pub fn has_trendyol(&self) -> bool {
        self.trendyol().is_ok()
    }

    /// True when the invoicing credential set is complete.
    #[must_use]
    pub fn has_smartbill(&self) -> bool {
        self.smartbill().is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_bundle() -> CredentialBundle {
        CredentialBundle {
            trendyol_api_key: Some("ty-key".into()),
            trendyol_api_secret: Some("ty-secret".into()),
            trendyol_supplier_id: Some("123456".into()),
            smartbill_token: Some("sb-token".into()),
            smartbill_email: Some("seller@example.com".into()),
            smartbill_company_cif: Some("RO12345678".into()),
            smartbill_warehouse: Some("Depozit".into()),
        }
    }

    #[test]
    fn test_complete_bundle_validates() {
        let bundle = full_bundle();
        let ty = bundle.trendyol().expect("trendyol complete");
        assert_eq!(ty.supplier_id, "123456");
        let sb = bundle.smartbill().expect("smartbill complete");
        assert_eq!(sb.warehouse.as_deref(), Some("Depozit"));
    }

    #[test]
    fn test_missing_field_fails_fast() {
        let mut bundle = full_bundle();
        bundle.trendyol_api_secret = None;
        assert_eq!(
            bundle.trendyol(),
            Err(CredentialError::Incomplete {
                api: "trendyol",
                field: "api_secret",
            })
        );
        // The other API is unaffected.
        assert!(bundle.has_smartbill());
    }

    #[test]
    fn test_empty_string_counts_as_missing() {
        let mut bundle = full_bundle();
        bundle.smartbill_company_cif = Some("   ".into());
        assert!(matches!(
            bundle.smartbill(),
            Err(CredentialError::Incomplete {
                api: "smartbill",
                field: "company_cif",
            })
        ));
    }

    #[test]
    fn test_warehouse_is_optional() {
        let mut bundle = full_bundle();
        bundle.smartbill_warehouse = None;
        let sb = bundle.smartbill().expect("warehouse optional");
        assert_eq!(sb.warehouse, None);

        bundle.smartbill_warehouse = Some(String::new());
        let sb = bundle.smartbill().expect("blank warehouse treated as none");
        assert_eq!(sb.warehouse, None);
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let bundle = full_bundle();
        let debug = format!("{bundle:?}");
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("ty-secret"));
        assert!(!debug.contains("sb-token"));

        let debug = format!("{:?}", bundle.trendyol().expect("complete"));
        assert!(!debug.contains("ty-key"));
        assert!(debug.contains("123456"));
    }
}
