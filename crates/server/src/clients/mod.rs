//! Clients for the two remote REST APIs.
//!
//! Both clients share the same shape: stateless HTTP Basic auth per
//! request (credential bytes base64-encoded, no token caching), typed
//! errors carrying the upstream status, and no retries — the bulk
//! orchestrator decides what to do with a failed item.

pub mod smartbill;
pub mod trendyol;
pub mod types;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use thiserror::Error;

pub use smartbill::SmartBillClient;
pub use trendyol::{OrderFilter, TrendyolClient};

/// Errors that can occur when talking to a remote API.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Transport-level failure (connect, timeout, TLS).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The remote returned a non-2xx response.
    #[error("upstream error ({status}): {message}")]
    Upstream {
        /// Upstream HTTP status code.
        status: u16,
        /// Upstream response body (truncated).
        message: String,
    },

    /// The requested remote resource does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Response body could not be parsed.
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// The tenant's credential set is incomplete.
    #[error(transparent)]
    Credentials(#[from] facturio_core::CredentialError),
}

/// Longest upstream body fragment kept in an error message.
const MAX_ERROR_BODY: usize = 200;

/// Build a `Basic` authorization header value from a username and password.
pub(crate) fn basic_auth(username: &str, password: &str) -> String {
    let credentials = format!("{username}:{password}");
    format!("Basic {}", BASE64.encode(credentials))
}

/// Turn a non-success response into [`ClientError::Upstream`], passing
/// success responses through.
pub(crate) async fn check_status(
    response: reqwest::Response,
) -> Result<reqwest::Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let mut message = response.text().await.unwrap_or_default();
    message.truncate(MAX_ERROR_BODY);

    Err(ClientError::Upstream {
        status: status.as_u16(),
        message,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_auth_encoding() {
        // Standard base64 of "user:pass"
        assert_eq!(basic_auth("user", "pass"), "Basic dXNlcjpwYXNz");
    }

    #[test]
    fn test_client_error_display() {
        let err = ClientError::Upstream {
            status: 429,
            message: "rate limited".to_owned(),
        };
        assert_eq!(err.to_string(), "upstream error (429): rate limited");

        let err = ClientError::NotFound("invoice FCT-42".to_owned());
        assert_eq!(err.to_string(), "not found: invoice FCT-42");
    }
}
