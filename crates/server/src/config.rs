//! Server configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `DATABASE_URL` - `PostgreSQL` connection string
//! - `SESSION_SECRET` - Session signing secret (min 32 chars, high entropy)
//! - `ENCRYPTION_KEY` - Base64-encoded 32-byte key for credential encryption
//!
//! ## Optional
//! - `HOST` - Bind address (default: 127.0.0.1)
//! - `PORT` - Listen port (default: 3000)
//! - `BASE_URL` - Public URL (default: `http://localhost:3000`; an https
//!   URL turns on secure session cookies)
//! - `INVOICE_STORAGE_DIR` - Directory for stored invoice PDFs (default: storage/invoices)
//! - `INVOICE_RETENTION_DAYS` - Retention window for stored PDFs (default: 30)
//! - `TRENDYOL_BASE_URL` - Marketplace API base override (for tests)
//! - `TRENDYOL_INTEGRATION_BASE_URL` - Marketplace integration API base override
//! - `SMARTBILL_BASE_URL` - Invoicing API base override (for tests)

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;

const MIN_SESSION_SECRET_LENGTH: usize = 32;
const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.3;
const ENCRYPTION_KEY_BYTES: usize = 32;

const DEFAULT_TRENDYOL_BASE_URL: &str = "https://api.trendyol.com/sapigw";
const DEFAULT_TRENDYOL_INTEGRATION_BASE_URL: &str = "https://apigw.trendyol.com/integration";
const DEFAULT_SMARTBILL_BASE_URL: &str = "https://ws.smartbill.ro/SBORO/api";

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "secret",
    "password",
    "xxx",
    "todo",
    "fixme",
    "insert",
    "enter-",
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// Application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// `PostgreSQL` database connection URL (contains password)
    pub database_url: SecretString,
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Public base URL (decides whether session cookies are Secure)
    pub base_url: String,
    /// Session signing secret
    pub session_secret: SecretString,
    /// Key for encrypting credential columns at rest
    pub encryption_key: EncryptionKey,
    /// Directory for stored invoice PDF artifacts
    pub invoice_storage_dir: PathBuf,
    /// Retention window for stored PDFs, in days
    pub invoice_retention_days: u32,
    /// Marketplace API endpoints
    pub trendyol: TrendyolEndpoints,
    /// Invoicing API endpoint
    pub smartbill: SmartBillEndpoint,
}

/// Marketplace API base URLs (overridable for tests).
#[derive(Debug, Clone)]
pub struct TrendyolEndpoints {
    /// Legacy supplier API base (labels, products, shipment packages).
    pub base_url: String,
    /// Integration API base (orders, invoice upload).
    pub integration_base_url: String,
}

/// Invoicing API base URL (overridable for tests).
#[derive(Debug, Clone)]
pub struct SmartBillEndpoint {
    pub base_url: String,
}

/// 32-byte symmetric key for credential encryption at rest.
///
/// Implements `Debug` manually so the key material never reaches logs.
#[derive(Clone)]
pub struct EncryptionKey([u8; ENCRYPTION_KEY_BYTES]);

impl EncryptionKey {
    /// Wrap raw key bytes.
    #[must_use]
    pub const fn new(bytes: [u8; ENCRYPTION_KEY_BYTES]) -> Self {
        Self(bytes)
    }

    /// Parse a base64-encoded key, requiring exactly 32 decoded bytes.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidEnvVar` if the value is not valid
    /// base64 or does not decode to 32 bytes.
    pub fn from_base64(var_name: &str, value: &str) -> Result<Self, ConfigError> {
        let decoded = BASE64.decode(value.trim()).map_err(|e| {
            ConfigError::InvalidEnvVar(var_name.to_string(), format!("not valid base64: {e}"))
        })?;

        let bytes: [u8; ENCRYPTION_KEY_BYTES] = decoded.try_into().map_err(|v: Vec<u8>| {
            ConfigError::InvalidEnvVar(
                var_name.to_string(),
                format!("must decode to {ENCRYPTION_KEY_BYTES} bytes (got {})", v.len()),
            )
        })?;

        Ok(Self(bytes))
    }

    /// The raw key bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; ENCRYPTION_KEY_BYTES] {
        &self.0
    }
}

impl std::fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("EncryptionKey([REDACTED])")
    }
}

impl AppConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing, invalid, or
    /// if secrets fail validation (placeholder detection, entropy check).
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let database_url = SecretString::from(get_required_env("DATABASE_URL")?);
        let host = get_env_or_default("HOST", "127.0.0.1")
            .parse::<IpAddr>()
            .map_err(|e| ConfigError::InvalidEnvVar("HOST".to_string(), e.to_string()))?;
        let port = get_env_or_default("PORT", "3000")
            .parse::<u16>()
            .map_err(|e| ConfigError::InvalidEnvVar("PORT".to_string(), e.to_string()))?;

        let base_url = get_env_or_default("BASE_URL", "http://localhost:3000");

        let session_secret = get_validated_secret("SESSION_SECRET")?;
        validate_session_secret(&session_secret, "SESSION_SECRET")?;

        let encryption_key =
            EncryptionKey::from_base64("ENCRYPTION_KEY", &get_required_env("ENCRYPTION_KEY")?)?;

        let invoice_storage_dir =
            PathBuf::from(get_env_or_default("INVOICE_STORAGE_DIR", "storage/invoices"));
        let invoice_retention_days = get_env_or_default("INVOICE_RETENTION_DAYS", "30")
            .parse::<u32>()
            .map_err(|e| {
                ConfigError::InvalidEnvVar("INVOICE_RETENTION_DAYS".to_string(), e.to_string())
            })?;

        let trendyol = TrendyolEndpoints {
            base_url: get_env_or_default("TRENDYOL_BASE_URL", DEFAULT_TRENDYOL_BASE_URL),
            integration_base_url: get_env_or_default(
                "TRENDYOL_INTEGRATION_BASE_URL",
                DEFAULT_TRENDYOL_INTEGRATION_BASE_URL,
            ),
        };
        let smartbill = SmartBillEndpoint {
            base_url: get_env_or_default("SMARTBILL_BASE_URL", DEFAULT_SMARTBILL_BASE_URL),
        };

        Ok(Self {
            database_url,
            host,
            port,
            base_url,
            session_secret,
            encryption_key,
            invoice_storage_dir,
            invoice_retention_days,
            trendyol,
            smartbill,
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// Retention window as a chrono duration.
    #[must_use]
    pub fn retention_window(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.invoice_retention_days))
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Validate that a session secret meets minimum length requirements.
fn validate_session_secret(secret: &SecretString, var_name: &str) -> Result<(), ConfigError> {
    let value = secret.expose_secret();
    if value.len() < MIN_SESSION_SECRET_LENGTH {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "must be at least {} characters (got {})",
                MIN_SESSION_SECRET_LENGTH,
                value.len()
            ),
        ));
    }
    Ok(())
}

/// Calculate Shannon entropy in bits per character.
fn shannon_entropy(s: &str) -> f64 {
    if s.is_empty() {
        return 0.0;
    }

    let mut freq: HashMap<char, usize> = HashMap::new();
    for c in s.chars() {
        *freq.entry(c).or_insert(0) += 1;
    }

    #[allow(clippy::cast_precision_loss)] // String length will never exceed f64 precision
    let len = s.len() as f64;
    freq.values()
        .map(|&count| {
            #[allow(clippy::cast_precision_loss)]
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Validate that a secret is not a placeholder and has sufficient entropy.
fn validate_secret_strength(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    let lower = secret.to_lowercase();

    // Check blocklist
    for pattern in PLACEHOLDER_PATTERNS {
        if lower.contains(pattern) {
            return Err(ConfigError::InsecureSecret(
                var_name.to_string(),
                format!("appears to be a placeholder (contains '{pattern}')"),
            ));
        }
    }

    // Check entropy (real secrets like API keys have high entropy)
    let entropy = shannon_entropy(secret);
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "entropy too low ({entropy:.2} bits/char, need >= {MIN_ENTROPY_BITS_PER_CHAR:.1}). Use a randomly generated secret."
            ),
        ));
    }

    Ok(())
}

/// Load and validate a secret from environment.
fn get_validated_secret(key: &str) -> Result<SecretString, ConfigError> {
    let value = get_required_env(key)?;
    validate_secret_strength(&value, key)?;
    Ok(SecretString::from(value))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_shannon_entropy_empty() {
        assert!((shannon_entropy("") - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_shannon_entropy_single_char() {
        // All same character = 0 entropy
        assert!((shannon_entropy("aaaaaaa") - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_shannon_entropy_high() {
        let entropy = shannon_entropy("aB3$xY9!mK2@nL5#");
        assert!(entropy > 3.3);
    }

    #[test]
    fn test_validate_secret_strength_placeholder() {
        let result = validate_secret_strength("your-api-key-here", "TEST_VAR");
        assert!(matches!(result, Err(ConfigError::InsecureSecret(_, _))));
    }

    #[test]
    fn test_validate_secret_strength_low_entropy() {
        let result = validate_secret_strength("aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa", "TEST_VAR");
        assert!(matches!(result, Err(ConfigError::InsecureSecret(_, _))));
    }

    #[test]
    fn test_validate_secret_strength_valid() {
        let result = validate_secret_strength("aB3$xY9!mK2@nL5#pQ7&rT0*uW4^zC6", "TEST_VAR");
        assert!(result.is_ok());
    }

    #[test]
    fn test_validate_session_secret_too_short() {
        let secret = SecretString::from("short");
        assert!(validate_session_secret(&secret, "TEST_SESSION").is_err());
    }

    #[test]
    fn test_validate_session_secret_valid_length() {
        let secret = SecretString::from("a".repeat(32));
        assert!(validate_session_secret(&secret, "TEST_SESSION").is_ok());
    }

    #[test]
    fn test_encryption_key_from_base64() {
        let encoded = BASE64.encode([7u8; 32]);
        let key = EncryptionKey::from_base64("ENCRYPTION_KEY", &encoded).unwrap();
        assert_eq!(key.as_bytes(), &[7u8; 32]);
    }

    #[test]
    fn test_encryption_key_wrong_length() {
        let encoded = BASE64.encode([7u8; 16]);
        let result = EncryptionKey::from_base64("ENCRYPTION_KEY", &encoded);
        assert!(matches!(result, Err(ConfigError::InvalidEnvVar(_, _))));
    }

    #[test]
    fn test_encryption_key_not_base64() {
        let result = EncryptionKey::from_base64("ENCRYPTION_KEY", "!!not-base64!!");
        assert!(matches!(result, Err(ConfigError::InvalidEnvVar(_, _))));
    }

    #[test]
    fn test_encryption_key_debug_redacted() {
        let key = EncryptionKey::new([9u8; 32]);
        assert_eq!(format!("{key:?}"), "EncryptionKey([REDACTED])");
    }
}
