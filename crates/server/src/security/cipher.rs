//! AES-256-GCM field encryption for credentials at rest.
//!
//! Encrypted fields are stored as `1:<nonce>:<ciphertext>` with nonce and
//! ciphertext base64-encoded. The leading `1` is the format version so the
//! scheme can be rotated without a flag column.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use rand::Rng;
use thiserror::Error;

use crate::config::EncryptionKey;

const NONCE_SIZE: usize = 12;
const FORMAT_VERSION: u32 = 1;

/// Errors from field encryption/decryption.
#[derive(Debug, Error)]
pub enum CipherError {
    /// Stored value does not match the `version:nonce:ciphertext` format.
    #[error("invalid encrypted field format")]
    Format,

    /// Stored value has an unknown format version.
    #[error("unsupported encryption version: {0}")]
    UnsupportedVersion(u32),

    /// Nonce or ciphertext is not valid base64.
    #[error("invalid encoding: {0}")]
    Encoding(#[from] base64::DecodeError),

    /// AEAD encryption failed.
    #[error("encryption failed")]
    Encrypt,

    /// AEAD decryption failed (wrong key or corrupted data).
    #[error("decryption failed")]
    Decrypt,

    /// Decrypted bytes are not valid UTF-8.
    #[error("decrypted value is not valid UTF-8")]
    Utf8(#[from] std::string::FromUtf8Error),
}

/// Symmetric cipher for credential columns.
///
/// One instance is created from the process-wide `ENCRYPTION_KEY` and
/// shared through application state. Values are decrypted only at the
/// storage boundary, immediately before an outbound call needs them.
#[derive(Clone)]
pub struct FieldCipher {
    cipher: Aes256Gcm,
}

impl FieldCipher {
    /// Create a cipher from the configured key.
    #[must_use]
    pub fn new(key: &EncryptionKey) -> Self {
        let key = Key::<Aes256Gcm>::from_slice(key.as_bytes());
        Self {
            cipher: Aes256Gcm::new(key),
        }
    }

    /// Encrypt a field value for storage.
    ///
    /// A fresh random nonce is generated per call, so encrypting the same
    /// plaintext twice yields different ciphertexts.
    ///
    /// # Errors
    ///
    /// Returns `CipherError::Encrypt` if the AEAD operation fails.
    pub fn encrypt(&self, plaintext: &str) -> Result<String, CipherError> {
        let nonce_bytes: [u8; NONCE_SIZE] = rand::rng().random();
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|_| CipherError::Encrypt)?;

        Ok(format!(
            "{FORMAT_VERSION}:{}:{}",
            BASE64.encode(nonce_bytes),
            BASE64.encode(ciphertext)
        ))
    }

    /// Decrypt a stored field value.
    ///
    /// # Errors
    ///
    /// Returns `CipherError::Format` / `UnsupportedVersion` for malformed
    /// input and `CipherError::Decrypt` when authentication fails (wrong
    /// key or tampered data).
    pub fn decrypt(&self, stored: &str) -> Result<String, CipherError> {
        let mut parts = stored.splitn(3, ':');
        let (version, nonce_b64, ciphertext_b64) =
            match (parts.next(), parts.next(), parts.next()) {
                (Some(v), Some(n), Some(c)) => (v, n, c),
                _ => return Err(CipherError::Format),
            };

        let version: u32 = version.parse().map_err(|_| CipherError::Format)?;
        if version != FORMAT_VERSION {
            return Err(CipherError::UnsupportedVersion(version));
        }

        let nonce_bytes = BASE64.decode(nonce_b64)?;
        if nonce_bytes.len() != NONCE_SIZE {
            return Err(CipherError::Format);
        }
        let ciphertext = BASE64.decode(ciphertext_b64)?;

        let nonce = Nonce::from_slice(&nonce_bytes);
        let plaintext = self
            .cipher
            .decrypt(nonce, ciphertext.as_ref())
            .map_err(|_| CipherError::Decrypt)?;

        Ok(String::from_utf8(plaintext)?)
    }

    /// Encrypt an optional field, passing `None` through.
    ///
    /// # Errors
    ///
    /// Returns `CipherError::Encrypt` if the AEAD operation fails.
    pub fn encrypt_opt(&self, plaintext: Option<&str>) -> Result<Option<String>, CipherError> {
        plaintext.map(|p| self.encrypt(p)).transpose()
    }

    /// Decrypt an optional field, passing `None` through.
    ///
    /// # Errors
    ///
    /// Returns the underlying `CipherError` if decryption fails.
    pub fn decrypt_opt(&self, stored: Option<&str>) -> Result<Option<String>, CipherError> {
        stored.map(|s| self.decrypt(s)).transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_cipher() -> FieldCipher {
        FieldCipher::new(&EncryptionKey::new([42u8; 32]))
    }

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let cipher = test_cipher();
        let encrypted = cipher.encrypt("sk-trendyol-key").expect("encrypt");
        assert!(encrypted.starts_with("1:"));
        let decrypted = cipher.decrypt(&encrypted).expect("decrypt");
        assert_eq!(decrypted, "sk-trendyol-key");
    }

    #[test]
    fn test_fresh_nonce_per_call() {
        let cipher = test_cipher();
        let a = cipher.encrypt("same value").expect("encrypt");
        let b = cipher.encrypt("same value").expect("encrypt");
        assert_ne!(a, b);
    }

    #[test]
    fn test_wrong_key_fails() {
        let encrypted = test_cipher().encrypt("secret").expect("encrypt");
        let other = FieldCipher::new(&EncryptionKey::new([7u8; 32]));
        assert!(matches!(other.decrypt(&encrypted), Err(CipherError::Decrypt)));
    }

    #[test]
    fn test_malformed_input() {
        let cipher = test_cipher();
        assert!(matches!(cipher.decrypt("garbage"), Err(CipherError::Format)));
        assert!(matches!(
            cipher.decrypt("2:AAAA:BBBB"),
            Err(CipherError::UnsupportedVersion(2))
        ));
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let cipher = test_cipher();
        let encrypted = cipher.encrypt("secret").expect("encrypt");
        // Flip the last character of the ciphertext portion.
        let mut tampered = encrypted.clone();
        let last = tampered.pop().expect("non-empty");
        tampered.push(if last == 'A' { 'B' } else { 'A' });
        assert!(cipher.decrypt(&tampered).is_err());
    }

    #[test]
    fn test_optional_passthrough() {
        let cipher = test_cipher();
        assert_eq!(cipher.encrypt_opt(None).expect("encrypt"), None);
        assert_eq!(cipher.decrypt_opt(None).expect("decrypt"), None);

        let stored = cipher.encrypt_opt(Some("v")).expect("encrypt");
        assert_eq!(
            cipher.decrypt_opt(stored.as_deref()).expect("decrypt"),
            Some("v".to_string())
        );
    }
}
