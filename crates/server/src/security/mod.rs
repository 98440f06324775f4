//! Credential encryption and password hashing.

mod cipher;
mod password;

pub use cipher::{CipherError, FieldCipher};
pub use password::{PasswordError, hash_password, verify_password};
