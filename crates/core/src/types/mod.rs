//! Core types for Facturio.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod credentials;
pub mod id;
pub mod status;

pub use credentials::{
    CredentialBundle, CredentialError, SmartBillCredentials, TrendyolCredentials,
};
pub use id::*;
pub use status::*;
