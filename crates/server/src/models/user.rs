//! Tenant account model.

use chrono::{DateTime, Utc};

use facturio_core::{CredentialBundle, Role, UserId};

/// A tenant account with decrypted credential bundle.
///
/// The credential fields are decrypted at the repository boundary and live
/// only as long as the request that loaded them.
#[derive(Debug, Clone)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub role: Role,
    pub credentials: CredentialBundle,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Whether this account has administrator privileges.
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}
