//! Session-stored identity.

use serde::{Deserialize, Serialize};

use facturio_core::{Role, UserId};

/// Session storage keys.
pub mod session_keys {
    /// Key under which [`super::CurrentUser`] is stored in the session.
    pub const CURRENT_USER: &str = "current_user";
}

/// The logged-in identity carried in the session cookie.
///
/// Only identity and role live in the session; credentials are re-read
/// (and decrypted) from the database per request that needs them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrentUser {
    pub id: UserId,
    pub username: String,
    pub role: Role,
}

impl CurrentUser {
    /// Whether this session belongs to an administrator.
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}
