//! Application state shared across handlers.

use std::sync::Arc;

use sqlx::PgPool;

use facturio_core::{CredentialBundle, UserId};

use crate::clients::smartbill::{SeriesCache, new_series_cache};
use crate::clients::{SmartBillClient, TrendyolClient};
use crate::config::AppConfig;
use crate::db::UserRepository;
use crate::error::AppError;
use crate::models::User;
use crate::security::FieldCipher;
use crate::services::PostalLookup;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: AppConfig,
    pool: PgPool,
    cipher: FieldCipher,
    postal: PostalLookup,
    series_cache: SeriesCache,
}

impl AppState {
    /// Build the state from loaded configuration and a database pool.
    #[must_use]
    pub fn new(config: AppConfig, pool: PgPool) -> Self {
        let cipher = FieldCipher::new(&config.encryption_key);

        Self {
            inner: Arc::new(AppStateInner {
                config,
                pool,
                cipher,
                postal: PostalLookup::new(),
                series_cache: new_series_cache(),
            }),
        }
    }

    /// Application configuration.
    #[must_use]
    pub fn config(&self) -> &AppConfig {
        &self.inner.config
    }

    /// Database pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.inner.pool
    }

    /// Credential field cipher.
    #[must_use]
    pub fn cipher(&self) -> &FieldCipher {
        &self.inner.cipher
    }

    /// Postal-code lookup service.
    #[must_use]
    pub fn postal(&self) -> &PostalLookup {
        &self.inner.postal
    }

    /// Per-tenant cache of invoicing document series.
    #[must_use]
    pub fn series_cache(&self) -> &SeriesCache {
        &self.inner.series_cache
    }

    /// Load the full account (with decrypted credentials) for a session
    /// identity.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Unauthorized` when the account no longer
    /// exists (deleted while the session was live).
    pub async fn load_user(&self, id: UserId) -> Result<User, AppError> {
        UserRepository::new(self.pool())
            .get_by_id(self.cipher(), id)
            .await?
            .ok_or_else(|| AppError::Unauthorized("account no longer exists".to_owned()))
    }

    /// Build a marketplace client from a tenant's credential bundle.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Credentials` when the bundle is incomplete —
    /// checked before any network call.
    pub fn trendyol_client(&self, bundle: &CredentialBundle) -> Result<TrendyolClient, AppError> {
        let credentials = bundle.trendyol()?;
        Ok(TrendyolClient::new(&self.config().trendyol, credentials))
    }

    /// Build an invoicing client from a tenant's credential bundle.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Credentials` when the bundle is incomplete —
    /// checked before any network call.
    pub fn smartbill_client(&self, bundle: &CredentialBundle) -> Result<SmartBillClient, AppError> {
        let credentials = bundle.smartbill()?;
        Ok(SmartBillClient::new(&self.config().smartbill, credentials))
    }
}
