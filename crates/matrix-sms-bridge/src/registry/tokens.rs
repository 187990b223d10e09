//! Device push token registry keyed by selector.

use super::store::{Store, Table};
use super::TokenRegistration;
use crate::error::{BridgeError, BridgeResult};
use chrono::Utc;
use tracing::{debug, info, instrument};

/// Persistent registry of device push registrations.
pub struct TokenRegistry {
    table: Table<TokenRegistration>,
}

impl TokenRegistry {
    /// Open the registry, loading persisted registrations.
    pub async fn open(store: Store) -> BridgeResult<Self> {
        let table = Table::open(store).await?;
        info!("Loaded token registry with {} registrations", table.len().await);
        Ok(Self { table })
    }

    pub fn in_memory() -> Self {
        Self {
            table: Table::in_memory(),
        }
    }

    /// Create or refresh the registration for a selector.
    ///
    /// Token and app fields are overwritten; `created_at` is kept from the
    /// first registration and `updated_at` is stamped on every call.
    #[instrument(skip(self, messaging_token, call_token))]
    pub async fn upsert(
        &self,
        selector: &str,
        messaging_token: &str,
        messaging_app_id: &str,
        call_token: &str,
        call_app_id: &str,
    ) -> BridgeResult<TokenRegistration> {
        let selector = selector.trim();
        if selector.is_empty() {
            return Err(BridgeError::ValidationFailed("selector is required".into()));
        }

        let registration = self
            .table
            .upsert(selector, |previous| {
                let now = Utc::now();
                TokenRegistration {
                    selector: selector.to_string(),
                    messaging_token: messaging_token.trim().to_string(),
                    messaging_app_id: messaging_app_id.trim().to_string(),
                    call_token: call_token.trim().to_string(),
                    call_app_id: call_app_id.trim().to_string(),
                    created_at: previous.map(|p| p.created_at).unwrap_or(now),
                    updated_at: now,
                }
            })
            .await?;

        debug!(selector = %selector, "Push token registration stored");
        Ok(registration)
    }

    /// Registration for a selector; absence is not an error.
    pub async fn get(&self, selector: &str) -> Option<TokenRegistration> {
        self.table.get(selector.trim()).await
    }

    /// Delete a registration. Deleting an unknown selector succeeds.
    #[instrument(skip(self))]
    pub async fn delete(&self, selector: &str) -> BridgeResult<()> {
        if self.table.remove(selector.trim()).await? {
            info!(selector = %selector, "Push token registration deleted");
        }
        Ok(())
    }

    /// All registrations, ordered by selector.
    pub async fn list(&self) -> Vec<TokenRegistration> {
        let mut all = self.table.values().await;
        all.sort_by(|a, b| a.selector.cmp(&b.selector));
        all
    }

    /// Registration whose messaging token equals the push gateway pushkey.
    ///
    /// If a token was re-registered under several selectors the most
    /// recently updated one wins.
    pub async fn find_by_messaging_token(&self, pushkey: &str) -> Option<TokenRegistration> {
        if pushkey.is_empty() {
            return None;
        }

        self.table
            .find(|r| r.messaging_token == pushkey)
            .await
            .into_iter()
            .max_by_key(|r| r.updated_at)
    }

    pub async fn count(&self) -> usize {
        self.table.len().await
    }
}
