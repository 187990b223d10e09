//! SMS number to Matrix identity mappings.

use super::store::{Store, Table};
use super::{normalize_sms_number, Mapping};
use crate::error::{BridgeError, BridgeResult};
use chrono::Utc;
use tracing::{info, instrument};

/// Persistent registry of SMS number mappings. Last writer wins.
pub struct MappingRegistry {
    table: Table<Mapping>,
}

impl MappingRegistry {
    pub async fn open(store: Store) -> BridgeResult<Self> {
        let table = Table::open(store).await?;
        info!("Loaded mapping registry with {} mappings", table.len().await);
        Ok(Self { table })
    }

    pub fn in_memory() -> Self {
        Self {
            table: Table::in_memory(),
        }
    }

    /// Replace the mapping for an SMS number.
    ///
    /// `sms_number` and `room_id` are required; the display user is taken
    /// as-is when present.
    #[instrument(skip(self))]
    pub async fn upsert(
        &self,
        sms_number: &str,
        matrix_id: &str,
        room_id: &str,
        user_name: Option<&str>,
    ) -> BridgeResult<Mapping> {
        let sms_number = normalize_sms_number(sms_number);
        if sms_number.is_empty() {
            return Err(BridgeError::ValidationFailed("sms_number is required".into()));
        }

        let room_id = room_id.trim();
        if room_id.is_empty() {
            return Err(BridgeError::ValidationFailed("room_id is required".into()));
        }

        let mapping = Mapping {
            sms_number: sms_number.clone(),
            matrix_id: matrix_id.trim().to_string(),
            room_id: room_id.to_string(),
            user_name: user_name
                .map(str::trim)
                .filter(|u| !u.is_empty())
                .map(String::from),
            updated_at: Utc::now(),
        };

        let mapping = self.table.upsert(&sms_number, |_| mapping).await?;
        info!(sms_number = %mapping.sms_number, room_id = %mapping.room_id, "Mapping stored");
        Ok(mapping)
    }

    /// Mapping for an SMS number, or `MappingNotFound`.
    pub async fn lookup(&self, sms_number: &str) -> BridgeResult<Mapping> {
        let key = normalize_sms_number(sms_number);
        self.table
            .get(&key)
            .await
            .ok_or(BridgeError::MappingNotFound(key))
    }

    pub async fn list(&self) -> Vec<Mapping> {
        let mut all = self.table.values().await;
        all.sort_by(|a, b| a.sms_number.cmp(&b.sms_number));
        all
    }

    pub async fn count(&self) -> usize {
        self.table.len().await
    }
}
