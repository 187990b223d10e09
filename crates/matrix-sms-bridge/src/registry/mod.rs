//! Durable registries: device push tokens and SMS number mappings.

mod mappings;
mod store;
mod tokens;

pub use mappings::MappingRegistry;
pub use store::{FileStore, Store, Table};
pub use tokens::TokenRegistry;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Push credentials a device reported for a selector.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenRegistration {
    /// Opaque key supplied by the relay client
    pub selector: String,

    /// Device token used for message pushes
    pub messaging_token: String,

    /// Application id paired with the messaging token
    pub messaging_app_id: String,

    /// Device token used for call pushes
    pub call_token: String,

    /// Application id paired with the call token
    pub call_app_id: String,

    /// First time this selector registered; never changes afterwards
    pub created_at: DateTime<Utc>,

    /// Last time the registration was written
    pub updated_at: DateTime<Utc>,
}

/// Association between an SMS number and a Matrix identity/room.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Mapping {
    pub sms_number: String,
    pub matrix_id: String,
    pub room_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// Normalize an SMS number used as a mapping key.
pub fn normalize_sms_number(number: &str) -> String {
    number.trim().to_string()
}
