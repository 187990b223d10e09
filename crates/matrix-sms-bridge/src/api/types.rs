//! API request and response types.

use serde::{Deserialize, Serialize};

/// Health check response.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub homeserver_reachable: bool,
    pub cached_sessions: usize,
    pub push_tokens: usize,
    pub mappings: usize,
}

/// Device push credentials reported by the softphone.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PushTokenReportRequest {
    #[serde(default)]
    pub selector: String,
    #[serde(default)]
    pub token_msgs: String,
    #[serde(default)]
    pub appid_msgs: String,
    #[serde(default)]
    pub token_calls: String,
    #[serde(default)]
    pub appid_calls: String,
}

/// Mapping upsert body.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MappingRequest {
    #[serde(default)]
    pub sms_number: String,
    #[serde(default)]
    pub matrix_id: String,
    #[serde(default)]
    pub room_id: String,
    #[serde(default)]
    pub user_name: Option<String>,
}

/// Query string of the mapping lookup.
#[derive(Debug, Default, Deserialize)]
pub struct MappingQuery {
    #[serde(default)]
    pub sms_number: Option<String>,
}
