//! HTTP request handlers.

use super::types::{
    HealthResponse, MappingQuery, MappingRequest, PushTokenReportRequest,
};
use super::AppState;
use crate::bridge::{
    FetchMessagesRequest, FetchMessagesResponse, SendMessageRequest, SendMessageResponse,
};
use crate::error::BridgeError;
use crate::push::{PushNotifyRequest, PushNotifyResponse};
use crate::registry::{Mapping, TokenRegistration};
use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde_json::{json, Value};
use tracing::{debug, info};

/// Health check endpoint.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        homeserver_reachable: state.network.health_check().await,
        cached_sessions: state.sessions.session_count().await,
        push_tokens: state.tokens.count().await,
        mappings: state.mappings.count().await,
    })
}

/// Send a message from a relay client into its mapped room.
pub async fn send_message(
    State(state): State<AppState>,
    Json(request): Json<SendMessageRequest>,
) -> Result<Json<SendMessageResponse>, BridgeError> {
    info!(from = %request.from, to = %request.sms_to, "Send message request received");
    let response = state.bridge.send_message(&request).await?;
    Ok(Json(response))
}

/// Poll for received and sent messages.
pub async fn fetch_messages(
    State(state): State<AppState>,
    Json(request): Json<FetchMessagesRequest>,
) -> Result<Json<FetchMessagesResponse>, BridgeError> {
    debug!(username = %request.username, "Fetch messages request received");
    let response = state.bridge.fetch_messages(&request).await?;
    Ok(Json(response))
}

/// Store the push tokens a device reported.
pub async fn push_token_report(
    State(state): State<AppState>,
    Json(request): Json<PushTokenReportRequest>,
) -> Result<Json<Value>, BridgeError> {
    state
        .tokens
        .upsert(
            &request.selector,
            &request.token_msgs,
            &request.appid_msgs,
            &request.token_calls,
            &request.appid_calls,
        )
        .await?;

    info!(selector = %request.selector, app_id = %request.appid_msgs, "Push token reported");
    Ok(Json(json!({})))
}

/// Matrix push gateway notify endpoint.
pub async fn push_notify(
    State(state): State<AppState>,
    Json(request): Json<PushNotifyRequest>,
) -> Json<PushNotifyResponse> {
    let result = state.push.handle_notification(&request.notification).await;
    Json(PushNotifyResponse {
        rejected: result.rejected_pushkeys(),
    })
}

/// Application service transaction push; acknowledged without processing.
pub async fn app_transaction(
    Path(txn_id): Path<String>,
    Json(body): Json<Value>,
) -> Json<Value> {
    let events = body
        .get("events")
        .and_then(Value::as_array)
        .map_or(0, Vec::len);
    info!(txn_id = %txn_id, events, "Application service transaction received");
    Json(json!({}))
}

/// Create or replace an SMS number mapping.
pub async fn upsert_mapping(
    State(state): State<AppState>,
    Json(request): Json<MappingRequest>,
) -> Result<Json<Mapping>, BridgeError> {
    let mapping = state
        .mappings
        .upsert(
            &request.sms_number,
            &request.matrix_id,
            &request.room_id,
            request.user_name.as_deref(),
        )
        .await?;
    Ok(Json(mapping))
}

/// Look up the mapping for `?sms_number=`.
pub async fn get_mapping(
    State(state): State<AppState>,
    Query(query): Query<MappingQuery>,
) -> Result<Json<Mapping>, BridgeError> {
    let sms_number = query.sms_number.unwrap_or_default();
    if sms_number.trim().is_empty() {
        return Err(BridgeError::ValidationFailed(
            "sms_number query parameter is required".into(),
        ));
    }

    let mapping = state.mappings.lookup(&sms_number).await?;
    Ok(Json(mapping))
}

/// List all push token registrations.
pub async fn list_push_tokens(State(state): State<AppState>) -> Json<Vec<TokenRegistration>> {
    Json(state.tokens.list().await)
}

/// Delete a push token registration.
pub async fn delete_push_token(
    State(state): State<AppState>,
    Path(selector): Path<String>,
) -> Result<Json<Value>, BridgeError> {
    state.tokens.delete(&selector).await?;
    Ok(Json(json!({})))
}
