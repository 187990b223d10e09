//! Message bridge between the SMS relay contract and Matrix rooms.

mod types;

pub use types::*;

use crate::chat::ChatNetwork;
use crate::error::{BridgeError, BridgeResult};
use crate::registry::MappingRegistry;
use crate::session::{normalize_username, SessionManager};
use chrono::Utc;
use matrix_client::{MatrixError, MatrixSession, TimelineEvent};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

const TEXT_MSGTYPE: &str = "m.text";

/// Sends and fetches messages on behalf of relay users.
pub struct MessageBridge {
    sessions: Arc<SessionManager>,
    network: Arc<dyn ChatNetwork>,
    mappings: Arc<MappingRegistry>,
}

impl MessageBridge {
    pub fn new(
        sessions: Arc<SessionManager>,
        network: Arc<dyn ChatNetwork>,
        mappings: Arc<MappingRegistry>,
    ) -> Self {
        Self {
            sessions,
            network,
            mappings,
        }
    }

    /// Send a message to the room mapped to `sms_to`.
    #[instrument(skip(self, request), fields(from = %request.from, to = %request.sms_to))]
    pub async fn send_message(
        &self,
        request: &SendMessageRequest,
    ) -> BridgeResult<SendMessageResponse> {
        let session = self
            .sessions
            .ensure_session(&request.from, &request.password)
            .await?;

        let room_id = self.resolve_room(&request.sms_to).await?;

        let content_type = request.content_type.trim();
        if !content_type.is_empty() && content_type != TEXT_PLAIN {
            debug!(content_type = %content_type, "Sending non-plain content as text");
        }

        let event_id = match self
            .network
            .send_message(&session, &room_id, &request.sms_body, TEXT_MSGTYPE)
            .await
        {
            Ok(id) => id,
            Err(e) => return Err(self.chat_failure(&request.from, e).await),
        };

        info!(
            room_id = %room_id,
            event_id = %event_id,
            disposition = %request.disposition_notification,
            "Message sent"
        );

        Ok(SendMessageResponse { sms_id: event_id })
    }

    /// Fetch received and sent messages after the client's two cursors.
    #[instrument(skip(self, request), fields(username = %request.username, device = %request.device))]
    pub async fn fetch_messages(
        &self,
        request: &FetchMessagesRequest,
    ) -> BridgeResult<FetchMessagesResponse> {
        let session = self
            .sessions
            .ensure_session(&request.username, &request.password)
            .await?;

        let last_id = cursor(&request.last_id);
        let last_sent_id = cursor(&request.last_sent_id);

        let (received_window, sent_window) = if last_id == last_sent_id {
            let events = self.fetch(&request.username, &session, last_id).await?;
            (events.clone(), events)
        } else {
            tokio::try_join!(
                self.fetch(&request.username, &session, last_id),
                self.fetch(&request.username, &session, last_sent_id),
            )?
        };

        let owners = [
            normalize_username(&session.user_id),
            normalize_username(&request.username),
        ];

        let received_smss: Vec<SmsMessage> = received_window
            .iter()
            .filter(|e| e.is_text_message() && !is_sent_by(&e.sender, &owners))
            .map(SmsMessage::from_event)
            .collect();

        let sent_smss: Vec<SmsMessage> = sent_window
            .iter()
            .filter(|e| e.is_text_message() && is_sent_by(&e.sender, &owners))
            .map(SmsMessage::from_event)
            .collect();

        debug!(
            received = received_smss.len(),
            sent = sent_smss.len(),
            "Fetched messages"
        );

        Ok(FetchMessagesResponse {
            date: Utc::now().to_rfc3339(),
            received_smss,
            sent_smss,
        })
    }

    async fn resolve_room(&self, destination: &str) -> BridgeResult<String> {
        let destination = destination.trim();
        if destination.is_empty() {
            return Err(BridgeError::InvalidRecipient(
                "destination is required".into(),
            ));
        }

        match self.mappings.lookup(destination).await {
            Ok(mapping) => Ok(mapping.room_id),
            Err(BridgeError::MappingNotFound(number)) => {
                Err(BridgeError::InvalidRecipient(format!("no mapping for {number}")))
            }
            Err(e) => Err(e),
        }
    }

    async fn fetch(
        &self,
        username: &str,
        session: &MatrixSession,
        cursor: Option<&str>,
    ) -> BridgeResult<Vec<TimelineEvent>> {
        match self.network.fetch_events(session, cursor).await {
            Ok(events) => Ok(events),
            Err(e) => Err(self.chat_failure(username, e).await),
        }
    }

    /// Map a chat network error, dropping the session if its token is dead.
    async fn chat_failure(&self, username: &str, err: MatrixError) -> BridgeError {
        if err.is_unknown_token() {
            warn!("Access token rejected by homeserver, invalidating session");
            self.sessions.invalidate(username).await;
        }
        err.into()
    }
}

fn cursor(value: &str) -> Option<&str> {
    let value = value.trim();
    (!value.is_empty()).then_some(value)
}

/// Whether `sender` is one of the caller's identities (already normalized).
pub fn is_sent_by(sender: &str, owners: &[String]) -> bool {
    let sender = normalize_username(sender);
    owners.iter().any(|owner| *owner == sender)
}
