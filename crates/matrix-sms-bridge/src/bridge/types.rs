//! Wire shapes of the SMS relay send/fetch contract.

use matrix_client::TimelineEvent;
use serde::{Deserialize, Serialize};

/// Content type the relay uses for plain text messages.
pub const TEXT_PLAIN: &str = "text/plain";

/// Outbound message from a relay client.
#[derive(Clone, Deserialize)]
pub struct SendMessageRequest {
    #[serde(default)]
    pub from: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub sms_to: String,
    #[serde(default)]
    pub sms_body: String,
    #[serde(default)]
    pub content_type: String,
    #[serde(default)]
    pub disposition_notification: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SendMessageResponse {
    pub sms_id: String,
}

/// Poll request carrying the two independent cursors.
#[derive(Clone, Deserialize)]
pub struct FetchMessagesRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    /// Last received message the client has seen
    #[serde(default)]
    pub last_id: String,
    /// Last sent message the client has seen
    #[serde(default)]
    pub last_sent_id: String,
    #[serde(default)]
    pub device: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FetchMessagesResponse {
    /// Response time, RFC 3339
    pub date: String,
    pub received_smss: Vec<SmsMessage>,
    pub sent_smss: Vec<SmsMessage>,
}

/// A chat message in relay form.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SmsMessage {
    pub sms_id: String,
    pub sending_date: String,
    pub sender: String,
    pub recipient: String,
    pub sms_text: String,
    pub content_type: String,
    pub stream_id: String,
}

impl SmsMessage {
    /// Convert a text message event. The room doubles as recipient and stream.
    pub fn from_event(event: &TimelineEvent) -> Self {
        Self {
            sms_id: event.event_id.clone(),
            sending_date: event.sent_at().to_rfc3339(),
            sender: event.sender.clone(),
            recipient: event.room_id.clone(),
            sms_text: event.body().unwrap_or_default().to_string(),
            content_type: content_type_for(event.msgtype()),
            stream_id: event.room_id.clone(),
        }
    }
}

/// Relay content type for a Matrix msgtype.
pub fn content_type_for(msgtype: Option<&str>) -> String {
    match msgtype {
        None | Some("m.text") | Some("m.notice") | Some("m.emote") => TEXT_PLAIN.to_string(),
        Some(other) => other.to_string(),
    }
}
