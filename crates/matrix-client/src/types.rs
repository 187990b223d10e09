//! Matrix client-server API types.

use chrono::{DateTime, TimeZone, Utc};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Password login request (`m.login.password`).
#[derive(Clone, Serialize)]
pub struct LoginRequest {
    #[serde(rename = "type")]
    pub login_type: String,
    pub identifier: UserIdentifier,
    pub password: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub initial_device_display_name: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UserIdentifier {
    #[serde(rename = "type")]
    pub id_type: String,
    pub user: String,
}

impl LoginRequest {
    pub fn password(user: &str, password: &str) -> Self {
        Self {
            login_type: "m.login.password".into(),
            identifier: UserIdentifier {
                id_type: "m.id.user".into(),
                user: user.to_string(),
            },
            password: password.to_string(),
            initial_device_display_name: Some("matrix-sms-bridge".into()),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginResponse {
    pub user_id: String,
    pub access_token: String,
    #[serde(default)]
    pub device_id: Option<String>,
}

/// An authenticated Matrix session.
///
/// The access token is kept behind `SecretString` so that the session can be
/// logged with `{:?}` without leaking credentials.
#[derive(Debug, Clone)]
pub struct MatrixSession {
    pub user_id: String,
    pub access_token: SecretString,
    pub device_id: Option<String>,
}

impl From<LoginResponse> for MatrixSession {
    fn from(resp: LoginResponse) -> Self {
        Self {
            user_id: resp.user_id,
            access_token: SecretString::new(resp.access_token),
            device_id: resp.device_id,
        }
    }
}

/// Content of an outgoing `m.room.message` event.
#[derive(Debug, Clone, Serialize)]
pub struct MessageContent {
    pub msgtype: String,
    pub body: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SendEventResponse {
    pub event_id: String,
}

/// Standard Matrix error body.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub errcode: String,
    #[serde(default)]
    pub error: String,
}

/// Subset of the `/sync` response the bridge consumes.
#[derive(Debug, Clone, Deserialize)]
pub struct SyncResponse {
    pub next_batch: String,
    #[serde(default)]
    pub rooms: Option<SyncRooms>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SyncRooms {
    #[serde(default)]
    pub join: HashMap<String, JoinedRoom>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct JoinedRoom {
    #[serde(default)]
    pub timeline: Timeline,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Timeline {
    #[serde(default)]
    pub events: Vec<ClientEvent>,
    /// More events exist before this window than the limit allowed.
    #[serde(default)]
    pub limited: bool,
    /// Token to paginate backwards from the start of the window.
    #[serde(default)]
    pub prev_batch: Option<String>,
}

/// One page of `/rooms/{roomId}/messages`.
#[derive(Debug, Clone, Deserialize)]
pub struct MessagesResponse {
    #[serde(default)]
    pub chunk: Vec<ClientEvent>,
    /// Absent once there is nothing further in the requested direction.
    #[serde(default)]
    pub end: Option<String>,
}

/// A room event as returned inside a sync timeline (no `room_id`).
#[derive(Debug, Clone, Deserialize)]
pub struct ClientEvent {
    pub event_id: String,
    pub sender: String,
    pub origin_server_ts: i64,
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub content: serde_json::Value,
}

/// A timeline event tagged with the room it belongs to.
#[derive(Debug, Clone)]
pub struct TimelineEvent {
    pub room_id: String,
    pub event_id: String,
    pub sender: String,
    pub origin_server_ts: i64,
    pub event_type: String,
    pub content: serde_json::Value,
}

impl TimelineEvent {
    pub fn from_client_event(room_id: &str, event: ClientEvent) -> Self {
        Self {
            room_id: room_id.to_string(),
            event_id: event.event_id,
            sender: event.sender,
            origin_server_ts: event.origin_server_ts,
            event_type: event.event_type,
            content: event.content,
        }
    }

    /// Text body of a message event.
    pub fn body(&self) -> Option<&str> {
        self.content.get("body").and_then(|v| v.as_str())
    }

    pub fn msgtype(&self) -> Option<&str> {
        self.content.get("msgtype").and_then(|v| v.as_str())
    }

    /// Whether this is an `m.room.message` carrying a text body.
    pub fn is_text_message(&self) -> bool {
        self.event_type == "m.room.message" && self.body().is_some()
    }

    pub fn sent_at(&self) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(self.origin_server_ts)
            .single()
            .unwrap_or_default()
    }
}

impl SyncResponse {
    /// Flatten the joined rooms' timelines into a single list ordered by
    /// server timestamp.
    pub fn into_timeline(self) -> Vec<TimelineEvent> {
        let events = self
            .rooms
            .unwrap_or_default()
            .join
            .into_iter()
            .flat_map(|(room_id, room)| {
                room.timeline
                    .events
                    .into_iter()
                    .map(move |e| TimelineEvent::from_client_event(&room_id, e))
            })
            .collect();
        sort_timeline(events)
    }

    /// Ids of the joined rooms present in this response.
    pub fn room_ids(&self) -> Vec<String> {
        self.rooms
            .as_ref()
            .map(|r| r.join.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Position of `event_id` if it is inside one of the room windows.
    pub fn position_of(&self, event_id: &str) -> Option<EventPosition> {
        self.rooms
            .as_ref()?
            .join
            .values()
            .flat_map(|room| room.timeline.events.iter())
            .find(|e| e.event_id == event_id)
            .map(EventPosition::of)
    }
}

/// Where an event sits in the merged timeline order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventPosition {
    pub origin_server_ts: i64,
    pub event_id: String,
}

impl EventPosition {
    pub fn of(event: &ClientEvent) -> Self {
        Self {
            origin_server_ts: event.origin_server_ts,
            event_id: event.event_id.clone(),
        }
    }

    /// Whether an event with this timestamp and id sorts after the position.
    pub fn precedes(&self, origin_server_ts: i64, event_id: &str) -> bool {
        (origin_server_ts, event_id) > (self.origin_server_ts, self.event_id.as_str())
    }
}

/// Order events by server timestamp, then event id.
pub fn sort_timeline(mut events: Vec<TimelineEvent>) -> Vec<TimelineEvent> {
    events.sort_by(|a, b| {
        a.origin_server_ts
            .cmp(&b.origin_server_ts)
            .then_with(|| a.event_id.cmp(&b.event_id))
    });
    events
}

/// Keep only the events that sort after `position`; `None` keeps everything.
pub fn events_after(
    events: Vec<TimelineEvent>,
    position: Option<&EventPosition>,
) -> Vec<TimelineEvent> {
    match position {
        Some(p) => events
            .into_iter()
            .filter(|e| p.precedes(e.origin_server_ts, &e.event_id))
            .collect(),
        None => events,
    }
}
