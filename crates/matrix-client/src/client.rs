//! Matrix HTTP client.

use crate::error::MatrixError;
use crate::types::*;
use reqwest::{Client, Response};
use secrecy::ExposeSecret;
use std::time::Duration;
use tracing::{debug, instrument, warn};
use urlencoding::encode;
use uuid::Uuid;

/// Upper bound on backward pages read per room while closing a gap.
const MAX_BACKFILL_PAGES: usize = 10;

/// Matrix client-server API client.
///
/// Holds no per-user state: every authenticated call takes the
/// [`MatrixSession`] it should act as.
#[derive(Clone)]
pub struct MatrixClient {
    client: Client,
    homeserver_url: String,
    timeline_limit: u32,
}

impl MatrixClient {
    /// Create a new Matrix client. Every request is bounded by `timeout`.
    pub fn new(homeserver_url: impl Into<String>, timeout: Duration) -> Result<Self, MatrixError> {
        let homeserver_url = homeserver_url.into().trim().trim_end_matches('/').to_string();
        if homeserver_url.is_empty() {
            return Err(MatrixError::Config("homeserver url is required".into()));
        }

        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            homeserver_url,
            timeline_limit: 50,
        })
    }

    /// Set how many timeline events per room a sync returns.
    pub fn with_timeline_limit(mut self, limit: u32) -> Self {
        self.timeline_limit = limit.max(1);
        self
    }

    pub fn homeserver_url(&self) -> &str {
        &self.homeserver_url
    }

    /// Check if the homeserver answers the versions endpoint.
    pub async fn health_check(&self) -> bool {
        self.client
            .get(format!("{}/_matrix/client/versions", self.homeserver_url))
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }

    /// Log in with a user identifier and password.
    #[instrument(skip(self, password))]
    pub async fn login(&self, username: &str, password: &str) -> Result<MatrixSession, MatrixError> {
        let request = LoginRequest::password(username, password);

        let response = self
            .client
            .post(format!("{}/_matrix/client/v3/login", self.homeserver_url))
            .json(&request)
            .send()
            .await?;

        let login: LoginResponse = Self::parse(response).await?;
        debug!(user_id = %login.user_id, "Matrix login succeeded");
        Ok(login.into())
    }

    /// Send an `m.room.message` event and return its event id.
    #[instrument(skip(self, session, body), fields(user_id = %session.user_id))]
    pub async fn send_message(
        &self,
        session: &MatrixSession,
        room_id: &str,
        body: &str,
        msgtype: &str,
    ) -> Result<String, MatrixError> {
        let content = MessageContent {
            msgtype: msgtype.to_string(),
            body: body.to_string(),
        };
        let txn_id = Uuid::new_v4().simple().to_string();

        let response = self
            .client
            .put(format!(
                "{}/_matrix/client/v3/rooms/{}/send/m.room.message/{}",
                self.homeserver_url,
                encode(room_id),
                txn_id
            ))
            .bearer_auth(session.access_token.expose_secret())
            .json(&content)
            .send()
            .await?;

        let sent: SendEventResponse = Self::parse(response).await?;
        debug!(event_id = %sent.event_id, "Message event sent");
        Ok(sent.event_id)
    }

    /// Run a non-blocking sync and return the message timeline of all
    /// joined rooms, oldest first.
    pub async fn sync_timeline(
        &self,
        session: &MatrixSession,
    ) -> Result<Vec<TimelineEvent>, MatrixError> {
        Ok(self.sync(session).await?.into_timeline())
    }

    /// Timeline events that follow the event identified by `cursor`.
    ///
    /// A cursor outside the sync window is located through the event
    /// endpoint, and rooms whose window starts after it are paged backwards
    /// so nothing between the cursor and the window is skipped. Only an
    /// empty cursor, or one no joined room knows, returns the whole window.
    #[instrument(skip(self, session), fields(user_id = %session.user_id))]
    pub async fn fetch_events(
        &self,
        session: &MatrixSession,
        cursor: Option<&str>,
    ) -> Result<Vec<TimelineEvent>, MatrixError> {
        let sync = self.sync(session).await?;

        let cursor = match cursor.map(str::trim) {
            Some(c) if !c.is_empty() => c,
            _ => return Ok(sync.into_timeline()),
        };

        let position = match sync.position_of(cursor) {
            Some(position) => Some(position),
            None => self.locate_event(session, &sync.room_ids(), cursor).await?,
        };
        let Some(position) = position else {
            warn!(cursor, "Cursor event not found in any joined room, returning full window");
            return Ok(sync.into_timeline());
        };

        let mut events = Vec::new();
        for (room_id, room) in sync.rooms.unwrap_or_default().join {
            let timeline = room.timeline;
            let gap = timeline.limited
                && timeline
                    .events
                    .iter()
                    .all(|e| position.precedes(e.origin_server_ts, &e.event_id));

            if gap {
                if let Some(from) = timeline.prev_batch.as_deref() {
                    events.extend(self.backfill(session, &room_id, from, &position).await?);
                }
            }

            events.extend(
                timeline
                    .events
                    .into_iter()
                    .map(|e| TimelineEvent::from_client_event(&room_id, e)),
            );
        }

        Ok(events_after(sort_timeline(events), Some(&position)))
    }

    async fn sync(&self, session: &MatrixSession) -> Result<SyncResponse, MatrixError> {
        let filter = serde_json::json!({
            "room": {
                "timeline": {
                    "limit": self.timeline_limit,
                    "types": ["m.room.message"]
                }
            }
        })
        .to_string();

        let response = self
            .client
            .get(format!("{}/_matrix/client/v3/sync", self.homeserver_url))
            .bearer_auth(session.access_token.expose_secret())
            .query(&[("timeout", "0"), ("filter", filter.as_str())])
            .send()
            .await?;

        let sync: SyncResponse = Self::parse(response).await?;
        debug!(next_batch = %sync.next_batch, "Sync completed");
        Ok(sync)
    }

    /// Ask each room for `event_id` until one knows it.
    async fn locate_event(
        &self,
        session: &MatrixSession,
        room_ids: &[String],
        event_id: &str,
    ) -> Result<Option<EventPosition>, MatrixError> {
        for room_id in room_ids {
            let response = self
                .client
                .get(format!(
                    "{}/_matrix/client/v3/rooms/{}/event/{}",
                    self.homeserver_url,
                    encode(room_id),
                    encode(event_id)
                ))
                .bearer_auth(session.access_token.expose_secret())
                .send()
                .await?;

            match Self::parse::<ClientEvent>(response).await {
                Ok(event) => return Ok(Some(EventPosition::of(&event))),
                Err(MatrixError::Api {
                    status: 403 | 404, ..
                }) => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(None)
    }

    /// Page a room backwards from `from` until the page reaches `position`.
    async fn backfill(
        &self,
        session: &MatrixSession,
        room_id: &str,
        from: &str,
        position: &EventPosition,
    ) -> Result<Vec<TimelineEvent>, MatrixError> {
        let filter = serde_json::json!({"types": ["m.room.message"]}).to_string();
        let limit = self.timeline_limit.to_string();
        let mut from = from.to_string();
        let mut events = Vec::new();

        for _ in 0..MAX_BACKFILL_PAGES {
            let response = self
                .client
                .get(format!(
                    "{}/_matrix/client/v3/rooms/{}/messages",
                    self.homeserver_url,
                    encode(room_id)
                ))
                .bearer_auth(session.access_token.expose_secret())
                .query(&[
                    ("dir", "b"),
                    ("from", from.as_str()),
                    ("limit", limit.as_str()),
                    ("filter", filter.as_str()),
                ])
                .send()
                .await?;

            let page: MessagesResponse = Self::parse(response).await?;
            let mut reached = page.chunk.is_empty();
            for event in page.chunk {
                if position.precedes(event.origin_server_ts, &event.event_id) {
                    events.push(TimelineEvent::from_client_event(room_id, event));
                } else {
                    reached = true;
                }
            }

            match page.end {
                Some(end) if !reached => from = end,
                _ => {
                    debug!(room_id, "Backfilled {} events", events.len());
                    return Ok(events);
                }
            }
        }

        warn!(room_id, "Backfill stopped before reaching the cursor");
        Ok(events)
    }

    async fn parse<T: serde::de::DeserializeOwned>(response: Response) -> Result<T, MatrixError> {
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let body: ErrorBody = serde_json::from_str(&text).unwrap_or_else(|_| ErrorBody {
                errcode: "M_UNKNOWN".into(),
                error: text,
            });
            warn!(status = %status, errcode = %body.errcode, "Matrix request failed");
            return Err(MatrixError::Api {
                status: status.as_u16(),
                errcode: body.errcode,
                message: body.error,
            });
        }

        Ok(response.json().await?)
    }
}
