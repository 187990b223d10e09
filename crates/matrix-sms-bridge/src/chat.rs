//! Chat network capability consumed by the session manager and the bridge.

use async_trait::async_trait;
use matrix_client::{MatrixClient, MatrixError, MatrixSession, TimelineEvent};

/// The operations the bridge needs from the chat network.
#[async_trait]
pub trait ChatNetwork: Send + Sync {
    /// Log in with username and password.
    async fn login(&self, username: &str, password: &str) -> Result<MatrixSession, MatrixError>;

    /// Send a message event into a room, returning the event id.
    async fn send_message(
        &self,
        session: &MatrixSession,
        room_id: &str,
        body: &str,
        msgtype: &str,
    ) -> Result<String, MatrixError>;

    /// Message events after `cursor` (an event id); `None` means from the
    /// beginning of available history.
    async fn fetch_events(
        &self,
        session: &MatrixSession,
        cursor: Option<&str>,
    ) -> Result<Vec<TimelineEvent>, MatrixError>;

    async fn health_check(&self) -> bool;
}

#[async_trait]
impl ChatNetwork for MatrixClient {
    async fn login(&self, username: &str, password: &str) -> Result<MatrixSession, MatrixError> {
        MatrixClient::login(self, username, password).await
    }

    async fn send_message(
        &self,
        session: &MatrixSession,
        room_id: &str,
        body: &str,
        msgtype: &str,
    ) -> Result<String, MatrixError> {
        MatrixClient::send_message(self, session, room_id, body, msgtype).await
    }

    async fn fetch_events(
        &self,
        session: &MatrixSession,
        cursor: Option<&str>,
    ) -> Result<Vec<TimelineEvent>, MatrixError> {
        MatrixClient::fetch_events(self, session, cursor).await
    }

    async fn health_check(&self) -> bool {
        MatrixClient::health_check(self).await
    }
}
