//! Translation of Matrix push gateway notifications into relay pushes.

mod relay;
mod types;

pub use relay::{AcrobitsPushClient, PushRelay, DEFAULT_PUSH_URL};
pub use types::*;

use crate::bridge::content_type_for;
use crate::registry::{TokenRegistration, TokenRegistry};
use futures::future::join_all;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Verb the relay uses for text message notifications.
pub const NOTIFY_TEXT_MESSAGE: &str = "NotifyTextMessage";

/// Why a device did not receive its push.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    /// No registration carries this pushkey
    Unregistered,
    /// The relay refused or could not be reached
    DeliveryFailed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered,
    Rejected(RejectReason),
}

/// Per-device outcomes for one notification, in device order.
#[derive(Debug, Clone, Default)]
pub struct PushBatchResult {
    pub outcomes: Vec<(String, DeliveryOutcome)>,
}

impl PushBatchResult {
    /// Pushkeys that were not delivered.
    pub fn rejected_pushkeys(&self) -> Vec<String> {
        self.outcomes
            .iter()
            .filter(|(_, outcome)| matches!(outcome, DeliveryOutcome::Rejected(_)))
            .map(|(pushkey, _)| pushkey.clone())
            .collect()
    }

    pub fn delivered_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, outcome)| *outcome == DeliveryOutcome::Delivered)
            .count()
    }
}

/// Routes push gateway notifications to registered devices.
pub struct PushTranslator {
    tokens: Arc<TokenRegistry>,
    relay: Arc<dyn PushRelay>,
}

impl PushTranslator {
    pub fn new(tokens: Arc<TokenRegistry>, relay: Arc<dyn PushRelay>) -> Self {
        Self { tokens, relay }
    }

    /// Deliver one push per device. Never fails as a whole; each device
    /// ends up either delivered or rejected.
    #[instrument(skip(self, notification), fields(event_id = ?notification.event_id, devices = notification.devices.len()))]
    pub async fn handle_notification(&self, notification: &Notification) -> PushBatchResult {
        let deliveries = notification
            .devices
            .iter()
            .map(|device| self.deliver_to_device(notification, device));

        let outcomes = join_all(deliveries).await;
        let result = PushBatchResult {
            outcomes: notification
                .devices
                .iter()
                .map(|d| d.pushkey.clone())
                .zip(outcomes)
                .collect(),
        };

        info!(
            delivered = result.delivered_count(),
            rejected = result.outcomes.len() - result.delivered_count(),
            "Push notification processed"
        );
        result
    }

    async fn deliver_to_device(&self, notification: &Notification, device: &Device) -> DeliveryOutcome {
        let Some(registration) = self.tokens.find_by_messaging_token(&device.pushkey).await else {
            debug!(app_id = %device.app_id, "No registration for pushkey");
            return DeliveryOutcome::Rejected(RejectReason::Unregistered);
        };

        let request = translate(notification, device, &registration);
        match self.relay.deliver(&request).await {
            Ok(()) => DeliveryOutcome::Delivered,
            Err(e) => {
                warn!(selector = %registration.selector, error = %e, "Push delivery failed");
                DeliveryOutcome::Rejected(RejectReason::DeliveryFailed(e.to_string()))
            }
        }
    }
}

/// Build the relay push for one device. Missing optional notification data
/// leaves the matching field empty.
pub fn translate(
    notification: &Notification,
    device: &Device,
    registration: &TokenRegistration,
) -> AcrobitsPushRequest {
    let message = notification.body().unwrap_or_default().to_string();
    let content_type = if message.is_empty() {
        String::new()
    } else {
        content_type_for(notification.msgtype())
    };

    AcrobitsPushRequest {
        verb: NOTIFY_TEXT_MESSAGE.to_string(),
        app_id: registration.messaging_app_id.clone(),
        device_token: registration.messaging_token.clone(),
        selector: registration.selector.clone(),
        badge: notification.counts.map(|c| c.unread).unwrap_or_default(),
        sound: device.sound().unwrap_or_default().to_string(),
        user_name: notification.sender.clone().unwrap_or_default(),
        user_display_name: notification.sender_display_name.clone().unwrap_or_default(),
        message,
        content_type,
        id: notification.event_id.clone().unwrap_or_default(),
        thread_id: notification.room_id.clone().unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::relay::MockPushRelay;
    use super::*;
    use crate::error::BridgeError;
    use chrono::Utc;
    use mockall::predicate::function;
    use serde_json::json;

    fn registration(selector: &str, token: &str, app_id: &str) -> TokenRegistration {
        let now = Utc::now();
        TokenRegistration {
            selector: selector.into(),
            messaging_token: token.into(),
            messaging_app_id: app_id.into(),
            call_token: "device-token-calls".into(),
            call_app_id: "app.id.calls".into(),
            created_at: now,
            updated_at: now,
        }
    }

    fn device(pushkey: &str, tweaks: Option<serde_json::Value>) -> Device {
        Device {
            app_id: "app.x".into(),
            pushkey: pushkey.into(),
            tweaks: tweaks.and_then(|t| t.as_object().cloned()),
            ..Default::default()
        }
    }

    fn full_notification(devices: Vec<Device>) -> Notification {
        serde_json::from_value::<Notification>(json!({
            "content": {"body": "Test message", "msgtype": "m.text"},
            "counts": {"unread": 3, "missed_calls": 1},
            "event_id": "$xyz",
            "room_id": "!test:example.org",
            "sender": "@bob:example.org",
            "sender_display_name": "Bob Smith"
        }))
        .map(|n| Notification { devices, ..n })
        .unwrap()
    }

    #[test]
    fn test_translate_fields() {
        let notification = full_notification(vec![]);
        let device = device("test-pushkey", Some(json!({"sound": "bing"})));
        let token = registration("selector123", "device-token-123", "app.id.msgs");

        let req = translate(&notification, &device, &token);

        assert_eq!(req.verb, "NotifyTextMessage");
        assert_eq!(req.device_token, "device-token-123");
        assert_eq!(req.app_id, "app.id.msgs");
        assert_eq!(req.selector, "selector123");
        assert_eq!(req.message, "Test message");
        assert_eq!(req.content_type, "text/plain");
        assert_eq!(req.badge, 3);
        assert_eq!(req.user_display_name, "Bob Smith");
        assert_eq!(req.user_name, "@bob:example.org");
        assert_eq!(req.id, "$xyz");
        assert_eq!(req.thread_id, "!test:example.org");
        assert_eq!(req.sound, "bing");
    }

    #[test]
    fn test_translate_missing_optional_fields() {
        let notification = Notification::default();
        let device = device("tok", None);
        let token = registration("sel", "tok", "app");

        let req = translate(&notification, &device, &token);
        assert_eq!(req.badge, 0);
        assert!(req.sound.is_empty());
        assert!(req.message.is_empty());
        assert!(req.content_type.is_empty());
        assert!(req.id.is_empty());

        let json = serde_json::to_value(&req).unwrap();
        assert!(json.get("Sound").is_none());
        assert!(json.get("Badge").is_none());
    }

    #[test]
    fn test_translate_unread_and_sound() {
        let notification = Notification {
            counts: Some(Counts {
                unread: 5,
                missed_calls: 0,
            }),
            ..Default::default()
        };
        let device = device("tok", Some(json!({"sound": "default"})));

        let req = translate(&notification, &device, &registration("sel", "tok", "app"));
        assert_eq!(req.badge, 5);
        assert_eq!(req.sound, "default");
    }

    #[tokio::test]
    async fn test_end_to_end_delivery() {
        let tokens = Arc::new(TokenRegistry::in_memory());
        tokens.upsert("sel-1", "tok-A", "app.x", "", "").await.unwrap();

        let mut relay = MockPushRelay::new();
        relay
            .expect_deliver()
            .with(function(|req: &AcrobitsPushRequest| {
                req.sound == "bing"
                    && req.verb == "NotifyTextMessage"
                    && req.selector == "sel-1"
                    && req.app_id == "app.x"
                    && req.device_token == "tok-A"
            }))
            .times(1)
            .returning(|_| Ok(()));

        let translator = PushTranslator::new(tokens, Arc::new(relay));
        let notification = Notification {
            devices: vec![device("tok-A", Some(json!({"sound": "bing"})))],
            ..Default::default()
        };

        let result = translator.handle_notification(&notification).await;
        assert!(result.rejected_pushkeys().is_empty());
        assert_eq!(result.delivered_count(), 1);
    }

    #[tokio::test]
    async fn test_unregistered_pushkey_is_rejected_without_delivery() {
        let tokens = Arc::new(TokenRegistry::in_memory());

        let mut relay = MockPushRelay::new();
        relay.expect_deliver().times(0);

        let translator = PushTranslator::new(tokens, Arc::new(relay));
        let notification = Notification {
            devices: vec![device("unknown-token", None)],
            ..Default::default()
        };

        let result = translator.handle_notification(&notification).await;
        assert_eq!(result.rejected_pushkeys(), vec!["unknown-token"]);
        assert_eq!(
            result.outcomes[0].1,
            DeliveryOutcome::Rejected(RejectReason::Unregistered)
        );
    }

    #[tokio::test]
    async fn test_partial_failure_keeps_processing() {
        let tokens = Arc::new(TokenRegistry::in_memory());
        tokens.upsert("sel-1", "tok-A", "app.x", "", "").await.unwrap();
        tokens.upsert("sel-2", "tok-B", "app.x", "", "").await.unwrap();
        tokens.upsert("sel-3", "tok-C", "app.x", "", "").await.unwrap();

        let mut relay = MockPushRelay::new();
        relay.expect_deliver().times(3).returning(|req| {
            if req.device_token == "tok-B" {
                Err(BridgeError::Upstream("relay down".into()))
            } else {
                Ok(())
            }
        });

        let translator = PushTranslator::new(tokens, Arc::new(relay));
        let notification = full_notification(vec![
            device("tok-A", None),
            device("tok-B", None),
            device("missing", None),
            device("tok-C", None),
        ]);

        let result = translator.handle_notification(&notification).await;
        assert_eq!(result.rejected_pushkeys(), vec!["tok-B", "missing"]);
        assert_eq!(result.delivered_count(), 2);
        assert!(matches!(
            result.outcomes[1].1,
            DeliveryOutcome::Rejected(RejectReason::DeliveryFailed(_))
        ));
    }

    #[tokio::test]
    async fn test_no_devices() {
        let translator = PushTranslator::new(
            Arc::new(TokenRegistry::in_memory()),
            Arc::new(MockPushRelay::new()),
        );
        let result = translator.handle_notification(&Notification::default()).await;
        assert!(result.outcomes.is_empty());
        assert!(result.rejected_pushkeys().is_empty());
    }
}
