//! Matrix push gateway and Acrobits PNM wire models.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Body of `POST /_matrix/push/v1/notify`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushNotifyRequest {
    pub notification: Notification,
}

/// Notification sent by the homeserver's pusher.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Notification {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub counts: Option<Counts>,
    #[serde(default)]
    pub devices: Vec<Device>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prio: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room_alias: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_display_name: Option<String>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub event_type: Option<String>,
    #[serde(default)]
    pub user_is_target: bool,
}

impl Notification {
    fn content_str(&self, key: &str) -> Option<&str> {
        self.content.as_ref()?.get(key)?.as_str()
    }

    pub fn body(&self) -> Option<&str> {
        self.content_str("body")
    }

    pub fn msgtype(&self) -> Option<&str> {
        self.content_str("msgtype")
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Counts {
    #[serde(default)]
    pub unread: u32,
    #[serde(default)]
    pub missed_calls: u32,
}

/// A device the notification should reach.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Device {
    pub app_id: String,
    pub pushkey: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pushkey_ts: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tweaks: Option<Map<String, Value>>,
}

impl Device {
    /// `tweaks.sound`, when it is a string.
    pub fn sound(&self) -> Option<&str> {
        self.tweaks.as_ref()?.get("sound")?.as_str()
    }
}

/// Response of the notify endpoint: pushkeys the gateway could not serve.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PushNotifyResponse {
    pub rejected: Vec<String>,
}

fn is_zero(n: &u32) -> bool {
    *n == 0
}

/// One push for one device, in Acrobits PNM format.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AcrobitsPushRequest {
    pub verb: String,
    #[serde(rename = "AppId")]
    pub app_id: String,
    #[serde(rename = "DeviceToken")]
    pub device_token: String,
    #[serde(rename = "Selector", default, skip_serializing_if = "String::is_empty")]
    pub selector: String,
    #[serde(rename = "Badge", default, skip_serializing_if = "is_zero")]
    pub badge: u32,
    #[serde(rename = "Sound", default, skip_serializing_if = "String::is_empty")]
    pub sound: String,
    #[serde(rename = "UserName", default, skip_serializing_if = "String::is_empty")]
    pub user_name: String,
    #[serde(
        rename = "UserDisplayName",
        default,
        skip_serializing_if = "String::is_empty"
    )]
    pub user_display_name: String,
    #[serde(rename = "Message", default, skip_serializing_if = "String::is_empty")]
    pub message: String,
    #[serde(rename = "ContentType", default, skip_serializing_if = "String::is_empty")]
    pub content_type: String,
    #[serde(rename = "Id", default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    #[serde(rename = "ThreadId", default, skip_serializing_if = "String::is_empty")]
    pub thread_id: String,
}

/// PNM reply body.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AcrobitsPushResponse {
    #[serde(default)]
    pub code: u16,
    #[serde(default)]
    pub response: String,
}
