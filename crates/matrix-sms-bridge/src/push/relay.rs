//! Delivery of pushes to the Acrobits PNM relay.

use super::types::{AcrobitsPushRequest, AcrobitsPushResponse};
use crate::error::{BridgeError, BridgeResult};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// Default Acrobits PNM endpoint.
pub const DEFAULT_PUSH_URL: &str = "https://pnm.cloudsoftphone.com/pnm2/send";

/// Outbound push delivery capability.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PushRelay: Send + Sync {
    /// Deliver a single push. Any error means the device was not reached.
    async fn deliver(&self, request: &AcrobitsPushRequest) -> BridgeResult<()>;
}

/// HTTP client for the PNM send endpoint.
#[derive(Clone)]
pub struct AcrobitsPushClient {
    client: Client,
    push_url: String,
}

impl AcrobitsPushClient {
    pub fn new(push_url: impl Into<String>, timeout: Duration) -> BridgeResult<Self> {
        let push_url = push_url.into();
        if push_url.trim().is_empty() {
            return Err(BridgeError::Internal("push relay url is required".into()));
        }

        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self { client, push_url })
    }

    pub fn push_url(&self) -> &str {
        &self.push_url
    }
}

#[async_trait]
impl PushRelay for AcrobitsPushClient {
    #[instrument(skip(self, request), fields(selector = %request.selector, event_id = %request.id))]
    async fn deliver(&self, request: &AcrobitsPushRequest) -> BridgeResult<()> {
        let response = self
            .client
            .post(&self.push_url)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await.unwrap_or_default();

        if !status.is_success() {
            warn!(status = %status, "Push relay rejected request: {}", text);
            return Err(BridgeError::Upstream(format!(
                "push relay returned {}: {}",
                status, text
            )));
        }

        // PNM may answer 200 with an error code in the body
        if let Ok(reply) = serde_json::from_str::<AcrobitsPushResponse>(&text) {
            if reply.code >= 400 {
                warn!(code = reply.code, "Push relay reported failure: {}", reply.response);
                return Err(BridgeError::Upstream(format!(
                    "push relay code {}: {}",
                    reply.code, reply.response
                )));
            }
        }

        debug!("Push delivered");
        Ok(())
    }
}
