//! # Push Channel Adapter
//!
//! Delivers roll calls as mobile push notifications through the push
//! gateway. Push is outbound-only: recipients answer through the app, which
//! reaches us over SMS or Slack relays, so `parse_inbound` always reports
//! [`ChannelError::InboundUnsupported`].

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::config::PushProviderConfig;
use crate::error::{Result, RollCallError};
use crate::models::Channel;

use super::{ChannelAdapter, ChannelError, ChannelResult, InboundMessage, OutboundRequest, ProviderReceipt};

#[derive(Debug, Deserialize)]
struct PushResponse {
    notification_id: String,
}

/// Adapter for the push gateway's REST API.
#[derive(Debug)]
pub struct PushAdapter {
    client: Client,
    base_url: Url,
}

impl PushAdapter {
    pub fn new(config: &PushProviderConfig) -> Result<Self> {
        let base_url = Url::parse(&config.base_url).map_err(|e| {
            RollCallError::Configuration(format!("Invalid push base URL: {e}"))
        })?;

        let mut client_builder = Client::builder()
            .timeout(config.request_timeout())
            .user_agent(format!("rollcall-core/{}", env!("CARGO_PKG_VERSION")));

        if !config.api_key.is_empty() {
            let mut default_headers = reqwest::header::HeaderMap::new();
            default_headers.insert(
                reqwest::header::AUTHORIZATION,
                format!("Bearer {}", config.api_key).parse().map_err(|e| {
                    RollCallError::Configuration(format!("Invalid push API key: {e}"))
                })?,
            );
            client_builder = client_builder.default_headers(default_headers);
        }

        let client = client_builder.build().map_err(|e| {
            RollCallError::Configuration(format!("Failed to build push HTTP client: {e}"))
        })?;

        Ok(Self { client, base_url })
    }
}

#[async_trait]
impl ChannelAdapter for PushAdapter {
    fn channel(&self) -> Channel {
        Channel::Push
    }

    async fn send(&self, request: &OutboundRequest) -> ChannelResult<ProviderReceipt> {
        let url = self.base_url.join("push").map_err(|e| {
            ChannelError::Transport(format!("Failed to construct push URL: {e}"))
        })?;

        debug!(
            roll_call_uuid = %request.roll_call_uuid,
            contact_uuid = %request.contact.contact_uuid,
            "Sending push notification"
        );

        let response = self
            .client
            .post(url)
            .json(&serde_json::json!({
                "token": request.contact.address,
                "title": "Roll call",
                "body": request.content,
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ChannelError::Rejected(format!(
                "HTTP {status}: {error_text}"
            )));
        }

        let body: PushResponse = response.json().await.map_err(|e| {
            ChannelError::Transport(format!("Invalid provider response: {e}"))
        })?;

        Ok(ProviderReceipt {
            provider_message_id: body.notification_id,
        })
    }

    fn parse_inbound(&self, _payload: &Value) -> ChannelResult<InboundMessage> {
        Err(ChannelError::InboundUnsupported)
    }
}
