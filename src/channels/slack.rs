//! # Slack Channel Adapter
//!
//! Delivers roll calls through per-organization Slack incoming webhooks and
//! parses Events API callbacks for replies. There is no global Slack
//! endpoint: each organization installs its own webhook, surfaced through
//! [`OrganizationSettingsProvider`], so sends without a configured webhook
//! fail as [`ChannelError::MissingSetting`] rather than a transport error.
//!
//! Incoming webhooks acknowledge with a bare "ok" and no message id, so the
//! adapter synthesizes a `provider_message_id` to keep the outbound record
//! shape uniform across channels.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use crate::error::{Result, RollCallError};
use crate::models::Channel;
use crate::settings::OrganizationSettingsProvider;

use super::{ChannelAdapter, ChannelError, ChannelResult, InboundMessage, OutboundRequest, ProviderReceipt};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Adapter for Slack incoming webhooks and Events API callbacks.
pub struct SlackAdapter {
    client: Client,
    settings: Arc<dyn OrganizationSettingsProvider>,
}

impl SlackAdapter {
    pub fn new(settings: Arc<dyn OrganizationSettingsProvider>) -> Result<Self> {
        let client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .user_agent(format!("rollcall-core/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| {
                RollCallError::Configuration(format!("Failed to build Slack HTTP client: {e}"))
            })?;

        Ok(Self { client, settings })
    }

    /// Parse Slack's epoch-seconds `ts` field ("1724316000.000200").
    fn parse_ts(ts: &str) -> Option<DateTime<Utc>> {
        let (secs, frac) = match ts.split_once('.') {
            Some((secs, frac)) => (secs, frac),
            None => (ts, ""),
        };
        let secs: i64 = secs.parse().ok()?;
        let micros: u32 = if frac.is_empty() {
            0
        } else {
            format!("{frac:0<6}").get(..6)?.parse().ok()?
        };
        DateTime::from_timestamp(secs, micros * 1_000)
    }
}

impl std::fmt::Debug for SlackAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlackAdapter").finish_non_exhaustive()
    }
}

#[async_trait]
impl ChannelAdapter for SlackAdapter {
    fn channel(&self) -> Channel {
        Channel::Slack
    }

    async fn send(&self, request: &OutboundRequest) -> ChannelResult<ProviderReceipt> {
        let settings = self
            .settings
            .channel_settings(request.organization_uuid)
            .await
            .map_err(|e| ChannelError::Transport(format!("Settings lookup failed: {e}")))?;

        let webhook_url = settings
            .slack_webhook_url
            .ok_or_else(|| ChannelError::MissingSetting("slack_webhook_url".to_string()))?;

        debug!(
            roll_call_uuid = %request.roll_call_uuid,
            contact_uuid = %request.contact.contact_uuid,
            "Sending Slack webhook message"
        );

        let response = self
            .client
            .post(&webhook_url)
            .json(&serde_json::json!({ "text": request.content }))
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

        Ok(ProviderReceipt {
            provider_message_id: format!("slack-{}", Uuid::new_v4()),
        })
    }

    fn parse_inbound(&self, payload: &Value) -> ChannelResult<InboundMessage> {
        // Events API wraps the message under "event"; accept a flattened
        // payload too for relays that unwrap it.
        let event = payload.get("event").unwrap_or(payload);

        let user = event
            .get("user")
            .and_then(Value::as_str)
            .ok_or_else(|| ChannelError::MalformedPayload("missing 'user' field".to_string()))?;

        let text = event
            .get("text")
            .and_then(Value::as_str)
            .ok_or_else(|| ChannelError::MalformedPayload("missing 'text' field".to_string()))?;

        let received_at = event
            .get("ts")
            .and_then(Value::as_str)
            .and_then(Self::parse_ts)
            .unwrap_or_else(Utc::now);

        Ok(InboundMessage {
            contact_address: user.to_string(),
            content: text.trim().to_string(),
            received_at,
        })
    }
}
