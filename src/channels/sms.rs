//! # SMS Channel Adapter
//!
//! Delivers roll calls through the SMS gateway and parses its inbound
//! webhook. Inbound texts carry the organization keyword as a prefix
//! ("rollcall I'm safe"); the adapter strips it before correlation so reply
//! content stays clean.
//!
//! The gateway enforces a per-account send rate. Outbound sends are paced
//! client-side to `messages_per_second` so a large fan-out does not trip the
//! provider's limiter and fail half a batch.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, Url};
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;
use uuid::Uuid;

use crate::config::SmsProviderConfig;
use crate::error::{Result, RollCallError};
use crate::models::Channel;

use super::{
    ChannelAdapter, ChannelError, ChannelResult, ComplaintFeed, ComplaintReport, InboundMessage,
    OutboundRequest, ProviderReceipt,
};

#[derive(Debug, Deserialize)]
struct SendResponse {
    message_id: String,
}

#[derive(Debug, Deserialize)]
struct ComplaintRow {
    roll_call_id: Uuid,
    count: i64,
}

/// Client-side pacing to the provider's send rate.
///
/// Each sender claims the next free slot and sleeps until it arrives, so
/// concurrent dispatch tasks serialize onto an evenly spaced schedule.
#[derive(Debug)]
struct SendPacer {
    min_interval: Duration,
    next_slot: Mutex<Instant>,
}

impl SendPacer {
    fn new(messages_per_second: u32) -> Self {
        Self {
            min_interval: Duration::from_secs(1) / messages_per_second,
            next_slot: Mutex::new(Instant::now()),
        }
    }

    async fn acquire(&self) {
        let wait = {
            let mut next = self.next_slot.lock().await;
            let now = Instant::now();
            if *next > now {
                let wait = *next - now;
                *next += self.min_interval;
                wait
            } else {
                *next = now + self.min_interval;
                Duration::ZERO
            }
        };
        if !wait.is_zero() {
            tokio::time::sleep(wait).await;
        }
    }
}

/// Adapter for the SMS gateway's REST API.
#[derive(Debug)]
pub struct SmsAdapter {
    client: Client,
    base_url: Url,
    from: String,
    keyword: String,
    pacer: Option<SendPacer>,
}

impl SmsAdapter {
    pub fn new(config: &SmsProviderConfig) -> Result<Self> {
        let base_url = Url::parse(&config.base_url).map_err(|e| {
            RollCallError::Configuration(format!("Invalid SMS base URL: {e}"))
        })?;

        let mut client_builder = Client::builder()
            .timeout(config.request_timeout())
            .user_agent(format!("rollcall-core/{}", env!("CARGO_PKG_VERSION")));

        if !config.api_key.is_empty() {
            let mut default_headers = reqwest::header::HeaderMap::new();
            default_headers.insert(
                reqwest::header::AUTHORIZATION,
                format!("Bearer {}", config.api_key).parse().map_err(|e| {
                    RollCallError::Configuration(format!("Invalid SMS API key: {e}"))
                })?,
            );
            client_builder = client_builder.default_headers(default_headers);
        }

        let client = client_builder.build().map_err(|e| {
            RollCallError::Configuration(format!("Failed to build SMS HTTP client: {e}"))
        })?;

        let pacer = (config.messages_per_second > 0)
            .then(|| SendPacer::new(config.messages_per_second));

        Ok(Self {
            client,
            base_url,
            from: config.from.clone(),
            keyword: config.keyword.clone(),
            pacer,
        })
    }

    /// Strip the leading organization keyword from reply content.
    ///
    /// The gateway routes texts to us by keyword, so inbound bodies arrive as
    /// "<keyword> actual reply". Matching is case-insensitive and the keyword
    /// alone (no further text) yields an empty reply body.
    fn strip_keyword<'a>(&self, content: &'a str) -> &'a str {
        let trimmed = content.trim();
        if self.keyword.is_empty() {
            return trimmed;
        }
        // get() guards the char boundary for multibyte bodies
        if let Some(prefix) = trimmed.get(..self.keyword.len()) {
            if prefix.eq_ignore_ascii_case(&self.keyword) {
                let rest = &trimmed[self.keyword.len()..];
                if rest.is_empty() || rest.starts_with(char::is_whitespace) {
                    return rest.trim_start();
                }
            }
        }
        trimmed
    }
}

#[async_trait]
impl ChannelAdapter for SmsAdapter {
    fn channel(&self) -> Channel {
        Channel::Sms
    }

    async fn send(&self, request: &OutboundRequest) -> ChannelResult<ProviderReceipt> {
        if let Some(pacer) = &self.pacer {
            pacer.acquire().await;
        }

        let url = self.base_url.join("messages").map_err(|e| {
            ChannelError::Transport(format!("Failed to construct send URL: {e}"))
        })?;

        debug!(
            roll_call_uuid = %request.roll_call_uuid,
            contact_uuid = %request.contact.contact_uuid,
            "Sending SMS"
        );

        let response = self
            .client
            .post(url)
            .json(&serde_json::json!({
                "to": request.contact.address,
                "from": self.from,
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

        let body: SendResponse = response.json().await.map_err(|e| {
            ChannelError::Transport(format!("Invalid provider response: {e}"))
        })?;

        Ok(ProviderReceipt {
            provider_message_id: body.message_id,
        })
    }

    fn parse_inbound(&self, payload: &Value) -> ChannelResult<InboundMessage> {
        let from = payload
            .get("from")
            .and_then(Value::as_str)
            .ok_or_else(|| ChannelError::MalformedPayload("missing 'from' field".to_string()))?;

        let body = payload
            .get("body")
            .or_else(|| payload.get("text"))
            .and_then(Value::as_str)
            .ok_or_else(|| ChannelError::MalformedPayload("missing 'body' field".to_string()))?;

        let received_at = payload
            .get("received_at")
            .and_then(Value::as_str)
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(Utc::now);

        Ok(InboundMessage {
            contact_address: from.to_string(),
            content: self.strip_keyword(body).to_string(),
            received_at,
        })
    }
}

#[async_trait]
impl ComplaintFeed for SmsAdapter {
    async fn fetch_complaints(
        &self,
        organization_uuid: Uuid,
        since: Option<DateTime<Utc>>,
    ) -> ChannelResult<Vec<ComplaintReport>> {
        let mut url = self.base_url.join("complaints").map_err(|e| {
            ChannelError::Transport(format!("Failed to construct complaints URL: {e}"))
        })?;

        url.query_pairs_mut()
            .append_pair("organization", &organization_uuid.to_string());
        if let Some(since) = since {
            url.query_pairs_mut()
                .append_pair("since", &since.to_rfc3339());
        }

        let response = self.client.get(url).send().await?;

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

        let rows: Vec<ComplaintRow> = response.json().await.map_err(|e| {
            ChannelError::Transport(format!("Invalid complaints response: {e}"))
        })?;

        Ok(rows
            .into_iter()
            .map(|row| ComplaintReport {
                roll_call_uuid: row.roll_call_id,
                count: row.count,
            })
            .collect())
    }
}
