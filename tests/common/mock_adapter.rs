//! Mock channel adapter for testing dispatch and correlation without
//! real providers.
//!
//! Records every send, and can simulate per-address failures and slow
//! provider calls to exercise partial-failure and timeout paths.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

use rollcall_core::channels::{
    ChannelAdapter, ChannelError, ChannelResult, ComplaintFeed, ComplaintReport, InboundMessage,
    OutboundRequest, ProviderReceipt,
};
use rollcall_core::models::Channel;

/// One recorded send.
#[derive(Debug, Clone)]
pub struct RecordedSend {
    pub roll_call_uuid: Uuid,
    pub contact_uuid: Uuid,
    pub address: String,
    pub content: String,
}

#[derive(Debug, Default)]
struct MockAdapterState {
    sends: Vec<RecordedSend>,
    failing_addresses: HashSet<String>,
}

/// Recording adapter with failure and delay injection.
pub struct MockAdapter {
    channel: Channel,
    state: Arc<Mutex<MockAdapterState>>,
    send_delay: Option<Duration>,
    sequence: AtomicU64,
}

impl MockAdapter {
    pub fn new(channel: Channel) -> Self {
        Self {
            channel,
            state: Arc::new(Mutex::new(MockAdapterState::default())),
            send_delay: None,
            sequence: AtomicU64::new(0),
        }
    }

    /// Simulate a slow provider: every send sleeps this long first.
    pub fn with_send_delay(mut self, delay: Duration) -> Self {
        self.send_delay = Some(delay);
        self
    }

    /// Make sends to `address` fail with a transport error.
    pub fn fail_address(&self, address: &str) {
        self.state
            .lock()
            .unwrap()
            .failing_addresses
            .insert(address.to_string());
    }

    /// Every send recorded so far, in completion order.
    pub fn sends(&self) -> Vec<RecordedSend> {
        self.state.lock().unwrap().sends.clone()
    }

    pub fn send_count(&self) -> usize {
        self.state.lock().unwrap().sends.len()
    }
}

#[async_trait]
impl ChannelAdapter for MockAdapter {
    fn channel(&self) -> Channel {
        self.channel
    }

    async fn send(&self, request: &OutboundRequest) -> ChannelResult<ProviderReceipt> {
        if let Some(delay) = self.send_delay {
            tokio::time::sleep(delay).await;
        }

        if self
            .state
            .lock()
            .unwrap()
            .failing_addresses
            .contains(&request.contact.address)
        {
            return Err(ChannelError::Transport(format!(
                "simulated failure for {}",
                request.contact.address
            )));
        }

        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst);
        self.state.lock().unwrap().sends.push(RecordedSend {
            roll_call_uuid: request.roll_call_uuid,
            contact_uuid: request.contact.contact_uuid,
            address: request.contact.address.clone(),
            content: request.content.clone(),
        });

        Ok(ProviderReceipt {
            provider_message_id: format!("{}-{}", self.channel, sequence),
        })
    }

    fn parse_inbound(&self, payload: &Value) -> ChannelResult<InboundMessage> {
        let from = payload
            .get("from")
            .and_then(Value::as_str)
            .ok_or_else(|| ChannelError::MalformedPayload("missing 'from'".to_string()))?;
        let body = payload
            .get("body")
            .and_then(Value::as_str)
            .ok_or_else(|| ChannelError::MalformedPayload("missing 'body'".to_string()))?;
        let received_at = payload
            .get("received_at")
            .and_then(Value::as_str)
            .and_then(|s| s.parse::<DateTime<Utc>>().ok())
            .unwrap_or_else(Utc::now);

        Ok(InboundMessage {
            contact_address: from.to_string(),
            content: body.to_string(),
            received_at,
        })
    }
}

/// Scripted complaint feed for reconciler tests.
#[derive(Default)]
pub struct MockComplaintFeed {
    reports: Mutex<Vec<ComplaintReport>>,
}

impl MockComplaintFeed {
    pub fn set_reports(&self, reports: Vec<ComplaintReport>) {
        *self.reports.lock().unwrap() = reports;
    }
}

#[async_trait]
impl ComplaintFeed for MockComplaintFeed {
    async fn fetch_complaints(
        &self,
        _organization_uuid: Uuid,
        _since: Option<DateTime<Utc>>,
    ) -> ChannelResult<Vec<ComplaintReport>> {
        Ok(self.reports.lock().unwrap().clone())
    }
}
