//! # Channel Adapters
//!
//! Uniform interface over the outbound notification channels (SMS, Slack,
//! push) plus parsing of each provider's inbound webhook payloads.
//!
//! ## Architecture
//!
//! Every channel implements [`ChannelAdapter`]: one `send` for outbound
//! delivery and one `parse_inbound` that normalizes the provider's webhook
//! body into an [`InboundMessage`]. Adapters are registered in a
//! [`ChannelAdapterRegistry`] keyed by [`Channel`], and the dispatcher picks
//! them up from there at fan-out time.
//!
//! Adapter errors stay channel-scoped ([`ChannelError`]) so one provider's
//! failure modes never leak provider-specific types into the engine.

pub mod push;
pub mod slack;
pub mod sms;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use uuid::Uuid;

use crate::models::{Channel, Contact};

pub use push::PushAdapter;
pub use slack::SlackAdapter;
pub use sms::SmsAdapter;

/// One outbound delivery for a single contact.
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    pub organization_uuid: Uuid,
    pub roll_call_uuid: Uuid,
    pub contact: Contact,
    pub content: String,
}

/// Provider acknowledgement of an accepted outbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderReceipt {
    /// Provider-side identifier for the accepted message, used later to
    /// tie provider callbacks back to our records.
    pub provider_message_id: String,
}

/// A provider webhook payload normalized to what correlation needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    /// Channel-native sender address (phone number, Slack user id).
    pub contact_address: String,
    /// Message text after channel-specific framing is stripped.
    pub content: String,
    pub received_at: DateTime<Utc>,
}

/// Channel-scoped failures raised by adapters.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// The provider could not be reached or timed out.
    #[error("Transport failure: {0}")]
    Transport(String),

    /// The provider answered but refused the message.
    #[error("Provider rejected message: {0}")]
    Rejected(String),

    /// An inbound payload did not have the expected shape.
    #[error("Malformed inbound payload: {0}")]
    MalformedPayload(String),

    /// The channel has no inbound direction.
    #[error("Channel does not support inbound messages")]
    InboundUnsupported,

    /// A required organization setting is absent.
    #[error("Missing channel setting: {0}")]
    MissingSetting(String),
}

impl From<reqwest::Error> for ChannelError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_status() {
            ChannelError::Rejected(error.to_string())
        } else {
            ChannelError::Transport(error.to_string())
        }
    }
}

/// Convenient Result type for adapter operations
pub type ChannelResult<T> = Result<T, ChannelError>;

/// Uniform send/parse interface implemented per channel.
#[async_trait]
pub trait ChannelAdapter: Send + Sync {
    /// The channel this adapter serves.
    fn channel(&self) -> Channel;

    /// Deliver one message to one contact.
    async fn send(&self, request: &OutboundRequest) -> ChannelResult<ProviderReceipt>;

    /// Normalize a provider webhook body into an [`InboundMessage`].
    ///
    /// Channels without an inbound direction return
    /// [`ChannelError::InboundUnsupported`].
    fn parse_inbound(&self, payload: &serde_json::Value) -> ChannelResult<InboundMessage>;
}

/// Thread-safe registry of channel adapters keyed by [`Channel`].
#[derive(Default)]
pub struct ChannelAdapterRegistry {
    adapters: DashMap<Channel, Arc<dyn ChannelAdapter>>,
}

impl ChannelAdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an adapter, replacing any previous adapter for its channel.
    pub fn register(&self, adapter: Arc<dyn ChannelAdapter>) {
        self.adapters.insert(adapter.channel(), adapter);
    }

    /// Look up the adapter for a channel.
    pub fn get(&self, channel: Channel) -> Option<Arc<dyn ChannelAdapter>> {
        self.adapters.get(&channel).map(|entry| entry.value().clone())
    }

    /// Channels that currently have a registered adapter.
    pub fn channels(&self) -> Vec<Channel> {
        self.adapters.iter().map(|entry| *entry.key()).collect()
    }

    pub fn is_registered(&self, channel: Channel) -> bool {
        self.adapters.contains_key(&channel)
    }
}

impl std::fmt::Debug for ChannelAdapterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelAdapterRegistry")
            .field("channels", &self.channels())
            .finish()
    }
}

/// Complaint totals reported by a provider for one roll call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComplaintReport {
    pub roll_call_uuid: Uuid,
    /// Cumulative complaint count the provider has recorded for this
    /// roll call so far.
    pub count: i64,
}

/// Source of provider-side complaint reports, polled by the reconciler.
#[async_trait]
pub trait ComplaintFeed: Send + Sync {
    /// Fetch complaint reports for an organization, scoped to activity at or
    /// after `since` when the provider supports windowing.
    async fn fetch_complaints(
        &self,
        organization_uuid: Uuid,
        since: Option<DateTime<Utc>>,
    ) -> ChannelResult<Vec<ComplaintReport>>;
}
