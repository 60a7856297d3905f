//! # OutboundMessage Model
//!
//! One delivery attempt of one roll call to one contact over one channel.
//! Rows are immutable once recorded; `sent_count` for a roll call is the
//! plain row count, independent of how many other recipients failed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Channel;

/// A recorded dispatch attempt.
///
/// The contact's channel must match `channel`; storage enforces this on
/// insert. `provider_message_id` is whatever identifier the channel provider
/// returned for the accepted message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub message_uuid: Uuid,
    pub roll_call_uuid: Uuid,
    pub contact_uuid: Uuid,
    pub channel: Channel,
    pub provider_message_id: String,
    pub sent_at: DateTime<Utc>,
}

impl OutboundMessage {
    /// Materialize a message record from creation input, generating the
    /// identifier and defaulting `sent_at` to now.
    pub fn from_new(new: NewOutboundMessage) -> Self {
        Self {
            message_uuid: Uuid::new_v4(),
            roll_call_uuid: new.roll_call_uuid,
            contact_uuid: new.contact_uuid,
            channel: new.channel,
            provider_message_id: new.provider_message_id,
            sent_at: new.sent_at.unwrap_or_else(Utc::now),
        }
    }
}

/// New OutboundMessage for creation (without generated fields)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewOutboundMessage {
    pub roll_call_uuid: Uuid,
    pub contact_uuid: Uuid,
    pub channel: Channel,
    pub provider_message_id: String,
    /// Defaults to now when not provided
    pub sent_at: Option<DateTime<Utc>>,
}
