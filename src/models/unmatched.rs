//! # UnmatchedInbound Model
//!
//! Inbound messages the correlator could not attribute to any outstanding
//! outbound message. Persisted for manual triage rather than silently
//! dropped: an operator (or a provider-specific auto-reply collaborator)
//! works the queue through [`unmatched_inbound`](crate::storage::RollCallStore::unmatched_inbound).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Channel;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnmatchedInbound {
    pub inbound_uuid: Uuid,
    pub channel: Channel,
    /// Raw channel address the message arrived from
    pub contact_address: String,
    /// Resolved contact, when the address was known but had no outstanding
    /// message
    pub contact_uuid: Option<Uuid>,
    pub content: String,
    pub received_at: DateTime<Utc>,
}

impl UnmatchedInbound {
    /// Materialize a parked inbound record, generating the identifier.
    pub fn from_new(new: NewUnmatchedInbound) -> Self {
        Self {
            inbound_uuid: Uuid::new_v4(),
            channel: new.channel,
            contact_address: new.contact_address,
            contact_uuid: new.contact_uuid,
            content: new.content,
            received_at: new.received_at,
        }
    }
}

/// New UnmatchedInbound for creation (without generated fields)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewUnmatchedInbound {
    pub channel: Channel,
    pub contact_address: String,
    pub contact_uuid: Option<Uuid>,
    pub content: String,
    pub received_at: DateTime<Utc>,
}
