//! # Contact Model
//!
//! A contact is one user's reachable address on one delivery channel: a phone
//! number for SMS, a workspace member id for Slack, a device token for push.
//! A user may hold several contacts (one or more per channel); the recipient
//! resolver picks among them by the configured channel priority.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Delivery channel a contact is reachable on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    /// Text message through the SMS gateway
    Sms,
    /// Slack incoming webhook
    Slack,
    /// Mobile push through the push gateway
    Push,
}

impl Channel {
    /// Channels that can carry inbound replies back into the engine.
    pub fn supports_inbound(&self) -> bool {
        matches!(self, Self::Sms | Self::Slack)
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sms => write!(f, "sms"),
            Self::Slack => write!(f, "slack"),
            Self::Push => write!(f, "push"),
        }
    }
}

impl std::str::FromStr for Channel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sms" => Ok(Self::Sms),
            "slack" => Ok(Self::Slack),
            "push" => Ok(Self::Push),
            _ => Err(format!("Invalid channel: {s}")),
        }
    }
}

/// One user's address on one channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contact {
    pub contact_uuid: Uuid,
    pub user_uuid: Uuid,
    pub channel: Channel,
    /// Channel-specific address: E.164 phone number, Slack user id,
    /// push device token.
    pub address: String,
    pub created_at: DateTime<Utc>,
}

impl Contact {
    /// Materialize a contact from creation input, generating the identifier
    /// and timestamp.
    pub fn from_new(new: NewContact) -> Self {
        Self {
            contact_uuid: Uuid::new_v4(),
            user_uuid: new.user_uuid,
            channel: new.channel,
            address: new.address,
            created_at: Utc::now(),
        }
    }
}

/// New Contact for creation (without generated fields)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewContact {
    pub user_uuid: Uuid,
    pub channel: Channel,
    pub address: String,
}
