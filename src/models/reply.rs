//! # Reply Model
//!
//! An inbound response correlated back to a roll call. A user may reply any
//! number of times; only the most recent reply per user counts toward
//! `reply_count` and the recipient's response status, so rows here are an
//! append-only history rather than a deduplicated set.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One inbound response from one contact, attributed to the contact's user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reply {
    pub reply_uuid: Uuid,
    pub roll_call_uuid: Uuid,
    pub user_uuid: Uuid,
    pub contact_uuid: Uuid,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl Reply {
    /// Materialize a reply from creation input, generating the identifier
    /// and defaulting `created_at` to now.
    pub fn from_new(new: NewReply) -> Self {
        Self {
            reply_uuid: Uuid::new_v4(),
            roll_call_uuid: new.roll_call_uuid,
            user_uuid: new.user_uuid,
            contact_uuid: new.contact_uuid,
            content: new.content,
            created_at: new.created_at.unwrap_or_else(Utc::now),
        }
    }
}

/// New Reply for creation (without generated fields)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewReply {
    pub roll_call_uuid: Uuid,
    pub user_uuid: Uuid,
    pub contact_uuid: Uuid,
    pub content: String,
    /// Defaults to now when not provided; the correlator passes the
    /// provider-reported receipt time
    pub created_at: Option<DateTime<Utc>>,
}
