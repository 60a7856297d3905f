//! # Recipient Model
//!
//! Pivot row between a roll call and a targeted user, carrying the user's
//! response status. One row per (roll_call, user); created together with the
//! roll call and updated only through the guarded status transition below.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Per-recipient response tracking state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    /// No reply correlated yet
    Pending,
    /// A reply was matched to one of this user's outbound messages
    Replied,
    /// Flagged by escalation policy after going unanswered too long
    Unresponsive,
}

impl ResponseStatus {
    /// Check if this user has answered the roll call
    pub fn is_replied(&self) -> bool {
        matches!(self, Self::Replied)
    }

    /// Whether a transition from `self` to `to` is allowed.
    ///
    /// `replied` never reverts: a late escalation sweep cannot downgrade a
    /// user who already answered. An unresponsive user who answers late is
    /// upgraded to `replied`. Same-state updates are permitted as no-ops.
    pub fn can_transition_to(&self, to: ResponseStatus) -> bool {
        match (self, to) {
            (a, b) if *a == b => true,
            (Self::Pending, Self::Replied) => true,
            (Self::Pending, Self::Unresponsive) => true,
            (Self::Unresponsive, Self::Replied) => true,
            _ => false,
        }
    }
}

impl fmt::Display for ResponseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Replied => write!(f, "replied"),
            Self::Unresponsive => write!(f, "unresponsive"),
        }
    }
}

impl std::str::FromStr for ResponseStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "replied" => Ok(Self::Replied),
            "unresponsive" => Ok(Self::Unresponsive),
            _ => Err(format!("Invalid response status: {s}")),
        }
    }
}

impl Default for ResponseStatus {
    fn default() -> Self {
        Self::Pending
    }
}

/// One targeted user of one roll call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recipient {
    pub roll_call_uuid: Uuid,
    pub user_uuid: Uuid,
    pub response_status: ResponseStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
