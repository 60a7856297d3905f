//! # RollCall Model
//!
//! A roll call is one broadcast request from an organization to a set of
//! recipients: "are you safe / are you there, reply to confirm". It owns the
//! outbound messages created by the dispatcher and the recipient rows that
//! track who has answered.
//!
//! ## Lifecycle
//!
//! A roll call is created in `draft`. The dispatcher claims the
//! `draft -> sent` transition atomically before any fan-out so a concurrent
//! second dispatch becomes a no-op; if every send in the batch fails the claim
//! is released and the roll call returns to `draft`. `closed` is set
//! explicitly by the owning organization and is terminal. There is no delete:
//! messages, replies and complaint totals reference roll calls as an audit
//! record, so `closed` is the archival state.
//!
//! ## Self-test mode
//!
//! With `self_test` set, the declared target list is ignored and the creator
//! is the sole recipient. Used to preview a roll call before sending it to a
//! whole organization.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Roll-call lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RollCallStatus {
    /// Created, not yet dispatched
    Draft,
    /// At least one outbound message was sent
    Sent,
    /// Explicitly archived; terminal
    Closed,
}

impl RollCallStatus {
    /// Check if this is a terminal state (no further transitions allowed)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed)
    }

    /// Check if the dispatcher may claim this roll call for fan-out
    pub fn is_dispatchable(&self) -> bool {
        matches!(self, Self::Draft)
    }

    /// Whether an explicit status update from `self` to `to` is allowed.
    ///
    /// Only the archival transitions go through here; `draft <-> sent` is
    /// reserved for the dispatcher's claim/release pair. Same-state updates
    /// are permitted as no-ops.
    pub fn can_transition_to(&self, to: RollCallStatus) -> bool {
        *self == to || matches!(to, Self::Closed)
    }
}

impl fmt::Display for RollCallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Draft => write!(f, "draft"),
            Self::Sent => write!(f, "sent"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

impl std::str::FromStr for RollCallStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(Self::Draft),
            "sent" => Ok(Self::Sent),
            "closed" => Ok(Self::Closed),
            _ => Err(format!("Invalid roll call status: {s}")),
        }
    }
}

impl Default for RollCallStatus {
    fn default() -> Self {
        Self::Draft
    }
}

/// A broadcast notification request owned by an organization.
///
/// Immutable after creation except for `status`/`dispatched_at`, which move
/// only through the dispatcher claim and the explicit close operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollCall {
    pub roll_call_uuid: Uuid,
    pub organization_uuid: Uuid,
    pub creator_uuid: Uuid,
    /// Message body delivered on every channel
    pub message: String,
    pub status: RollCallStatus,
    pub self_test: bool,
    /// Set when the dispatcher claims the roll call; cleared again if the
    /// whole batch fails and the claim is released
    pub dispatched_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl RollCall {
    /// Materialize a draft roll call from creation input, generating the
    /// identifier and timestamp. Target handling stays with the caller.
    pub fn from_new(new: &NewRollCall) -> Self {
        Self {
            roll_call_uuid: Uuid::new_v4(),
            organization_uuid: new.organization_uuid,
            creator_uuid: new.creator_uuid,
            message: new.message.clone(),
            status: RollCallStatus::Draft,
            self_test: new.self_test,
            dispatched_at: None,
            created_at: Utc::now(),
        }
    }
}

/// New RollCall for creation (without generated fields)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewRollCall {
    pub organization_uuid: Uuid,
    pub creator_uuid: Uuid,
    pub message: String,
    pub self_test: bool,
    /// Declared target user ids. Ignored when `self_test` is set.
    pub targets: Vec<Uuid>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_terminal_check() {
        assert!(RollCallStatus::Closed.is_terminal());
        assert!(!RollCallStatus::Draft.is_terminal());
        assert!(!RollCallStatus::Sent.is_terminal());
    }

    #[test]
    fn test_dispatchable_only_from_draft() {
        assert!(RollCallStatus::Draft.is_dispatchable());
        assert!(!RollCallStatus::Sent.is_dispatchable());
        assert!(!RollCallStatus::Closed.is_dispatchable());
    }

    #[test]
    fn test_explicit_transitions() {
        assert!(RollCallStatus::Draft.can_transition_to(RollCallStatus::Closed));
        assert!(RollCallStatus::Sent.can_transition_to(RollCallStatus::Closed));
        assert!(RollCallStatus::Closed.can_transition_to(RollCallStatus::Closed));
        assert!(!RollCallStatus::Closed.can_transition_to(RollCallStatus::Draft));
        assert!(!RollCallStatus::Sent.can_transition_to(RollCallStatus::Draft));
        assert!(!RollCallStatus::Draft.can_transition_to(RollCallStatus::Sent));
    }

    #[test]
    fn test_status_string_conversion() {
        assert_eq!(RollCallStatus::Sent.to_string(), "sent");
        assert_eq!(
            "draft".parse::<RollCallStatus>().unwrap(),
            RollCallStatus::Draft
        );
        assert!("archived".parse::<RollCallStatus>().is_err());
    }
}
