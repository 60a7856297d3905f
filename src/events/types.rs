//! Lifecycle event types emitted by the engine.
//!
//! Events are observational. Nothing in the delivery or correlation paths
//! depends on a subscriber consuming them, and publishing to an empty
//! channel is not an error.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::Channel;

/// Events published on the engine's broadcast channel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EngineEvent {
    /// A roll call was persisted and is about to be dispatched.
    RollCallCreated {
        roll_call_uuid: Uuid,
        organization_uuid: Uuid,
        self_test: bool,
    },
    /// Fan-out completed for a roll call.
    RollCallDispatched {
        roll_call_uuid: Uuid,
        sent: usize,
        failed: usize,
        unreachable: usize,
    },
    /// An inbound message was attributed to a recipient's open roll call.
    ReplyMatched {
        roll_call_uuid: Uuid,
        user_uuid: Uuid,
        contact_uuid: Uuid,
        reply_uuid: Uuid,
    },
    /// An inbound message could not be attributed and was parked for review.
    InboundUnmatched {
        inbound_uuid: Uuid,
        channel: Channel,
        contact_address: String,
    },
    /// The reconciler found a delivered message still awaiting a reply.
    OutstandingMessage {
        roll_call_uuid: Uuid,
        contact_uuid: Uuid,
        message_uuid: Uuid,
        sent_at: DateTime<Utc>,
    },
    /// Complaint polling refreshed an organization's totals.
    ComplaintTotalsUpdated { organization_uuid: Uuid, total: i64 },
}

impl EngineEvent {
    /// Stable event name, usable as a routing key by subscribers.
    pub fn name(&self) -> &'static str {
        match self {
            EngineEvent::RollCallCreated { .. } => "roll_call.created",
            EngineEvent::RollCallDispatched { .. } => "roll_call.dispatched",
            EngineEvent::ReplyMatched { .. } => "reply.matched",
            EngineEvent::InboundUnmatched { .. } => "inbound.unmatched",
            EngineEvent::OutstandingMessage { .. } => "reconciler.outstanding_message",
            EngineEvent::ComplaintTotalsUpdated { .. } => "reconciler.complaint_totals_updated",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_names_are_stable() {
        let event = EngineEvent::RollCallCreated {
            roll_call_uuid: Uuid::new_v4(),
            organization_uuid: Uuid::new_v4(),
            self_test: false,
        };
        assert_eq!(event.name(), "roll_call.created");

        let event = EngineEvent::ComplaintTotalsUpdated {
            organization_uuid: Uuid::new_v4(),
            total: 3,
        };
        assert_eq!(event.name(), "reconciler.complaint_totals_updated");
    }

    #[test]
    fn test_event_serialization_tags() {
        let event = EngineEvent::RollCallDispatched {
            roll_call_uuid: Uuid::new_v4(),
            sent: 2,
            failed: 1,
            unreachable: 0,
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["event"], "roll_call_dispatched");
        assert_eq!(value["sent"], 2);
    }
}
