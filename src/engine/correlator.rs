//! # Reply Correlator
//!
//! Attributes inbound messages back to outbound roll call messages using
//! last-unreplied-by-contact semantics: the match target is the contact's
//! most recent outbound message that has no newer reply from the contact's
//! user, across every roll call the contact was messaged for.
//!
//! ## Per-contact serialization
//!
//! Find-then-insert must not race for one contact: two near-simultaneous
//! inbound events would otherwise both observe the same unreplied message
//! and both record a reply against it. Correlation therefore holds an
//! in-process async mutex keyed by contact id across the find and the
//! insert. Different contacts correlate fully in parallel.
//!
//! Inbound messages that match nothing are parked as [`UnmatchedInbound`]
//! records for manual triage, never dropped.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{Result, RollCallError};
use crate::events::{EngineEvent, EventPublisher};
use crate::models::{
    Channel, Contact, NewReply, NewUnmatchedInbound, Reply, ResponseStatus, UnmatchedInbound,
};
use crate::storage::RollCallStore;

/// Outcome of correlating one inbound message.
#[derive(Debug, Clone)]
pub enum CorrelationResult {
    /// The inbound message answered an outstanding outbound message.
    Matched {
        reply: Reply,
        roll_call_uuid: Uuid,
        message_uuid: Uuid,
    },
    /// No outstanding outbound message existed; parked for triage.
    Unmatched { inbound: UnmatchedInbound },
}

impl CorrelationResult {
    pub fn is_matched(&self) -> bool {
        matches!(self, Self::Matched { .. })
    }
}

/// Matches inbound messages to outstanding outbound messages.
pub struct ReplyCorrelator {
    store: Arc<dyn RollCallStore>,
    events: EventPublisher,
    /// One lock per contact, created on first use and kept for the process
    /// lifetime.
    contact_locks: DashMap<Uuid, Arc<Mutex<()>>>,
}

impl ReplyCorrelator {
    pub fn new(store: Arc<dyn RollCallStore>, events: EventPublisher) -> Self {
        Self {
            store,
            events,
            contact_locks: DashMap::new(),
        }
    }

    fn lock_for(&self, contact_uuid: Uuid) -> Arc<Mutex<()>> {
        self.contact_locks
            .entry(contact_uuid)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Correlate one inbound message from a known contact.
    ///
    /// On a match, records the reply and upgrades the recipient's response
    /// status to `replied`. On no match, parks the message as unmatched.
    pub async fn correlate(
        &self,
        contact: &Contact,
        content: &str,
        received_at: DateTime<Utc>,
    ) -> Result<CorrelationResult> {
        let lock = self.lock_for(contact.contact_uuid);
        let _guard = lock.lock().await;

        let Some(message) = self
            .store
            .last_unreplied_message_by_contact(contact.contact_uuid)
            .await?
        else {
            debug!(
                contact_uuid = %contact.contact_uuid,
                "No unreplied outbound message for contact, parking inbound"
            );
            let inbound = self
                .park_unmatched(
                    contact.channel,
                    contact.address.clone(),
                    Some(contact.contact_uuid),
                    content.to_string(),
                    received_at,
                )
                .await?;
            return Ok(CorrelationResult::Unmatched { inbound });
        };

        let reply = self
            .store
            .record_reply(NewReply {
                roll_call_uuid: message.roll_call_uuid,
                user_uuid: contact.user_uuid,
                contact_uuid: contact.contact_uuid,
                content: content.to_string(),
                created_at: Some(received_at),
            })
            .await?;

        match self
            .store
            .update_recipient_status(
                message.roll_call_uuid,
                contact.user_uuid,
                ResponseStatus::Replied,
            )
            .await
        {
            Ok(_) => {}
            Err(RollCallError::NotFound { .. }) => {
                // A reply can arrive from a contact that was messaged without
                // a recipient row (re-sends to replaced contacts). The reply
                // itself still counts.
                warn!(
                    roll_call_uuid = %message.roll_call_uuid,
                    user_uuid = %contact.user_uuid,
                    "Matched reply has no recipient row to upgrade"
                );
            }
            Err(e) => {
                warn!(
                    roll_call_uuid = %message.roll_call_uuid,
                    user_uuid = %contact.user_uuid,
                    error = %e,
                    "Failed to upgrade recipient status for matched reply"
                );
            }
        }

        debug!(
            roll_call_uuid = %message.roll_call_uuid,
            contact_uuid = %contact.contact_uuid,
            reply_uuid = %reply.reply_uuid,
            "Inbound message correlated"
        );

        if let Err(e) = self
            .events
            .publish(EngineEvent::ReplyMatched {
                roll_call_uuid: message.roll_call_uuid,
                user_uuid: contact.user_uuid,
                contact_uuid: contact.contact_uuid,
                reply_uuid: reply.reply_uuid,
            })
            .await
        {
            warn!(error = %e, "Failed to publish reply event");
        }

        Ok(CorrelationResult::Matched {
            reply,
            roll_call_uuid: message.roll_call_uuid,
            message_uuid: message.message_uuid,
        })
    }

    /// Park an inbound message that matched nothing, publishing the
    /// triage event. Also used directly for inbound traffic from addresses
    /// with no contact on file.
    pub async fn park_unmatched(
        &self,
        channel: Channel,
        contact_address: String,
        contact_uuid: Option<Uuid>,
        content: String,
        received_at: DateTime<Utc>,
    ) -> Result<UnmatchedInbound> {
        let inbound = self
            .store
            .record_unmatched_inbound(NewUnmatchedInbound {
                channel,
                contact_address,
                contact_uuid,
                content,
                received_at,
            })
            .await?;

        if let Err(e) = self
            .events
            .publish(EngineEvent::InboundUnmatched {
                inbound_uuid: inbound.inbound_uuid,
                channel: inbound.channel,
                contact_address: inbound.contact_address.clone(),
            })
            .await
        {
            warn!(error = %e, "Failed to publish unmatched inbound event");
        }

        Ok(inbound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewContact, NewOutboundMessage, NewRollCall};
    use crate::storage::InMemoryStore;

    async fn seeded() -> (Arc<InMemoryStore>, Contact, Uuid) {
        let store = Arc::new(InMemoryStore::new());
        let contact = store
            .create_contact(NewContact {
                user_uuid: Uuid::new_v4(),
                channel: Channel::Sms,
                address: "+15551239000".to_string(),
            })
            .await
            .unwrap();
        let roll_call = store
            .create_roll_call(
                NewRollCall {
                    organization_uuid: Uuid::new_v4(),
                    creator_uuid: Uuid::new_v4(),
                    message: "Status check".to_string(),
                    self_test: false,
                    targets: vec![contact.user_uuid],
                },
                &[contact.user_uuid],
            )
            .await
            .unwrap();
        store
            .record_outbound_message(NewOutboundMessage {
                roll_call_uuid: roll_call.roll_call_uuid,
                contact_uuid: contact.contact_uuid,
                channel: Channel::Sms,
                provider_message_id: "m1".to_string(),
                sent_at: None,
            })
            .await
            .unwrap();
        (store, contact, roll_call.roll_call_uuid)
    }

    #[tokio::test]
    async fn test_matched_reply_upgrades_recipient() {
        let (store, contact, roll_call_uuid) = seeded().await;
        let correlator = ReplyCorrelator::new(store.clone(), EventPublisher::default());

        let result = correlator
            .correlate(&contact, "I'm fine", Utc::now())
            .await
            .unwrap();

        match result {
            CorrelationResult::Matched {
                roll_call_uuid: matched,
                ref reply,
                ..
            } => {
                assert_eq!(matched, roll_call_uuid);
                assert_eq!(reply.content, "I'm fine");
            }
            CorrelationResult::Unmatched { .. } => panic!("expected a match"),
        }

        let recipient = store
            .recipient(roll_call_uuid, contact.user_uuid)
            .await
            .unwrap();
        assert_eq!(recipient.response_status, ResponseStatus::Replied);
    }

    #[tokio::test]
    async fn test_second_reply_without_new_outbound_is_unmatched() {
        let (store, contact, _) = seeded().await;
        let correlator = ReplyCorrelator::new(store.clone(), EventPublisher::default());

        let first = correlator
            .correlate(&contact, "first", Utc::now())
            .await
            .unwrap();
        assert!(first.is_matched());

        let second = correlator
            .correlate(&contact, "second", Utc::now())
            .await
            .unwrap();
        assert!(!second.is_matched());

        assert_eq!(store.unmatched_inbound(10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unsolicited_inbound_parks_with_contact() {
        let store = Arc::new(InMemoryStore::new());
        let contact = store
            .create_contact(NewContact {
                user_uuid: Uuid::new_v4(),
                channel: Channel::Sms,
                address: "+15551239001".to_string(),
            })
            .await
            .unwrap();
        let correlator = ReplyCorrelator::new(store.clone(), EventPublisher::default());

        let result = correlator
            .correlate(&contact, "hello?", Utc::now())
            .await
            .unwrap();

        match result {
            CorrelationResult::Unmatched { inbound } => {
                assert_eq!(inbound.contact_uuid, Some(contact.contact_uuid));
                assert_eq!(inbound.content, "hello?");
            }
            CorrelationResult::Matched { .. } => panic!("expected unmatched"),
        }
    }

    #[tokio::test]
    async fn test_concurrent_inbound_for_one_contact_matches_once() {
        let (store, contact, _) = seeded().await;
        let correlator = Arc::new(ReplyCorrelator::new(store.clone(), EventPublisher::default()));

        let mut handles = Vec::new();
        for i in 0..8 {
            let correlator = Arc::clone(&correlator);
            let contact = contact.clone();
            handles.push(tokio::spawn(async move {
                correlator
                    .correlate(&contact, &format!("reply {i}"), Utc::now())
                    .await
                    .unwrap()
            }));
        }

        let mut matched = 0;
        for handle in handles {
            if handle.await.unwrap().is_matched() {
                matched += 1;
            }
        }
        // Exactly one inbound wins the single outstanding message
        assert_eq!(matched, 1);
    }
}
