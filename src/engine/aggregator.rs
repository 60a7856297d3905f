//! # Status Aggregator
//!
//! Pure read-side computation of a roll call's derived state. Counts are
//! recomputed from the message and reply records on every read; nothing is
//! cached or denormalized, so partial-failure dispatches and late replies
//! can never leave a stale counter behind.

use std::sync::Arc;

use uuid::Uuid;

use crate::error::Result;
use crate::models::{Recipient, Reply, ResponseStatus, RollCall};
use crate::storage::{Page, RollCallCounts, RollCallFilter, RollCallStore};

/// A roll call together with its derived totals and the most recent reply
/// per user.
#[derive(Debug, Clone)]
pub struct RollCallSummary {
    pub roll_call: RollCall,
    pub reply_count: i64,
    pub sent_count: i64,
    pub latest_replies: Vec<Reply>,
}

/// Read-side derived state over the stored records.
pub struct StatusAggregator {
    store: Arc<dyn RollCallStore>,
}

impl StatusAggregator {
    pub fn new(store: Arc<dyn RollCallStore>) -> Self {
        Self { store }
    }

    /// Distinct replying users and outbound message rows for a roll call.
    pub async fn counts(&self, roll_call_uuid: Uuid) -> Result<RollCallCounts> {
        self.store.counts(roll_call_uuid).await
    }

    /// A single recipient's response status.
    pub async fn recipient_status(
        &self,
        roll_call_uuid: Uuid,
        user_uuid: Uuid,
    ) -> Result<ResponseStatus> {
        Ok(self
            .store
            .recipient(roll_call_uuid, user_uuid)
            .await?
            .response_status)
    }

    /// Recipient rows for a roll call, optionally narrowed by status.
    pub async fn recipients(
        &self,
        roll_call_uuid: Uuid,
        status: Option<ResponseStatus>,
    ) -> Result<Vec<Recipient>> {
        self.store.recipients(roll_call_uuid, status).await
    }

    /// Full derived view of one roll call.
    pub async fn summary(&self, roll_call_uuid: Uuid) -> Result<RollCallSummary> {
        let roll_call = self.store.roll_call(roll_call_uuid).await?;
        let counts = self.store.counts(roll_call_uuid).await?;
        let latest_replies = self.store.latest_replies(roll_call_uuid).await?;

        Ok(RollCallSummary {
            roll_call,
            reply_count: counts.reply_count,
            sent_count: counts.sent_count,
            latest_replies,
        })
    }

    /// Derived views for a filtered listing, newest roll call first.
    pub async fn summaries(
        &self,
        filter: &RollCallFilter,
        page: &Page,
    ) -> Result<Vec<RollCallSummary>> {
        let roll_calls = self.store.list_roll_calls(filter, page).await?;

        let mut summaries = Vec::with_capacity(roll_calls.len());
        for roll_call in roll_calls {
            let counts = self.store.counts(roll_call.roll_call_uuid).await?;
            let latest_replies = self.store.latest_replies(roll_call.roll_call_uuid).await?;
            summaries.push(RollCallSummary {
                roll_call,
                reply_count: counts.reply_count,
                sent_count: counts.sent_count,
                latest_replies,
            });
        }

        Ok(summaries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Channel, NewContact, NewOutboundMessage, NewReply, NewRollCall};
    use crate::storage::InMemoryStore;
    use chrono::{Duration, Utc};

    #[tokio::test]
    async fn test_summary_uses_latest_reply_per_user() {
        let store = Arc::new(InMemoryStore::new());
        let contact = store
            .create_contact(NewContact {
                user_uuid: Uuid::new_v4(),
                channel: Channel::Sms,
                address: "+15551238000".to_string(),
            })
            .await
            .unwrap();
        let roll_call = store
            .create_roll_call(
                NewRollCall {
                    organization_uuid: Uuid::new_v4(),
                    creator_uuid: Uuid::new_v4(),
                    message: "Check in".to_string(),
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

        let earlier = Utc::now() - Duration::minutes(2);
        for (content, at) in [("first", Some(earlier)), ("second", None)] {
            store
                .record_reply(NewReply {
                    roll_call_uuid: roll_call.roll_call_uuid,
                    user_uuid: contact.user_uuid,
                    contact_uuid: contact.contact_uuid,
                    content: content.to_string(),
                    created_at: at,
                })
                .await
                .unwrap();
        }

        let aggregator = StatusAggregator::new(store);
        let summary = aggregator.summary(roll_call.roll_call_uuid).await.unwrap();

        assert_eq!(summary.reply_count, 1);
        assert_eq!(summary.sent_count, 1);
        assert_eq!(summary.latest_replies.len(), 1);
        assert_eq!(summary.latest_replies[0].content, "second");
    }
}
