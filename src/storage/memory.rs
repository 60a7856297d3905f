//! In-memory [`RollCallStore`] backed by lock-protected maps.
//!
//! Mirrors the PostgreSQL implementation's semantics exactly, including the
//! unreplied-message selection and the monotonic complaint upsert, so the
//! engine's behavior under test matches production. Lock guards are never
//! held across an await point.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use uuid::Uuid;

use crate::error::{Result, RollCallError};
use crate::models::{
    Channel, ComplaintRecord, Contact, NewContact, NewOutboundMessage, NewReply, NewRollCall,
    NewUnmatchedInbound, OutboundMessage, Recipient, Reply, ResponseStatus, RollCall,
    RollCallStatus, UnmatchedInbound,
};

use super::{Page, RollCallCounts, RollCallFilter, RollCallStore};

#[derive(Debug, Default)]
pub struct InMemoryStore {
    roll_calls: RwLock<HashMap<Uuid, RollCall>>,
    recipients: RwLock<Vec<Recipient>>,
    contacts: RwLock<HashMap<Uuid, Contact>>,
    messages: RwLock<Vec<OutboundMessage>>,
    replies: RwLock<Vec<Reply>>,
    unmatched: RwLock<Vec<UnmatchedInbound>>,
    /// Keyed by roll call; one total row per roll call.
    complaints: RwLock<HashMap<Uuid, ComplaintRecord>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `message` still awaits a reply: no reply from the contact's
    /// user on the same roll call at or after the send time.
    fn is_unreplied(message: &OutboundMessage, user_uuid: Uuid, replies: &[Reply]) -> bool {
        !replies.iter().any(|reply| {
            reply.roll_call_uuid == message.roll_call_uuid
                && reply.user_uuid == user_uuid
                && reply.created_at >= message.sent_at
        })
    }

    /// Most recent unreplied message among `candidates`, all owned by
    /// `user_uuid`. Later insertions win `sent_at` ties.
    fn last_unreplied<'a>(
        candidates: impl Iterator<Item = &'a OutboundMessage>,
        user_uuid: Uuid,
        replies: &[Reply],
    ) -> Option<OutboundMessage> {
        candidates
            .filter(|message| Self::is_unreplied(message, user_uuid, replies))
            .max_by_key(|message| message.sent_at)
            .cloned()
    }
}

#[async_trait]
impl RollCallStore for InMemoryStore {
    async fn create_roll_call(
        &self,
        new: NewRollCall,
        recipient_users: &[Uuid],
    ) -> Result<RollCall> {
        let roll_call = RollCall::from_new(&new);

        let mut recipients = self.recipients.write();
        let mut seen = HashSet::new();
        for &user_uuid in recipient_users {
            if seen.insert(user_uuid) {
                recipients.push(Recipient {
                    roll_call_uuid: roll_call.roll_call_uuid,
                    user_uuid,
                    response_status: ResponseStatus::Pending,
                    created_at: roll_call.created_at,
                    updated_at: roll_call.created_at,
                });
            }
        }
        drop(recipients);

        self.roll_calls
            .write()
            .insert(roll_call.roll_call_uuid, roll_call.clone());
        Ok(roll_call)
    }

    async fn roll_call(&self, roll_call_uuid: Uuid) -> Result<RollCall> {
        self.roll_calls
            .read()
            .get(&roll_call_uuid)
            .cloned()
            .ok_or(RollCallError::NotFound {
                entity: "roll_call",
                id: roll_call_uuid,
            })
    }

    async fn list_roll_calls(&self, filter: &RollCallFilter, page: &Page) -> Result<Vec<RollCall>> {
        let roll_calls = self.roll_calls.read();
        let recipients = self.recipients.read();

        let mut matching: Vec<RollCall> = roll_calls
            .values()
            .filter(|rc| {
                filter
                    .organization_uuid
                    .is_none_or(|org| rc.organization_uuid == org)
            })
            .filter(|rc| filter.creator_uuid.is_none_or(|user| rc.creator_uuid == user))
            .filter(|rc| {
                filter.recipient_uuid.is_none_or(|user| {
                    rc.creator_uuid == user
                        || recipients.iter().any(|r| {
                            r.roll_call_uuid == rc.roll_call_uuid && r.user_uuid == user
                        })
                })
            })
            .cloned()
            .collect();
        drop(recipients);
        drop(roll_calls);

        matching.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.roll_call_uuid.cmp(&b.roll_call_uuid))
        });

        let page_iter = matching.into_iter().skip(page.offset);
        Ok(match page.limit {
            Some(limit) => page_iter.take(limit).collect(),
            None => page_iter.collect(),
        })
    }

    async fn claim_for_dispatch(&self, roll_call_uuid: Uuid) -> Result<bool> {
        let mut roll_calls = self.roll_calls.write();
        let roll_call = roll_calls
            .get_mut(&roll_call_uuid)
            .ok_or(RollCallError::NotFound {
                entity: "roll_call",
                id: roll_call_uuid,
            })?;

        if roll_call.status.is_dispatchable() {
            roll_call.status = RollCallStatus::Sent;
            roll_call.dispatched_at = Some(Utc::now());
            Ok(true)
        } else {
            Ok(false)
        }
    }

    async fn release_dispatch_claim(&self, roll_call_uuid: Uuid) -> Result<()> {
        let mut roll_calls = self.roll_calls.write();
        let roll_call = roll_calls
            .get_mut(&roll_call_uuid)
            .ok_or(RollCallError::NotFound {
                entity: "roll_call",
                id: roll_call_uuid,
            })?;

        if roll_call.status == RollCallStatus::Sent {
            roll_call.status = RollCallStatus::Draft;
            roll_call.dispatched_at = None;
        }
        Ok(())
    }

    async fn update_roll_call_status(
        &self,
        roll_call_uuid: Uuid,
        status: RollCallStatus,
    ) -> Result<RollCall> {
        let mut roll_calls = self.roll_calls.write();
        let roll_call = roll_calls
            .get_mut(&roll_call_uuid)
            .ok_or(RollCallError::NotFound {
                entity: "roll_call",
                id: roll_call_uuid,
            })?;

        if !roll_call.status.can_transition_to(status) {
            return Err(RollCallError::InvalidStateTransition {
                entity: "roll_call",
                from: roll_call.status.to_string(),
                to: status.to_string(),
            });
        }

        roll_call.status = status;
        Ok(roll_call.clone())
    }

    async fn create_contact(&self, new: NewContact) -> Result<Contact> {
        let contact = Contact::from_new(new);
        self.contacts
            .write()
            .insert(contact.contact_uuid, contact.clone());
        Ok(contact)
    }

    async fn contact(&self, contact_uuid: Uuid) -> Result<Contact> {
        self.contacts
            .read()
            .get(&contact_uuid)
            .cloned()
            .ok_or(RollCallError::NotFound {
                entity: "contact",
                id: contact_uuid,
            })
    }

    async fn contacts_for_user(&self, user_uuid: Uuid) -> Result<Vec<Contact>> {
        let mut contacts: Vec<Contact> = self
            .contacts
            .read()
            .values()
            .filter(|c| c.user_uuid == user_uuid)
            .cloned()
            .collect();
        contacts.sort_by_key(|c| c.created_at);
        Ok(contacts)
    }

    async fn contact_by_address(
        &self,
        channel: Channel,
        address: &str,
    ) -> Result<Option<Contact>> {
        Ok(self
            .contacts
            .read()
            .values()
            .filter(|c| c.channel == channel && c.address == address)
            .min_by_key(|c| c.created_at)
            .cloned())
    }

    async fn recipients(
        &self,
        roll_call_uuid: Uuid,
        status: Option<ResponseStatus>,
    ) -> Result<Vec<Recipient>> {
        Ok(self
            .recipients
            .read()
            .iter()
            .filter(|r| r.roll_call_uuid == roll_call_uuid)
            .filter(|r| status.is_none_or(|s| r.response_status == s))
            .cloned()
            .collect())
    }

    async fn recipient(&self, roll_call_uuid: Uuid, user_uuid: Uuid) -> Result<Recipient> {
        self.recipients
            .read()
            .iter()
            .find(|r| r.roll_call_uuid == roll_call_uuid && r.user_uuid == user_uuid)
            .cloned()
            .ok_or(RollCallError::NotFound {
                entity: "recipient",
                id: user_uuid,
            })
    }

    async fn update_recipient_status(
        &self,
        roll_call_uuid: Uuid,
        user_uuid: Uuid,
        status: ResponseStatus,
    ) -> Result<Recipient> {
        let mut recipients = self.recipients.write();
        let recipient = recipients
            .iter_mut()
            .find(|r| r.roll_call_uuid == roll_call_uuid && r.user_uuid == user_uuid)
            .ok_or(RollCallError::NotFound {
                entity: "recipient",
                id: user_uuid,
            })?;

        if !recipient.response_status.can_transition_to(status) {
            return Err(RollCallError::InvalidStateTransition {
                entity: "recipient",
                from: recipient.response_status.to_string(),
                to: status.to_string(),
            });
        }

        recipient.response_status = status;
        recipient.updated_at = Utc::now();
        Ok(recipient.clone())
    }

    async fn record_outbound_message(&self, new: NewOutboundMessage) -> Result<OutboundMessage> {
        if !self.roll_calls.read().contains_key(&new.roll_call_uuid) {
            return Err(RollCallError::NotFound {
                entity: "roll_call",
                id: new.roll_call_uuid,
            });
        }
        let contact = self.contact(new.contact_uuid).await?;
        if contact.channel != new.channel {
            return Err(RollCallError::Validation(format!(
                "contact {} is on channel {}, message claims {}",
                contact.contact_uuid, contact.channel, new.channel
            )));
        }

        let message = OutboundMessage::from_new(new);
        self.messages.write().push(message.clone());
        Ok(message)
    }

    async fn messages(
        &self,
        roll_call_uuid: Uuid,
        user_uuid: Option<Uuid>,
    ) -> Result<Vec<OutboundMessage>> {
        let contacts = self.contacts.read();
        let mut messages: Vec<OutboundMessage> = self
            .messages
            .read()
            .iter()
            .filter(|m| m.roll_call_uuid == roll_call_uuid)
            .filter(|m| {
                user_uuid.is_none_or(|user| {
                    contacts
                        .get(&m.contact_uuid)
                        .is_some_and(|c| c.user_uuid == user)
                })
            })
            .cloned()
            .collect();
        drop(contacts);

        messages.sort_by_key(|m| m.sent_at);
        Ok(messages)
    }

    async fn last_unreplied_message_by_contact(
        &self,
        contact_uuid: Uuid,
    ) -> Result<Option<OutboundMessage>> {
        let contact = self.contact(contact_uuid).await?;
        let messages = self.messages.read();
        let replies = self.replies.read();

        Ok(Self::last_unreplied(
            messages.iter().filter(|m| m.contact_uuid == contact_uuid),
            contact.user_uuid,
            &replies,
        ))
    }

    async fn last_unreplied_message_by_user(
        &self,
        user_uuid: Uuid,
    ) -> Result<Option<OutboundMessage>> {
        let contacts = self.contacts.read();
        let contact_uuids: HashSet<Uuid> = contacts
            .values()
            .filter(|c| c.user_uuid == user_uuid)
            .map(|c| c.contact_uuid)
            .collect();
        drop(contacts);

        let messages = self.messages.read();
        let replies = self.replies.read();

        Ok(Self::last_unreplied(
            messages
                .iter()
                .filter(|m| contact_uuids.contains(&m.contact_uuid)),
            user_uuid,
            &replies,
        ))
    }

    async fn outstanding_messages(
        &self,
        older_than: DateTime<Utc>,
    ) -> Result<Vec<OutboundMessage>> {
        let contacts = self.contacts.read();
        let messages = self.messages.read();
        let replies = self.replies.read();

        let mut latest_per_contact: HashMap<Uuid, OutboundMessage> = HashMap::new();
        for message in messages.iter() {
            let Some(contact) = contacts.get(&message.contact_uuid) else {
                continue;
            };
            if !Self::is_unreplied(message, contact.user_uuid, &replies) {
                continue;
            }
            match latest_per_contact.get(&message.contact_uuid) {
                Some(current) if current.sent_at > message.sent_at => {}
                _ => {
                    latest_per_contact.insert(message.contact_uuid, message.clone());
                }
            }
        }
        drop(replies);
        drop(messages);
        drop(contacts);

        let mut outstanding: Vec<OutboundMessage> = latest_per_contact
            .into_values()
            .filter(|m| m.sent_at <= older_than)
            .collect();
        outstanding.sort_by_key(|m| m.sent_at);
        Ok(outstanding)
    }

    async fn record_reply(&self, new: NewReply) -> Result<Reply> {
        if !self.roll_calls.read().contains_key(&new.roll_call_uuid) {
            return Err(RollCallError::NotFound {
                entity: "roll_call",
                id: new.roll_call_uuid,
            });
        }
        if !self.contacts.read().contains_key(&new.contact_uuid) {
            return Err(RollCallError::NotFound {
                entity: "contact",
                id: new.contact_uuid,
            });
        }

        let reply = Reply::from_new(new);
        self.replies.write().push(reply.clone());
        Ok(reply)
    }

    async fn replies(&self, roll_call_uuid: Uuid) -> Result<Vec<Reply>> {
        let mut replies: Vec<Reply> = self
            .replies
            .read()
            .iter()
            .filter(|r| r.roll_call_uuid == roll_call_uuid)
            .cloned()
            .collect();
        replies.sort_by_key(|r| r.created_at);
        Ok(replies)
    }

    async fn latest_replies(&self, roll_call_uuid: Uuid) -> Result<Vec<Reply>> {
        let replies = self.replies.read();
        let mut latest_per_user: HashMap<Uuid, Reply> = HashMap::new();
        for reply in replies.iter().filter(|r| r.roll_call_uuid == roll_call_uuid) {
            match latest_per_user.get(&reply.user_uuid) {
                Some(current) if current.created_at > reply.created_at => {}
                _ => {
                    latest_per_user.insert(reply.user_uuid, reply.clone());
                }
            }
        }
        drop(replies);

        let mut latest: Vec<Reply> = latest_per_user.into_values().collect();
        latest.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.user_uuid.cmp(&b.user_uuid))
        });
        Ok(latest)
    }

    async fn counts(&self, roll_call_uuid: Uuid) -> Result<RollCallCounts> {
        if !self.roll_calls.read().contains_key(&roll_call_uuid) {
            return Err(RollCallError::NotFound {
                entity: "roll_call",
                id: roll_call_uuid,
            });
        }

        let reply_count = self
            .replies
            .read()
            .iter()
            .filter(|r| r.roll_call_uuid == roll_call_uuid)
            .map(|r| r.user_uuid)
            .collect::<HashSet<Uuid>>()
            .len() as i64;

        let sent_count = self
            .messages
            .read()
            .iter()
            .filter(|m| m.roll_call_uuid == roll_call_uuid)
            .count() as i64;

        Ok(RollCallCounts {
            reply_count,
            sent_count,
        })
    }

    async fn record_unmatched_inbound(
        &self,
        new: NewUnmatchedInbound,
    ) -> Result<UnmatchedInbound> {
        let inbound = UnmatchedInbound::from_new(new);
        self.unmatched.write().push(inbound.clone());
        Ok(inbound)
    }

    async fn unmatched_inbound(&self, limit: usize) -> Result<Vec<UnmatchedInbound>> {
        let mut unmatched: Vec<UnmatchedInbound> = self.unmatched.read().clone();
        unmatched.sort_by(|a, b| b.received_at.cmp(&a.received_at));
        unmatched.truncate(limit);
        Ok(unmatched)
    }

    async fn upsert_complaint_total(
        &self,
        organization_uuid: Uuid,
        roll_call_uuid: Uuid,
        count: i64,
    ) -> Result<ComplaintRecord> {
        let roll_call = self.roll_call(roll_call_uuid).await?;
        if roll_call.organization_uuid != organization_uuid {
            return Err(RollCallError::Validation(format!(
                "roll call {} does not belong to organization {}",
                roll_call_uuid, organization_uuid
            )));
        }

        let mut complaints = self.complaints.write();
        let record = complaints
            .entry(roll_call_uuid)
            .or_insert_with(|| ComplaintRecord {
                organization_uuid,
                roll_call_uuid,
                count: 0,
                updated_at: Utc::now(),
            });
        if count > record.count {
            record.count = count;
            record.updated_at = Utc::now();
        }
        Ok(record.clone())
    }

    async fn complaint_total_for_org(&self, organization_uuid: Uuid) -> Result<i64> {
        Ok(self
            .complaints
            .read()
            .values()
            .filter(|c| c.organization_uuid == organization_uuid)
            .map(|c| c.count)
            .sum())
    }

    async fn organization_uuids(&self) -> Result<Vec<Uuid>> {
        let orgs: HashSet<Uuid> = self
            .roll_calls
            .read()
            .values()
            .map(|rc| rc.organization_uuid)
            .collect();
        let mut orgs: Vec<Uuid> = orgs.into_iter().collect();
        orgs.sort();
        Ok(orgs)
    }
}
