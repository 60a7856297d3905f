//! # Storage Layer
//!
//! Persistence behind the engine, expressed as the [`RollCallStore`] trait so
//! the delivery and correlation logic never touches a concrete database.
//! Two implementations ship with the crate:
//!
//! - [`InMemoryStore`]: lock-protected maps, used by the test suite and by
//!   single-process embeddings that do not need durability.
//! - [`PgStore`]: PostgreSQL through sqlx, the production backend.
//!
//! ## Query semantics worth knowing
//!
//! The correlation queries implement "last unreplied message" semantics: an
//! outbound message counts as unreplied while no reply from the contact's
//! user exists on the same roll call with `created_at >= sent_at`. Selection
//! across roll calls is by most recent `sent_at`, so a contact's newest
//! dispatch always wins correlation over older ones.
//!
//! There is no delete operation for roll calls. Messages, replies and
//! complaint totals hang off roll calls as an audit trail, and `closed` is
//! the archival state.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::Result;
use crate::models::{
    Channel, ComplaintRecord, Contact, NewContact, NewOutboundMessage, NewReply, NewRollCall,
    NewUnmatchedInbound, OutboundMessage, Recipient, Reply, ResponseStatus, RollCall,
    RollCallStatus, UnmatchedInbound,
};

pub use memory::InMemoryStore;
pub use postgres::PgStore;

/// Filter for roll call listings. All present fields must match.
#[derive(Debug, Clone, Default)]
pub struct RollCallFilter {
    pub organization_uuid: Option<Uuid>,
    /// Roll calls created by this user.
    pub creator_uuid: Option<Uuid>,
    /// Roll calls where this user is a recipient or the creator.
    pub recipient_uuid: Option<Uuid>,
}

/// Offset/limit pagination. `limit: None` returns everything.
#[derive(Debug, Clone, Default)]
pub struct Page {
    pub offset: usize,
    pub limit: Option<usize>,
}

impl Page {
    pub fn new(offset: usize, limit: usize) -> Self {
        Self {
            offset,
            limit: Some(limit),
        }
    }
}

/// Derived totals for one roll call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RollCallCounts {
    /// Distinct users that replied, however many times each replied.
    pub reply_count: i64,
    /// Outbound message rows, including re-sends.
    pub sent_count: i64,
}

/// Persistence operations required by the engine.
///
/// Creation methods take `New*` inputs and return the stored record with
/// generated identifiers and timestamps filled in. Lookup methods return
/// [`RollCallError::NotFound`](crate::error::RollCallError::NotFound) for
/// missing primary records; optional lookups return `Ok(None)` instead.
#[async_trait]
pub trait RollCallStore: Send + Sync {
    // --- roll calls ---

    /// Persist a draft roll call together with its recipient rows, all
    /// starting as `pending`.
    async fn create_roll_call(
        &self,
        new: NewRollCall,
        recipient_users: &[Uuid],
    ) -> Result<RollCall>;

    async fn roll_call(&self, roll_call_uuid: Uuid) -> Result<RollCall>;

    /// List roll calls matching `filter`, newest first.
    async fn list_roll_calls(&self, filter: &RollCallFilter, page: &Page) -> Result<Vec<RollCall>>;

    /// Atomically claim the `draft -> sent` transition ahead of fan-out.
    ///
    /// Returns `true` when this caller won the claim; `false` when the roll
    /// call was already claimed, closed, or otherwise not in `draft`.
    async fn claim_for_dispatch(&self, roll_call_uuid: Uuid) -> Result<bool>;

    /// Return a claimed roll call to `draft` after a fan-out in which no
    /// send succeeded. No-op when the roll call is no longer in `sent`.
    async fn release_dispatch_claim(&self, roll_call_uuid: Uuid) -> Result<()>;

    /// Apply an explicit status change, enforcing
    /// [`RollCallStatus::can_transition_to`].
    async fn update_roll_call_status(
        &self,
        roll_call_uuid: Uuid,
        status: RollCallStatus,
    ) -> Result<RollCall>;

    // --- contacts ---

    async fn create_contact(&self, new: NewContact) -> Result<Contact>;

    async fn contact(&self, contact_uuid: Uuid) -> Result<Contact>;

    async fn contacts_for_user(&self, user_uuid: Uuid) -> Result<Vec<Contact>>;

    /// Exact-match lookup by channel-native address (E.164 number, Slack
    /// user id). Addresses are stored normalized; callers pass them through
    /// unchanged.
    async fn contact_by_address(&self, channel: Channel, address: &str)
        -> Result<Option<Contact>>;

    // --- recipients ---

    async fn recipients(
        &self,
        roll_call_uuid: Uuid,
        status: Option<ResponseStatus>,
    ) -> Result<Vec<Recipient>>;

    async fn recipient(&self, roll_call_uuid: Uuid, user_uuid: Uuid) -> Result<Recipient>;

    /// Apply a response-status change, enforcing
    /// [`ResponseStatus::can_transition_to`]. `replied` never reverts.
    async fn update_recipient_status(
        &self,
        roll_call_uuid: Uuid,
        user_uuid: Uuid,
        status: ResponseStatus,
    ) -> Result<Recipient>;

    // --- outbound messages ---

    /// Record one dispatch attempt. The referenced roll call and contact
    /// must exist and the contact's channel must match.
    async fn record_outbound_message(&self, new: NewOutboundMessage) -> Result<OutboundMessage>;

    /// Messages for a roll call, oldest first, optionally narrowed to those
    /// sent to one user's contacts.
    async fn messages(
        &self,
        roll_call_uuid: Uuid,
        user_uuid: Option<Uuid>,
    ) -> Result<Vec<OutboundMessage>>;

    /// The contact's most recent outbound message with no newer reply from
    /// the contact's user on the same roll call.
    async fn last_unreplied_message_by_contact(
        &self,
        contact_uuid: Uuid,
    ) -> Result<Option<OutboundMessage>>;

    /// Same selection as [`last_unreplied_message_by_contact`], but across
    /// every contact the user holds.
    ///
    /// [`last_unreplied_message_by_contact`]: RollCallStore::last_unreplied_message_by_contact
    async fn last_unreplied_message_by_user(
        &self,
        user_uuid: Uuid,
    ) -> Result<Option<OutboundMessage>>;

    /// Per contact, the most recent unreplied message sent at or before
    /// `older_than`. Oldest first, so escalation collaborators work the
    /// longest-waiting contacts first.
    async fn outstanding_messages(
        &self,
        older_than: DateTime<Utc>,
    ) -> Result<Vec<OutboundMessage>>;

    // --- replies ---

    /// Append a reply. Replies are history; recording a second reply for
    /// the same user never overwrites the first.
    async fn record_reply(&self, new: NewReply) -> Result<Reply>;

    /// Full reply history for a roll call, oldest first.
    async fn replies(&self, roll_call_uuid: Uuid) -> Result<Vec<Reply>>;

    /// The most recent reply per user for a roll call.
    async fn latest_replies(&self, roll_call_uuid: Uuid) -> Result<Vec<Reply>>;

    /// Derived totals. Errors with `NotFound` for an unknown roll call.
    async fn counts(&self, roll_call_uuid: Uuid) -> Result<RollCallCounts>;

    // --- unmatched inbound ---

    async fn record_unmatched_inbound(&self, new: NewUnmatchedInbound)
        -> Result<UnmatchedInbound>;

    /// Parked inbound messages awaiting manual triage, newest first.
    async fn unmatched_inbound(&self, limit: usize) -> Result<Vec<UnmatchedInbound>>;

    // --- complaints ---

    /// Record a provider-reported complaint total for a roll call.
    ///
    /// Totals are monotonic: an update with a lower count than already
    /// recorded is kept at the recorded maximum, so a provider re-reporting
    /// from an earlier window can never shrink the total.
    async fn upsert_complaint_total(
        &self,
        organization_uuid: Uuid,
        roll_call_uuid: Uuid,
        count: i64,
    ) -> Result<ComplaintRecord>;

    /// Sum of complaint totals across an organization's roll calls.
    async fn complaint_total_for_org(&self, organization_uuid: Uuid) -> Result<i64>;

    /// Every organization that has created at least one roll call. Drives
    /// the reconciler's complaint polling.
    async fn organization_uuids(&self) -> Result<Vec<Uuid>>;
}
