//! # Roll-Call Engine
//!
//! The delivery and response-tracking core, assembled from four components
//! behind one facade:
//!
//! - [`RecipientResolver`]: expands a roll call's declared targets into
//!   concrete (user, contact, channel) deliveries.
//! - [`DeliveryDispatcher`]: fans the roll call out across channel adapters
//!   with partial-failure semantics and at-most-once dispatch.
//! - [`ReplyCorrelator`]: attributes inbound messages back to the contact's
//!   most recent unreplied outbound message.
//! - [`StatusAggregator`]: recomputes derived counts and per-recipient
//!   status on every read.
//!
//! The [`ReconciliationJob`] runs beside the facade on its own cadence and
//! shares the same store and event channel.
//!
//! Invocations are short-lived: an HTTP-originated create triggers one
//! dispatch, each provider webhook triggers one correlation, and the
//! reconciler ticks on fixed intervals. No long-running loop owns the
//! engine, so concurrent invocations for different roll calls are the
//! normal case.

pub mod aggregator;
pub mod correlator;
pub mod dispatcher;
pub mod reconciler;
pub mod resolver;

use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use crate::channels::{ChannelAdapterRegistry, ChannelError, ComplaintFeed};
use crate::config::RollCallConfig;
use crate::error::{Result, RollCallError};
use crate::events::{EngineEvent, EventPublisher, PublishedEvent};
use crate::models::{
    Channel, NewRollCall, OutboundMessage, Recipient, ResponseStatus, RollCall, RollCallStatus,
    UnmatchedInbound,
};
use crate::settings::OrganizationSettingsProvider;
use crate::storage::{Page, RollCallCounts, RollCallFilter, RollCallStore};

pub use aggregator::{RollCallSummary, StatusAggregator};
pub use correlator::{CorrelationResult, ReplyCorrelator};
pub use dispatcher::{
    DeliveryDispatcher, DispatchDisposition, DispatchResult, RecipientOutcome, SendOutcome,
};
pub use reconciler::{ComplaintPollSummary, ReconcilerHandle, ReconciliationJob};
pub use resolver::{RecipientResolver, ResolutionOutcome, ResolvedRecipient, UnreachableRecipient};

/// Facade over the delivery, correlation and aggregation components.
///
/// One instance per process; every operation is safe to call concurrently.
/// The only serialization points inside are the per-roll-call dispatch claim
/// and the per-contact correlation lock.
pub struct RollCallEngine {
    store: Arc<dyn RollCallStore>,
    adapters: Arc<ChannelAdapterRegistry>,
    events: EventPublisher,
    config: RollCallConfig,
    resolver: RecipientResolver,
    dispatcher: DeliveryDispatcher,
    correlator: ReplyCorrelator,
    aggregator: StatusAggregator,
}

impl RollCallEngine {
    pub fn new(
        config: RollCallConfig,
        store: Arc<dyn RollCallStore>,
        settings: Arc<dyn OrganizationSettingsProvider>,
        adapters: Arc<ChannelAdapterRegistry>,
    ) -> Self {
        let events = EventPublisher::new(config.events.channel_capacity);

        let resolver = RecipientResolver::new(
            Arc::clone(&store),
            settings,
            Arc::clone(&adapters),
            config.channel_priority.clone(),
        );
        let dispatcher = DeliveryDispatcher::new(
            Arc::clone(&store),
            Arc::clone(&adapters),
            config.dispatch.clone(),
            events.clone(),
        );
        let correlator = ReplyCorrelator::new(Arc::clone(&store), events.clone());
        let aggregator = StatusAggregator::new(Arc::clone(&store));

        Self {
            store,
            adapters,
            events,
            config,
            resolver,
            dispatcher,
            correlator,
            aggregator,
        }
    }

    /// Subscribe to the engine's lifecycle events.
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<PublishedEvent> {
        self.events.subscribe()
    }

    /// Build a [`ReconciliationJob`] sharing this engine's store and event
    /// channel. Callers start it or drive its one-shot cycles themselves.
    pub fn reconciler(&self, feed: Arc<dyn ComplaintFeed>) -> Arc<ReconciliationJob> {
        Arc::new(ReconciliationJob::new(
            Arc::clone(&self.store),
            feed,
            self.config.reconciler.clone(),
            self.events.clone(),
        ))
    }

    /// Create a roll call and immediately dispatch it.
    ///
    /// Persists the draft with its recipient rows (the creator alone for a
    /// self-test), resolves targets, then fans out under the configured
    /// dispatch deadline. The returned [`DispatchResult`] carries the
    /// per-recipient outcomes; a roll call whose every send failed remains
    /// in `draft` with disposition [`DispatchDisposition::NoneSent`].
    pub async fn create_roll_call(&self, new: NewRollCall) -> Result<(RollCall, DispatchResult)> {
        if new.message.trim().is_empty() {
            return Err(RollCallError::Validation(
                "roll call message must not be empty".to_string(),
            ));
        }
        if !new.self_test && new.targets.is_empty() {
            return Err(RollCallError::Validation(
                "roll call must declare at least one target".to_string(),
            ));
        }

        let recipient_users: Vec<Uuid> = if new.self_test {
            vec![new.creator_uuid]
        } else {
            let mut seen = std::collections::HashSet::new();
            new.targets
                .iter()
                .copied()
                .filter(|user| seen.insert(*user))
                .collect()
        };

        let targets = new.targets.clone();
        let roll_call = self.store.create_roll_call(new, &recipient_users).await?;

        info!(
            roll_call_uuid = %roll_call.roll_call_uuid,
            organization_uuid = %roll_call.organization_uuid,
            self_test = roll_call.self_test,
            recipients = recipient_users.len(),
            "Roll call created"
        );

        if let Err(e) = self
            .events
            .publish(EngineEvent::RollCallCreated {
                roll_call_uuid: roll_call.roll_call_uuid,
                organization_uuid: roll_call.organization_uuid,
                self_test: roll_call.self_test,
            })
            .await
        {
            warn!(error = %e, "Failed to publish roll call created event");
        }

        let dispatch = self.dispatch_roll_call(&roll_call, &targets).await?;
        let roll_call = self.store.roll_call(roll_call.roll_call_uuid).await?;
        Ok((roll_call, dispatch))
    }

    /// Resolve and dispatch one roll call.
    ///
    /// Also the retry entry point after a [`DispatchDisposition::NoneSent`]
    /// outcome; a roll call already in `sent` reports `AlreadyDispatched`.
    pub async fn dispatch_roll_call(
        &self,
        roll_call: &RollCall,
        targets: &[Uuid],
    ) -> Result<DispatchResult> {
        let resolution = self.resolver.resolve(roll_call, targets).await?;
        self.dispatcher
            .dispatch(
                roll_call,
                resolution,
                Some(self.config.dispatch.dispatch_deadline()),
            )
            .await
    }

    /// Feed one provider webhook payload through inbound parsing and
    /// correlation.
    ///
    /// The payload is parsed by the channel's adapter, the sender address is
    /// resolved to a contact, and the message is correlated against the
    /// contact's outstanding outbound messages. Inbound traffic from an
    /// address with no contact on file is parked as unmatched, same as a
    /// contact with nothing outstanding.
    pub async fn record_inbound(
        &self,
        channel: Channel,
        payload: &serde_json::Value,
    ) -> Result<CorrelationResult> {
        let adapter = self.adapters.get(channel).ok_or_else(|| {
            RollCallError::UnsupportedChannel {
                channel,
                reason: "no adapter registered".to_string(),
            }
        })?;

        let inbound = adapter.parse_inbound(payload).map_err(|e| match e {
            ChannelError::InboundUnsupported => RollCallError::UnsupportedChannel {
                channel,
                reason: "channel has no inbound direction".to_string(),
            },
            other => RollCallError::Validation(format!("inbound payload rejected: {other}")),
        })?;

        match self
            .store
            .contact_by_address(channel, &inbound.contact_address)
            .await?
        {
            Some(contact) => {
                self.correlator
                    .correlate(&contact, &inbound.content, inbound.received_at)
                    .await
            }
            None => {
                let parked = self
                    .correlator
                    .park_unmatched(
                        channel,
                        inbound.contact_address,
                        None,
                        inbound.content,
                        inbound.received_at,
                    )
                    .await?;
                Ok(CorrelationResult::Unmatched { inbound: parked })
            }
        }
    }

    /// Derived totals for one roll call, recomputed from the records.
    pub async fn counts(&self, roll_call_uuid: Uuid) -> Result<RollCallCounts> {
        self.aggregator.counts(roll_call_uuid).await
    }

    /// One recipient's response status.
    pub async fn recipient_status(
        &self,
        roll_call_uuid: Uuid,
        user_uuid: Uuid,
    ) -> Result<ResponseStatus> {
        self.aggregator.recipient_status(roll_call_uuid, user_uuid).await
    }

    /// Recipient rows for a roll call, optionally narrowed by status.
    pub async fn recipients(
        &self,
        roll_call_uuid: Uuid,
        status: Option<ResponseStatus>,
    ) -> Result<Vec<Recipient>> {
        self.aggregator.recipients(roll_call_uuid, status).await
    }

    pub async fn roll_call(&self, roll_call_uuid: Uuid) -> Result<RollCall> {
        self.store.roll_call(roll_call_uuid).await
    }

    /// Full derived view of one roll call: record, totals, and the latest
    /// reply per user.
    pub async fn summary(&self, roll_call_uuid: Uuid) -> Result<RollCallSummary> {
        self.aggregator.summary(roll_call_uuid).await
    }

    /// Derived views for a filtered listing, newest roll call first.
    pub async fn summaries(
        &self,
        filter: &RollCallFilter,
        page: &Page,
    ) -> Result<Vec<RollCallSummary>> {
        self.aggregator.summaries(filter, page).await
    }

    /// Outbound messages recorded for a roll call, oldest first.
    pub async fn messages(
        &self,
        roll_call_uuid: Uuid,
        user_uuid: Option<Uuid>,
    ) -> Result<Vec<OutboundMessage>> {
        self.store.messages(roll_call_uuid, user_uuid).await
    }

    /// Archive a roll call. `closed` is terminal; there is no delete.
    pub async fn close_roll_call(&self, roll_call_uuid: Uuid) -> Result<RollCall> {
        self.store
            .update_roll_call_status(roll_call_uuid, RollCallStatus::Closed)
            .await
    }

    /// Flag a recipient who never answered as unresponsive.
    ///
    /// A recipient who has replied stays `replied`; the attempt fails with
    /// [`RollCallError::InvalidStateTransition`].
    pub async fn mark_unresponsive(
        &self,
        roll_call_uuid: Uuid,
        user_uuid: Uuid,
    ) -> Result<Recipient> {
        self.store
            .update_recipient_status(roll_call_uuid, user_uuid, ResponseStatus::Unresponsive)
            .await
    }

    /// The user's most recent outbound message with no newer reply, across
    /// all of their contacts, or `None` when nothing is outstanding.
    pub async fn last_unreplied_message_for_user(
        &self,
        user_uuid: Uuid,
    ) -> Result<Option<OutboundMessage>> {
        self.store.last_unreplied_message_by_user(user_uuid).await
    }

    /// Cumulative provider complaint total recorded for an organization.
    pub async fn complaint_total(&self, organization_uuid: Uuid) -> Result<i64> {
        self.store.complaint_total_for_org(organization_uuid).await
    }

    /// Parked inbound messages awaiting manual triage, newest first.
    pub async fn unmatched_inbound(&self, limit: usize) -> Result<Vec<UnmatchedInbound>> {
        self.store.unmatched_inbound(limit).await
    }
}
