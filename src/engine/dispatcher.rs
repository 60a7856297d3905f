//! # Delivery Dispatcher
//!
//! Fans a roll call out to its resolved recipients, one channel send per
//! recipient, with partial-failure semantics: a recipient's transport
//! failure, timeout, or panic never blocks the rest of the batch.
//!
//! ## Idempotency
//!
//! Dispatch is at-most-once per roll call. The dispatcher claims the
//! `draft -> sent` transition atomically before any send; a concurrent
//! second dispatch loses the claim and reports `AlreadyDispatched` without
//! touching the providers. If every send in the batch fails the claim is
//! released, returning the roll call to `draft` so a later retry can claim
//! it again.
//!
//! ## Concurrency
//!
//! Sends run on spawned tasks gated by a semaphore sized from
//! `dispatch.max_concurrent_sends`. Each send is bounded by
//! `dispatch.send_timeout_ms`, and the whole batch optionally by a
//! dispatch deadline; a send that cannot start before the deadline fails
//! without reaching the provider.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::time::{timeout, Instant};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::channels::{ChannelAdapter, ChannelAdapterRegistry, OutboundRequest};
use crate::config::DispatchConfig;
use crate::error::Result;
use crate::events::{EngineEvent, EventPublisher};
use crate::models::{Channel, NewOutboundMessage, RollCall};
use crate::storage::RollCallStore;

use super::resolver::ResolutionOutcome;

/// How the dispatch attempt as a whole concluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchDisposition {
    /// At least one send succeeded; the roll call is `sent`.
    Dispatched,
    /// Another dispatch already claimed this roll call; nothing was sent.
    AlreadyDispatched,
    /// Every send failed (or there was nothing to send); the roll call
    /// returned to `draft`.
    NoneSent,
}

/// Per-recipient send result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    Sent {
        message_uuid: Uuid,
        provider_message_id: String,
    },
    Failed {
        reason: String,
    },
    Unreachable {
        reason: String,
    },
}

/// One recipient's outcome within a dispatch batch.
#[derive(Debug, Clone)]
pub struct RecipientOutcome {
    pub user_uuid: Uuid,
    /// Absent for recipients the resolver reported unreachable.
    pub contact_uuid: Option<Uuid>,
    pub channel: Option<Channel>,
    pub outcome: SendOutcome,
}

/// Summary of one dispatch attempt, per-recipient outcomes included.
#[derive(Debug, Clone)]
pub struct DispatchResult {
    pub roll_call_uuid: Uuid,
    pub disposition: DispatchDisposition,
    pub outcomes: Vec<RecipientOutcome>,
    pub sent_count: usize,
    pub failed_count: usize,
    pub unreachable_count: usize,
}

impl DispatchResult {
    fn already_dispatched(roll_call_uuid: Uuid) -> Self {
        Self {
            roll_call_uuid,
            disposition: DispatchDisposition::AlreadyDispatched,
            outcomes: Vec::new(),
            sent_count: 0,
            failed_count: 0,
            unreachable_count: 0,
        }
    }

    fn from_outcomes(
        roll_call_uuid: Uuid,
        disposition: DispatchDisposition,
        outcomes: Vec<RecipientOutcome>,
    ) -> Self {
        let sent_count = outcomes
            .iter()
            .filter(|o| matches!(o.outcome, SendOutcome::Sent { .. }))
            .count();
        let failed_count = outcomes
            .iter()
            .filter(|o| matches!(o.outcome, SendOutcome::Failed { .. }))
            .count();
        let unreachable_count = outcomes
            .iter()
            .filter(|o| matches!(o.outcome, SendOutcome::Unreachable { .. }))
            .count();

        Self {
            roll_call_uuid,
            disposition,
            outcomes,
            sent_count,
            failed_count,
            unreachable_count,
        }
    }
}

/// Fans roll calls out across channel adapters.
pub struct DeliveryDispatcher {
    store: Arc<dyn RollCallStore>,
    adapters: Arc<ChannelAdapterRegistry>,
    send_semaphore: Arc<Semaphore>,
    config: DispatchConfig,
    events: EventPublisher,
}

impl DeliveryDispatcher {
    pub fn new(
        store: Arc<dyn RollCallStore>,
        adapters: Arc<ChannelAdapterRegistry>,
        config: DispatchConfig,
        events: EventPublisher,
    ) -> Self {
        let send_semaphore = Arc::new(Semaphore::new(config.max_concurrent_sends));
        Self {
            store,
            adapters,
            send_semaphore,
            config,
            events,
        }
    }

    /// Dispatch a resolved roll call.
    ///
    /// `deadline` bounds the whole batch; sends that cannot start before it
    /// elapses fail with a deadline reason. Per-send time is additionally
    /// bounded by the configured send timeout.
    pub async fn dispatch(
        &self,
        roll_call: &RollCall,
        resolution: ResolutionOutcome,
        deadline: Option<Duration>,
    ) -> Result<DispatchResult> {
        let roll_call_uuid = roll_call.roll_call_uuid;

        if !self.store.claim_for_dispatch(roll_call_uuid).await? {
            debug!(roll_call_uuid = %roll_call_uuid, "Dispatch claim lost, roll call already dispatched");
            return Ok(DispatchResult::already_dispatched(roll_call_uuid));
        }

        let deadline_at = deadline.map(|d| Instant::now() + d);
        let mut handles = Vec::new();

        for recipient in &resolution.resolved {
            let Some(adapter) = self.adapters.get(recipient.contact.channel) else {
                // The resolver checked registration; losing the adapter
                // between resolve and dispatch still must not abort the batch
                handles.push((
                    recipient.user_uuid,
                    recipient.contact.contact_uuid,
                    recipient.contact.channel,
                    None,
                ));
                continue;
            };

            let request = OutboundRequest {
                organization_uuid: roll_call.organization_uuid,
                roll_call_uuid,
                contact: recipient.contact.clone(),
                content: roll_call.message.clone(),
            };
            let store = Arc::clone(&self.store);
            let semaphore = Arc::clone(&self.send_semaphore);
            let send_timeout = self.config.send_timeout();

            let handle = tokio::spawn(async move {
                Self::send_one(store, adapter, semaphore, request, send_timeout, deadline_at).await
            });
            handles.push((
                recipient.user_uuid,
                recipient.contact.contact_uuid,
                recipient.contact.channel,
                Some(handle),
            ));
        }

        let mut outcomes = Vec::with_capacity(handles.len() + resolution.unreachable.len());
        for (user_uuid, contact_uuid, channel, handle) in handles {
            let outcome = match handle {
                Some(handle) => match handle.await {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        error!(
                            roll_call_uuid = %roll_call_uuid,
                            contact_uuid = %contact_uuid,
                            error = %e,
                            "Send task panicked"
                        );
                        SendOutcome::Failed {
                            reason: format!("send task panicked: {e}"),
                        }
                    }
                },
                None => SendOutcome::Failed {
                    reason: "no adapter registered for channel".to_string(),
                },
            };
            outcomes.push(RecipientOutcome {
                user_uuid,
                contact_uuid: Some(contact_uuid),
                channel: Some(channel),
                outcome,
            });
        }

        for unreachable in resolution.unreachable {
            outcomes.push(RecipientOutcome {
                user_uuid: unreachable.user_uuid,
                contact_uuid: None,
                channel: None,
                outcome: SendOutcome::Unreachable {
                    reason: unreachable.reason,
                },
            });
        }

        let any_sent = outcomes
            .iter()
            .any(|o| matches!(o.outcome, SendOutcome::Sent { .. }));

        let disposition = if any_sent {
            DispatchDisposition::Dispatched
        } else {
            // Nothing went out; return the roll call to draft so a retry
            // can claim it again
            self.store.release_dispatch_claim(roll_call_uuid).await?;
            DispatchDisposition::NoneSent
        };

        let result = DispatchResult::from_outcomes(roll_call_uuid, disposition, outcomes);

        info!(
            roll_call_uuid = %roll_call_uuid,
            sent = result.sent_count,
            failed = result.failed_count,
            unreachable = result.unreachable_count,
            disposition = ?result.disposition,
            "Dispatch completed"
        );

        if let Err(e) = self
            .events
            .publish(EngineEvent::RollCallDispatched {
                roll_call_uuid,
                sent: result.sent_count,
                failed: result.failed_count,
                unreachable: result.unreachable_count,
            })
            .await
        {
            warn!(error = %e, "Failed to publish dispatch event");
        }

        Ok(result)
    }

    async fn send_one(
        store: Arc<dyn RollCallStore>,
        adapter: Arc<dyn ChannelAdapter>,
        semaphore: Arc<Semaphore>,
        request: OutboundRequest,
        send_timeout: Duration,
        deadline_at: Option<Instant>,
    ) -> SendOutcome {
        let _permit = match semaphore.acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => {
                return SendOutcome::Failed {
                    reason: "send concurrency limiter closed".to_string(),
                }
            }
        };

        let effective_timeout = match deadline_at {
            Some(at) => {
                let remaining = at.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    return SendOutcome::Failed {
                        reason: "dispatch deadline exceeded before send".to_string(),
                    };
                }
                send_timeout.min(remaining)
            }
            None => send_timeout,
        };

        let receipt = match timeout(effective_timeout, adapter.send(&request)).await {
            Ok(Ok(receipt)) => receipt,
            Ok(Err(e)) => {
                warn!(
                    roll_call_uuid = %request.roll_call_uuid,
                    contact_uuid = %request.contact.contact_uuid,
                    channel = %request.contact.channel,
                    error = %e,
                    "Channel send failed"
                );
                return SendOutcome::Failed {
                    reason: e.to_string(),
                };
            }
            Err(_) => {
                warn!(
                    roll_call_uuid = %request.roll_call_uuid,
                    contact_uuid = %request.contact.contact_uuid,
                    channel = %request.contact.channel,
                    timeout_ms = effective_timeout.as_millis() as u64,
                    "Channel send timed out"
                );
                return SendOutcome::Failed {
                    reason: format!("send timed out after {}ms", effective_timeout.as_millis()),
                };
            }
        };

        match store
            .record_outbound_message(NewOutboundMessage {
                roll_call_uuid: request.roll_call_uuid,
                contact_uuid: request.contact.contact_uuid,
                channel: request.contact.channel,
                provider_message_id: receipt.provider_message_id.clone(),
                sent_at: None,
            })
            .await
        {
            Ok(message) => SendOutcome::Sent {
                message_uuid: message.message_uuid,
                provider_message_id: message.provider_message_id,
            },
            Err(e) => {
                error!(
                    roll_call_uuid = %request.roll_call_uuid,
                    contact_uuid = %request.contact.contact_uuid,
                    error = %e,
                    "Provider accepted the message but recording it failed"
                );
                SendOutcome::Failed {
                    reason: format!("message accepted but not recorded: {e}"),
                }
            }
        }
    }
}
