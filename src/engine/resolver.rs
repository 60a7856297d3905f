//! # Recipient Resolver
//!
//! Expands a roll call's declared target users into concrete
//! (user, contact, channel) deliveries. For each user the resolver walks
//! the configured channel priority and picks the first channel that is
//! ready for the organization, has a registered adapter, and has a contact
//! on file for the user. Users with no usable contact are reported as
//! unreachable rather than failing resolution; dispatch proceeds for the
//! rest.
//!
//! Self-test roll calls ignore the declared targets entirely and resolve to
//! exactly one recipient: the creator.

use std::sync::Arc;

use tracing::debug;
use uuid::Uuid;

use crate::channels::ChannelAdapterRegistry;
use crate::error::Result;
use crate::models::{Channel, Contact, RollCall};
use crate::settings::OrganizationSettingsProvider;
use crate::storage::RollCallStore;

/// One deliverable (user, contact) pair chosen by the resolver.
#[derive(Debug, Clone)]
pub struct ResolvedRecipient {
    pub user_uuid: Uuid,
    pub contact: Contact,
}

impl ResolvedRecipient {
    pub fn channel(&self) -> Channel {
        self.contact.channel
    }
}

/// A target user the resolver could not produce a delivery for.
#[derive(Debug, Clone)]
pub struct UnreachableRecipient {
    pub user_uuid: Uuid,
    pub reason: String,
}

/// Result of expanding a roll call's target set.
#[derive(Debug, Clone, Default)]
pub struct ResolutionOutcome {
    /// Deliverable recipients in target order.
    pub resolved: Vec<ResolvedRecipient>,
    /// Targets excluded from dispatch, with the reason each was skipped.
    pub unreachable: Vec<UnreachableRecipient>,
}

impl ResolutionOutcome {
    pub fn is_empty(&self) -> bool {
        self.resolved.is_empty()
    }
}

/// Expands declared targets into concrete channel deliveries.
pub struct RecipientResolver {
    store: Arc<dyn RollCallStore>,
    settings: Arc<dyn OrganizationSettingsProvider>,
    adapters: Arc<ChannelAdapterRegistry>,
    channel_priority: Vec<Channel>,
}

impl RecipientResolver {
    pub fn new(
        store: Arc<dyn RollCallStore>,
        settings: Arc<dyn OrganizationSettingsProvider>,
        adapters: Arc<ChannelAdapterRegistry>,
        channel_priority: Vec<Channel>,
    ) -> Self {
        Self {
            store,
            settings,
            adapters,
            channel_priority,
        }
    }

    /// Resolve a roll call's targets to deliverable recipients.
    ///
    /// Order is preserved from the declared target list; duplicate user ids
    /// resolve once. Channel choice per user is the first priority-ordered
    /// channel that is enabled for the organization, has a registered
    /// adapter, and has a contact on file.
    pub async fn resolve(&self, roll_call: &RollCall, targets: &[Uuid]) -> Result<ResolutionOutcome> {
        let creator_target = [roll_call.creator_uuid];
        let targets: &[Uuid] = if roll_call.self_test {
            &creator_target
        } else {
            targets
        };

        let settings = self
            .settings
            .channel_settings(roll_call.organization_uuid)
            .await?;

        let usable_channels: Vec<Channel> = self
            .channel_priority
            .iter()
            .copied()
            .filter(|&channel| settings.is_ready(channel) && self.adapters.is_registered(channel))
            .collect();

        let mut outcome = ResolutionOutcome::default();
        let mut seen = std::collections::HashSet::new();

        for &user_uuid in targets {
            if !seen.insert(user_uuid) {
                continue;
            }

            let contacts = self.store.contacts_for_user(user_uuid).await?;
            if contacts.is_empty() {
                outcome.unreachable.push(UnreachableRecipient {
                    user_uuid,
                    reason: "user has no contacts".to_string(),
                });
                continue;
            }

            let chosen = usable_channels.iter().find_map(|&channel| {
                contacts
                    .iter()
                    .find(|contact| contact.channel == channel)
                    .cloned()
            });

            match chosen {
                Some(contact) => outcome.resolved.push(ResolvedRecipient {
                    user_uuid,
                    contact,
                }),
                None => outcome.unreachable.push(UnreachableRecipient {
                    user_uuid,
                    reason: "no contact on an enabled channel".to_string(),
                }),
            }
        }

        debug!(
            roll_call_uuid = %roll_call.roll_call_uuid,
            resolved = outcome.resolved.len(),
            unreachable = outcome.unreachable.len(),
            "Resolved roll call targets"
        );

        Ok(outcome)
    }
}
