//! # Organization Channel Settings
//!
//! Per-organization notification preferences consulted during recipient
//! resolution. Settings decide which channels an organization has enabled
//! and carry channel-specific material such as the Slack webhook URL.
//!
//! The engine only ever reads settings through [`OrganizationSettingsProvider`],
//! so embedding applications can back this with their own tenant store. The
//! bundled [`InMemorySettings`] covers tests and single-process deployments.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use uuid::Uuid;

use crate::error::Result;
use crate::models::Channel;

/// Channel enablement and channel-specific configuration for one organization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelSettings {
    /// Channels the organization has switched on.
    pub enabled: Vec<Channel>,
    /// Incoming webhook URL for Slack delivery. Slack is only usable when
    /// this is present, regardless of the `enabled` list.
    pub slack_webhook_url: Option<String>,
}

impl Default for ChannelSettings {
    fn default() -> Self {
        Self {
            enabled: vec![Channel::Sms, Channel::Slack, Channel::Push],
            slack_webhook_url: None,
        }
    }
}

impl ChannelSettings {
    /// Whether `channel` is enabled for this organization.
    pub fn is_enabled(&self, channel: Channel) -> bool {
        self.enabled.contains(&channel)
    }

    /// Whether `channel` is actually usable: enabled, and any required
    /// channel-specific material is present.
    pub fn is_ready(&self, channel: Channel) -> bool {
        if !self.is_enabled(channel) {
            return false;
        }
        match channel {
            Channel::Slack => self.slack_webhook_url.is_some(),
            Channel::Sms | Channel::Push => true,
        }
    }
}

/// Source of per-organization channel settings.
#[async_trait]
pub trait OrganizationSettingsProvider: Send + Sync {
    /// Resolve the channel settings for an organization.
    ///
    /// Implementations should fall back to a sensible default rather than
    /// failing when an organization has never customized its settings.
    async fn channel_settings(&self, organization_uuid: Uuid) -> Result<ChannelSettings>;
}

/// DashMap-backed settings provider for tests and single-process use.
///
/// Organizations without an explicit entry get [`ChannelSettings::default`].
#[derive(Debug, Default)]
pub struct InMemorySettings {
    settings: DashMap<Uuid, ChannelSettings>,
}

impl InMemorySettings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap in an `Arc` for sharing with the engine.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Install or replace the settings for an organization.
    pub fn set(&self, organization_uuid: Uuid, settings: ChannelSettings) {
        self.settings.insert(organization_uuid, settings);
    }
}

#[async_trait]
impl OrganizationSettingsProvider for InMemorySettings {
    async fn channel_settings(&self, organization_uuid: Uuid) -> Result<ChannelSettings> {
        Ok(self
            .settings
            .get(&organization_uuid)
            .map(|entry| entry.value().clone())
            .unwrap_or_default())
    }
}
