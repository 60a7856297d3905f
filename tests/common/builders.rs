//! Builders assembling an engine over the in-memory store with mock
//! adapters, plus factories for the entities most tests need.

use std::sync::Arc;

use uuid::Uuid;

use rollcall_core::channels::ChannelAdapterRegistry;
use rollcall_core::config::RollCallConfig;
use rollcall_core::engine::RollCallEngine;
use rollcall_core::models::{Channel, Contact, NewContact, NewRollCall};
use rollcall_core::settings::InMemorySettings;
use rollcall_core::storage::{InMemoryStore, RollCallStore};

use super::mock_adapter::MockAdapter;

/// An engine wired to an in-memory store and mock adapters, with handles
/// onto everything a test wants to inspect or manipulate.
pub struct TestEngine {
    pub engine: RollCallEngine,
    pub store: Arc<InMemoryStore>,
    pub settings: Arc<InMemorySettings>,
    /// Shared with the engine; registering here replaces the adapter the
    /// dispatcher will pick up for that channel.
    pub adapters: Arc<ChannelAdapterRegistry>,
    pub sms: Arc<MockAdapter>,
    pub slack: Arc<MockAdapter>,
}

/// Builder over [`TestEngine`] wiring.
pub struct TestEngineBuilder {
    config: RollCallConfig,
    channels: Vec<Channel>,
}

impl Default for TestEngineBuilder {
    fn default() -> Self {
        Self {
            config: RollCallConfig::default(),
            channels: vec![Channel::Sms, Channel::Slack],
        }
    }
}

impl TestEngineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(mut self, config: RollCallConfig) -> Self {
        self.config = config;
        self
    }

    /// Restrict which channels get a registered mock adapter.
    pub fn with_channels(mut self, channels: Vec<Channel>) -> Self {
        self.channels = channels;
        self
    }

    pub fn build(self) -> TestEngine {
        let store = Arc::new(InMemoryStore::new());
        let settings = InMemorySettings::shared();
        let adapters = Arc::new(ChannelAdapterRegistry::new());

        let sms = Arc::new(MockAdapter::new(Channel::Sms));
        let slack = Arc::new(MockAdapter::new(Channel::Slack));
        if self.channels.contains(&Channel::Sms) {
            adapters.register(Arc::clone(&sms) as Arc<dyn rollcall_core::channels::ChannelAdapter>);
        }
        if self.channels.contains(&Channel::Slack) {
            adapters
                .register(Arc::clone(&slack) as Arc<dyn rollcall_core::channels::ChannelAdapter>);
        }

        let engine = RollCallEngine::new(
            self.config,
            Arc::clone(&store) as Arc<dyn rollcall_core::storage::RollCallStore>,
            Arc::clone(&settings) as Arc<dyn rollcall_core::settings::OrganizationSettingsProvider>,
            Arc::clone(&adapters),
        );

        TestEngine {
            engine,
            store,
            settings,
            adapters,
            sms,
            slack,
        }
    }
}

impl TestEngine {
    pub fn new() -> Self {
        TestEngineBuilder::new().build()
    }

    /// Create a user with one SMS contact; returns (user, contact).
    pub async fn user_with_sms(&self, address: &str) -> (Uuid, Contact) {
        let user_uuid = Uuid::new_v4();
        let contact = self
            .store
            .create_contact(NewContact {
                user_uuid,
                channel: Channel::Sms,
                address: address.to_string(),
            })
            .await
            .expect("contact creation");
        (user_uuid, contact)
    }
}

impl Default for TestEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Minimal roll-call creation input for the given targets.
pub fn new_roll_call(targets: Vec<Uuid>) -> NewRollCall {
    NewRollCall {
        organization_uuid: Uuid::new_v4(),
        creator_uuid: Uuid::new_v4(),
        message: "Emergency check-in: reply to confirm you are safe".to_string(),
        self_test: false,
        targets,
    }
}

/// Self-test variant: targets are declared but must be ignored.
pub fn new_self_test_roll_call(creator_uuid: Uuid, decoy_targets: Vec<Uuid>) -> NewRollCall {
    NewRollCall {
        organization_uuid: Uuid::new_v4(),
        creator_uuid,
        message: "Self-test: preview before the real send".to_string(),
        self_test: true,
        targets: decoy_targets,
    }
}
