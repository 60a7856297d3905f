//! Configuration management for the roll-call engine.
//!
//! Layered loading: compiled defaults, then an optional TOML file, then
//! `ROLLCALL_`-prefixed environment variables (`__` separates nesting, e.g.
//! `ROLLCALL_DISPATCH__SEND_TIMEOUT_MS=5000`). Durations are stored as
//! integer `*_ms`/`*_secs` fields and exposed through accessor methods.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use crate::error::{Result, RollCallError};
use crate::models::Channel;

/// Top-level engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollCallConfig {
    pub database_url: String,
    /// Channel preference order used by the recipient resolver when a user is
    /// reachable on more than one channel. Policy, not hard-coded precedence.
    pub channel_priority: Vec<Channel>,
    pub dispatch: DispatchConfig,
    pub reconciler: ReconcilerConfig,
    pub sms: SmsProviderConfig,
    pub push: PushProviderConfig,
    pub events: EventsConfig,
}

/// Delivery dispatcher configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Maximum number of concurrent adapter calls per dispatch
    pub max_concurrent_sends: usize,
    /// Per-recipient send timeout
    pub send_timeout_ms: u64,
    /// Overall budget for one dispatch invocation
    pub dispatch_deadline_ms: u64,
}

impl DispatchConfig {
    /// Get per-send timeout as Duration
    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }

    /// Get whole-dispatch deadline as Duration
    pub fn dispatch_deadline(&self) -> Duration {
        Duration::from_millis(self.dispatch_deadline_ms)
    }
}

/// Reconciliation job configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcilerConfig {
    pub enabled: bool,
    /// Cadence of the outstanding-message sweep
    pub outstanding_sweep_interval_secs: u64,
    /// Cadence of the complaint-feed poll
    pub complaint_poll_interval_secs: u64,
    /// How long a message must stay unanswered before the sweep reports it
    pub outstanding_min_age_secs: u64,
}

impl ReconcilerConfig {
    /// Get sweep interval as Duration
    pub fn outstanding_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.outstanding_sweep_interval_secs)
    }

    /// Get complaint poll interval as Duration
    pub fn complaint_poll_interval(&self) -> Duration {
        Duration::from_secs(self.complaint_poll_interval_secs)
    }

    /// Get outstanding minimum age as Duration
    pub fn outstanding_min_age(&self) -> Duration {
        Duration::from_secs(self.outstanding_min_age_secs)
    }
}

/// SMS gateway provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmsProviderConfig {
    pub base_url: String,
    pub api_key: String,
    /// Sender id / originating number
    pub from: String,
    /// Leading keyword stripped from inbound bodies (shared-shortcode
    /// providers prefix replies with it)
    pub keyword: String,
    /// Outbound pacing; 0 disables pacing
    pub messages_per_second: u32,
    pub request_timeout_ms: u64,
}

impl SmsProviderConfig {
    /// Get HTTP request timeout as Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Push gateway provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushProviderConfig {
    pub base_url: String,
    pub api_key: String,
    pub request_timeout_ms: u64,
}

impl PushProviderConfig {
    /// Get HTTP request timeout as Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Engine event channel configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventsConfig {
    pub channel_capacity: usize,
}

impl Default for RollCallConfig {
    fn default() -> Self {
        Self {
            database_url: "postgresql://localhost/rollcall_development".to_string(),
            channel_priority: vec![Channel::Sms, Channel::Slack, Channel::Push],
            dispatch: DispatchConfig::default(),
            reconciler: ReconcilerConfig::default(),
            sms: SmsProviderConfig::default(),
            push: PushProviderConfig::default(),
            events: EventsConfig::default(),
        }
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_concurrent_sends: 16,
            send_timeout_ms: 10_000,
            dispatch_deadline_ms: 60_000,
        }
    }
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            outstanding_sweep_interval_secs: 60,
            complaint_poll_interval_secs: 3_600,
            outstanding_min_age_secs: 300,
        }
    }
}

impl Default for SmsProviderConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:4010".to_string(),
            api_key: String::new(),
            from: "ROLLCALL".to_string(),
            keyword: "rollcall".to_string(),
            messages_per_second: 5,
            request_timeout_ms: 10_000,
        }
    }
}

impl Default for PushProviderConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:4020".to_string(),
            api_key: String::new(),
            request_timeout_ms: 10_000,
        }
    }
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 1_000,
        }
    }
}

impl RollCallConfig {
    /// Load configuration: defaults, then the optional TOML file, then
    /// `ROLLCALL_*` environment overrides.
    pub fn load(config_file: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder().add_source(
            config::Config::try_from(&RollCallConfig::default())
                .map_err(|e| RollCallError::Configuration(e.to_string()))?,
        );

        if let Some(path) = config_file {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        let loaded: RollCallConfig = builder
            .add_source(
                config::Environment::with_prefix("ROLLCALL")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| RollCallError::Configuration(e.to_string()))?
            .try_deserialize()
            .map_err(|e| RollCallError::Configuration(e.to_string()))?;

        loaded.validate()?;
        Ok(loaded)
    }

    /// Validate cross-field constraints.
    pub fn validate(&self) -> Result<()> {
        if self.channel_priority.is_empty() {
            return Err(RollCallError::Configuration(
                "channel_priority must list at least one channel".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for channel in &self.channel_priority {
            if !seen.insert(channel) {
                return Err(RollCallError::Configuration(format!(
                    "channel_priority lists {channel} more than once"
                )));
            }
        }

        if self.dispatch.max_concurrent_sends == 0 {
            return Err(RollCallError::Configuration(
                "dispatch.max_concurrent_sends must be at least 1".to_string(),
            ));
        }
        if self.dispatch.send_timeout_ms == 0 || self.dispatch.dispatch_deadline_ms == 0 {
            return Err(RollCallError::Configuration(
                "dispatch timeouts must be non-zero".to_string(),
            ));
        }

        if self.reconciler.outstanding_sweep_interval_secs == 0
            || self.reconciler.complaint_poll_interval_secs == 0
        {
            return Err(RollCallError::Configuration(
                "reconciler intervals must be non-zero".to_string(),
            ));
        }

        if self.events.channel_capacity == 0 {
            return Err(RollCallError::Configuration(
                "events.channel_capacity must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}
