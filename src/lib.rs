#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Rollcall Core
//!
//! Multi-channel roll-call delivery and response-tracking engine: fan a
//! single roll call out to N recipients across heterogeneous channels (SMS,
//! Slack, push), record delivery state per recipient and channel, correlate
//! asynchronous inbound replies back to the right outstanding roll call, and
//! reconcile provider feedback (complaints, long-unanswered messages) on a
//! fixed cadence.
//!
//! ## Architecture
//!
//! The engine is four components behind the [`engine::RollCallEngine`]
//! facade:
//!
//! - **Recipient resolution** expands declared targets into concrete
//!   (user, contact, channel) deliveries by configurable channel priority.
//! - **Dispatch** fans out concurrently with partial-failure semantics and
//!   an atomic `draft -> sent` claim that makes dispatch at-most-once per
//!   roll call.
//! - **Correlation** matches each inbound message to the sender contact's
//!   most recent unreplied outbound message, serialized per contact.
//! - **Aggregation** recomputes `reply_count` (distinct replying users) and
//!   `sent_count` (message rows) from the records on every read.
//!
//! A periodic [`engine::ReconciliationJob`] sweeps for outstanding messages
//! and polls provider complaint feeds into monotonic per-organization
//! totals.
//!
//! ## Module Organization
//!
//! - [`engine`] - Resolver, dispatcher, correlator, aggregator, reconciler
//! - [`channels`] - Channel adapter trait, registry, and the SMS/Slack/push
//!   adapters
//! - [`storage`] - [`storage::RollCallStore`] trait with in-memory and
//!   PostgreSQL implementations
//! - [`models`] - Immutable value types: roll calls, contacts, messages,
//!   replies
//! - [`settings`] - Per-organization channel settings seam
//! - [`events`] - Broadcast lifecycle events for embedding applications
//! - [`config`] - Layered configuration (defaults, TOML file, environment)
//! - [`error`] - Structured error taxonomy
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use rollcall_core::channels::{ChannelAdapterRegistry, SmsAdapter};
//! use rollcall_core::config::RollCallConfig;
//! use rollcall_core::engine::RollCallEngine;
//! use rollcall_core::settings::InMemorySettings;
//! use rollcall_core::storage::PgStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = RollCallConfig::load(None)?;
//! let store = Arc::new(PgStore::connect(&config.database_url).await?);
//!
//! let adapters = Arc::new(ChannelAdapterRegistry::new());
//! adapters.register(Arc::new(SmsAdapter::new(&config.sms)?));
//!
//! let engine = RollCallEngine::new(config, store, InMemorySettings::shared(), adapters);
//! let counts = engine.counts(uuid::Uuid::new_v4()).await?;
//! println!("{} sent, {} replied", counts.sent_count, counts.reply_count);
//! # Ok(())
//! # }
//! ```

pub mod channels;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod logging;
pub mod models;
pub mod settings;
pub mod storage;

pub use config::RollCallConfig;
pub use engine::{
    CorrelationResult, DispatchDisposition, DispatchResult, ReconciliationJob, RollCallEngine,
};
pub use error::{Result, RollCallError};
pub use models::{Channel, ResponseStatus, RollCallStatus};
pub use storage::{RollCallCounts, RollCallStore};
