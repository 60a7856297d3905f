//! Error types for the roll-call engine.

use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

use crate::models::Channel;

/// Top-level error taxonomy for engine operations.
///
/// Two outcomes that look like errors are deliberately *not* here:
/// a repeated dispatch reports `AlreadyDispatched` through
/// [`DispatchResult`](crate::engine::DispatchResult), and an inbound message
/// with no matching outbound reports `Unmatched` through
/// [`CorrelationResult`](crate::engine::CorrelationResult). Both are ordinary
/// results a caller is expected to branch on.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RollCallError {
    /// Referenced entity does not exist; fatal for the single operation.
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: Uuid },

    #[error("validation error: {0}")]
    Validation(String),

    #[error("storage error: {0}")]
    Storage(String),

    /// Per-recipient transport failure. Recorded in the dispatch summary,
    /// never propagated across the batch.
    #[error("transport error on {channel}: {reason}")]
    Transport { channel: Channel, reason: String },

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("invalid {entity} transition: {from} -> {to}")]
    InvalidStateTransition {
        entity: &'static str,
        from: String,
        to: String,
    },

    #[error("operation {operation} timed out after {timeout:?}")]
    Timeout {
        operation: &'static str,
        timeout: Duration,
    },

    /// No adapter is registered for the requested channel, or the channel
    /// cannot service the operation (e.g. inbound on push).
    #[error("unsupported channel {channel}: {reason}")]
    UnsupportedChannel { channel: Channel, reason: String },

    /// Complaint-feed poll failure. Logged by the reconciler and retried on
    /// the next scheduled tick; never fatal to the scheduler.
    #[error("provider poll failed for organization {organization_uuid}: {reason}")]
    ProviderPoll {
        organization_uuid: Uuid,
        reason: String,
    },
}

impl From<sqlx::Error> for RollCallError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => RollCallError::Storage("row not found".to_string()),
            other => RollCallError::Storage(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for RollCallError {
    fn from(err: serde_json::Error) -> Self {
        RollCallError::Validation(format!("JSON serialization error: {err}"))
    }
}

pub type Result<T> = anyhow::Result<T, RollCallError>;
