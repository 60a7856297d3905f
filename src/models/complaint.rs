//! # ComplaintRecord Model
//!
//! Aggregated bounce/spam-report totals fed back from channel providers,
//! keyed by (organization, roll call). Totals only ratchet upward; the
//! reconciler's upsert keeps the maximum of the stored and reported count so
//! a re-poll is idempotent. External quota/throttle logic reads the per-org
//! sum.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplaintRecord {
    pub organization_uuid: Uuid,
    pub roll_call_uuid: Uuid,
    pub count: i64,
    pub updated_at: DateTime<Utc>,
}
