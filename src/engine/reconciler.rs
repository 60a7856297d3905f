//! # Reconciliation Job
//!
//! Periodic sweeps over the delivery records, run on two independent
//! cadences:
//!
//! - **Outstanding sweep** (design cadence: once a minute): finds, per
//!   contact, the most recent outbound message still awaiting a reply after
//!   a configured minimum age, and publishes an event per finding.
//!   Escalation and resend policy belong to subscribers; the sweep only
//!   reports.
//! - **Complaint poll** (design cadence: once an hour): pulls complaint
//!   totals from the provider feedback feed per organization and upserts
//!   them into the monotonic complaint records external throttle logic
//!   reads.
//!
//! A failed poll is logged and retried on the next scheduled tick; one
//! organization's poll failure never blocks the others, and no failure is
//! fatal to the scheduler. Both loops also run as one-shot cycles
//! ([`ReconciliationJob::sweep_outstanding`],
//! [`ReconciliationJob::poll_complaints`]) so embedders with their own
//! scheduler can drive the cadence themselves.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::channels::ComplaintFeed;
use crate::config::ReconcilerConfig;
use crate::error::{Result, RollCallError};
use crate::events::{EngineEvent, EventPublisher};
use crate::models::OutboundMessage;
use crate::storage::RollCallStore;

/// Result of one complaint-poll cycle across all organizations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ComplaintPollSummary {
    pub organizations_polled: usize,
    pub organizations_failed: usize,
    pub reports_applied: usize,
}

/// Runtime counters for the reconciler's background loops.
#[derive(Debug, Default)]
pub struct ReconcilerStats {
    pub sweep_cycles: AtomicU64,
    pub outstanding_found: AtomicU64,
    pub poll_cycles: AtomicU64,
    pub poll_errors: AtomicU64,
}

/// Handle to the reconciler's spawned loops.
#[derive(Debug)]
pub struct ReconcilerHandle {
    is_running: Arc<AtomicBool>,
    handles: Vec<JoinHandle<()>>,
}

impl ReconcilerHandle {
    /// Signal both loops to stop after their current tick and abort their
    /// interval waits.
    pub fn stop(&mut self) {
        self.is_running.store(false, Ordering::SeqCst);
        for handle in self.handles.drain(..) {
            handle.abort();
        }
    }
}

impl Drop for ReconcilerHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Periodic reconciliation over outstanding messages and complaint feeds.
pub struct ReconciliationJob {
    store: Arc<dyn RollCallStore>,
    feed: Arc<dyn ComplaintFeed>,
    events: EventPublisher,
    config: ReconcilerConfig,
    is_running: Arc<AtomicBool>,
    /// Window cursor for providers that support `since` filtering. Advanced
    /// only after a fully successful poll cycle so a partial failure re-polls
    /// the same window; the monotonic upsert makes that idempotent.
    last_successful_poll: Mutex<Option<DateTime<Utc>>>,
    stats: ReconcilerStats,
}

impl ReconciliationJob {
    pub fn new(
        store: Arc<dyn RollCallStore>,
        feed: Arc<dyn ComplaintFeed>,
        config: ReconcilerConfig,
        events: EventPublisher,
    ) -> Self {
        Self {
            store,
            feed,
            events,
            config,
            is_running: Arc::new(AtomicBool::new(false)),
            last_successful_poll: Mutex::new(None),
            stats: ReconcilerStats::default(),
        }
    }

    pub fn stats(&self) -> &ReconcilerStats {
        &self.stats
    }

    /// Spawn the sweep and poll loops on their configured intervals.
    ///
    /// Returns a handle that stops both loops when dropped. When the
    /// reconciler is disabled by configuration, no loops are spawned and the
    /// returned handle is inert.
    pub fn start(self: &Arc<Self>) -> ReconcilerHandle {
        if !self.config.enabled {
            info!("Reconciler disabled by configuration, not starting loops");
            return ReconcilerHandle {
                is_running: Arc::clone(&self.is_running),
                handles: Vec::new(),
            };
        }

        self.is_running.store(true, Ordering::SeqCst);

        info!(
            sweep_interval = ?self.config.outstanding_sweep_interval(),
            poll_interval = ?self.config.complaint_poll_interval(),
            "Starting reconciliation loops"
        );

        let sweep_job = Arc::clone(self);
        let sweep_handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(sweep_job.config.outstanding_sweep_interval());
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // The first tick fires immediately; skip it so startup does not
            // race record seeding in embedders
            ticker.tick().await;
            while sweep_job.is_running.load(Ordering::SeqCst) {
                ticker.tick().await;
                if let Err(e) = sweep_job.sweep_outstanding().await {
                    error!(error = %e, "Outstanding sweep failed, retrying next tick");
                }
            }
        });

        let poll_job = Arc::clone(self);
        let poll_handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(poll_job.config.complaint_poll_interval());
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            ticker.tick().await;
            while poll_job.is_running.load(Ordering::SeqCst) {
                ticker.tick().await;
                if let Err(e) = poll_job.poll_complaints().await {
                    error!(error = %e, "Complaint poll failed, retrying next tick");
                }
            }
        });

        ReconcilerHandle {
            is_running: Arc::clone(&self.is_running),
            handles: vec![sweep_handle, poll_handle],
        }
    }

    /// One outstanding-message sweep.
    ///
    /// Reports, per contact, the most recent outbound message with no newer
    /// reply, aged at least `outstanding_min_age`. Findings are published as
    /// [`EngineEvent::OutstandingMessage`] and returned oldest first.
    pub async fn sweep_outstanding(&self) -> Result<Vec<OutboundMessage>> {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(self.config.outstanding_min_age()).map_err(|e| {
                RollCallError::Configuration(format!("outstanding_min_age out of range: {e}"))
            })?;

        let outstanding = self.store.outstanding_messages(cutoff).await?;

        self.stats.sweep_cycles.fetch_add(1, Ordering::Relaxed);
        self.stats
            .outstanding_found
            .fetch_add(outstanding.len() as u64, Ordering::Relaxed);

        debug!(
            outstanding = outstanding.len(),
            cutoff = %cutoff,
            "Outstanding sweep completed"
        );

        for message in &outstanding {
            if let Err(e) = self
                .events
                .publish(EngineEvent::OutstandingMessage {
                    roll_call_uuid: message.roll_call_uuid,
                    contact_uuid: message.contact_uuid,
                    message_uuid: message.message_uuid,
                    sent_at: message.sent_at,
                })
                .await
            {
                warn!(error = %e, "Failed to publish outstanding message event");
            }
        }

        Ok(outstanding)
    }

    /// One complaint-poll cycle across every known organization.
    ///
    /// Per-organization failures are logged and counted but do not stop the
    /// cycle; the failed organization is re-polled on the next tick.
    pub async fn poll_complaints(&self) -> Result<ComplaintPollSummary> {
        let organizations = self.store.organization_uuids().await?;
        let since = *self.last_successful_poll.lock().await;
        let cycle_started_at = Utc::now();

        let mut summary = ComplaintPollSummary {
            organizations_polled: organizations.len(),
            ..ComplaintPollSummary::default()
        };

        for organization_uuid in organizations {
            match self.poll_one_organization(organization_uuid, since).await {
                Ok(applied) => summary.reports_applied += applied,
                Err(e) => {
                    summary.organizations_failed += 1;
                    self.stats.poll_errors.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        organization_uuid = %organization_uuid,
                        error = %e,
                        "Complaint poll failed for organization, retrying next tick"
                    );
                }
            }
        }

        if summary.organizations_failed == 0 {
            *self.last_successful_poll.lock().await = Some(cycle_started_at);
        }

        self.stats.poll_cycles.fetch_add(1, Ordering::Relaxed);

        debug!(
            polled = summary.organizations_polled,
            failed = summary.organizations_failed,
            applied = summary.reports_applied,
            "Complaint poll cycle completed"
        );

        Ok(summary)
    }

    async fn poll_one_organization(
        &self,
        organization_uuid: Uuid,
        since: Option<DateTime<Utc>>,
    ) -> Result<usize> {
        let reports = self
            .feed
            .fetch_complaints(organization_uuid, since)
            .await
            .map_err(|e| RollCallError::ProviderPoll {
                organization_uuid,
                reason: e.to_string(),
            })?;

        let mut applied = 0;
        for report in reports {
            self.store
                .upsert_complaint_total(organization_uuid, report.roll_call_uuid, report.count)
                .await?;
            applied += 1;
        }

        if applied > 0 {
            let total = self.store.complaint_total_for_org(organization_uuid).await?;
            if let Err(e) = self
                .events
                .publish(EngineEvent::ComplaintTotalsUpdated {
                    organization_uuid,
                    total,
                })
                .await
            {
                warn!(error = %e, "Failed to publish complaint totals event");
            }
        }

        Ok(applied)
    }
}
