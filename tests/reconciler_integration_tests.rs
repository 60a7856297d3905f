//! Reconciliation sweeps driven as one-shot cycles against the engine's
//! store: outstanding-message reporting and monotonic complaint totals.

mod common;

use std::sync::Arc;

use serde_json::json;

use rollcall_core::channels::ComplaintReport;
use rollcall_core::config::ReconcilerConfig;
use rollcall_core::engine::ReconciliationJob;
use rollcall_core::events::EventPublisher;
use rollcall_core::models::Channel;
use rollcall_core::storage::RollCallStore;

use common::builders::{new_roll_call, TestEngine};
use common::mock_adapter::MockComplaintFeed;

#[tokio::test]
async fn sweep_reports_unanswered_messages_until_the_reply_lands() {
    let harness = TestEngine::new();
    let (user, _) = harness.user_with_sms("+15550004001").await;

    let (roll_call, _) = harness
        .engine
        .create_roll_call(new_roll_call(vec![user]))
        .await
        .unwrap();

    // No minimum age so the fresh dispatch shows up immediately
    let job = ReconciliationJob::new(
        Arc::clone(&harness.store) as Arc<dyn RollCallStore>,
        Arc::new(MockComplaintFeed::default()),
        ReconcilerConfig {
            outstanding_min_age_secs: 0,
            ..ReconcilerConfig::default()
        },
        EventPublisher::default(),
    );

    let outstanding = job.sweep_outstanding().await.unwrap();
    assert_eq!(outstanding.len(), 1);
    assert_eq!(outstanding[0].roll_call_uuid, roll_call.roll_call_uuid);

    harness
        .engine
        .record_inbound(
            Channel::Sms,
            &json!({ "from": "+15550004001", "body": "present" }),
        )
        .await
        .unwrap();

    assert!(job.sweep_outstanding().await.unwrap().is_empty());
}

#[tokio::test]
async fn complaint_poll_feeds_monotonic_org_totals() {
    let harness = TestEngine::new();
    let (user, _) = harness.user_with_sms("+15550004002").await;

    let (roll_call, _) = harness
        .engine
        .create_roll_call(new_roll_call(vec![user]))
        .await
        .unwrap();
    let organization_uuid = roll_call.organization_uuid;

    let feed = Arc::new(MockComplaintFeed::default());
    feed.set_reports(vec![ComplaintReport {
        roll_call_uuid: roll_call.roll_call_uuid,
        count: 3,
    }]);

    let reconciler = harness.engine.reconciler(feed.clone());
    let summary = reconciler.poll_complaints().await.unwrap();
    assert_eq!(summary.reports_applied, 1);
    assert_eq!(summary.organizations_failed, 0);
    assert_eq!(
        harness
            .store
            .complaint_total_for_org(organization_uuid)
            .await
            .unwrap(),
        3
    );

    // Provider re-reports a stale lower count; the total holds
    feed.set_reports(vec![ComplaintReport {
        roll_call_uuid: roll_call.roll_call_uuid,
        count: 1,
    }]);
    reconciler.poll_complaints().await.unwrap();
    assert_eq!(
        harness
            .store
            .complaint_total_for_org(organization_uuid)
            .await
            .unwrap(),
        3
    );

    // A genuinely higher count ratchets upward
    feed.set_reports(vec![ComplaintReport {
        roll_call_uuid: roll_call.roll_call_uuid,
        count: 5,
    }]);
    reconciler.poll_complaints().await.unwrap();
    assert_eq!(
        harness
            .store
            .complaint_total_for_org(organization_uuid)
            .await
            .unwrap(),
        5
    );
}
