//! End-to-end dispatch behavior through the engine facade: fan-out,
//! partial failure, idempotency, self-test mode, and derived counts.

mod common;

use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use rollcall_core::config::RollCallConfig;
use rollcall_core::engine::{DispatchDisposition, SendOutcome};
use rollcall_core::models::{Channel, ResponseStatus, RollCallStatus};
use rollcall_core::settings::ChannelSettings;
use rollcall_core::storage::RollCallStore;
use rollcall_core::RollCallError;

use common::builders::{new_roll_call, new_self_test_roll_call, TestEngine, TestEngineBuilder};

#[tokio::test]
async fn sent_count_equals_outbound_rows_despite_failures() {
    let harness = TestEngine::new();
    let (alice, _) = harness.user_with_sms("+15550001001").await;
    let (bob, _) = harness.user_with_sms("+15550001002").await;
    let (carol, _) = harness.user_with_sms("+15550001003").await;
    harness.sms.fail_address("+15550001002");

    let (roll_call, dispatch) = harness
        .engine
        .create_roll_call(new_roll_call(vec![alice, bob, carol]))
        .await
        .unwrap();

    assert_eq!(dispatch.disposition, DispatchDisposition::Dispatched);
    assert_eq!(dispatch.sent_count, 2);
    assert_eq!(dispatch.failed_count, 1);

    // sent_count counts recorded outbound rows, not attempted recipients
    let counts = harness.engine.counts(roll_call.roll_call_uuid).await.unwrap();
    assert_eq!(counts.sent_count, 2);
    assert_eq!(
        harness
            .engine
            .messages(roll_call.roll_call_uuid, None)
            .await
            .unwrap()
            .len(),
        2
    );
}

#[tokio::test]
async fn contactless_recipient_is_reported_unreachable_not_fatal() {
    let harness = TestEngine::new();
    let (alice, _) = harness.user_with_sms("+15550001010").await;
    let bob = Uuid::new_v4(); // no contact on file

    let (roll_call, dispatch) = harness
        .engine
        .create_roll_call(new_roll_call(vec![alice, bob]))
        .await
        .unwrap();

    assert_eq!(dispatch.sent_count, 1);
    assert_eq!(dispatch.unreachable_count, 1);
    let unreachable = dispatch
        .outcomes
        .iter()
        .find(|o| matches!(o.outcome, SendOutcome::Unreachable { .. }))
        .unwrap();
    assert_eq!(unreachable.user_uuid, bob);

    let counts = harness.engine.counts(roll_call.roll_call_uuid).await.unwrap();
    assert_eq!(counts.sent_count, 1);
}

#[tokio::test]
async fn second_dispatch_is_already_dispatched_noop() {
    let harness = TestEngine::new();
    let (alice, _) = harness.user_with_sms("+15550001020").await;

    let (roll_call, first) = harness
        .engine
        .create_roll_call(new_roll_call(vec![alice]))
        .await
        .unwrap();
    assert_eq!(first.disposition, DispatchDisposition::Dispatched);

    let second = harness
        .engine
        .dispatch_roll_call(&roll_call, &[alice])
        .await
        .unwrap();
    assert_eq!(second.disposition, DispatchDisposition::AlreadyDispatched);
    assert!(second.outcomes.is_empty());

    // Exactly one set of outbound messages exists
    assert_eq!(harness.sms.send_count(), 1);
    assert_eq!(
        harness.engine.counts(roll_call.roll_call_uuid).await.unwrap().sent_count,
        1
    );
}

#[tokio::test]
async fn total_failure_returns_roll_call_to_draft() {
    let harness = TestEngine::new();
    let (alice, _) = harness.user_with_sms("+15550001030").await;
    harness.sms.fail_address("+15550001030");

    let (roll_call, dispatch) = harness
        .engine
        .create_roll_call(new_roll_call(vec![alice]))
        .await
        .unwrap();

    assert_eq!(dispatch.disposition, DispatchDisposition::NoneSent);
    assert_eq!(roll_call.status, RollCallStatus::Draft);
    assert_eq!(
        harness.engine.counts(roll_call.roll_call_uuid).await.unwrap().sent_count,
        0
    );

    // A retry after the transport recovers can claim the draft again
    let retry = harness
        .engine
        .dispatch_roll_call(&roll_call, &[alice])
        .await
        .unwrap();
    // Address still failing; still draft
    assert_eq!(retry.disposition, DispatchDisposition::NoneSent);
}

#[tokio::test]
async fn self_test_creates_recipient_row_only_for_creator() {
    let harness = TestEngine::new();
    let (creator, _) = harness.user_with_sms("+15550001040").await;
    let (decoy, _) = harness.user_with_sms("+15550001041").await;

    let (roll_call, dispatch) = harness
        .engine
        .create_roll_call(new_self_test_roll_call(creator, vec![decoy]))
        .await
        .unwrap();

    assert_eq!(dispatch.sent_count, 1);
    let sends = harness.sms.sends();
    assert_eq!(sends.len(), 1);
    assert_eq!(sends[0].address, "+15550001040");

    let recipients = harness
        .engine
        .recipients(roll_call.roll_call_uuid, None)
        .await
        .unwrap();
    assert_eq!(recipients.len(), 1);
    assert_eq!(recipients[0].user_uuid, creator);
}

#[tokio::test]
async fn slow_send_times_out_without_stalling_the_batch() {
    let mut config = RollCallConfig::default();
    config.dispatch.send_timeout_ms = 50;
    let harness = TestEngineBuilder::new().with_config(config).build();

    let (fast, _) = harness.user_with_sms("+15550001050").await;
    let slow = Uuid::new_v4();
    harness
        .store
        .create_contact(rollcall_core::models::NewContact {
            user_uuid: slow,
            channel: Channel::Slack,
            address: "U0SLOW".to_string(),
        })
        .await
        .unwrap();

    // Replace the default Slack mock with a delayed one; the registry is
    // shared with the engine and replaces per channel
    harness.adapters.register(Arc::new(
        common::mock_adapter::MockAdapter::new(Channel::Slack)
            .with_send_delay(Duration::from_millis(500)),
    ));

    let new = new_roll_call(vec![fast, slow]);
    harness.settings.set(
        new.organization_uuid,
        ChannelSettings {
            enabled: vec![Channel::Sms, Channel::Slack],
            slack_webhook_url: Some("https://hooks.slack.example/T0/B0/tok".to_string()),
        },
    );

    let (roll_call, dispatch) = harness.engine.create_roll_call(new).await.unwrap();

    // The SMS send succeeds; the Slack send exceeds its 50ms budget
    assert_eq!(dispatch.sent_count, 1);
    assert_eq!(dispatch.failed_count, 1);
    let failed = dispatch
        .outcomes
        .iter()
        .find_map(|o| match &o.outcome {
            SendOutcome::Failed { reason } => Some(reason.clone()),
            _ => None,
        })
        .unwrap();
    assert!(failed.contains("timed out"), "unexpected reason: {failed}");
    assert_eq!(roll_call.status, RollCallStatus::Sent);
}

#[tokio::test]
async fn recipients_start_pending_and_are_queryable_by_status() {
    let harness = TestEngine::new();
    let (alice, _) = harness.user_with_sms("+15550001060").await;
    let (bob, _) = harness.user_with_sms("+15550001061").await;

    let (roll_call, _) = harness
        .engine
        .create_roll_call(new_roll_call(vec![alice, bob]))
        .await
        .unwrap();

    let pending = harness
        .engine
        .recipients(roll_call.roll_call_uuid, Some(ResponseStatus::Pending))
        .await
        .unwrap();
    assert_eq!(pending.len(), 2);

    assert_eq!(
        harness
            .engine
            .recipient_status(roll_call.roll_call_uuid, alice)
            .await
            .unwrap(),
        ResponseStatus::Pending
    );
}

#[tokio::test]
async fn unknown_roll_call_is_not_found() {
    let harness = TestEngine::new();
    let missing = Uuid::new_v4();

    assert!(matches!(
        harness.engine.counts(missing).await,
        Err(RollCallError::NotFound { .. })
    ));
    assert!(matches!(
        harness.engine.roll_call(missing).await,
        Err(RollCallError::NotFound { .. })
    ));
}
