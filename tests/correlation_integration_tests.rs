//! Inbound correlation through the engine facade: last-unreplied-by-contact
//! selection across roll calls, per-user reply dedup in the counts, and the
//! unmatched triage path.

mod common;

use chrono::{Duration, Utc};
use serde_json::json;

use rollcall_core::engine::CorrelationResult;
use rollcall_core::models::ResponseStatus;
use rollcall_core::storage::RollCallStore;

use common::builders::{new_roll_call, TestEngine};

#[tokio::test]
async fn reply_correlates_to_most_recent_of_two_roll_calls() {
    let harness = TestEngine::new();
    let (user, _) = harness.user_with_sms("+15550002001").await;

    // Two roll calls to the same contact, dispatched in order
    let (first, _) = harness
        .engine
        .create_roll_call(new_roll_call(vec![user]))
        .await
        .unwrap();
    let (second, _) = harness
        .engine
        .create_roll_call(new_roll_call(vec![user]))
        .await
        .unwrap();

    let result = harness
        .engine
        .record_inbound(
            rollcall_core::models::Channel::Sms,
            &json!({ "from": "+15550002001", "body": "present" }),
        )
        .await
        .unwrap();

    match result {
        CorrelationResult::Matched { roll_call_uuid, .. } => {
            assert_eq!(roll_call_uuid, second.roll_call_uuid);
        }
        CorrelationResult::Unmatched { .. } => panic!("expected a match"),
    }

    // The newer roll call absorbed the reply; the older one still waits
    assert_eq!(
        harness.engine.counts(second.roll_call_uuid).await.unwrap().reply_count,
        1
    );
    assert_eq!(
        harness.engine.counts(first.roll_call_uuid).await.unwrap().reply_count,
        0
    );
}

#[tokio::test]
async fn dispatch_reply_dispatch_reply_sequence_tracks_each_roll_call() {
    let harness = TestEngine::new();
    let (user, _) = harness.user_with_sms("+15550002002").await;
    let sms = rollcall_core::models::Channel::Sms;

    // T1: first roll call; T2: reply; T3: second roll call; T4: reply
    let (first, _) = harness
        .engine
        .create_roll_call(new_roll_call(vec![user]))
        .await
        .unwrap();
    let reply1 = harness
        .engine
        .record_inbound(sms, &json!({ "from": "+15550002002", "body": "ack one" }))
        .await
        .unwrap();
    assert!(reply1.is_matched());

    let (second, _) = harness
        .engine
        .create_roll_call(new_roll_call(vec![user]))
        .await
        .unwrap();
    let reply2 = harness
        .engine
        .record_inbound(sms, &json!({ "from": "+15550002002", "body": "ack two" }))
        .await
        .unwrap();

    match reply2 {
        CorrelationResult::Matched { roll_call_uuid, .. } => {
            assert_eq!(roll_call_uuid, second.roll_call_uuid, "second reply belongs to the later dispatch");
        }
        CorrelationResult::Unmatched { .. } => panic!("expected a match"),
    }

    for roll_call in [&first, &second] {
        assert_eq!(
            harness.engine.counts(roll_call.roll_call_uuid).await.unwrap().reply_count,
            1
        );
        assert_eq!(
            harness
                .engine
                .recipient_status(roll_call.roll_call_uuid, user)
                .await
                .unwrap(),
            ResponseStatus::Replied
        );
    }
}

#[tokio::test]
async fn repeated_replies_count_one_user_once() {
    let harness = TestEngine::new();
    let (user, contact) = harness.user_with_sms("+15550002003").await;

    let (roll_call, _) = harness
        .engine
        .create_roll_call(new_roll_call(vec![user]))
        .await
        .unwrap();

    // First inbound matches; the rest arrive with nothing outstanding and
    // are parked, but we also record extra replies directly to prove the
    // count stays per-user
    harness
        .engine
        .record_inbound(
            rollcall_core::models::Channel::Sms,
            &json!({ "from": "+15550002003", "body": "first" }),
        )
        .await
        .unwrap();

    for (content, minutes) in [("second", 2), ("third", 4)] {
        harness
            .store
            .record_reply(rollcall_core::models::NewReply {
                roll_call_uuid: roll_call.roll_call_uuid,
                user_uuid: user,
                contact_uuid: contact.contact_uuid,
                content: content.to_string(),
                created_at: Some(Utc::now() + Duration::minutes(minutes)),
            })
            .await
            .unwrap();
    }

    let counts = harness.engine.counts(roll_call.roll_call_uuid).await.unwrap();
    assert_eq!(counts.reply_count, 1, "three reply rows, one user");

    let summary = harness.engine.summary(roll_call.roll_call_uuid).await.unwrap();
    assert_eq!(summary.latest_replies.len(), 1);
    assert_eq!(summary.latest_replies[0].content, "third");
}

#[tokio::test]
async fn inbound_with_nothing_outstanding_is_parked_for_triage() {
    let harness = TestEngine::new();
    let (_, contact) = harness.user_with_sms("+15550002004").await;

    let result = harness
        .engine
        .record_inbound(
            rollcall_core::models::Channel::Sms,
            &json!({ "from": "+15550002004", "body": "anyone there?" }),
        )
        .await
        .unwrap();

    match result {
        CorrelationResult::Unmatched { inbound } => {
            assert_eq!(inbound.contact_uuid, Some(contact.contact_uuid));
            assert_eq!(inbound.content, "anyone there?");
        }
        CorrelationResult::Matched { .. } => panic!("expected unmatched"),
    }

    let parked = harness.engine.unmatched_inbound(10).await.unwrap();
    assert_eq!(parked.len(), 1);
}

#[tokio::test]
async fn replied_status_never_reverts_on_late_unresponsive_flag() {
    let harness = TestEngine::new();
    let (user, _) = harness.user_with_sms("+15550002005").await;

    let (roll_call, _) = harness
        .engine
        .create_roll_call(new_roll_call(vec![user]))
        .await
        .unwrap();
    harness
        .engine
        .record_inbound(
            rollcall_core::models::Channel::Sms,
            &json!({ "from": "+15550002005", "body": "here" }),
        )
        .await
        .unwrap();

    // A late escalation pass cannot downgrade a user who answered
    let result = harness
        .store
        .update_recipient_status(
            roll_call.roll_call_uuid,
            user,
            ResponseStatus::Unresponsive,
        )
        .await;
    assert!(result.is_err());
    assert_eq!(
        harness
            .engine
            .recipient_status(roll_call.roll_call_uuid, user)
            .await
            .unwrap(),
        ResponseStatus::Replied
    );
}

#[tokio::test]
async fn reply_on_sibling_channel_closes_the_users_outstanding_message() {
    let harness = TestEngine::new();
    let (user, _) = harness.user_with_sms("+15550002006").await;

    let (roll_call, _) = harness
        .engine
        .create_roll_call(new_roll_call(vec![user]))
        .await
        .unwrap();
    harness
        .engine
        .record_inbound(
            rollcall_core::models::Channel::Sms,
            &json!({ "from": "+15550002006", "body": "ok" }),
        )
        .await
        .unwrap();

    // Nothing outstanding remains for this user on any contact
    assert!(harness
        .store
        .last_unreplied_message_by_user(user)
        .await
        .unwrap()
        .is_none());
    assert_eq!(
        harness.engine.counts(roll_call.roll_call_uuid).await.unwrap().reply_count,
        1
    );
}
