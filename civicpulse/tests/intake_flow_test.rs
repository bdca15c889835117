//! Integration tests for the intake dialogue
//!
//! Drives whole conversations through the pipeline entry point and checks
//! the dialogue properties: termination within each flow's step count,
//! re-prompt idempotence, and restart semantics.

use std::sync::Arc;

use civicpulse::store::types::SessionAnswers;
use civicpulse::{
    DialogueStep, FeedbackPipeline, FeedbackStore, NotificationDispatcher, Office,
    SharedFeedbackStore,
};

const PHONE: &str = "+919800000010";

fn pipeline() -> (FeedbackPipeline, SharedFeedbackStore) {
    let store = FeedbackStore::open_in_memory().unwrap().shared();
    let office = Office::new("OFF-1", "Pune Tehsil Office", "Revenue", "Pune")
        .with_head("A. Deshmukh", "9800000001");
    store.upsert_office(&office).unwrap();

    let dispatcher = Arc::new(NotificationDispatcher::new(
        store.clone(),
        None,
        "+14150000000",
        "+91",
    ));
    (
        FeedbackPipeline::with_dispatcher(store.clone(), dispatcher),
        store,
    )
}

async fn send(pipeline: &FeedbackPipeline, body: &str) -> String {
    pipeline.handle_inbound(PHONE, body).await.unwrap()
}

#[tokio::test]
async fn test_office_flow_completes_in_three_valid_inputs() {
    let (pipeline, store) = pipeline();

    send(&pipeline, "feedback for OFF-1").await;
    send(&pipeline, "1").await; // topic
    send(&pipeline, "4").await; // rating
    let reply = send(&pipeline, "counter staff were helpful").await;
    assert!(reply.contains("Thank you"));

    let sessions = store.completed_sessions_for_office("OFF-1").unwrap();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].step, DialogueStep::Complete);
    assert_eq!(sessions[0].rating(), Some(4));
}

#[tokio::test]
async fn test_policy_flow_completes_in_four_valid_inputs() {
    let (pipeline, store) = pipeline();

    send(&pipeline, "feedback for OFF-1").await;
    send(&pipeline, "2").await;
    send(&pipeline, "crop insurance scheme").await;
    send(&pipeline, "2").await;
    let reply = send(&pipeline, "1").await;
    assert!(reply.contains("Thank you"));

    let sessions = store.completed_sessions_for_office("OFF-1").unwrap();
    assert_eq!(sessions.len(), 1);
    match &sessions[0].answers {
        SessionAnswers::Policy(a) => {
            assert_eq!(a.policy_name.as_deref(), Some("crop insurance scheme"));
            assert_eq!(a.improvement_type.as_deref(), Some("make it fully online"));
            assert_eq!(a.beneficiary.as_deref(), Some("farmers"));
        }
        other => panic!("expected policy answers, got {other:?}"),
    }
}

#[tokio::test]
async fn test_process_flow_completes_in_four_valid_inputs() {
    let (pipeline, store) = pipeline();

    send(&pipeline, "feedback for OFF-1").await;
    send(&pipeline, "3").await;
    send(&pipeline, "birth certificate").await;
    send(&pipeline, "2").await;
    let reply = send(&pipeline, "allow submitting documents online").await;
    assert!(reply.contains("Thank you"));

    let sessions = store.completed_sessions_for_office("OFF-1").unwrap();
    assert_eq!(sessions.len(), 1);
    match &sessions[0].answers {
        SessionAnswers::Process(a) => {
            assert_eq!(a.process_name.as_deref(), Some("birth certificate"));
            assert_eq!(a.difficulty_type.as_deref(), Some("too many office visits"));
            assert_eq!(
                a.suggestion.as_deref(),
                Some("allow submitting documents online")
            );
        }
        other => panic!("expected process answers, got {other:?}"),
    }
}

#[tokio::test]
async fn test_out_of_range_rating_keeps_session_in_place() {
    let (pipeline, store) = pipeline();

    send(&pipeline, "feedback for OFF-1").await;
    send(&pipeline, "1").await;

    // Rating "6": re-prompt, no answer recorded, step unchanged
    let reply = send(&pipeline, "6").await;
    assert!(reply.contains("between 1 and 5"));

    let session = store.open_session_for_phone(PHONE).unwrap().unwrap();
    assert_eq!(session.step, DialogueStep::Step2);
    assert_eq!(session.rating(), None);
}

#[tokio::test]
async fn test_invalid_input_never_mutates_recorded_answers() {
    let (pipeline, store) = pipeline();

    send(&pipeline, "feedback for OFF-1").await;
    send(&pipeline, "3").await;
    send(&pipeline, "land records").await;
    send(&pipeline, "1").await;

    let before = store.open_session_for_phone(PHONE).unwrap().unwrap();

    // Repeated invalid input at step 4 neither advances nor mutates
    for _ in 0..3 {
        send(&pipeline, "x").await;
        let after = store.open_session_for_phone(PHONE).unwrap().unwrap();
        assert_eq!(after.step, before.step);
        assert_eq!(after.answers, before.answers);
    }

    // Still completable afterwards
    let reply = send(&pipeline, "publish the document checklist").await;
    assert!(reply.contains("Thank you"));
}

#[tokio::test]
async fn test_missing_sender_or_body_is_rejected_before_mutation() {
    let (pipeline, store) = pipeline();

    assert!(pipeline.handle_inbound("", "hello").await.is_err());
    assert!(pipeline.handle_inbound(PHONE, "   ").await.is_err());
    assert!(store.open_session_for_phone(PHONE).unwrap().is_none());
}

#[tokio::test]
async fn test_restart_mid_dialogue_binds_to_new_office() {
    let (pipeline, store) = pipeline();
    let office2 = Office::new("OFF-2", "Nashik Tehsil Office", "Revenue", "Nashik");
    store.upsert_office(&office2).unwrap();

    send(&pipeline, "feedback for OFF-1").await;
    send(&pipeline, "1").await;

    // New start wins; exactly one open session remains
    let reply = send(&pipeline, "feedback for OFF-2").await;
    assert!(reply.contains("Nashik"));

    let open = store.open_session_for_phone(PHONE).unwrap().unwrap();
    assert_eq!(open.office_id, "OFF-2");
    assert_eq!(open.step, DialogueStep::TopicSelect);
}
