//! Integration tests for the escalation pattern engine
//!
//! Seeds session history and stored scores directly, then checks the
//! open/upgrade/resolve transitions and the audit side effects.

use std::sync::Arc;

use chrono::{DateTime, Datelike, TimeZone, Utc};

use civicpulse::store::types::{
    DialogueStep, FlowType, OfficeAnswers, Session, SessionAnswers,
};
use civicpulse::{
    EngineAction, EscalationEngine, EscalationLevel, EscalationStatus, FeedbackStore,
    NotificationDispatcher, Office, OfficeMetrics, SharedFeedbackStore, SCORE_THRESHOLD,
};

fn engine() -> (EscalationEngine, SharedFeedbackStore) {
    let store = FeedbackStore::open_in_memory().unwrap().shared();
    let dispatcher = Arc::new(NotificationDispatcher::new(
        store.clone(),
        None,
        "+14150000000",
        "+91",
    ));
    (EscalationEngine::new(store.clone(), dispatcher), store)
}

fn seed_office(store: &SharedFeedbackStore, id: &str) -> Office {
    let office = Office::new(id, format!("{id} Tehsil Office"), "Revenue", "Pune")
        .with_head("A. Deshmukh", "9800000001")
        .with_collector("B. Kulkarni", "9800000002")
        .with_commissioner("C. Patil", "9800000003");
    store.upsert_office(&office).unwrap();
    office
}

/// Insert one completed office-experience session at the given month offset
/// back from the current month (0 = this month).
fn seed_rating(store: &SharedFeedbackStore, office_id: &str, months_back: u32, rating: u8) {
    let now = Utc::now();
    let mut year = now.year();
    let mut month = now.month();
    for _ in 0..months_back {
        if month == 1 {
            year -= 1;
            month = 12;
        } else {
            month -= 1;
        }
    }
    let at: DateTime<Utc> = Utc.with_ymd_and_hms(year, month, 10, 12, 0, 0).unwrap();

    let mut session = Session::start(format!("+9198{:08}", next_phone_suffix()), office_id);
    session.created_at = at;
    session.flow = FlowType::Office;
    session.answers = SessionAnswers::Office(OfficeAnswers {
        rating: Some(rating),
        comment: None,
    });
    session.step = DialogueStep::Complete;
    session.completed = true;
    store.start_session(&session).unwrap();
}

/// Distinct phone per seeded session so the open-session index never trips
fn next_phone_suffix() -> u32 {
    use std::sync::atomic::{AtomicU32, Ordering};
    static COUNTER: AtomicU32 = AtomicU32::new(0);
    COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// Scenario: zero prior sessions, score forced below threshold → exactly one
/// level-1 escalation with a single bootstrap month of evidence.
#[tokio::test]
async fn test_forced_low_score_bootstraps_level_one() {
    let (engine, store) = engine();
    seed_office(&store, "OFF-A");
    store.put_metrics(&OfficeMetrics::forced("OFF-A", 1.8)).unwrap();

    let decision = engine.evaluate("OFF-A").await.unwrap();

    match decision.action {
        EngineAction::Opened { level, .. } => assert_eq!(level, EscalationLevel::Level1),
        other => panic!("expected opened escalation, got {other:?}"),
    }

    let escalations = store.escalations_for_office("OFF-A").unwrap();
    assert_eq!(escalations.len(), 1);
    assert_eq!(escalations[0].consecutive_months_below, 1);
    assert_eq!(escalations[0].omes_at_trigger, 1.8);
    assert_eq!(escalations[0].threshold_used, SCORE_THRESHOLD);

    // Re-evaluation with unchanged evidence is a no-op
    let again = engine.evaluate("OFF-A").await.unwrap();
    assert_eq!(again.action, EngineAction::None);
    assert_eq!(store.escalations_for_office("OFF-A").unwrap().len(), 1);
}

/// Scenario: five straight below-threshold months and an open escalation
/// with no corrective action → raised to level 4.
#[tokio::test]
async fn test_sustained_failure_without_action_reaches_level_four() {
    let (engine, store) = engine();
    seed_office(&store, "OFF-B");
    for months_back in 0..5 {
        seed_rating(&store, "OFF-B", months_back, 2);
    }
    store.put_metrics(&OfficeMetrics::forced("OFF-B", 2.0)).unwrap();

    let existing = civicpulse::Escalation::open("OFF-B", EscalationLevel::Level2, 2.3, 3, 3.0);
    store.create_escalation(&existing).unwrap();

    let decision = engine.evaluate("OFF-B").await.unwrap();

    assert_eq!(decision.months_below, 5);
    match decision.action {
        EngineAction::Upgraded { from, to, .. } => {
            assert_eq!(from, EscalationLevel::Level2);
            assert_eq!(to, EscalationLevel::Level4);
        }
        other => panic!("expected upgrade, got {other:?}"),
    }

    // Same lineage, still a single active escalation
    let active = store.active_escalation_for_office("OFF-B").unwrap().unwrap();
    assert_eq!(active.id, existing.id);
    assert_eq!(active.level, EscalationLevel::Level4);
    assert_eq!(active.consecutive_months_below, 5);
}

/// Same sustained failure but a corrective action is on record → level 3,
/// not 4.
#[tokio::test]
async fn test_corrective_action_caps_at_level_three() {
    let (engine, store) = engine();
    seed_office(&store, "OFF-C");
    for months_back in 0..5 {
        seed_rating(&store, "OFF-C", months_back, 2);
    }
    store.put_metrics(&OfficeMetrics::forced("OFF-C", 2.0)).unwrap();

    let mut existing = civicpulse::Escalation::open("OFF-C", EscalationLevel::Level2, 2.3, 3, 3.0);
    existing.status = EscalationStatus::ActionUploaded;
    existing.corrective_action_note = Some("queue management system installed".into());
    store.create_escalation(&existing).unwrap();

    let decision = engine.evaluate("OFF-C").await.unwrap();

    match decision.action {
        EngineAction::Upgraded { to, .. } => assert_eq!(to, EscalationLevel::Level3),
        other => panic!("expected upgrade to level 3, got {other:?}"),
    }
    // Status and the uploaded action survive the upgrade
    let active = store.active_escalation_for_office("OFF-C").unwrap().unwrap();
    assert_eq!(active.status, EscalationStatus::ActionUploaded);
    assert!(active.corrective_action_note.is_some());
}

/// Scenario: recovery to a healthy score resolves the open escalation and
/// creates no new one, regardless of history.
#[tokio::test]
async fn test_recovery_resolves_open_escalation() {
    let (engine, store) = engine();
    seed_office(&store, "OFF-D");
    for months_back in 1..4 {
        seed_rating(&store, "OFF-D", months_back, 2);
    }
    store.put_metrics(&OfficeMetrics::forced("OFF-D", 4.0)).unwrap();

    let existing = civicpulse::Escalation::open("OFF-D", EscalationLevel::Level2, 2.3, 3, 3.0);
    store.create_escalation(&existing).unwrap();

    let decision = engine.evaluate("OFF-D").await.unwrap();

    assert_eq!(decision.action, EngineAction::Resolved { count: 1 });
    assert!(store.active_escalation_for_office("OFF-D").unwrap().is_none());

    let resolved = store.get_escalation(&existing.id).unwrap().unwrap();
    assert_eq!(resolved.status, EscalationStatus::Resolved);
    assert!(resolved.resolved_at.is_some());
    assert_eq!(store.escalations_for_office("OFF-D").unwrap().len(), 1);
}

/// Once open at level L, evidence for level ≤ L never changes the record.
#[tokio::test]
async fn test_level_is_monotonic_while_active() {
    let (engine, store) = engine();
    seed_office(&store, "OFF-E");
    // Three below-threshold months → level 2 evidence
    for months_back in 0..3 {
        seed_rating(&store, "OFF-E", months_back, 2);
    }
    store.put_metrics(&OfficeMetrics::forced("OFF-E", 2.0)).unwrap();

    let existing = civicpulse::Escalation::open("OFF-E", EscalationLevel::Level3, 2.0, 5, 3.0);
    store.create_escalation(&existing).unwrap();

    let decision = engine.evaluate("OFF-E").await.unwrap();
    assert_eq!(decision.action, EngineAction::None);

    let active = store.active_escalation_for_office("OFF-E").unwrap().unwrap();
    assert_eq!(active.level, EscalationLevel::Level3);
    assert_eq!(active.consecutive_months_below, 5);
}

/// An office with no data at all never escalates: absence of data is not
/// poor performance.
#[tokio::test]
async fn test_no_data_never_escalates() {
    let (engine, store) = engine();
    seed_office(&store, "OFF-F");

    let decision = engine.evaluate("OFF-F").await.unwrap();
    assert_eq!(decision.action, EngineAction::None);
    assert!(store.escalations_for_office("OFF-F").unwrap().is_empty());
}

/// Every open/upgrade hands off to the dispatcher; with no channel
/// configured the attempt is still audited as failed.
#[tokio::test]
async fn test_alert_attempt_is_audited() {
    let (engine, store) = engine();
    seed_office(&store, "OFF-G");
    store.put_metrics(&OfficeMetrics::forced("OFF-G", 1.5)).unwrap();

    let decision = engine.evaluate("OFF-G").await.unwrap();
    let EngineAction::Opened { escalation_id, .. } = decision.action else {
        panic!("expected opened escalation");
    };

    let trail = store.notifications_for_escalation(&escalation_id).unwrap();
    assert_eq!(trail.len(), 1);
    assert_eq!(trail[0].recipient_label, "Office Head");
    assert!(trail[0].message_body.contains("NOTICE [Level 1]"));
    assert!(trail[0].error.as_deref().unwrap().contains("not configured"));
}

/// Sweep over active offices reports counts and skips healthy offices.
#[tokio::test]
async fn test_sweep_reports_checked_and_raised() {
    let (engine, store) = engine();
    seed_office(&store, "OFF-H");
    seed_office(&store, "OFF-I");
    seed_office(&store, "OFF-J");
    let mut inactive = seed_office(&store, "OFF-K");
    inactive.active = false;
    store.upsert_office(&inactive).unwrap();

    store.put_metrics(&OfficeMetrics::forced("OFF-H", 1.5)).unwrap();
    store.put_metrics(&OfficeMetrics::forced("OFF-I", 4.2)).unwrap();
    // OFF-J has no metrics at all

    let report = engine.run_sweep().await.unwrap();
    assert_eq!(report.offices_checked, 3);
    assert_eq!(report.escalations_raised, 1);

    // Sweep is idempotent on unchanged evidence
    let again = engine.run_sweep().await.unwrap();
    assert_eq!(again.escalations_raised, 0);
}

/// The active escalation's own age does not matter — a fresh evaluation
/// shortly after an upgrade still no-ops.
#[tokio::test]
async fn test_repeated_evaluations_are_stable() {
    let (engine, store) = engine();
    seed_office(&store, "OFF-L");
    store.put_metrics(&OfficeMetrics::forced("OFF-L", 2.5)).unwrap();

    let first = engine.evaluate("OFF-L").await.unwrap();
    assert!(first.action.raised());

    for _ in 0..3 {
        let next = engine.evaluate("OFF-L").await.unwrap();
        assert_eq!(next.action, EngineAction::None);
    }
    assert_eq!(store.escalations_for_office("OFF-L").unwrap().len(), 1);
}
