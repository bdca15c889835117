//! Intake state machine — drives the feedback dialogue one reply at a time
//!
//! Dispatch is an explicit match over (step, flow); combinations outside the
//! dialogue graph are an engineering-error class, logged and answered with
//! the generic failure reply. The machine's outer boundary never lets a
//! store or collaborator error escape: the messaging provider must always
//! receive a well-formed reply, or it will retry the webhook with the same
//! inbound event and corrupt step progression.

use regex::Regex;
use tracing::{debug, error, info, warn};

use super::flows::{self, StepOutcome};
use super::prompts;
use crate::store::types::{
    DialogueStep, FlowType, Office, OfficeAnswers, PolicyAnswers, ProcessAnswers, Session,
    SessionAnswers,
};
use crate::store::{SharedFeedbackStore, StoreError};

/// Error type for intake operations (boundary-internal; converted to a
/// generic reply before leaving the machine)
#[derive(Debug, thiserror::Error)]
pub enum IntakeError {
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Result type for intake operations
pub type IntakeResult<T> = Result<T, IntakeError>;

/// Legacy QR payload prefix, kept for codes printed before the visible
/// sentence format was introduced
const LEGACY_TRIGGER_PREFIX: &str = "feedback_";

/// Outcome of one inbound message
#[derive(Debug, Clone)]
pub struct IntakeTurn {
    /// Outbound reply text (always well-formed)
    pub reply: String,
    /// The session that reached completion on this turn, if any —
    /// the caller triggers aggregation from it
    pub completed: Option<Session>,
}

impl IntakeTurn {
    fn reply_only(reply: impl Into<String>) -> Self {
        Self {
            reply: reply.into(),
            completed: None,
        }
    }

    fn failure() -> Self {
        Self::reply_only(prompts::GENERIC_FAILURE)
    }
}

/// The conversational intake state machine
pub struct IntakeMachine {
    store: SharedFeedbackStore,
    entry_pattern: Regex,
}

impl IntakeMachine {
    pub fn new(store: SharedFeedbackStore) -> Self {
        // "feedback for <office>" as printed under the QR code; the capture
        // is resolved as an office code first, then as an office name.
        let entry_pattern = Regex::new(r"(?i)feedback\s+(?:for|about)\s+(?:office\s+)?(.+)")
            .expect("entry pattern is static");
        Self {
            store,
            entry_pattern,
        }
    }

    /// Handle one inbound (phone, text) pair.
    ///
    /// This is the machine's error boundary: every internal fault is logged
    /// and converted into the generic failure reply.
    pub fn handle_message(&self, phone: &str, text: &str) -> IntakeTurn {
        match self.drive(phone, text) {
            Ok(turn) => turn,
            Err(IntakeError::Store(StoreError::UnreachableStep { session_id, value })) => {
                // Modeling bug, not citizen behavior — distinct error class
                error!(session_id = %session_id, value, "session stored with unreachable step");
                IntakeTurn::failure()
            }
            Err(e) => {
                error!(error = %e, phone, "intake turn failed; replying generically");
                IntakeTurn::failure()
            }
        }
    }

    fn drive(&self, phone: &str, text: &str) -> IntakeResult<IntakeTurn> {
        match self.store.open_session_for_phone(phone)? {
            None => self.start_dialogue(phone, text),
            Some(session) => self.step_dialogue(session, text),
        }
    }

    // =========================================================================
    // Entry point — no open session
    // =========================================================================

    fn start_dialogue(&self, phone: &str, text: &str) -> IntakeResult<IntakeTurn> {
        let Some(office) = self.resolve_office(text)? else {
            debug!(phone, "no office match; onboarding reply, no session created");
            return Ok(IntakeTurn::reply_only(prompts::ONBOARDING));
        };

        let session = Session::start(phone, &office.id);
        let closed = self.store.start_session(&session)?;
        if closed > 0 {
            info!(phone, closed, "force-completed stale open session on restart");
        }
        info!(
            session_id = %session.id,
            office_id = %office.id,
            "dialogue started"
        );
        Ok(IntakeTurn::reply_only(prompts::welcome(&office.name)))
    }

    /// Interpret the text as, in order: a visible-sentence pattern naming an
    /// office, the legacy prefixed trigger, a bare office code.
    fn resolve_office(&self, text: &str) -> IntakeResult<Option<Office>> {
        let trimmed = text.trim();

        if let Some(caps) = self.entry_pattern.captures(trimmed) {
            let reference = caps[1].trim_end_matches(['.', '!', '?']).trim();
            if let Some(office) = self.lookup_office(reference)? {
                return Ok(Some(office));
            }
        }

        if let Some(rest) = strip_prefix_ci(trimmed, LEGACY_TRIGGER_PREFIX) {
            if let Some(office) = self.store.get_office(rest.trim())? {
                return Ok(Some(office));
            }
        }

        Ok(self.store.get_office(trimmed)?)
    }

    fn lookup_office(&self, reference: &str) -> IntakeResult<Option<Office>> {
        if let Some(office) = self.store.get_office(reference)? {
            return Ok(Some(office));
        }
        Ok(self.store.find_office_by_name(reference)?)
    }

    // =========================================================================
    // Open session — step dispatch
    // =========================================================================

    fn step_dialogue(&self, mut session: Session, text: &str) -> IntakeResult<IntakeTurn> {
        match session.step {
            DialogueStep::Entry => {
                // Sessions are created at TopicSelect; an open session parked
                // at Entry means a writer bypassed the machine
                warn!(session_id = %session.id, "open session at entry step; re-onboarding");
                Ok(IntakeTurn::reply_only(prompts::ONBOARDING))
            }
            DialogueStep::TopicSelect => self.select_topic(session, text),
            DialogueStep::Step2 | DialogueStep::Step3 | DialogueStep::Step4 => {
                let step = session.step;
                let Some(outcome) = run_flow(step, session.flow, text, &mut session.answers) else {
                    error!(
                        session_id = %session.id,
                        step = %step,
                        flow = %session.flow,
                        "flow/answers shape mismatch; replying generically"
                    );
                    return Ok(IntakeTurn::failure());
                };
                self.apply_outcome(session, outcome)
            }
            DialogueStep::Complete => Ok(IntakeTurn::reply_only(prompts::ALREADY_COMPLETE)),
        }
    }

    fn select_topic(&self, mut session: Session, text: &str) -> IntakeResult<IntakeTurn> {
        let (flow, answers, first_question) = match text.trim() {
            "1" => (
                FlowType::Office,
                SessionAnswers::Office(OfficeAnswers::default()),
                prompts::OFFICE_RATING_PROMPT,
            ),
            "2" => (
                FlowType::Policy,
                SessionAnswers::Policy(PolicyAnswers::default()),
                prompts::POLICY_NAME_PROMPT,
            ),
            "3" => (
                FlowType::Process,
                SessionAnswers::Process(ProcessAnswers::default()),
                prompts::PROCESS_NAME_PROMPT,
            ),
            other => {
                debug!(session_id = %session.id, input = other, "invalid topic choice");
                return Ok(IntakeTurn::reply_only(prompts::TOPIC_REPROMPT));
            }
        };

        session.flow = flow;
        session.answers = answers;
        session.step = DialogueStep::Step2;
        self.store.update_session(&session)?;
        debug!(session_id = %session.id, flow = %flow, "topic selected");
        Ok(IntakeTurn::reply_only(first_question))
    }

    fn apply_outcome(&self, mut session: Session, outcome: StepOutcome) -> IntakeResult<IntakeTurn> {
        let from = session.step;
        session.step = outcome.next_step;
        session.completed = outcome.completed;
        self.store.update_session(&session)?;
        debug!(
            session_id = %session.id,
            from = %from,
            to = %session.step,
            completed = session.completed,
            "dialogue step"
        );

        let completed = outcome.completed.then_some(session);
        Ok(IntakeTurn {
            reply: outcome.reply,
            completed,
        })
    }
}

/// Delegate one step to the sub-handler matching the flow.
///
/// `None` means the session's flow and answers shapes diverged — an
/// engineering fault the caller reports.
fn run_flow(
    step: DialogueStep,
    flow: FlowType,
    text: &str,
    answers: &mut SessionAnswers,
) -> Option<StepOutcome> {
    match (flow, answers) {
        (FlowType::Office, SessionAnswers::Office(a)) => Some(flows::office_step(step, text, a)),
        (FlowType::Policy, SessionAnswers::Policy(a)) => Some(flows::policy_step(step, text, a)),
        (FlowType::Process, SessionAnswers::Process(a)) => Some(flows::process_step(step, text, a)),
        _ => None,
    }
}

fn strip_prefix_ci<'a>(text: &'a str, prefix: &str) -> Option<&'a str> {
    let head = text.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix)
        .then(|| &text[prefix.len()..])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::FeedbackStore;

    fn machine() -> IntakeMachine {
        let store = FeedbackStore::open_in_memory().unwrap().shared();
        let office = Office::new("OFF-1", "Pune Tehsil Office", "Revenue", "Pune");
        store.upsert_office(&office).unwrap();
        IntakeMachine::new(store)
    }

    const PHONE: &str = "+919800000010";

    #[test]
    fn test_unknown_text_onboards_without_session() {
        let m = machine();
        let turn = m.handle_message(PHONE, "hello there");
        assert_eq!(turn.reply, prompts::ONBOARDING);
        assert!(m.store.open_session_for_phone(PHONE).unwrap().is_none());
    }

    #[test]
    fn test_visible_sentence_entry() {
        let m = machine();
        let turn = m.handle_message(PHONE, "I want to give feedback for Pune Tehsil Office.");
        assert!(turn.reply.contains("Pune Tehsil Office"));

        let session = m.store.open_session_for_phone(PHONE).unwrap().unwrap();
        assert_eq!(session.office_id, "OFF-1");
        assert_eq!(session.step, DialogueStep::TopicSelect);
    }

    #[test]
    fn test_legacy_trigger_entry() {
        let m = machine();
        let turn = m.handle_message(PHONE, "FEEDBACK_OFF-1");
        assert!(turn.reply.contains("Pune Tehsil Office"));
    }

    #[test]
    fn test_bare_office_code_entry() {
        let m = machine();
        let turn = m.handle_message(PHONE, "OFF-1");
        assert!(turn.reply.contains("Pune Tehsil Office"));
    }

    #[test]
    fn test_invalid_topic_choice_reprompts() {
        let m = machine();
        m.handle_message(PHONE, "OFF-1");

        let turn = m.handle_message(PHONE, "4");
        assert_eq!(turn.reply, prompts::TOPIC_REPROMPT);

        let session = m.store.open_session_for_phone(PHONE).unwrap().unwrap();
        assert_eq!(session.step, DialogueStep::TopicSelect);
        assert_eq!(session.flow, FlowType::None);
    }

    #[test]
    fn test_office_flow_to_completion() {
        let m = machine();
        m.handle_message(PHONE, "OFF-1");
        m.handle_message(PHONE, "1");

        let turn = m.handle_message(PHONE, "2");
        assert_eq!(turn.reply, prompts::ISSUE_PROMPT);
        assert!(turn.completed.is_none());

        let turn = m.handle_message(PHONE, "1");
        assert_eq!(turn.reply, prompts::THANKS);
        let completed = turn.completed.expect("session completed this turn");
        assert_eq!(completed.rating(), Some(2));
        assert!(completed.completed);

        // No open session remains
        assert!(m.store.open_session_for_phone(PHONE).unwrap().is_none());
    }

    #[test]
    fn test_message_after_completion() {
        let m = machine();
        m.handle_message(PHONE, "OFF-1");
        m.handle_message(PHONE, "1");
        m.handle_message(PHONE, "5");
        m.handle_message(PHONE, "quick and helpful");

        // The open session is gone, so a non-matching text onboards again
        let turn = m.handle_message(PHONE, "thanks");
        assert_eq!(turn.reply, prompts::ONBOARDING);
    }

    #[test]
    fn test_restart_force_completes_open_session() {
        let m = machine();
        let office2 = Office::new("OFF-2", "Nashik Tehsil Office", "Revenue", "Nashik");
        m.store.upsert_office(&office2).unwrap();

        m.handle_message(PHONE, "OFF-1");
        m.handle_message(PHONE, "1");

        // Mid-dialogue restart for a different office
        let turn = m.handle_message(PHONE, "feedback for Nashik Tehsil Office");
        assert!(turn.reply.contains("Nashik"));

        let open = m.store.open_session_for_phone(PHONE).unwrap().unwrap();
        assert_eq!(open.office_id, "OFF-2");
        assert_eq!(open.step, DialogueStep::TopicSelect);
    }

    #[test]
    fn test_reprompt_preserves_recorded_answers() {
        let m = machine();
        m.handle_message(PHONE, "OFF-1");
        m.handle_message(PHONE, "2"); // policy flow
        m.handle_message(PHONE, "crop insurance");

        // Step 3 accepts anything; go to step 4 then send a valid code
        m.handle_message(PHONE, "1");
        let session = m.store.open_session_for_phone(PHONE).unwrap().unwrap();
        assert_eq!(session.step, DialogueStep::Step4);
        match &session.answers {
            SessionAnswers::Policy(a) => {
                assert_eq!(a.policy_name.as_deref(), Some("crop insurance"));
                assert_eq!(a.improvement_type.as_deref(), Some("simplify the procedure"));
            }
            other => panic!("expected policy answers, got {other:?}"),
        }
    }
}
