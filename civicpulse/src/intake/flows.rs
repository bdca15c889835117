//! Flow sub-handlers — the three dialogue branches
//!
//! Each handler is a small linear state machine keyed by the session's
//! current step. Shared rules:
//! - Enumerated-option lookups never hard-fail: an unrecognized key stores
//!   the citizen's raw input as free text instead of rejecting it.
//! - Only numeric-range and minimum-length checks reject, and a rejection
//!   re-prompts at the same step without touching prior answers.

use super::prompts;
use crate::store::types::{
    DialogueStep, OfficeAnswers, PolicyAnswers, ProcessAnswers,
};

/// Minimum length for free-text answers that name something
const MIN_TEXT_LEN: usize = 2;

/// Ratings at or below this get the issue follow-up; above it, the
/// positive-feedback follow-up.
const LOW_RATING_CUTOFF: u8 = 3;

/// What a flow handler decided for one inbound reply
#[derive(Debug, Clone, PartialEq)]
pub struct StepOutcome {
    /// Outbound reply text
    pub reply: String,
    /// Step the session moves to (same step on rejection)
    pub next_step: DialogueStep,
    /// Whether the flow terminated
    pub completed: bool,
}

impl StepOutcome {
    fn advance(reply: impl Into<String>, next_step: DialogueStep) -> Self {
        Self {
            reply: reply.into(),
            next_step,
            completed: false,
        }
    }

    fn reject(reply: impl Into<String>, step: DialogueStep) -> Self {
        Self {
            reply: reply.into(),
            next_step: step,
            completed: false,
        }
    }

    fn terminate(reply: impl Into<String>) -> Self {
        Self {
            reply: reply.into(),
            next_step: DialogueStep::Complete,
            completed: true,
        }
    }
}

/// Enumerated issue options for a low office-experience rating
const ISSUE_OPTIONS: &[(&str, &str)] = &[
    ("1", "long waiting time"),
    ("2", "staff behaviour"),
    ("3", "bribe or informal payment demanded"),
    ("4", "incomplete or wrong information"),
];

const IMPROVEMENT_OPTIONS: &[(&str, &str)] = &[
    ("1", "simplify the procedure"),
    ("2", "make it fully online"),
    ("3", "reduce fees or charges"),
    ("4", "improve transparency"),
];

const BENEFICIARY_OPTIONS: &[(&str, &str)] = &[
    ("1", "farmers"),
    ("2", "students"),
    ("3", "women"),
    ("4", "senior citizens"),
    ("5", "everyone"),
];

const DIFFICULTY_OPTIONS: &[(&str, &str)] = &[
    ("1", "too many documents"),
    ("2", "too many office visits"),
    ("3", "unclear instructions"),
    ("4", "delays beyond the promised time"),
];

/// Map a numeric choice through an option table, falling back to the raw
/// input so an unrecognized reply still preserves what the citizen said.
fn lookup_or_raw(table: &[(&str, &str)], text: &str) -> String {
    let key = text.trim();
    table
        .iter()
        .find(|(code, _)| *code == key)
        .map(|(_, label)| (*label).to_string())
        .unwrap_or_else(|| key.to_string())
}

fn long_enough(text: &str) -> Option<String> {
    let trimmed = text.trim();
    (trimmed.chars().count() >= MIN_TEXT_LEN).then(|| trimmed.to_string())
}

/// Office Experience: rating (step 2), then issue or praise (step 3).
pub fn office_step(step: DialogueStep, text: &str, answers: &mut OfficeAnswers) -> StepOutcome {
    match step {
        DialogueStep::Step2 => {
            let rating = text.trim().parse::<u8>().ok().filter(|r| (1..=5).contains(r));
            match rating {
                Some(r) => {
                    answers.rating = Some(r);
                    let prompt = if r <= LOW_RATING_CUTOFF {
                        prompts::ISSUE_PROMPT
                    } else {
                        prompts::POSITIVE_PROMPT
                    };
                    StepOutcome::advance(prompt, DialogueStep::Step3)
                }
                None => StepOutcome::reject(prompts::RATING_REPROMPT, step),
            }
        }
        DialogueStep::Step3 => {
            let comment = match answers.rating {
                // Low rating: enumerated issue table with free-text fallback
                Some(r) if r <= LOW_RATING_CUTOFF => lookup_or_raw(ISSUE_OPTIONS, text),
                _ => text.trim().to_string(),
            };
            answers.comment = Some(comment);
            StepOutcome::terminate(prompts::THANKS)
        }
        // Step 4 is unused by this flow; the machine never routes it here
        _ => StepOutcome::terminate(prompts::THANKS),
    }
}

/// Policy Suggestion: policy name, improvement type, beneficiary.
pub fn policy_step(step: DialogueStep, text: &str, answers: &mut PolicyAnswers) -> StepOutcome {
    match step {
        DialogueStep::Step2 => match long_enough(text) {
            Some(name) => {
                answers.policy_name = Some(name);
                StepOutcome::advance(prompts::POLICY_IMPROVEMENT_PROMPT, DialogueStep::Step3)
            }
            None => StepOutcome::reject(prompts::TOO_SHORT_REPROMPT, step),
        },
        DialogueStep::Step3 => {
            answers.improvement_type = Some(lookup_or_raw(IMPROVEMENT_OPTIONS, text));
            StepOutcome::advance(prompts::POLICY_BENEFICIARY_PROMPT, DialogueStep::Step4)
        }
        DialogueStep::Step4 => {
            answers.beneficiary = Some(lookup_or_raw(BENEFICIARY_OPTIONS, text));
            StepOutcome::terminate(prompts::THANKS)
        }
        _ => StepOutcome::terminate(prompts::THANKS),
    }
}

/// Process Reform: process name, difficulty type, suggestion.
pub fn process_step(step: DialogueStep, text: &str, answers: &mut ProcessAnswers) -> StepOutcome {
    match step {
        DialogueStep::Step2 => match long_enough(text) {
            Some(name) => {
                answers.process_name = Some(name);
                StepOutcome::advance(prompts::PROCESS_DIFFICULTY_PROMPT, DialogueStep::Step3)
            }
            None => StepOutcome::reject(prompts::TOO_SHORT_REPROMPT, step),
        },
        DialogueStep::Step3 => {
            answers.difficulty_type = Some(lookup_or_raw(DIFFICULTY_OPTIONS, text));
            StepOutcome::advance(prompts::PROCESS_SUGGESTION_PROMPT, DialogueStep::Step4)
        }
        DialogueStep::Step4 => match long_enough(text) {
            Some(suggestion) => {
                answers.suggestion = Some(suggestion);
                StepOutcome::terminate(prompts::THANKS)
            }
            None => StepOutcome::reject(prompts::TOO_SHORT_REPROMPT, step),
        },
        _ => StepOutcome::terminate(prompts::THANKS),
    }
}
