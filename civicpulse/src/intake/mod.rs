//! Conversational intake — the citizen-facing half of the pipeline
//!
//! One inbound message advances one session by at most one step. The
//! machine owns entry matching and step dispatch; the three flow
//! sub-handlers own their branch's questions and validation.

pub mod flows;
pub mod machine;
pub mod prompts;

pub use flows::StepOutcome;
pub use machine::{IntakeError, IntakeMachine, IntakeResult, IntakeTurn};
