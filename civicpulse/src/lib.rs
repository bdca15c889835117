//! CivicPulse — citizen feedback to administrative accountability
//!
//! This library implements one pipeline with durable state at every stage:
//!
//! - **Intake**: a turn-based messaging dialogue that collects structured
//!   feedback about a government office (experience rating, policy
//!   suggestion, or process reform), one session per citizen at a time.
//! - **Metrics**: a rolling per-office performance score (0–5) with trend,
//!   themes, and confidence, recomputed wholesale from session history.
//! - **Escalation**: a fixed four-tier policy that opens, upgrades, and
//!   resolves administrative alerts when the score sustains a decline.
//! - **Notification**: delivery of each alert to the responsible official
//!   over an external messaging channel, with an append-only audit trail.
//!
//! The HTTP transport, dashboard, office provisioning, and the generative
//! annotation producer are external collaborators; their seams are
//! `FeedbackPipeline::handle_inbound`, `FeedbackPipeline::attach_annotation`,
//! and the `MessageChannel` trait.

pub mod config;
pub mod escalation;
pub mod intake;
pub mod metrics;
pub mod notify;
pub mod pipeline;
pub mod store;

// Re-export key store types
pub use store::{
    ConfidenceLabel, DataWindow, DialogueStep, Escalation, EscalationLevel,
    EscalationNotification, EscalationStatus, FeedbackStore, FlowType, NotificationStatus, Office,
    OfficeMetrics, Session, SessionAnnotation, SessionAnswers, SharedFeedbackStore, StoreError,
    StoreResult, Trend,
};

// Re-export pipeline surface
pub use config::{AppConfig, ChannelConfig};
pub use pipeline::{FeedbackPipeline, PipelineError, PipelineResult};

// Re-export key component types
pub use escalation::{
    EngineAction, EscalationDecision, EscalationEngine, Recipient, SweepReport, SCORE_THRESHOLD,
};
pub use intake::{IntakeMachine, IntakeTurn};
pub use metrics::MetricsAggregator;
pub use notify::{DispatchOutcome, HttpMessageChannel, MessageChannel, NotificationDispatcher};
