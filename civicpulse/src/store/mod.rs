//! Durable state for the feedback pipeline
//!
//! This module provides SQLite-backed persistent storage for:
//! - Citizen dialogue sessions and their answers/annotations
//! - Per-office performance summaries owned by the aggregator
//! - Escalation lifecycle records
//! - The append-only notification audit log
//!
//! The store handle is constructed once at startup and injected into every
//! component; invariants that must survive concurrent writers (one open
//! session per phone) are enforced by the schema, not by callers.

pub mod schema;
pub mod store;
pub mod types;

pub use store::{FeedbackStore, SharedFeedbackStore, StoreError, StoreResult};
pub use types::{
    ConfidenceLabel, DataWindow, DialogueStep, Escalation, EscalationId, EscalationLevel,
    EscalationNotification, EscalationStatus, FlowType, NotificationStatus, Office, OfficeAnswers,
    OfficeMetrics, PolicyAnswers, ProcessAnswers, Session, SessionAnnotation, SessionAnswers,
    SessionId, Trend,
};
