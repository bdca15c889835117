//! Escalation — turning sustained decline into routed administrative alerts
//!
//! The engine inspects score history and performs exactly one lifecycle
//! transition per evaluation; recipient resolution maps the resulting level
//! onto the administrative hierarchy.

pub mod engine;
pub mod recipients;

pub use engine::{
    consecutive_months_below, level_for, monthly_history, EngineAction, EscalationDecision,
    EscalationEngine, EscalationError, EscalationResult, MonthlyAverage, SweepReport,
    SCORE_THRESHOLD,
};
pub use recipients::{resolve_recipient, Recipient};
