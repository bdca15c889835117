//! Escalation pattern engine — deterministic decision-making over score history
//!
//! Consumes the office's stored score and monthly rating history to decide
//! whether an escalation must open, upgrade, or resolve. Exactly one state
//! transition per evaluation. All decisions are deterministic.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};

use super::recipients::resolve_recipient;
use crate::notify::NotificationDispatcher;
use crate::store::types::{Escalation, EscalationLevel, Session};
use crate::store::{SharedFeedbackStore, StoreError};

/// Fixed score threshold of the four-tier policy
pub const SCORE_THRESHOLD: f64 = 3.0;

/// How far back the monthly history looks (months with data)
const HISTORY_MONTHS: usize = 6;

/// Error type for escalation operations
#[derive(Debug, thiserror::Error)]
pub enum EscalationError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Unknown office: {0}")]
    UnknownOffice(String),
}

/// Result type for escalation operations
pub type EscalationResult<T> = Result<T, EscalationError>;

/// Average rating for one calendar month with data
#[derive(Debug, Clone, PartialEq)]
pub struct MonthlyAverage {
    pub year: i32,
    pub month: u32,
    pub average: f64,
    pub samples: u32,
}

/// The single state transition an evaluation performed
#[derive(Debug, Clone, PartialEq)]
pub enum EngineAction {
    /// Evidence did not require any change
    None,
    /// Recovery resolved the office's active escalations
    Resolved { count: usize },
    /// A new escalation was opened
    Opened {
        escalation_id: String,
        level: EscalationLevel,
    },
    /// The existing active escalation was raised in place
    Upgraded {
        escalation_id: String,
        from: EscalationLevel,
        to: EscalationLevel,
    },
}

impl EngineAction {
    /// Whether this action raised an alert (opened or upgraded)
    pub fn raised(&self) -> bool {
        matches!(self, Self::Opened { .. } | Self::Upgraded { .. })
    }
}

/// Decision produced by one office evaluation
#[derive(Debug, Clone)]
pub struct EscalationDecision {
    pub office_id: String,
    /// Stored score the decision was based on
    pub score: f64,
    pub months_below: u32,
    pub action: EngineAction,
    pub reason: String,
}

/// Result of a full-office sweep
#[derive(Debug, Clone, Serialize)]
pub struct SweepReport {
    pub offices_checked: usize,
    pub escalations_raised: usize,
}

/// The escalation pattern engine
pub struct EscalationEngine {
    store: SharedFeedbackStore,
    dispatcher: Arc<NotificationDispatcher>,
}

impl EscalationEngine {
    pub fn new(store: SharedFeedbackStore, dispatcher: Arc<NotificationDispatcher>) -> Self {
        Self { store, dispatcher }
    }

    /// Evaluate one office and perform exactly one state transition.
    ///
    /// Notification delivery is handed off after the escalation write and
    /// only logged; its failure never rolls the transition back.
    pub async fn evaluate(&self, office_id: &str) -> EscalationResult<EscalationDecision> {
        let office = self
            .store
            .get_office(office_id)?
            .ok_or_else(|| EscalationError::UnknownOffice(office_id.to_string()))?;

        let score = self
            .store
            .get_metrics(office_id)?
            .map(|m| m.score)
            .unwrap_or(0.0);

        // Recovery always wins over any pending evidence
        if score >= SCORE_THRESHOLD && score > 0.0 {
            let count = self.store.resolve_active_escalations(office_id, Utc::now())?;
            if count > 0 {
                info!(office_id, score, count, "score recovered; escalations resolved");
            }
            return Ok(EscalationDecision {
                office_id: office_id.to_string(),
                score,
                months_below: 0,
                action: if count > 0 {
                    EngineAction::Resolved { count }
                } else {
                    EngineAction::None
                },
                reason: format!("score {score:.2} at or above threshold {SCORE_THRESHOLD}"),
            });
        }

        let sessions = self.store.completed_sessions_for_office(office_id)?;
        let history = monthly_history(&sessions);
        let mut months_below = consecutive_months_below(&history, SCORE_THRESHOLD);

        // Bootstrap: a below-threshold score with no session-derived history
        // (set directly) counts as one month, so new offices are not silently
        // ignored. A zero score means no data at all and never escalates.
        if months_below == 0 && score > 0.0 && score < SCORE_THRESHOLD {
            months_below = 1;
        }

        let active = self.store.active_escalation_for_office(office_id)?;
        let has_corrective_action = active
            .as_ref()
            .map(Escalation::has_corrective_action)
            .unwrap_or(false);

        let Some(level) = level_for(months_below, has_corrective_action) else {
            return Ok(EscalationDecision {
                office_id: office_id.to_string(),
                score,
                months_below,
                action: EngineAction::None,
                reason: "no consecutive below-threshold evidence".to_string(),
            });
        };

        match active {
            // Never downgrade or duplicate an active escalation
            Some(existing) if level <= existing.level => Ok(EscalationDecision {
                office_id: office_id.to_string(),
                score,
                months_below,
                action: EngineAction::None,
                reason: format!(
                    "required {level} does not exceed active {}",
                    existing.level
                ),
            }),
            Some(mut existing) => {
                let from = existing.level;
                existing.upgrade(level, score, months_below);
                self.store.update_escalation(&existing)?;
                info!(
                    office_id,
                    escalation_id = %existing.id,
                    from = %from,
                    to = %level,
                    months_below,
                    "escalation upgraded"
                );
                self.notify(&existing, &office).await;
                Ok(EscalationDecision {
                    office_id: office_id.to_string(),
                    score,
                    months_below,
                    action: EngineAction::Upgraded {
                        escalation_id: existing.id,
                        from,
                        to: level,
                    },
                    reason: format!("{months_below} consecutive months below threshold"),
                })
            }
            None => {
                let escalation =
                    Escalation::open(office_id, level, score, months_below, SCORE_THRESHOLD);
                self.store.create_escalation(&escalation)?;
                info!(
                    office_id,
                    escalation_id = %escalation.id,
                    level = %level,
                    months_below,
                    score,
                    "escalation opened"
                );
                self.notify(&escalation, &office).await;
                Ok(EscalationDecision {
                    office_id: office_id.to_string(),
                    score,
                    months_below,
                    action: EngineAction::Opened {
                        escalation_id: escalation.id,
                        level,
                    },
                    reason: format!("{months_below} consecutive months below threshold"),
                })
            }
        }
    }

    /// Hand the alert to the dispatcher; outcome is logged, never propagated.
    async fn notify(&self, escalation: &Escalation, office: &crate::store::types::Office) {
        let recipient = resolve_recipient(escalation.level, office);
        let outcome = self.dispatcher.dispatch(escalation, office, recipient).await;
        if outcome.delivered() {
            info!(
                escalation_id = %escalation.id,
                recipient = %outcome.recipient_number,
                "alert delivered"
            );
        } else {
            warn!(
                escalation_id = %escalation.id,
                error = outcome.error.as_deref().unwrap_or("unknown"),
                "alert delivery failed; escalation stands"
            );
        }
    }

    /// Evaluate every active office (scheduled or manual batch trigger).
    ///
    /// Per-office failures are logged and skipped; already-performed
    /// transitions stand.
    pub async fn run_sweep(&self) -> EscalationResult<SweepReport> {
        let offices = self.store.list_active_offices()?;
        let mut raised = 0;

        for office in &offices {
            match self.evaluate(&office.id).await {
                Ok(decision) if decision.action.raised() => raised += 1,
                Ok(_) => {}
                Err(e) => {
                    warn!(office_id = %office.id, error = %e, "sweep evaluation failed; continuing");
                }
            }
        }

        let report = SweepReport {
            offices_checked: offices.len(),
            escalations_raised: raised,
        };
        info!(
            offices_checked = report.offices_checked,
            escalations_raised = report.escalations_raised,
            "sweep complete"
        );
        Ok(report)
    }
}

/// Monthly average ratings from completed office-experience sessions,
/// most recent month first, capped at the history window.
///
/// Months with no sessions are skipped entirely — absence of data is never
/// read as poor performance.
pub fn monthly_history(sessions: &[Session]) -> Vec<MonthlyAverage> {
    let mut buckets: Vec<((i32, u32), (f64, u32))> = Vec::new();
    for session in sessions {
        let Some(rating) = session.rating() else {
            continue;
        };
        let key = crate::metrics::month_key(&session.created_at);
        match buckets.iter_mut().find(|(k, _)| *k == key) {
            Some((_, (sum, count))) => {
                *sum += f64::from(rating);
                *count += 1;
            }
            None => buckets.push((key, (f64::from(rating), 1))),
        }
    }

    buckets.sort_by(|a, b| b.0.cmp(&a.0));
    buckets
        .into_iter()
        .take(HISTORY_MONTHS)
        .map(|((year, month), (sum, count))| MonthlyAverage {
            year,
            month,
            average: sum / f64::from(count),
            samples: count,
        })
        .collect()
}

/// Count consecutive below-threshold months backward from the most recent
/// month with data, stopping at the first month at or above threshold.
pub fn consecutive_months_below(history: &[MonthlyAverage], threshold: f64) -> u32 {
    history
        .iter()
        .take_while(|m| m.average < threshold)
        .count() as u32
}

/// The four-tier policy: map sustained decline to a severity level.
///
/// Level 4 is exhausted patience — sustained failure with no corrective
/// action uploaded.
pub fn level_for(months_below: u32, has_corrective_action: bool) -> Option<EscalationLevel> {
    match months_below {
        0 => None,
        1..=2 => Some(EscalationLevel::Level1),
        3..=4 => Some(EscalationLevel::Level2),
        _ if has_corrective_action => Some(EscalationLevel::Level3),
        _ => Some(EscalationLevel::Level4),
    }
}
