//! Metrics aggregator — turns completed sessions into an office summary
//!
//! Every run is a full recompute over the office's session history, written
//! wholesale over the previous summary. Re-running on unchanged sessions
//! produces the same record, so retried triggers cannot double-count.

use chrono::{DateTime, Datelike, Utc};
use tracing::debug;

use crate::store::types::{
    ConfidenceLabel, DataWindow, OfficeMetrics, Session, Trend,
};
use crate::store::{SharedFeedbackStore, StoreResult};

/// Score movement below this is reported as stable
const TREND_BAND: f64 = 0.2;

/// How many themes the summary keeps
const TOP_THEME_COUNT: usize = 3;

/// Recomputes and owns the per-office metrics summary
pub struct MetricsAggregator {
    store: SharedFeedbackStore,
}

impl MetricsAggregator {
    pub fn new(store: SharedFeedbackStore) -> Self {
        Self { store }
    }

    /// Recompute an office's summary and overwrite the stored record.
    ///
    /// Idempotent; safe to re-run arbitrarily often.
    pub fn recompute(&self, office_id: &str) -> StoreResult<OfficeMetrics> {
        let sessions = self.store.completed_sessions_for_office(office_id)?;
        let metrics = compute(office_id, &sessions, Utc::now());
        self.store.put_metrics(&metrics)?;
        debug!(
            office_id,
            score = metrics.score,
            trend = metrics.trend.as_str(),
            window = metrics.data_window.as_str(),
            "metrics recomputed"
        );
        Ok(metrics)
    }
}

/// Pure recompute over a session list, relative to `now`.
///
/// Split out so the calendar arithmetic is testable without a store.
pub fn compute(office_id: &str, sessions: &[Session], now: DateTime<Utc>) -> OfficeMetrics {
    let this_month = month_key(&now);
    let prev_month = previous_month(this_month);

    let ratings: Vec<(DateTime<Utc>, f64)> = sessions
        .iter()
        .filter_map(|s| s.rating().map(|r| (s.created_at, f64::from(r))))
        .collect();

    let this_month_avg = average(
        ratings
            .iter()
            .filter(|(at, _)| month_key(at) == this_month)
            .map(|(_, r)| *r),
    );
    let prev_month_avg = average(
        ratings
            .iter()
            .filter(|(at, _)| month_key(at) == prev_month)
            .map(|(_, r)| *r),
    );
    let all_time_avg = average(ratings.iter().map(|(_, r)| *r));

    // Prefer this month's data; an office with any rating history never
    // reports zero, but the fallback is marked so it stays observable.
    let (score, data_window) = match (this_month_avg, all_time_avg) {
        (Some(current), _) => (current, DataWindow::CurrentMonth),
        (None, Some(historic)) => (historic, DataWindow::AllTimeFallback),
        (None, None) => (0.0, DataWindow::NoData),
    };

    let trend = match prev_month_avg {
        Some(previous) if score - previous > TREND_BAND => Trend::Improving,
        Some(previous) if previous - score > TREND_BAND => Trend::Declining,
        Some(_) => Trend::Stable,
        // No previous-month baseline
        None => Trend::Stable,
    };

    let monthly_submission_count = sessions
        .iter()
        .filter(|s| month_key(&s.created_at) == this_month)
        .count() as u32;

    OfficeMetrics {
        office_id: office_id.to_string(),
        score,
        trend,
        top_themes: top_themes(sessions),
        confidence: confidence_label(sessions),
        monthly_submission_count,
        data_window,
        computed_at: now,
    }
}

/// Calendar month identity of a timestamp
pub fn month_key(at: &DateTime<Utc>) -> (i32, u32) {
    (at.year(), at.month())
}

fn previous_month((year, month): (i32, u32)) -> (i32, u32) {
    if month == 1 {
        (year - 1, 12)
    } else {
        (year, month - 1)
    }
}

fn average(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values.fold((0.0, 0u32), |(s, c), v| (s + v, c + 1));
    (count > 0).then(|| sum / f64::from(count))
}

/// Theme frequency across every annotated session, all time.
///
/// Ties break by encounter order, which the session list already carries.
fn top_themes(sessions: &[Session]) -> Vec<String> {
    let mut tally: Vec<(String, u32)> = Vec::new();
    for session in sessions {
        let Some(annotation) = &session.annotation else {
            continue;
        };
        for theme in &annotation.themes {
            match tally.iter_mut().find(|(name, _)| name == theme) {
                Some((_, count)) => *count += 1,
                None => tally.push((theme.clone(), 1)),
            }
        }
    }
    // Stable sort keeps encounter order among equal frequencies
    tally.sort_by(|a, b| b.1.cmp(&a.1));
    tally
        .into_iter()
        .take(TOP_THEME_COUNT)
        .map(|(name, _)| name)
        .collect()
}

fn confidence_label(sessions: &[Session]) -> ConfidenceLabel {
    let avg = average(
        sessions
            .iter()
            .filter_map(|s| s.annotation.as_ref())
            .map(|a| a.confidence),
    );
    match avg {
        Some(c) if c > 85.0 => ConfidenceLabel::High,
        Some(c) if c > 60.0 => ConfidenceLabel::Medium,
        _ => ConfidenceLabel::Low,
    }
}
