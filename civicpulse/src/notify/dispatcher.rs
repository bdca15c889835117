//! Notification dispatcher — delivery plus a mandatory audit trail
//!
//! Every dispatch attempt writes exactly one append-only audit record,
//! whatever the outcome. The caller always receives a structured outcome;
//! escalation creation and metrics recomputation can never fail because the
//! notification leg failed.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, error};

use super::channel::MessageChannel;
use crate::escalation::Recipient;
use crate::store::types::{
    Escalation, EscalationLevel, EscalationNotification, NotificationStatus, Office,
};
use crate::store::SharedFeedbackStore;

/// Structured result of one dispatch attempt
#[derive(Debug, Clone)]
pub struct DispatchOutcome {
    pub status: NotificationStatus,
    pub provider_message_id: Option<String>,
    /// Canonical recipient number, empty when no recipient resolved
    pub recipient_number: String,
    pub error: Option<String>,
}

impl DispatchOutcome {
    pub fn delivered(&self) -> bool {
        self.status == NotificationStatus::Sent
    }
}

/// Delivers escalation alerts and records every attempt
pub struct NotificationDispatcher {
    store: SharedFeedbackStore,
    channel: Option<Arc<dyn MessageChannel>>,
    from_address: String,
    country_code: String,
}

impl NotificationDispatcher {
    /// `channel = None` models missing credentials: dispatch degrades to
    /// audit-only failure records instead of crashing.
    pub fn new(
        store: SharedFeedbackStore,
        channel: Option<Arc<dyn MessageChannel>>,
        from_address: impl Into<String>,
        country_code: impl Into<String>,
    ) -> Self {
        Self {
            store,
            channel,
            from_address: from_address.into(),
            country_code: country_code.into(),
        }
    }

    /// Attempt delivery of one escalation alert.
    ///
    /// Never returns an error; the outcome (and the audit record) carry the
    /// failure detail instead.
    pub async fn dispatch(
        &self,
        escalation: &Escalation,
        office: &Office,
        recipient: Option<Recipient>,
    ) -> DispatchOutcome {
        let channel_name = self
            .channel
            .as_deref()
            .map(|c| c.name())
            .unwrap_or("whatsapp");

        let Some(recipient) = recipient else {
            let outcome = DispatchOutcome {
                status: NotificationStatus::Failed,
                provider_message_id: None,
                recipient_number: String::new(),
                error: Some(format!(
                    "no contact on record for {}",
                    escalation.level.role_label()
                )),
            };
            self.audit(
                escalation,
                channel_name,
                escalation.level.role_label(),
                "",
                &render_alert(escalation, office),
                &outcome,
            );
            return outcome;
        };

        let to = normalize_phone(&recipient.phone, &self.country_code);
        let body = render_alert(escalation, office);

        let outcome = match &self.channel {
            None => DispatchOutcome {
                status: NotificationStatus::Failed,
                provider_message_id: None,
                recipient_number: to.clone(),
                error: Some("outbound channel not configured".to_string()),
            },
            Some(channel) => match channel.send(&self.from_address, &to, &body).await {
                Ok(message_id) => DispatchOutcome {
                    status: NotificationStatus::Sent,
                    provider_message_id: Some(message_id),
                    recipient_number: to.clone(),
                    error: None,
                },
                Err(e) => DispatchOutcome {
                    status: NotificationStatus::Failed,
                    provider_message_id: None,
                    recipient_number: to.clone(),
                    error: Some(e.to_string()),
                },
            },
        };

        self.audit(escalation, channel_name, recipient.role, &to, &body, &outcome);
        outcome
    }

    /// Append the audit record; a failed write is logged, never propagated.
    fn audit(
        &self,
        escalation: &Escalation,
        channel: &str,
        recipient_label: &str,
        recipient_number: &str,
        body: &str,
        outcome: &DispatchOutcome,
    ) {
        let record = EscalationNotification {
            id: uuid::Uuid::new_v4().to_string(),
            escalation_id: escalation.id.clone(),
            channel: channel.to_string(),
            recipient_label: recipient_label.to_string(),
            recipient_number: recipient_number.to_string(),
            message_body: body.to_string(),
            provider_message_id: outcome.provider_message_id.clone(),
            status: outcome.status,
            error: outcome.error.clone(),
            created_at: Utc::now(),
        };
        if let Err(e) = self.store.insert_notification(&record) {
            error!(
                escalation_id = %escalation.id,
                error = %e,
                "failed to write notification audit record"
            );
        } else {
            debug!(
                escalation_id = %escalation.id,
                status = record.status.as_str(),
                "notification audited"
            );
        }
    }
}

/// Normalize a phone number to canonical international form.
///
/// Bare domestic numbers get the configured country prefix; no channel
/// framing is ever included here.
pub fn normalize_phone(raw: &str, country_code: &str) -> String {
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    let cc_digits = country_code.trim_start_matches('+');

    if raw.trim_start().starts_with('+') {
        return format!("+{digits}");
    }
    if let Some(rest) = digits.strip_prefix("00") {
        return format!("+{rest}");
    }
    // Bare local-format numbers are assumed domestic
    if digits.len() == 10 {
        return format!("+{cc_digits}{digits}");
    }
    format!("+{digits}")
}

/// Render the alert body for an escalation.
///
/// Deterministic template keyed by level; no two levels share one.
pub fn render_alert(escalation: &Escalation, office: &Office) -> String {
    let place = format!("{} ({}, {})", office.name, office.department, office.location);
    let score = escalation.omes_at_trigger;
    let threshold = escalation.threshold_used;
    let months = escalation.consecutive_months_below;

    match escalation.level {
        EscalationLevel::Level1 => format!(
            "NOTICE [Level 1] — Office Head\n\
             {place} has slipped below the citizen service benchmark.\n\
             Current score {score:.1} against benchmark {threshold:.1}; \
             {months} month(s) below.\n\
             Please review recent citizen feedback and address the decline."
        ),
        EscalationLevel::Level2 => format!(
            "ATTENTION [Level 2] — District Collector\n\
             Sustained underperformance at {place}.\n\
             Score {score:.1} against benchmark {threshold:.1} for \
             {months} consecutive months.\n\
             District-level intervention is requested."
        ),
        EscalationLevel::Level3 => format!(
            "URGENT [Level 3] — Divisional Commissioner\n\
             {place} remains below benchmark despite corrective action on record.\n\
             Score {score:.1} against benchmark {threshold:.1}; \
             {months} consecutive months below.\n\
             Divisional review of the corrective measures is required."
        ),
        EscalationLevel::Level4 => format!(
            "CRITICAL [Level 4] — Guardian Secretary\n\
             Prolonged failure at {place} with no corrective action recorded.\n\
             Score {score:.1} against benchmark {threshold:.1} for \
             {months} consecutive months.\n\
             Immediate administrative intervention is required."
        ),
    }
}
