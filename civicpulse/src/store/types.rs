//! Core types for feedback state persistence
//!
//! These types are stored in SQLite and represent the persistent state of
//! the intake → aggregation → escalation → notification pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Unique identifier for feedback sessions
pub type SessionId = String;

/// Unique identifier for escalations
pub type EscalationId = String;

/// A government office registered for citizen feedback.
///
/// Contact fields may be absent; recipient resolution falls back through the
/// hierarchy when they are (see `escalation::recipients`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Office {
    /// Opaque office code (also the QR payload)
    pub id: String,
    pub name: String,
    pub department: String,
    pub location: String,
    /// Inactive offices are skipped by the sweep
    pub active: bool,
    pub head_name: Option<String>,
    pub head_phone: Option<String>,
    pub collector_name: Option<String>,
    pub collector_phone: Option<String>,
    pub commissioner_name: Option<String>,
    pub commissioner_phone: Option<String>,
}

impl Office {
    /// Create a new active office with no contacts on record
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        department: impl Into<String>,
        location: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            department: department.into(),
            location: location.into(),
            active: true,
            head_name: None,
            head_phone: None,
            collector_name: None,
            collector_phone: None,
            commissioner_name: None,
            commissioner_phone: None,
        }
    }

    /// Set the office head contact
    pub fn with_head(mut self, name: impl Into<String>, phone: impl Into<String>) -> Self {
        self.head_name = Some(name.into());
        self.head_phone = Some(phone.into());
        self
    }

    /// Set the district collector contact
    pub fn with_collector(mut self, name: impl Into<String>, phone: impl Into<String>) -> Self {
        self.collector_name = Some(name.into());
        self.collector_phone = Some(phone.into());
        self
    }

    /// Set the divisional commissioner contact
    pub fn with_commissioner(mut self, name: impl Into<String>, phone: impl Into<String>) -> Self {
        self.commissioner_name = Some(name.into());
        self.commissioner_phone = Some(phone.into());
        self
    }
}

/// Position in the dialogue graph.
///
/// The numeric codes are the wire/storage representation; an integer outside
/// this set is an unreachable-state fault, surfaced as a distinct store
/// error rather than silently defaulted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DialogueStep {
    /// Awaiting a topic entry point (office match)
    Entry,
    /// Awaiting a topic choice (1/2/3)
    TopicSelect,
    Step2,
    Step3,
    Step4,
    /// Terminal
    Complete,
}

impl DialogueStep {
    /// Storage code for this step
    pub fn code(self) -> i64 {
        match self {
            Self::Entry => 0,
            Self::TopicSelect => 1,
            Self::Step2 => 2,
            Self::Step3 => 3,
            Self::Step4 => 4,
            Self::Complete => 5,
        }
    }

    /// Decode a storage code; `None` for values outside the dialogue graph
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Self::Entry),
            1 => Some(Self::TopicSelect),
            2 => Some(Self::Step2),
            3 => Some(Self::Step3),
            4 => Some(Self::Step4),
            5 => Some(Self::Complete),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete)
    }
}

impl std::fmt::Display for DialogueStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Which dialogue branch the citizen picked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowType {
    /// No topic chosen yet
    None,
    Office,
    Policy,
    Process,
}

impl FlowType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Office => "office",
            Self::Policy => "policy",
            Self::Process => "process",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "none" => Some(Self::None),
            "office" => Some(Self::Office),
            "policy" => Some(Self::Policy),
            "process" => Some(Self::Process),
            _ => None,
        }
    }
}

impl std::fmt::Display for FlowType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Answers collected by the Office Experience flow
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OfficeAnswers {
    /// 1–5 rating from step 2
    pub rating: Option<u8>,
    /// Issue description (rating ≤ 3) or positive feedback (rating > 3)
    pub comment: Option<String>,
}

/// Answers collected by the Policy Suggestion flow
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PolicyAnswers {
    pub policy_name: Option<String>,
    pub improvement_type: Option<String>,
    pub beneficiary: Option<String>,
}

/// Answers collected by the Process Reform flow
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessAnswers {
    pub process_name: Option<String>,
    pub difficulty_type: Option<String>,
    pub suggestion: Option<String>,
}

/// Per-flow answer records, selected by the session's flow type.
///
/// Append-only during the session's life: handlers only ever fill fields
/// that are still `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "flow", rename_all = "snake_case")]
pub enum SessionAnswers {
    /// No topic chosen yet
    Empty,
    Office(OfficeAnswers),
    Policy(PolicyAnswers),
    Process(ProcessAnswers),
}

impl Default for SessionAnswers {
    fn default() -> Self {
        Self::Empty
    }
}

/// Structured annotation attached asynchronously by the generative-text
/// producer. Never required for session completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionAnnotation {
    /// e.g. "positive", "negative", "neutral"
    pub sentiment: String,
    /// 0–100
    pub confidence: f64,
    /// At most 3
    #[serde(default)]
    pub themes: Vec<String>,
    /// At most 4
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub translated_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recommendation: Option<String>,
}

/// One citizen's dialogue instance.
///
/// Mutated once per inbound message while open; immutable once completed,
/// except for the annotation which the producer attaches later.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    /// Opaque phone identifier (canonical sender address)
    pub phone: String,
    pub office_id: String,
    pub created_at: DateTime<Utc>,
    pub step: DialogueStep,
    pub flow: FlowType,
    pub answers: SessionAnswers,
    pub annotation: Option<SessionAnnotation>,
    /// Monotonic false→true
    pub completed: bool,
}

impl Session {
    /// Create a new session awaiting topic choice for the given office
    pub fn start(phone: impl Into<String>, office_id: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            phone: phone.into(),
            office_id: office_id.into(),
            created_at: Utc::now(),
            step: DialogueStep::TopicSelect,
            flow: FlowType::None,
            answers: SessionAnswers::Empty,
            annotation: None,
            completed: false,
        }
    }

    /// The office-experience rating, if this session recorded one
    pub fn rating(&self) -> Option<u8> {
        match &self.answers {
            SessionAnswers::Office(a) => a.rating,
            _ => None,
        }
    }
}

/// Score trend across calendar months
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Improving,
    Stable,
    Declining,
}

impl Trend {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Improving => "improving",
            Self::Stable => "stable",
            Self::Declining => "declining",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "improving" => Some(Self::Improving),
            "stable" => Some(Self::Stable),
            "declining" => Some(Self::Declining),
            _ => None,
        }
    }
}

/// Bucketed average annotation confidence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceLabel {
    High,
    Medium,
    Low,
}

impl ConfidenceLabel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "high" => Some(Self::High),
            "medium" => Some(Self::Medium),
            "low" => Some(Self::Low),
            _ => None,
        }
    }
}

/// Which data the current score was derived from.
///
/// `AllTimeFallback` marks the historical-average substitution explicitly so
/// an office coasting on old ratings is observable rather than silent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataWindow {
    CurrentMonth,
    AllTimeFallback,
    NoData,
}

impl DataWindow {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CurrentMonth => "current_month",
            Self::AllTimeFallback => "all_time_fallback",
            Self::NoData => "no_data",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "current_month" => Some(Self::CurrentMonth),
            "all_time_fallback" => Some(Self::AllTimeFallback),
            "no_data" => Some(Self::NoData),
            _ => None,
        }
    }
}

/// Denormalized per-office performance summary.
///
/// Recomputed wholesale by the aggregator on every run; never patched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OfficeMetrics {
    pub office_id: String,
    /// Rolling score on the 0–5 scale
    pub score: f64,
    pub trend: Trend,
    /// At most 3, ordered by frequency then encounter order
    pub top_themes: Vec<String>,
    pub confidence: ConfidenceLabel,
    pub monthly_submission_count: u32,
    pub data_window: DataWindow,
    pub computed_at: DateTime<Utc>,
}

impl OfficeMetrics {
    /// Operator-forced score, bypassing session history
    pub fn forced(office_id: impl Into<String>, score: f64) -> Self {
        Self {
            office_id: office_id.into(),
            score,
            trend: Trend::Stable,
            top_themes: Vec::new(),
            confidence: ConfidenceLabel::Low,
            monthly_submission_count: 0,
            data_window: DataWindow::CurrentMonth,
            computed_at: Utc::now(),
        }
    }
}

/// Severity tier of an administrative alert
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationLevel {
    Level1,
    Level2,
    Level3,
    Level4,
}

impl EscalationLevel {
    /// Storage code (1–4)
    pub fn code(self) -> i64 {
        match self {
            Self::Level1 => 1,
            Self::Level2 => 2,
            Self::Level3 => 3,
            Self::Level4 => 4,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(Self::Level1),
            2 => Some(Self::Level2),
            3 => Some(Self::Level3),
            4 => Some(Self::Level4),
            _ => None,
        }
    }

    /// The administrative role alerted at this tier
    pub fn role_label(self) -> &'static str {
        match self {
            Self::Level1 => "Office Head",
            Self::Level2 => "District Collector",
            Self::Level3 => "Divisional Commissioner",
            Self::Level4 => "Guardian Secretary",
        }
    }
}

impl std::fmt::Display for EscalationLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "level {}", self.code())
    }
}

/// Lifecycle state of an escalation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationStatus {
    Open,
    ActionUploaded,
    Resolved,
}

impl EscalationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::ActionUploaded => "action_uploaded",
            Self::Resolved => "resolved",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "open" => Some(Self::Open),
            "action_uploaded" => Some(Self::ActionUploaded),
            "resolved" => Some(Self::Resolved),
            _ => None,
        }
    }

    /// Open or action-uploaded — counts against the one-per-office invariant
    pub fn is_active(self) -> bool {
        !matches!(self, Self::Resolved)
    }
}

/// One administrative alert lifecycle instance for one office
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Escalation {
    pub id: EscalationId,
    pub office_id: String,
    /// Monotonically non-decreasing while the escalation is active
    pub level: EscalationLevel,
    pub status: EscalationStatus,
    /// Score at the moment the level was (last) triggered
    pub omes_at_trigger: f64,
    pub consecutive_months_below: u32,
    pub threshold_used: f64,
    pub corrective_action_note: Option<String>,
    pub corrective_action_by: Option<String>,
    pub corrective_action_at: Option<DateTime<Utc>>,
    pub triggered_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Escalation {
    /// Open a new escalation with its evidence snapshot
    pub fn open(
        office_id: impl Into<String>,
        level: EscalationLevel,
        omes_at_trigger: f64,
        consecutive_months_below: u32,
        threshold_used: f64,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            office_id: office_id.into(),
            level,
            status: EscalationStatus::Open,
            omes_at_trigger,
            consecutive_months_below,
            threshold_used,
            corrective_action_note: None,
            corrective_action_by: None,
            corrective_action_at: None,
            triggered_at: Utc::now(),
            resolved_at: None,
        }
    }

    pub fn has_corrective_action(&self) -> bool {
        self.corrective_action_note.is_some()
    }

    /// Raise the level in place with a fresh evidence snapshot.
    ///
    /// Status and any uploaded corrective action are preserved; only the
    /// level, evidence, and trigger timestamp move.
    pub fn upgrade(
        &mut self,
        level: EscalationLevel,
        omes_at_trigger: f64,
        consecutive_months_below: u32,
    ) {
        debug_assert!(level > self.level);
        self.level = level;
        self.omes_at_trigger = omes_at_trigger;
        self.consecutive_months_below = consecutive_months_below;
        self.triggered_at = Utc::now();
    }
}

/// Delivery state of one notification attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationStatus {
    Sent,
    Failed,
    Pending,
}

impl NotificationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sent => "sent",
            Self::Failed => "failed",
            Self::Pending => "pending",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "sent" => Some(Self::Sent),
            "failed" => Some(Self::Failed),
            "pending" => Some(Self::Pending),
            _ => None,
        }
    }
}

/// Immutable audit record of one delivery attempt.
///
/// Created exactly once per attempt and never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscalationNotification {
    pub id: String,
    pub escalation_id: EscalationId,
    /// Channel name, e.g. "whatsapp"
    pub channel: String,
    /// Role label of the recipient, e.g. "District Collector"
    pub recipient_label: String,
    /// Canonical international number (no channel framing)
    pub recipient_number: String,
    pub message_body: String,
    pub provider_message_id: Option<String>,
    pub status: NotificationStatus,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dialogue_step_codes_roundtrip() {
        for code in 0..=5 {
            let step = DialogueStep::from_code(code).unwrap();
            assert_eq!(step.code(), code);
        }
        assert_eq!(DialogueStep::from_code(6), None);
        assert_eq!(DialogueStep::from_code(-1), None);
    }

    #[test]
    fn test_only_complete_is_terminal() {
        assert!(DialogueStep::Complete.is_terminal());
        assert!(!DialogueStep::Step4.is_terminal());
        assert!(!DialogueStep::Entry.is_terminal());
    }

    #[test]
    fn test_answers_tagged_serialization() {
        let answers = SessionAnswers::Office(OfficeAnswers {
            rating: Some(2),
            comment: Some("long waiting time".to_string()),
        });
        let json = serde_json::to_string(&answers).unwrap();
        assert!(json.contains("\"flow\":\"office\""), "JSON: {json}");

        let restored: SessionAnswers = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, answers);
    }

    #[test]
    fn test_annotation_accepts_producer_payload() {
        // Minimal payload as the producer sends it — optional fields absent
        let json = r#"{
            "sentiment": "negative",
            "confidence": 72.5,
            "themes": ["staff behaviour", "delays"],
            "keywords": ["queue", "hours"]
        }"#;
        let annotation: SessionAnnotation = serde_json::from_str(json).unwrap();
        assert_eq!(annotation.sentiment, "negative");
        assert_eq!(annotation.themes.len(), 2);
        assert!(annotation.translated_text.is_none());
    }

    #[test]
    fn test_session_rating_extraction() {
        let mut session = Session::start("+919800000001", "OFF-1");
        assert_eq!(session.rating(), None);

        session.answers = SessionAnswers::Office(OfficeAnswers {
            rating: Some(4),
            comment: None,
        });
        assert_eq!(session.rating(), Some(4));

        session.answers = SessionAnswers::Policy(PolicyAnswers::default());
        assert_eq!(session.rating(), None);
    }

    #[test]
    fn test_escalation_level_ordering() {
        assert!(EscalationLevel::Level4 > EscalationLevel::Level3);
        assert!(EscalationLevel::Level2 > EscalationLevel::Level1);
        assert_eq!(EscalationLevel::from_code(4), Some(EscalationLevel::Level4));
        assert_eq!(EscalationLevel::from_code(0), None);
    }

    #[test]
    fn test_escalation_upgrade_preserves_action() {
        let mut escalation = Escalation::open("OFF-1", EscalationLevel::Level2, 2.1, 3, 3.0);
        escalation.status = EscalationStatus::ActionUploaded;
        escalation.corrective_action_note = Some("staff retrained".to_string());

        escalation.upgrade(EscalationLevel::Level3, 1.9, 5);

        assert_eq!(escalation.level, EscalationLevel::Level3);
        assert_eq!(escalation.consecutive_months_below, 5);
        assert_eq!(escalation.status, EscalationStatus::ActionUploaded);
        assert!(escalation.has_corrective_action());
    }

    #[test]
    fn test_active_status() {
        assert!(EscalationStatus::Open.is_active());
        assert!(EscalationStatus::ActionUploaded.is_active());
        assert!(!EscalationStatus::Resolved.is_active());
    }
}
