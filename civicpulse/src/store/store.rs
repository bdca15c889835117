//! SQLite-backed store for the feedback pipeline
//!
//! All pipeline state lives here between turns: sessions, office metrics,
//! escalations, and the notification audit log. The handle is explicitly
//! constructed and injected (opened once at service start), never a
//! module-level singleton.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::schema;
use super::types::*;

/// Error type for store operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Lock poisoned")]
    LockPoisoned,

    /// A stored session step outside the dialogue graph — a modeling bug,
    /// not citizen behavior.
    #[error("Session {session_id} has unreachable step value {value}")]
    UnreachableStep { session_id: String, value: i64 },

    #[error("Corrupt stored value: {0}")]
    Corrupt(String),
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Shared reference to FeedbackStore
pub type SharedFeedbackStore = Arc<FeedbackStore>;

/// Raw session row before enum decoding
struct SessionRow {
    id: String,
    phone: String,
    office_id: String,
    created_at: DateTime<Utc>,
    step: i64,
    flow: String,
    answers: String,
    annotation: Option<String>,
    completed: bool,
}

impl SessionRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            phone: row.get(1)?,
            office_id: row.get(2)?,
            created_at: row.get(3)?,
            step: row.get(4)?,
            flow: row.get(5)?,
            answers: row.get(6)?,
            annotation: row.get(7)?,
            completed: row.get(8)?,
        })
    }

    fn decode(self) -> StoreResult<Session> {
        let step =
            DialogueStep::from_code(self.step).ok_or_else(|| StoreError::UnreachableStep {
                session_id: self.id.clone(),
                value: self.step,
            })?;
        let flow = FlowType::parse(&self.flow)
            .ok_or_else(|| StoreError::Corrupt(format!("unknown flow type '{}'", self.flow)))?;
        let answers: SessionAnswers = serde_json::from_str(&self.answers)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        let annotation = match self.annotation {
            Some(json) => Some(
                serde_json::from_str(&json).map_err(|e| StoreError::Serialization(e.to_string()))?,
            ),
            None => None,
        };

        Ok(Session {
            id: self.id,
            phone: self.phone,
            office_id: self.office_id,
            created_at: self.created_at,
            step,
            flow,
            answers,
            annotation,
            completed: self.completed,
        })
    }
}

const SESSION_COLUMNS: &str =
    "id, phone, office_id, created_at, step, flow, answers, annotation, completed";

/// SQLite-backed persistent feedback store
pub struct FeedbackStore {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl FeedbackStore {
    /// Open or create a store at the given path, applying the schema
    pub fn open(path: impl Into<PathBuf>) -> StoreResult<Self> {
        let path = path.into();
        let conn = Connection::open(&path)?;
        conn.execute_batch(schema::DDL)?;
        Ok(Self {
            conn: Mutex::new(conn),
            path: Some(path),
        })
    }

    /// Open an in-memory store (tests and dry runs)
    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(schema::DDL)?;
        Ok(Self {
            conn: Mutex::new(conn),
            path: None,
        })
    }

    /// Create a shared reference to this store
    pub fn shared(self) -> SharedFeedbackStore {
        Arc::new(self)
    }

    /// Database path, if file-backed
    pub fn path(&self) -> Option<&PathBuf> {
        self.path.as_ref()
    }

    fn lock(&self) -> StoreResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StoreError::LockPoisoned)
    }

    // =========================================================================
    // Office operations
    // =========================================================================

    /// Insert or fully replace an office record
    pub fn upsert_office(&self, office: &Office) -> StoreResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR REPLACE INTO offices
             (id, name, department, location, active,
              head_name, head_phone, collector_name, collector_phone,
              commissioner_name, commissioner_phone)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                office.id,
                office.name,
                office.department,
                office.location,
                office.active,
                office.head_name,
                office.head_phone,
                office.collector_name,
                office.collector_phone,
                office.commissioner_name,
                office.commissioner_phone,
            ],
        )?;
        Ok(())
    }

    /// Get an office by its code
    pub fn get_office(&self, id: &str) -> StoreResult<Option<Office>> {
        let conn = self.lock()?;
        let office = conn
            .query_row(
                "SELECT id, name, department, location, active,
                        head_name, head_phone, collector_name, collector_phone,
                        commissioner_name, commissioner_phone
                 FROM offices WHERE id = ?1",
                params![id],
                office_from_row,
            )
            .optional()?;
        Ok(office)
    }

    /// Case-insensitive exact lookup by office name
    pub fn find_office_by_name(&self, name: &str) -> StoreResult<Option<Office>> {
        let conn = self.lock()?;
        let office = conn
            .query_row(
                "SELECT id, name, department, location, active,
                        head_name, head_phone, collector_name, collector_phone,
                        commissioner_name, commissioner_phone
                 FROM offices WHERE name = ?1 COLLATE NOCASE",
                params![name],
                office_from_row,
            )
            .optional()?;
        Ok(office)
    }

    /// All offices the sweep evaluates
    pub fn list_active_offices(&self) -> StoreResult<Vec<Office>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, name, department, location, active,
                    head_name, head_phone, collector_name, collector_phone,
                    commissioner_name, commissioner_phone
             FROM offices WHERE active = 1 ORDER BY id",
        )?;
        let offices = stmt
            .query_map([], office_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(offices)
    }

    // =========================================================================
    // Session operations
    // =========================================================================

    /// Start a new dialogue session with restart semantics.
    ///
    /// Force-completes any open session for the phone and inserts the new one
    /// in a single transaction, so concurrent starts serialize against the
    /// open-session unique index rather than racing check-then-act. Returns
    /// the number of stale sessions that were force-completed.
    pub fn start_session(&self, session: &Session) -> StoreResult<usize> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let closed = tx.execute(
            "UPDATE sessions SET completed = 1 WHERE phone = ?1 AND completed = 0",
            params![session.phone],
        )?;
        tx.execute(
            "INSERT INTO sessions (id, phone, office_id, created_at, step, flow, answers, annotation, completed)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                session.id,
                session.phone,
                session.office_id,
                session.created_at,
                session.step.code(),
                session.flow.as_str(),
                encode_answers(&session.answers)?,
                encode_annotation(session.annotation.as_ref())?,
                session.completed,
            ],
        )?;
        tx.commit()?;

        Ok(closed)
    }

    /// Atomic full-document update of an existing session
    pub fn update_session(&self, session: &Session) -> StoreResult<()> {
        let conn = self.lock()?;
        let updated = conn.execute(
            "UPDATE sessions
             SET step = ?2, flow = ?3, answers = ?4, annotation = ?5, completed = ?6
             WHERE id = ?1",
            params![
                session.id,
                session.step.code(),
                session.flow.as_str(),
                encode_answers(&session.answers)?,
                encode_annotation(session.annotation.as_ref())?,
                session.completed,
            ],
        )?;
        if updated == 0 {
            return Err(StoreError::NotFound(format!("session {}", session.id)));
        }
        Ok(())
    }

    /// Get a session by id
    pub fn get_session(&self, id: &str) -> StoreResult<Option<Session>> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                &format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE id = ?1"),
                params![id],
                SessionRow::read,
            )
            .optional()?;
        drop(conn);
        row.map(SessionRow::decode).transpose()
    }

    /// The phone's open session, if any (the unique index guarantees at most one)
    pub fn open_session_for_phone(&self, phone: &str) -> StoreResult<Option<Session>> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                &format!(
                    "SELECT {SESSION_COLUMNS} FROM sessions
                     WHERE phone = ?1 AND completed = 0
                     ORDER BY created_at DESC LIMIT 1"
                ),
                params![phone],
                SessionRow::read,
            )
            .optional()?;
        drop(conn);
        row.map(SessionRow::decode).transpose()
    }

    /// Attach or replace the producer annotation on a session.
    ///
    /// The only field that may change after completion.
    pub fn set_annotation(
        &self,
        session_id: &str,
        annotation: &SessionAnnotation,
    ) -> StoreResult<()> {
        let json =
            serde_json::to_string(annotation).map_err(|e| StoreError::Serialization(e.to_string()))?;
        let conn = self.lock()?;
        let updated = conn.execute(
            "UPDATE sessions SET annotation = ?2 WHERE id = ?1",
            params![session_id, json],
        )?;
        if updated == 0 {
            return Err(StoreError::NotFound(format!("session {session_id}")));
        }
        Ok(())
    }

    /// All completed sessions for an office, in creation (encounter) order
    pub fn completed_sessions_for_office(&self, office_id: &str) -> StoreResult<Vec<Session>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {SESSION_COLUMNS} FROM sessions
             WHERE office_id = ?1 AND completed = 1
             ORDER BY created_at ASC"
        ))?;
        let rows = stmt
            .query_map(params![office_id], SessionRow::read)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        drop(stmt);
        drop(conn);
        rows.into_iter().map(SessionRow::decode).collect()
    }

    // =========================================================================
    // Office metrics operations
    // =========================================================================

    /// Overwrite an office's metrics summary wholesale
    pub fn put_metrics(&self, metrics: &OfficeMetrics) -> StoreResult<()> {
        let themes = serde_json::to_string(&metrics.top_themes)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR REPLACE INTO office_metrics
             (office_id, score, trend, top_themes, confidence,
              monthly_submission_count, data_window, computed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                metrics.office_id,
                metrics.score,
                metrics.trend.as_str(),
                themes,
                metrics.confidence.as_str(),
                metrics.monthly_submission_count,
                metrics.data_window.as_str(),
                metrics.computed_at,
            ],
        )?;
        Ok(())
    }

    /// Current metrics summary for an office
    pub fn get_metrics(&self, office_id: &str) -> StoreResult<Option<OfficeMetrics>> {
        let conn = self.lock()?;
        let raw = conn
            .query_row(
                "SELECT office_id, score, trend, top_themes, confidence,
                        monthly_submission_count, data_window, computed_at
                 FROM office_metrics WHERE office_id = ?1",
                params![office_id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, f64>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, u32>(5)?,
                        row.get::<_, String>(6)?,
                        row.get::<_, DateTime<Utc>>(7)?,
                    ))
                },
            )
            .optional()?;
        drop(conn);

        let Some((office_id, score, trend, themes, confidence, count, window, computed_at)) = raw
        else {
            return Ok(None);
        };

        Ok(Some(OfficeMetrics {
            office_id,
            score,
            trend: Trend::parse(&trend)
                .ok_or_else(|| StoreError::Corrupt(format!("unknown trend '{trend}'")))?,
            top_themes: serde_json::from_str(&themes)
                .map_err(|e| StoreError::Serialization(e.to_string()))?,
            confidence: ConfidenceLabel::parse(&confidence)
                .ok_or_else(|| StoreError::Corrupt(format!("unknown confidence '{confidence}'")))?,
            monthly_submission_count: count,
            data_window: DataWindow::parse(&window)
                .ok_or_else(|| StoreError::Corrupt(format!("unknown data window '{window}'")))?,
            computed_at,
        }))
    }

    // =========================================================================
    // Escalation operations
    // =========================================================================

    /// Persist a newly opened escalation
    pub fn create_escalation(&self, escalation: &Escalation) -> StoreResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO escalations
             (id, office_id, level, status, omes_at_trigger, consecutive_months_below,
              threshold_used, corrective_action_note, corrective_action_by,
              corrective_action_at, triggered_at, resolved_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                escalation.id,
                escalation.office_id,
                escalation.level.code(),
                escalation.status.as_str(),
                escalation.omes_at_trigger,
                escalation.consecutive_months_below,
                escalation.threshold_used,
                escalation.corrective_action_note,
                escalation.corrective_action_by,
                escalation.corrective_action_at,
                escalation.triggered_at,
                escalation.resolved_at,
            ],
        )?;
        Ok(())
    }

    /// Atomic full-document update of an existing escalation
    pub fn update_escalation(&self, escalation: &Escalation) -> StoreResult<()> {
        let conn = self.lock()?;
        let updated = conn.execute(
            "UPDATE escalations
             SET level = ?2, status = ?3, omes_at_trigger = ?4,
                 consecutive_months_below = ?5, threshold_used = ?6,
                 corrective_action_note = ?7, corrective_action_by = ?8,
                 corrective_action_at = ?9, triggered_at = ?10, resolved_at = ?11
             WHERE id = ?1",
            params![
                escalation.id,
                escalation.level.code(),
                escalation.status.as_str(),
                escalation.omes_at_trigger,
                escalation.consecutive_months_below,
                escalation.threshold_used,
                escalation.corrective_action_note,
                escalation.corrective_action_by,
                escalation.corrective_action_at,
                escalation.triggered_at,
                escalation.resolved_at,
            ],
        )?;
        if updated == 0 {
            return Err(StoreError::NotFound(format!("escalation {}", escalation.id)));
        }
        Ok(())
    }

    /// Get an escalation by id
    pub fn get_escalation(&self, id: &str) -> StoreResult<Option<Escalation>> {
        let conn = self.lock()?;
        let escalation = conn
            .query_row(
                &format!("SELECT {ESCALATION_COLUMNS} FROM escalations WHERE id = ?1"),
                params![id],
                escalation_from_row,
            )
            .optional()?;
        Ok(escalation)
    }

    /// The office's most recent open or action-uploaded escalation, if any.
    ///
    /// Composable with `create_escalation` under per-office serialization;
    /// no cross-office lock is taken.
    pub fn active_escalation_for_office(&self, office_id: &str) -> StoreResult<Option<Escalation>> {
        let conn = self.lock()?;
        let escalation = conn
            .query_row(
                &format!(
                    "SELECT {ESCALATION_COLUMNS} FROM escalations
                     WHERE office_id = ?1 AND status IN ('open', 'action_uploaded')
                     ORDER BY triggered_at DESC LIMIT 1"
                ),
                params![office_id],
                escalation_from_row,
            )
            .optional()?;
        Ok(escalation)
    }

    /// Resolve every open/action-uploaded escalation for an office.
    ///
    /// Returns how many were resolved.
    pub fn resolve_active_escalations(
        &self,
        office_id: &str,
        resolved_at: DateTime<Utc>,
    ) -> StoreResult<usize> {
        let conn = self.lock()?;
        let resolved = conn.execute(
            "UPDATE escalations SET status = 'resolved', resolved_at = ?2
             WHERE office_id = ?1 AND status IN ('open', 'action_uploaded')",
            params![office_id, resolved_at],
        )?;
        Ok(resolved)
    }

    /// All escalations for an office, most recent first
    pub fn escalations_for_office(&self, office_id: &str) -> StoreResult<Vec<Escalation>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {ESCALATION_COLUMNS} FROM escalations
             WHERE office_id = ?1 ORDER BY triggered_at DESC"
        ))?;
        let escalations = stmt
            .query_map(params![office_id], escalation_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(escalations)
    }

    // =========================================================================
    // Notification audit operations
    // =========================================================================

    /// Append one delivery-attempt audit record (never updated afterwards)
    pub fn insert_notification(&self, notification: &EscalationNotification) -> StoreResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO escalation_notifications
             (id, escalation_id, channel, recipient_label, recipient_number,
              message_body, provider_message_id, status, error, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                notification.id,
                notification.escalation_id,
                notification.channel,
                notification.recipient_label,
                notification.recipient_number,
                notification.message_body,
                notification.provider_message_id,
                notification.status.as_str(),
                notification.error,
                notification.created_at,
            ],
        )?;
        Ok(())
    }

    /// Audit trail for one escalation, oldest first
    pub fn notifications_for_escalation(
        &self,
        escalation_id: &str,
    ) -> StoreResult<Vec<EscalationNotification>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, escalation_id, channel, recipient_label, recipient_number,
                    message_body, provider_message_id, status, error, created_at
             FROM escalation_notifications
             WHERE escalation_id = ?1 ORDER BY created_at ASC",
        )?;
        let notifications = stmt
            .query_map(params![escalation_id], notification_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(notifications)
    }
}

const ESCALATION_COLUMNS: &str =
    "id, office_id, level, status, omes_at_trigger, consecutive_months_below, threshold_used, \
     corrective_action_note, corrective_action_by, corrective_action_at, triggered_at, resolved_at";

fn encode_answers(answers: &SessionAnswers) -> StoreResult<String> {
    serde_json::to_string(answers).map_err(|e| StoreError::Serialization(e.to_string()))
}

fn encode_annotation(annotation: Option<&SessionAnnotation>) -> StoreResult<Option<String>> {
    annotation
        .map(|a| serde_json::to_string(a).map_err(|e| StoreError::Serialization(e.to_string())))
        .transpose()
}

fn office_from_row(row: &Row<'_>) -> rusqlite::Result<Office> {
    Ok(Office {
        id: row.get(0)?,
        name: row.get(1)?,
        department: row.get(2)?,
        location: row.get(3)?,
        active: row.get(4)?,
        head_name: row.get(5)?,
        head_phone: row.get(6)?,
        collector_name: row.get(7)?,
        collector_phone: row.get(8)?,
        commissioner_name: row.get(9)?,
        commissioner_phone: row.get(10)?,
    })
}

fn escalation_from_row(row: &Row<'_>) -> rusqlite::Result<Escalation> {
    let level_code: i64 = row.get(2)?;
    let status_raw: String = row.get(3)?;
    Ok(Escalation {
        id: row.get(0)?,
        office_id: row.get(1)?,
        level: EscalationLevel::from_code(level_code).ok_or_else(|| {
            rusqlite::Error::IntegralValueOutOfRange(2, level_code)
        })?,
        status: EscalationStatus::parse(&status_raw).ok_or_else(|| {
            rusqlite::Error::InvalidColumnType(3, "status".into(), rusqlite::types::Type::Text)
        })?,
        omes_at_trigger: row.get(4)?,
        consecutive_months_below: row.get(5)?,
        threshold_used: row.get(6)?,
        corrective_action_note: row.get(7)?,
        corrective_action_by: row.get(8)?,
        corrective_action_at: row.get(9)?,
        triggered_at: row.get(10)?,
        resolved_at: row.get(11)?,
    })
}

fn notification_from_row(row: &Row<'_>) -> rusqlite::Result<EscalationNotification> {
    let status_raw: String = row.get(7)?;
    Ok(EscalationNotification {
        id: row.get(0)?,
        escalation_id: row.get(1)?,
        channel: row.get(2)?,
        recipient_label: row.get(3)?,
        recipient_number: row.get(4)?,
        message_body: row.get(5)?,
        provider_message_id: row.get(6)?,
        status: NotificationStatus::parse(&status_raw).ok_or_else(|| {
            rusqlite::Error::InvalidColumnType(7, "status".into(), rusqlite::types::Type::Text)
        })?,
        error: row.get(8)?,
        created_at: row.get(9)?,
    })
}
