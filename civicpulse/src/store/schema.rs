//! Table definitions for the SQLite feedback store
//!
//! Each table maps to one collection of the pipeline. The partial unique
//! index on open sessions enforces the one-open-session-per-phone invariant
//! at the storage layer, not in application code.

/// DDL applied on every open; all statements are idempotent.
pub const DDL: &str = r#"
CREATE TABLE IF NOT EXISTS offices (
    id                  TEXT PRIMARY KEY,
    name                TEXT NOT NULL,
    department          TEXT NOT NULL,
    location            TEXT NOT NULL,
    active              INTEGER NOT NULL DEFAULT 1,
    head_name           TEXT,
    head_phone          TEXT,
    collector_name      TEXT,
    collector_phone     TEXT,
    commissioner_name   TEXT,
    commissioner_phone  TEXT
);

CREATE TABLE IF NOT EXISTS sessions (
    id          TEXT PRIMARY KEY,
    phone       TEXT NOT NULL,
    office_id   TEXT NOT NULL,
    created_at  TEXT NOT NULL,
    step        INTEGER NOT NULL,
    flow        TEXT NOT NULL,
    answers     TEXT NOT NULL,
    annotation  TEXT,
    completed   INTEGER NOT NULL DEFAULT 0
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_sessions_open_phone
    ON sessions(phone) WHERE completed = 0;

CREATE INDEX IF NOT EXISTS idx_sessions_office
    ON sessions(office_id, completed);

CREATE TABLE IF NOT EXISTS office_metrics (
    office_id                 TEXT PRIMARY KEY,
    score                     REAL NOT NULL,
    trend                     TEXT NOT NULL,
    top_themes                TEXT NOT NULL,
    confidence                TEXT NOT NULL,
    monthly_submission_count  INTEGER NOT NULL,
    data_window               TEXT NOT NULL,
    computed_at               TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS escalations (
    id                        TEXT PRIMARY KEY,
    office_id                 TEXT NOT NULL,
    level                     INTEGER NOT NULL,
    status                    TEXT NOT NULL,
    omes_at_trigger           REAL NOT NULL,
    consecutive_months_below  INTEGER NOT NULL,
    threshold_used            REAL NOT NULL,
    corrective_action_note    TEXT,
    corrective_action_by      TEXT,
    corrective_action_at      TEXT,
    triggered_at              TEXT NOT NULL,
    resolved_at               TEXT
);

CREATE INDEX IF NOT EXISTS idx_escalations_office_status
    ON escalations(office_id, status);

CREATE TABLE IF NOT EXISTS escalation_notifications (
    id                   TEXT PRIMARY KEY,
    escalation_id        TEXT NOT NULL,
    channel              TEXT NOT NULL,
    recipient_label      TEXT NOT NULL,
    recipient_number     TEXT NOT NULL,
    message_body         TEXT NOT NULL,
    provider_message_id  TEXT,
    status               TEXT NOT NULL,
    error                TEXT,
    created_at           TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_notifications_escalation
    ON escalation_notifications(escalation_id);
"#;
