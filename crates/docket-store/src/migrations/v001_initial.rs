//! v001 -- Initial schema creation.
//!
//! Creates the ten core tables: `users`, `clients`, `cases`,
//! `consultations`, `invoices`, `documents`, `client_tokens`,
//! `communications`, `ai_chat_sessions`, and `audit_logs`.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Users (administrative staff)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS users (
    id            TEXT PRIMARY KEY NOT NULL,  -- UUID v4
    email         TEXT NOT NULL UNIQUE,
    password_hash TEXT NOT NULL,              -- bcrypt
    role          TEXT NOT NULL DEFAULT 'admin',
    profile_photo TEXT,                       -- optional URL
    created_at    TEXT NOT NULL               -- ISO-8601 / RFC-3339
);

-- ----------------------------------------------------------------
-- Clients (persons represented by the firm)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS clients (
    id         TEXT PRIMARY KEY NOT NULL,     -- UUID v4
    first_name TEXT NOT NULL,
    last_name  TEXT NOT NULL,
    email      TEXT NOT NULL UNIQUE,
    phone      TEXT,
    address    TEXT,
    notes      TEXT,
    created_at TEXT NOT NULL
);

-- ----------------------------------------------------------------
-- Cases (legal matters)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS cases (
    id          TEXT PRIMARY KEY NOT NULL,    -- UUID v4
    client_id   TEXT NOT NULL,                -- FK -> clients(id)
    title       TEXT NOT NULL,
    case_type   TEXT NOT NULL,
    status      TEXT NOT NULL,                -- active / closed / on-hold
    description TEXT,
    total_fees  REAL NOT NULL DEFAULT 0,
    created_at  TEXT NOT NULL,
    updated_at  TEXT NOT NULL,

    FOREIGN KEY (client_id) REFERENCES clients(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_cases_client_id ON cases(client_id);
CREATE INDEX IF NOT EXISTS idx_cases_status ON cases(status);

-- ----------------------------------------------------------------
-- Consultations (scheduled meetings)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS consultations (
    id           TEXT PRIMARY KEY NOT NULL,   -- UUID v4
    client_id    TEXT NOT NULL,               -- FK -> clients(id)
    kind         TEXT NOT NULL,               -- phone / virtual / in-person
    case_type    TEXT NOT NULL,
    scheduled_at TEXT NOT NULL,
    status       TEXT NOT NULL,               -- scheduled / completed / cancelled / no-show
    rate         REAL,
    description  TEXT,
    created_at   TEXT NOT NULL,

    FOREIGN KEY (client_id) REFERENCES clients(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_consultations_client_id ON consultations(client_id);
CREATE INDEX IF NOT EXISTS idx_consultations_scheduled
    ON consultations(scheduled_at DESC);

-- ----------------------------------------------------------------
-- Invoices
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS invoices (
    id             TEXT PRIMARY KEY NOT NULL, -- UUID v4
    client_id      TEXT NOT NULL,             -- FK -> clients(id)
    invoice_number TEXT NOT NULL UNIQUE,
    amount         REAL NOT NULL,
    tax            REAL NOT NULL,
    total_amount   REAL NOT NULL,             -- amount + tax, fixed at creation
    status         TEXT NOT NULL,             -- draft / sent / paid / overdue
    due_date       TEXT,
    paid_at        TEXT,
    line_items     TEXT NOT NULL,             -- JSON array
    created_at     TEXT NOT NULL,

    FOREIGN KEY (client_id) REFERENCES clients(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_invoices_client_id ON invoices(client_id);

-- ----------------------------------------------------------------
-- Documents (file metadata; the bytes live on disk)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS documents (
    id            TEXT PRIMARY KEY NOT NULL,  -- UUID v4, doubles as filename stem
    filename      TEXT NOT NULL,              -- storage-internal: <uuid><ext>
    original_name TEXT NOT NULL,              -- user-supplied
    storage_path  TEXT NOT NULL,              -- path relative to the upload root,
                                              -- fixed at upload; survives the
                                              -- client/case links being nulled
    size          INTEGER NOT NULL,
    mime_type     TEXT NOT NULL,
    client_id     TEXT,                       -- nullable FK -> clients(id)
    case_id       TEXT,                       -- nullable FK -> cases(id)
    category      TEXT NOT NULL,
    description   TEXT,
    uploaded_by   TEXT NOT NULL,              -- FK -> users(id)
    created_at    TEXT NOT NULL,

    FOREIGN KEY (client_id) REFERENCES clients(id) ON DELETE SET NULL,
    FOREIGN KEY (case_id) REFERENCES cases(id) ON DELETE SET NULL,
    FOREIGN KEY (uploaded_by) REFERENCES users(id)
);

CREATE INDEX IF NOT EXISTS idx_documents_client_id ON documents(client_id);
CREATE INDEX IF NOT EXISTS idx_documents_case_id ON documents(case_id);

-- ----------------------------------------------------------------
-- Client portal access tokens
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS client_tokens (
    id         TEXT PRIMARY KEY NOT NULL,     -- UUID v4
    client_id  TEXT NOT NULL,                 -- FK -> clients(id)
    token      TEXT NOT NULL UNIQUE,          -- 64 hex chars
    expires_at TEXT NOT NULL,
    created_at TEXT NOT NULL,

    FOREIGN KEY (client_id) REFERENCES clients(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_client_tokens_expires ON client_tokens(expires_at);

-- ----------------------------------------------------------------
-- Communications (correspondence log, email only for now)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS communications (
    id         TEXT PRIMARY KEY NOT NULL,     -- UUID v4
    client_id  TEXT NOT NULL,                 -- FK -> clients(id)
    direction  TEXT NOT NULL,                 -- inbound / outbound
    channel    TEXT NOT NULL,                 -- email
    subject    TEXT NOT NULL,
    body       TEXT NOT NULL,
    status     TEXT NOT NULL,                 -- sent / failed / received
    created_at TEXT NOT NULL,

    FOREIGN KEY (client_id) REFERENCES clients(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_communications_client
    ON communications(client_id, created_at DESC);

-- ----------------------------------------------------------------
-- AI chat sessions (website assistant)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS ai_chat_sessions (
    session_id   TEXT PRIMARY KEY NOT NULL,   -- client-generated opaque id
    client_email TEXT,
    messages     TEXT NOT NULL,               -- JSON array of turns
    status       TEXT NOT NULL,
    created_at   TEXT NOT NULL,
    updated_at   TEXT NOT NULL
);

-- ----------------------------------------------------------------
-- Audit logs (append-only)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS audit_logs (
    id            TEXT PRIMARY KEY NOT NULL,  -- UUID v4
    user_id       TEXT,                       -- null for unauthenticated actors
    action        TEXT NOT NULL,
    resource_type TEXT NOT NULL,
    resource_id   TEXT,
    status        TEXT NOT NULL,              -- success / failure
    ip            TEXT,
    user_agent    TEXT,
    details       TEXT,                       -- sanitized JSON
    created_at    TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_audit_logs_user ON audit_logs(user_id);
CREATE INDEX IF NOT EXISTS idx_audit_logs_resource
    ON audit_logs(resource_type, resource_id);
CREATE INDEX IF NOT EXISTS idx_audit_logs_created ON audit_logs(created_at DESC);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
