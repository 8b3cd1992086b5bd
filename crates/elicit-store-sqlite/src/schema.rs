//! SQL schema for the Elicit SQLite store.
//!
//! Executed once at connection startup via `PRAGMA user_version`. Future
//! migrations will be gated on that version number.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS document (
    document_id   INTEGER PRIMARY KEY,
    document_name TEXT NOT NULL UNIQUE
);

-- One row per candidate value ever proposed or declared for a document.
CREATE TABLE IF NOT EXISTS variable (
    variable_id      INTEGER PRIMARY KEY,
    document_id      INTEGER NOT NULL REFERENCES document(document_id),
    variable_name    TEXT NOT NULL,
    variable_value   TEXT NOT NULL,
    value_confidence REAL,           -- written by the estimators only
    UNIQUE (document_id, variable_name, variable_value)
);

-- One row per distinct piece of evidence for a variable row.
CREATE TABLE IF NOT EXISTS extraction (
    extraction_id     INTEGER PRIMARY KEY,
    variable_id       INTEGER NOT NULL REFERENCES variable(variable_id),
    exact_context     TEXT NOT NULL,
    local_context     TEXT NOT NULL,
    wider_context     TEXT NOT NULL,
    valid             TEXT CHECK (valid IN ('TRUE', 'FALSE')),
    meta_confidence   REAL,          -- written by the estimators only
    validated_context TEXT
);

-- One row per (extraction, method); re-votes keep the maximum confidence.
CREATE TABLE IF NOT EXISTS raw_extraction (
    raw_extraction_id INTEGER PRIMARY KEY,
    extraction_id     INTEGER NOT NULL REFERENCES extraction(extraction_id),
    method            TEXT NOT NULL,
    confidence        REAL NOT NULL,
    UNIQUE (extraction_id, method)
);

-- Append-only curator notes.
CREATE TABLE IF NOT EXISTS explanation (
    explanation_id INTEGER PRIMARY KEY,
    extraction_id  INTEGER NOT NULL REFERENCES extraction(extraction_id),
    text           TEXT NOT NULL,
    recorded_at    TEXT NOT NULL     -- RFC 3339 UTC
);

CREATE INDEX IF NOT EXISTS variable_name_idx        ON variable(variable_name);
CREATE INDEX IF NOT EXISTS extraction_variable_idx  ON extraction(variable_id);
CREATE INDEX IF NOT EXISTS explanation_extraction_idx ON explanation(extraction_id);

PRAGMA user_version = 1;
";
