//! SQL schema for the Tally SQLite store.
//!
//! Executed once at connection startup. The version is recorded in
//! `PRAGMA user_version`; future migrations will be gated on it.

/// Full schema DDL; idempotent thanks to `IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;

-- One row per ledger event. Rows are strictly append-only: the triggers
-- below abort any UPDATE or DELETE.
CREATE TABLE IF NOT EXISTS history_events (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    aggregate_id    INTEGER NOT NULL,
    event_type      TEXT    NOT NULL,
    event_subtype   TEXT,
    details         TEXT    NOT NULL DEFAULT '{}',  -- free-form JSON
    anchor_snapshot TEXT,                           -- JSON object, anchors only
    patch           TEXT,                           -- JSON op list, patches only
    legacy_snapshot TEXT,                           -- pre-hybrid rows only
    is_anchor       INTEGER NOT NULL DEFAULT 0,
    anchor_reason   TEXT,
    artifact        TEXT,
    artifact_sha256 TEXT,
    created_at      TEXT    NOT NULL,               -- RFC 3339 UTC
    created_by      TEXT,
    CHECK (anchor_snapshot IS NULL OR patch IS NULL),
    CHECK (legacy_snapshot IS NULL OR (anchor_snapshot IS NULL AND patch IS NULL)),
    CHECK (is_anchor = (anchor_snapshot IS NOT NULL)),
    CHECK ((artifact IS NULL) = (artifact_sha256 IS NULL))
);

CREATE INDEX IF NOT EXISTS history_events_aggregate_idx
    ON history_events(aggregate_id, id);

CREATE TRIGGER IF NOT EXISTS history_events_no_update
BEFORE UPDATE ON history_events
BEGIN
    SELECT RAISE(ABORT, 'history_events is append-only');
END;

CREATE TRIGGER IF NOT EXISTS history_events_no_delete
BEFORE DELETE ON history_events
BEGIN
    SELECT RAISE(ABORT, 'history_events is append-only');
END;

PRAGMA user_version = 1;
";
