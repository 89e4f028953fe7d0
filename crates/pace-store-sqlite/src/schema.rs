//! SQL schema for the Pace SQLite store.
//!
//! Executed once at connection startup via `PRAGMA user_version`. Future
//! migrations will be gated on that version number.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS circles (
    circle_id                TEXT PRIMARY KEY,
    name                     TEXT NOT NULL,
    coach_id                 TEXT,
    created_at               TEXT NOT NULL,   -- ISO 8601 UTC
    member_ids               TEXT NOT NULL DEFAULT '[]',  -- denormalized JSON list
    -- Stats cache fields. Written and cleared together, as one entry.
    cached_avg_alignment     INTEGER,
    cached_alignment_change  INTEGER,
    cached_member_alignments TEXT,            -- JSON map userId -> {score, streak}
    cached_at                TEXT,            -- calendar date the entry was computed on
    cached_at_ts             TEXT             -- instant, for the TTL backstop
);

CREATE TABLE IF NOT EXISTS circle_members (
    circle_id TEXT NOT NULL REFERENCES circles(circle_id),
    user_id   TEXT NOT NULL,
    joined_at TEXT NOT NULL,
    PRIMARY KEY (circle_id, user_id)
);

-- One record per (user, day), written by the check-in subsystem. Immutable
-- once the day has elapsed; today's row is rewritten as the user checks in.
CREATE TABLE IF NOT EXISTS user_alignments (
    user_id         TEXT NOT NULL,
    date            TEXT NOT NULL,   -- YYYY-MM-DD
    alignment_score INTEGER NOT NULL,
    fully_aligned   INTEGER NOT NULL,
    components      TEXT NOT NULL DEFAULT '{}',
    PRIMARY KEY (user_id, date)
);

CREATE TABLE IF NOT EXISTS user_alignment_summaries (
    user_id           TEXT PRIMARY KEY,
    current_streak    INTEGER NOT NULL DEFAULT 0,
    last_aligned_date TEXT
);

-- Derived per-day circle aggregate. Write-once for past dates; today's
-- value is never read from here.
CREATE TABLE IF NOT EXISTS circle_alignment_days (
    circle_id              TEXT NOT NULL,
    date                   TEXT NOT NULL,
    fraction_fully_aligned REAL    NOT NULL,
    num_fully_aligned      INTEGER NOT NULL,
    total_members          INTEGER NOT NULL,
    kept                   INTEGER NOT NULL,
    PRIMARY KEY (circle_id, date)
);

CREATE TABLE IF NOT EXISTS circle_alignment_summaries (
    circle_id      TEXT PRIMARY KEY,
    current_streak INTEGER NOT NULL DEFAULT 0,
    last_kept_date TEXT
);

CREATE INDEX IF NOT EXISTS circle_members_user_idx ON circle_members(user_id);

PRAGMA user_version = 1;
";
