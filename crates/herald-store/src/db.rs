use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::Connection;

use crate::error::Result;

/// Open (creating if needed) the database file at `path`, with WAL and
/// foreign keys enabled and the given busy timeout.
pub fn open(path: &str, busy_timeout: Duration) -> Result<Connection> {
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let conn = Connection::open(path)?;
    conn.busy_timeout(busy_timeout)?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

/// Initialise the dispatcher schema in `conn`. Idempotent.
///
/// Timestamps are stored as fixed-width RFC 3339 strings (see [`fmt_ts`]) so
/// text comparison in SQL orders them chronologically.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS schedules (
            id              INTEGER NOT NULL PRIMARY KEY AUTOINCREMENT,
            external_id     TEXT    NOT NULL DEFAULT '',
            created_by      TEXT    NOT NULL DEFAULT '',
            arn             TEXT    NOT NULL,
            payload         TEXT    NOT NULL,
            created         TEXT    NOT NULL,
            starts_at       TEXT    NOT NULL,
            active          INTEGER NOT NULL DEFAULT 1,
            deactivated_at  TEXT
        ) STRICT;

        CREATE TABLE IF NOT EXISTS crontabs (
            id              INTEGER NOT NULL PRIMARY KEY AUTOINCREMENT,
            schedule_id     INTEGER NOT NULL REFERENCES schedules (id),
            expression      TEXT    NOT NULL,
            previous_run    TEXT,
            next_run        TEXT    NOT NULL,
            last_updated    TEXT,
            locked_by       TEXT,
            locked_until    TEXT,
            claim_token     TEXT
        ) STRICT;

        -- Polling: WHERE next_run < ? ORDER BY next_run
        CREATE INDEX IF NOT EXISTS idx_crontabs_next_run ON crontabs (next_run);
        CREATE INDEX IF NOT EXISTS idx_crontabs_schedule ON crontabs (schedule_id);

        CREATE TABLE IF NOT EXISTS jobs (
            id              INTEGER NOT NULL PRIMARY KEY AUTOINCREMENT,
            schedule_id     INTEGER REFERENCES schedules (id),
            run_at          TEXT    NOT NULL,
            arn             TEXT    NOT NULL,
            payload         TEXT    NOT NULL,
            created_at      TEXT    NOT NULL,
            locked_by       TEXT,
            locked_until    TEXT,
            claim_token     TEXT
        ) STRICT;

        -- Polling: WHERE run_at <= ? ORDER BY run_at
        CREATE INDEX IF NOT EXISTS idx_jobs_run_at ON jobs (run_at);

        -- At most one response per job; the first write wins.
        CREATE TABLE IF NOT EXISTS job_responses (
            id              INTEGER NOT NULL PRIMARY KEY AUTOINCREMENT,
            job_id          INTEGER NOT NULL UNIQUE REFERENCES jobs (id),
            time            TEXT    NOT NULL,
            response        TEXT    NOT NULL,
            is_error        INTEGER NOT NULL,
            error           TEXT    NOT NULL
        ) STRICT;
        ",
    )?;
    Ok(())
}

/// Render a timestamp in the fixed-width form used in every column.
pub(crate) fn fmt_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Read a timestamp column written by [`fmt_ts`].
pub(crate) fn get_ts(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    parse_ts(idx, &raw)
}

pub(crate) fn get_opt_ts(
    row: &rusqlite::Row<'_>,
    idx: usize,
) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| parse_ts(idx, &s)).transpose()
}

fn parse_ts(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}
