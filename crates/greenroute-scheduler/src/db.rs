use rusqlite::Connection;

use crate::error::Result;

/// Initialise the scheduling schema in `conn`.
///
/// `weekly_routes` holds one row per route; `job_ids` is JSON and may be a
/// flat array or the legacy object grouped by recurrence bucket.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS jobs (
            id                 TEXT    NOT NULL PRIMARY KEY,
            service            TEXT    NOT NULL,
            description        TEXT,
            customer_id        TEXT,
            price_cents        INTEGER NOT NULL DEFAULT 0,
            status             TEXT    NOT NULL DEFAULT 'pending',
            is_recurring       INTEGER NOT NULL DEFAULT 0,
            recurrence         TEXT    NOT NULL DEFAULT 'none',
            last_service_date  TEXT,               -- RFC 3339 or NULL
            completion_count   INTEGER NOT NULL DEFAULT 0,
            estimated_minutes  INTEGER,
            actual_minutes     INTEGER,
            location           TEXT,               -- JSON ServiceLocation or NULL
            updated_at         TEXT    NOT NULL
        ) STRICT;

        CREATE TABLE IF NOT EXISTS weekly_routes (
            weekday      TEXT    NOT NULL,
            idx          INTEGER NOT NULL,
            name         TEXT,
            job_ids      TEXT    NOT NULL DEFAULT '[]',
            employee_id  TEXT,
            crew_id      TEXT,
            PRIMARY KEY (weekday, idx)
        ) STRICT;
        ",
    )?;
    Ok(())
}
