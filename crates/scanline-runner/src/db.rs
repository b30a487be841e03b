use rusqlite::Connection;

use crate::error::Result;

/// Initialise the runner schema in `conn`.
///
/// One row per trigger holding its whole scheduling metadata blob as JSON.
/// Idempotent; safe to call on every start.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS trigger_metadata (
            trigger_id  TEXT    NOT NULL PRIMARY KEY,
            metadata    TEXT    NOT NULL,   -- JSON object, replaced wholesale
            updated_at  TEXT    NOT NULL    -- RFC 3339
        ) STRICT;
        ",
    )?;
    Ok(())
}
