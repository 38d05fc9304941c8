//! Session database schema

use rusqlite::{params, Connection};

use super::StoreError;

/// Current schema version - sessions are dropped on mismatch
pub(super) const SCHEMA_VERSION: i32 = 1;

/// Create tables when missing, or rebuild them after a version change
///
/// Sessions are ephemeral, so a rebuild never migrates rows.
pub(super) fn prepare(conn: &Connection) -> Result<(), StoreError> {
    if needs_schema_rebuild(conn) {
        conn.execute_batch(
            r#"
            DROP TABLE IF EXISTS schema_version;
            DROP TABLE IF EXISTS import_sessions;
            "#,
        )?;
    }
    init_schema(conn)
}

fn needs_schema_rebuild(conn: &Connection) -> bool {
    let current_version: i32 = conn
        .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
            row.get(0)
        })
        .unwrap_or(0);

    current_version != SCHEMA_VERSION
}

fn init_schema(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        r#"
        -- Schema version tracking
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        );

        -- One row per live import session
        CREATE TABLE IF NOT EXISTS import_sessions (
            id TEXT PRIMARY KEY,
            data TEXT NOT NULL,
            row_offset INTEGER NOT NULL,
            source_file TEXT NOT NULL,
            phase TEXT NOT NULL,
            expires_at INTEGER NOT NULL,
            lease_token TEXT,
            lease_expires INTEGER
        );
        CREATE INDEX IF NOT EXISTS idx_sessions_expires ON import_sessions(expires_at);
        "#,
    )?;

    conn.execute(
        "INSERT OR REPLACE INTO schema_version (version) VALUES (?1)",
        params![SCHEMA_VERSION],
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prepare_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        prepare(&conn).unwrap();
        prepare(&conn).unwrap();
        let version: i32 = conn
            .query_row("SELECT version FROM schema_version", [], |r| r.get(0))
            .unwrap();
        assert_eq!(version, SCHEMA_VERSION);
    }

    #[test]
    fn test_version_mismatch_drops_sessions() {
        let conn = Connection::open_in_memory().unwrap();
        prepare(&conn).unwrap();
        conn.execute(
            "INSERT INTO import_sessions (id, data, row_offset, source_file, phase, expires_at)
             VALUES ('x', '{}', 0, 'a.csv', 'uploaded', 0)",
            [],
        )
        .unwrap();
        conn.execute("UPDATE schema_version SET version = 0", []).unwrap();

        prepare(&conn).unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM import_sessions", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }
}
