//! Bundled record sink backed by SQLite
//!
//! Rows are stored per import type, keyed by the value of the primary field.
//! A SHA-256 fingerprint of the mapped fields decides between an update and
//! a no-op, so replaying rows after a resume never creates duplicates.

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

use crate::core::sink::{MappedRow, RecordSink, RowOutcome};

/// Current schema version - the table is rebuilt on mismatch
const SCHEMA_VERSION: i32 = 1;

/// Errors opening or querying the record table
#[derive(Debug, Error)]
pub enum RecordError {
    #[error("record database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("corrupt record: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Records of one import type
pub struct RecordTable {
    conn: Connection,
    import_type: String,
    primary_key: String,
}

impl RecordTable {
    /// Open the record database for an import type whose rows are keyed by `primary_key`
    pub fn open(path: &Path, import_type: &str, primary_key: &str) -> Result<Self, RecordError> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        Self::with_connection(conn, import_type, primary_key)
    }

    pub fn open_in_memory(import_type: &str, primary_key: &str) -> Result<Self, RecordError> {
        Self::with_connection(Connection::open_in_memory()?, import_type, primary_key)
    }

    fn with_connection(
        conn: Connection,
        import_type: &str,
        primary_key: &str,
    ) -> Result<Self, RecordError> {
        let table = Self {
            conn,
            import_type: import_type.to_string(),
            primary_key: primary_key.to_string(),
        };
        table.init_schema()?;
        Ok(table)
    }

    fn init_schema(&self) -> Result<(), RecordError> {
        let version: i32 = self
            .conn
            .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
                row.get(0)
            })
            .unwrap_or(0);

        if version != SCHEMA_VERSION {
            self.conn.execute_batch(
                r#"
                DROP TABLE IF EXISTS schema_version;
                DROP TABLE IF EXISTS records;
                "#,
            )?;
        }

        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER PRIMARY KEY
            );

            CREATE TABLE IF NOT EXISTS records (
                import_type TEXT NOT NULL,
                record_key TEXT NOT NULL,
                fields TEXT NOT NULL,
                fingerprint TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (import_type, record_key)
            );
            "#,
        )?;
        self.conn.execute(
            "INSERT OR REPLACE INTO schema_version (version) VALUES (?1)",
            params![SCHEMA_VERSION],
        )?;
        Ok(())
    }

    /// Number of records of this import type
    pub fn count(&self) -> Result<u64, RecordError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM records WHERE import_type = ?1",
            params![self.import_type],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    /// Fields of the record stored under `key`
    pub fn get(&self, key: &str) -> Result<Option<BTreeMap<String, String>>, RecordError> {
        let fields: Option<String> = self
            .conn
            .query_row(
                "SELECT fields FROM records WHERE import_type = ?1 AND record_key = ?2",
                params![self.import_type, key],
                |row| row.get(0),
            )
            .optional()?;
        match fields {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    fn upsert(&self, key: &str, row: &MappedRow) -> Result<RowOutcome, RecordError> {
        let fields: BTreeMap<&str, &str> = row
            .fields
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        let json = serde_json::to_string(&fields)?;
        let fingerprint = fingerprint(&json);

        let existing: Option<String> = self
            .conn
            .query_row(
                "SELECT fingerprint FROM records WHERE import_type = ?1 AND record_key = ?2",
                params![self.import_type, key],
                |row| row.get(0),
            )
            .optional()?;

        let now = Utc::now().to_rfc3339();
        match existing {
            Some(stored) if stored == fingerprint => Ok(RowOutcome::Skipped),
            Some(_) => {
                self.conn.execute(
                    "UPDATE records SET fields = ?3, fingerprint = ?4, updated_at = ?5
                     WHERE import_type = ?1 AND record_key = ?2",
                    params![self.import_type, key, json, fingerprint, now],
                )?;
                Ok(RowOutcome::Updated)
            }
            None => {
                self.conn.execute(
                    "INSERT INTO records (import_type, record_key, fields, fingerprint, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![self.import_type, key, json, fingerprint, now],
                )?;
                Ok(RowOutcome::Inserted)
            }
        }
    }
}

impl RecordSink for RecordTable {
    fn apply(&mut self, row: &MappedRow) -> RowOutcome {
        let key = row.get(&self.primary_key).unwrap_or_default().trim();
        if key.is_empty() {
            return RowOutcome::Failed(format!("'{}' is empty", self.primary_key));
        }
        self.upsert(key, row)
            .unwrap_or_else(|e| RowOutcome::Failed(e.to_string()))
    }
}

fn fingerprint(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(line: u64, code: &str, name: &str) -> MappedRow {
        MappedRow {
            line,
            fields: vec![
                ("code".to_string(), code.to_string()),
                ("name".to_string(), name.to_string()),
            ],
        }
    }

    #[test]
    fn test_insert_update_skip() {
        let mut table = RecordTable::open_in_memory("item", "code").unwrap();
        assert_eq!(table.apply(&row(2, "A1", "Apple")), RowOutcome::Inserted);
        assert_eq!(table.apply(&row(3, "A1", "Apple")), RowOutcome::Skipped);
        assert_eq!(table.apply(&row(4, "A1", "Green apple")), RowOutcome::Updated);
        assert_eq!(table.count().unwrap(), 1);
        assert_eq!(
            table.get("A1").unwrap().unwrap().get("name").map(String::as_str),
            Some("Green apple")
        );
    }

    #[test]
    fn test_empty_primary_fails() {
        let mut table = RecordTable::open_in_memory("item", "code").unwrap();
        assert_eq!(
            table.apply(&row(2, "  ", "Apple")),
            RowOutcome::Failed("'code' is empty".to_string())
        );
        assert_eq!(table.count().unwrap(), 0);
    }

    #[test]
    fn test_types_are_separate() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("records.db");
        let mut items = RecordTable::open(&path, "item", "code").unwrap();
        items.apply(&row(2, "A1", "Apple"));

        let mut others = RecordTable::open(&path, "other", "code").unwrap();
        assert_eq!(others.apply(&row(2, "A1", "Apple")), RowOutcome::Inserted);
        assert_eq!(items.count().unwrap(), 1);
        assert_eq!(others.count().unwrap(), 1);
    }

    #[test]
    fn test_fingerprint_is_stable() {
        assert_eq!(fingerprint("abc"), fingerprint("abc"));
        assert_eq!(fingerprint("abc").len(), 64);
    }
}
