//! Import sessions and their TTL-bounded store
//!
//! A session is the only place import state lives between requests. It is
//! created by an upload, frozen by the mapping step and advanced chunk by
//! chunk until the cursor reaches the end of the file.

mod schema;
mod store;

pub use store::{SessionLease, SessionStore};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

use crate::core::encoding::CharacterEncoding;
use crate::core::identity::SessionId;
use crate::core::mapping::ColumnMapping;

/// Where a session is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionPhase {
    /// Staged file present, mapping not yet confirmed
    Uploaded,
    /// Mapping frozen, chunks may run
    Processing,
    /// Cursor reached the end of the file
    Completed,
}

impl SessionPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionPhase::Uploaded => "uploaded",
            SessionPhase::Processing => "processing",
            SessionPhase::Completed => "completed",
        }
    }
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Server-held state of one import
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportSession {
    pub id: SessionId,

    /// Import type the file was uploaded under
    pub import_type: String,

    /// Canonical CSV in the uploads directory
    pub source_file: PathBuf,

    /// Name the user uploaded
    pub source_name: String,

    pub phase: SessionPhase,

    pub encoding: CharacterEncoding,

    pub has_header: bool,

    /// Set once by the mapping step, immutable afterwards
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mapping: Option<ColumnMapping>,

    /// Data rows in the file, header included
    pub total_rows: u64,

    /// Data rows consumed so far, header included
    pub row_offset: u64,

    pub rows_processed: u64,
    pub rows_inserted: u64,
    pub rows_updated: u64,

    pub started_at: DateTime<Utc>,

    /// Diagnostic snapshot of resource limits taken at mapping time
    #[serde(default)]
    pub resource_limits: String,
}

impl ImportSession {
    /// A freshly uploaded session with every counter at zero
    pub fn new(import_type: impl Into<String>, source_file: PathBuf, source_name: impl Into<String>) -> Self {
        Self {
            id: SessionId::new(),
            import_type: import_type.into(),
            source_file,
            source_name: source_name.into(),
            phase: SessionPhase::Uploaded,
            encoding: CharacterEncoding::default(),
            has_header: false,
            mapping: None,
            total_rows: 0,
            row_offset: 0,
            rows_processed: 0,
            rows_inserted: 0,
            rows_updated: 0,
            started_at: Utc::now(),
            resource_limits: String::new(),
        }
    }

    /// Rows at the head of the file that are not data
    pub fn header_rows(&self) -> u64 {
        u64::from(self.has_header)
    }

    /// Data rows excluding the header, as reported to users
    pub fn data_rows(&self) -> u64 {
        self.total_rows.saturating_sub(self.header_rows())
    }

    /// Data rows consumed so far, excluding the header
    pub fn rows_consumed(&self) -> u64 {
        self.row_offset.saturating_sub(self.header_rows())
    }

    pub fn is_complete(&self) -> bool {
        match self.phase {
            SessionPhase::Completed => true,
            SessionPhase::Processing => self.row_offset >= self.total_rows,
            SessionPhase::Uploaded => false,
        }
    }

    /// Counter ordering that must hold after every chunk
    pub fn counters_consistent(&self) -> bool {
        self.rows_inserted + self.rows_updated <= self.rows_processed
            && self.rows_processed <= self.row_offset
            && self.row_offset <= self.total_rows
    }
}

/// Errors raised by the session store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("session database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("corrupt session record: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("session {0} not found")]
    NotFound(String),

    #[error("session {0} is leased by another request")]
    Busy(String),

    #[error("session {0} changed while the chunk was running")]
    Conflict(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_session_is_zeroed() {
        let session = ImportSession::new("item", PathBuf::from("a.csv"), "a.csv");
        assert_eq!(session.phase, SessionPhase::Uploaded);
        assert_eq!(session.row_offset, 0);
        assert_eq!(session.rows_processed, 0);
        assert!(session.mapping.is_none());
        assert!(!session.is_complete());
        assert!(session.counters_consistent());
    }

    #[test]
    fn test_header_adjusts_reported_rows() {
        let mut session = ImportSession::new("item", PathBuf::from("a.csv"), "a.csv");
        session.has_header = true;
        session.total_rows = 10;
        session.row_offset = 5;
        assert_eq!(session.data_rows(), 9);
        assert_eq!(session.rows_consumed(), 4);
    }

    #[test]
    fn test_processing_completes_at_total() {
        let mut session = ImportSession::new("item", PathBuf::from("a.csv"), "a.csv");
        session.phase = SessionPhase::Processing;
        session.total_rows = 3;
        session.row_offset = 2;
        assert!(!session.is_complete());
        session.row_offset = 3;
        assert!(session.is_complete());
    }

    #[test]
    fn test_session_json_roundtrip_keeps_mapping() {
        let mut session = ImportSession::new("item", PathBuf::from("a.csv"), "a.csv");
        session.encoding = CharacterEncoding::Sjis;
        let json = serde_json::to_string(&session).unwrap();
        assert!(json.contains("\"SJIS\""));
        assert!(!json.contains("mapping"));
        let back: ImportSession = serde_json::from_str(&json).unwrap();
        assert_eq!(back, session);
    }
}
