//! Import errors with stable reference codes
//!
//! Every step-aborting failure carries a reference code rendered as `(#NNN)`
//! so a user report can be traced back to the exact check that fired.
//! Row-level failures are not errors of this type: they are [`RowError`]s,
//! written to the error log while the chunk keeps going.

use miette::Diagnostic;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

use crate::core::identity::SessionIdError;
use crate::core::session::StoreError;
use crate::core::workspace::WorkspaceError;

/// Errors that abort the current import step
#[derive(Debug, Error, Diagnostic)]
pub enum ImportError {
    /// The upload itself did not arrive intact
    #[error("{message} (#{code:03})")]
    #[diagnostic(code(csvimp::transport), help("Upload the file again."))]
    Transport { message: String, code: u16 },

    /// The uploaded content is not something we can import
    #[error("{message} (#{code:03})")]
    #[diagnostic(
        code(csvimp::format),
        help("Upload a .csv file, or a .zip archive containing a single .csv file.")
    )]
    Format { message: String, code: u16 },

    /// The mapping or the file content failed validation
    #[error("{message} (#{code:03})")]
    #[diagnostic(code(csvimp::validation), help("Correct the column mapping and confirm it again."))]
    Validation { message: String, code: u16 },

    #[error("Import session {id} not found or expired. Please re-upload the CSV. (#{code:03})")]
    #[diagnostic(code(csvimp::session_expired), help("Start over with 'csvimp upload'."))]
    SessionExpired { id: String, code: u16 },

    #[error("Import session {id} is being processed by another request. (#061)")]
    #[diagnostic(code(csvimp::session_busy), help("Wait for the running chunk to finish."))]
    SessionBusy { id: String },

    #[error("Import session {id} changed while the chunk was running; its rows were not counted. (#063)")]
    #[diagnostic(
        code(csvimp::session_conflict),
        help("Request the next chunk again; it resumes from the stored offset.")
    )]
    SessionConflict { id: String },

    #[error("Requested offset {requested} is ahead of the stored offset {stored}. (#062)")]
    #[diagnostic(code(csvimp::offset_ahead))]
    OffsetAhead { requested: u64, stored: u64 },

    #[error("Type does not match: session was uploaded as '{expected}', not '{actual}'. (#001)")]
    #[diagnostic(code(csvimp::type_mismatch))]
    TypeMismatch { expected: String, actual: String },

    #[error("Import type not specified or not configured: '{0}'. (#029)")]
    #[diagnostic(
        code(csvimp::unknown_type),
        help("Declare the type under 'types:' in .csvimp/config.yaml, or pass --type.")
    )]
    UnknownType(String),

    #[error("I/O error on {}: {source} (#070)", .path.display())]
    #[diagnostic(code(csvimp::io))]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV read error: {0} (#071)")]
    #[diagnostic(code(csvimp::csv))]
    Csv(#[from] csv::Error),

    #[error("{0} (#072)")]
    #[diagnostic(code(csvimp::store))]
    Store(StoreError),

    #[error("{0} (#073)")]
    #[diagnostic(code(csvimp::workspace))]
    Workspace(#[from] WorkspaceError),

    #[error("{0} (#074)")]
    #[diagnostic(code(csvimp::session_id))]
    SessionId(#[from] SessionIdError),
}

impl ImportError {
    pub fn transport(code: u16, message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            code,
        }
    }

    pub fn format(code: u16, message: impl Into<String>) -> Self {
        Self::Format {
            message: message.into(),
            code,
        }
    }

    pub fn validation(code: u16, message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            code,
        }
    }

    pub fn expired(id: impl fmt::Display, code: u16) -> Self {
        Self::SessionExpired {
            id: id.to_string(),
            code,
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// True for errors the user fixes by starting over from the upload step
    pub fn requires_reupload(&self) -> bool {
        matches!(
            self,
            ImportError::Transport { .. }
                | ImportError::Format { .. }
                | ImportError::SessionExpired { .. }
        )
    }
}

impl From<StoreError> for ImportError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => ImportError::expired(id, 51),
            StoreError::Busy(id) => ImportError::SessionBusy { id },
            StoreError::Conflict(id) => ImportError::SessionConflict { id },
            other => ImportError::Store(other),
        }
    }
}

/// A single row that the record sink could not apply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowError {
    /// Line in the source where the row starts (1-based)
    pub line: u64,
    pub reason: String,
}

impl RowError {
    pub fn new(line: u64, reason: impl Into<String>) -> Self {
        Self {
            line,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for RowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Log lines are one per failure
        let reason = self.reason.replace(['\r', '\n'], " ");
        write!(f, "Row {}: {}", self.line, reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_code_is_rendered() {
        let err = ImportError::format(30, "Too many files in ZIP.");
        assert_eq!(err.to_string(), "Too many files in ZIP. (#030)");
    }

    #[test]
    fn test_expired_message_names_session() {
        let err = ImportError::expired("IMP-X", 51);
        assert!(err.to_string().contains("IMP-X"));
        assert!(err.to_string().ends_with("(#051)"));
        assert!(err.requires_reupload());
    }

    #[test]
    fn test_validation_does_not_require_reupload() {
        let err = ImportError::validation(33, "Required fields have not been selected.");
        assert!(!err.requires_reupload());
    }

    #[test]
    fn test_missing_session_maps_to_expired() {
        let err: ImportError = StoreError::NotFound("IMP-1".to_string()).into();
        assert!(matches!(err, ImportError::SessionExpired { code: 51, .. }));

        let err: ImportError = StoreError::Busy("IMP-1".to_string()).into();
        assert!(matches!(err, ImportError::SessionBusy { .. }));

        let err: ImportError = StoreError::Conflict("IMP-1".to_string()).into();
        assert!(matches!(err, ImportError::SessionConflict { .. }));
        assert!(err.to_string().ends_with("(#063)"));
    }

    #[test]
    fn test_every_step_error_carries_a_code() {
        let io_err = || std::io::Error::new(std::io::ErrorKind::Other, "disk gone");
        let csv_err = csv::Error::from(io_err());
        let json_err = serde_json::from_str::<u8>("x").unwrap_err();
        let errors = vec![
            ImportError::io("a.csv", io_err()),
            ImportError::Csv(csv_err),
            StoreError::Serde(json_err).into(),
            StoreError::Conflict("IMP-1".to_string()).into(),
            ImportError::Workspace(WorkspaceError::IoError("denied".to_string())),
            ImportError::SessionId("nope".parse::<crate::core::SessionId>().unwrap_err()),
            ImportError::SessionBusy { id: "IMP-1".to_string() },
            ImportError::OffsetAhead { requested: 7, stored: 1 },
            ImportError::TypeMismatch {
                expected: "item".to_string(),
                actual: "member".to_string(),
            },
            ImportError::UnknownType("nope".to_string()),
        ];
        for err in errors {
            let message = err.to_string();
            let code = message
                .rsplit_once("(#")
                .map(|(_, tail)| tail.trim_end_matches(')'));
            assert!(
                code.is_some_and(|c| c.len() == 3 && c.chars().all(|d| d.is_ascii_digit())),
                "no reference code in '{}'",
                message
            );
        }
    }

    #[test]
    fn test_row_error_is_single_line() {
        let err = RowError::new(7, "bad\nvalue");
        assert_eq!(err.to_string(), "Row 7: bad value");
    }
}
