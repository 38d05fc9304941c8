//! Workspace-wide row error log

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use crate::core::error::{ImportError, RowError};

/// Line written to an empty log when an import finishes
pub const NO_ERRORS: &str = "No error.";

/// Append-only text log with one line per failed row
#[derive(Debug, Clone)]
pub struct ErrorLog {
    path: PathBuf,
}

/// The head of the log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorPreview {
    pub lines: Vec<String>,
    /// More lines follow the ones shown
    pub more: bool,
}

impl ErrorLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Empty the log, creating it if needed
    pub fn truncate(&self) -> Result<(), ImportError> {
        File::create(&self.path).map_err(|e| ImportError::io(&self.path, e))?;
        Ok(())
    }

    pub fn append(&self, error: &RowError) -> Result<(), ImportError> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| ImportError::io(&self.path, e))?;
        writeln!(file, "{}", error).map_err(|e| ImportError::io(&self.path, e))
    }

    /// True when the log is missing or has no content
    pub fn is_empty(&self) -> bool {
        fs::metadata(&self.path).map(|m| m.len() == 0).unwrap_or(true)
    }

    /// Write the sentinel line into an empty log
    pub fn finalize(&self) -> Result<(), ImportError> {
        if self.is_empty() {
            fs::write(&self.path, format!("{}\n", NO_ERRORS))
                .map_err(|e| ImportError::io(&self.path, e))?;
        }
        Ok(())
    }

    /// Read at most `limit` lines from the head of the log
    ///
    /// A missing log reads as empty.
    pub fn preview(&self, limit: usize) -> Result<ErrorPreview, ImportError> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Ok(ErrorPreview {
                    lines: Vec::new(),
                    more: false,
                })
            }
            Err(e) => return Err(ImportError::io(&self.path, e)),
        };

        let mut lines = Vec::new();
        let mut more = false;
        for line in BufReader::new(file).lines() {
            let line = line.map_err(|e| ImportError::io(&self.path, e))?;
            if line.is_empty() {
                continue;
            }
            if lines.len() == limit {
                more = true;
                break;
            }
            lines.push(line);
        }
        Ok(ErrorPreview { lines, more })
    }

    /// Copy the raw log bytes to a writer
    pub fn export<W: Write>(&self, out: &mut W) -> Result<u64, ImportError> {
        let mut file = File::open(&self.path).map_err(|e| ImportError::io(&self.path, e))?;
        io::copy(&mut file, out).map_err(|e| ImportError::io(&self.path, e))
    }

    pub fn export_to(&self, target: &Path) -> Result<u64, ImportError> {
        let mut out = File::create(target).map_err(|e| ImportError::io(target, e))?;
        self.export(&mut out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_append_and_preview() {
        let tmp = tempdir().unwrap();
        let log = ErrorLog::new(tmp.path().join("log.txt"));
        log.truncate().unwrap();
        log.append(&RowError::new(2, "missing code")).unwrap();
        log.append(&RowError::new(5, "bad price")).unwrap();

        let preview = log.preview(50).unwrap();
        assert_eq!(preview.lines, vec!["Row 2: missing code", "Row 5: bad price"]);
        assert!(!preview.more);
    }

    #[test]
    fn test_preview_is_capped() {
        let tmp = tempdir().unwrap();
        let log = ErrorLog::new(tmp.path().join("log.txt"));
        for line in 1..=3 {
            log.append(&RowError::new(line, "x")).unwrap();
        }
        let preview = log.preview(2).unwrap();
        assert_eq!(preview.lines.len(), 2);
        assert!(preview.more);
    }

    #[test]
    fn test_truncate_clears() {
        let tmp = tempdir().unwrap();
        let log = ErrorLog::new(tmp.path().join("log.txt"));
        log.append(&RowError::new(1, "x")).unwrap();
        log.truncate().unwrap();
        assert!(log.is_empty());
    }

    #[test]
    fn test_finalize_writes_sentinel_only_when_empty() {
        let tmp = tempdir().unwrap();
        let log = ErrorLog::new(tmp.path().join("log.txt"));
        log.finalize().unwrap();
        assert_eq!(log.preview(50).unwrap().lines, vec![NO_ERRORS]);

        log.truncate().unwrap();
        log.append(&RowError::new(4, "x")).unwrap();
        log.finalize().unwrap();
        assert_eq!(log.preview(50).unwrap().lines, vec!["Row 4: x"]);
    }

    #[test]
    fn test_missing_log_previews_empty() {
        let tmp = tempdir().unwrap();
        let log = ErrorLog::new(tmp.path().join("absent.txt"));
        assert!(log.preview(10).unwrap().lines.is_empty());
        assert!(log.export(&mut Vec::new()).is_err());
    }

    #[test]
    fn test_export_copies_bytes() {
        let tmp = tempdir().unwrap();
        let log = ErrorLog::new(tmp.path().join("log.txt"));
        log.append(&RowError::new(9, "boom")).unwrap();
        let mut out = Vec::new();
        let written = log.export(&mut out).unwrap();
        assert_eq!(out, b"Row 9: boom\n");
        assert_eq!(written, 12);
    }
}
