//! Import workspace discovery and structure

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Name of the directory that marks a workspace root
pub const WORKSPACE_DIR: &str = ".csvimp";

/// Represents an import workspace
#[derive(Debug, Clone)]
pub struct Workspace {
    /// Root directory of the workspace (parent of .csvimp/)
    root: PathBuf,
}

impl Workspace {
    /// Find workspace root by walking up from the current directory
    pub fn discover() -> Result<Self, WorkspaceError> {
        let current = std::env::current_dir().map_err(|e| WorkspaceError::IoError(e.to_string()))?;
        Self::discover_from(&current)
    }

    /// Find workspace root by walking up from the given directory
    pub fn discover_from(start: &Path) -> Result<Self, WorkspaceError> {
        let mut current = start
            .canonicalize()
            .map_err(|e| WorkspaceError::IoError(e.to_string()))?;

        loop {
            if current.join(WORKSPACE_DIR).is_dir() {
                return Ok(Self { root: current });
            }

            if !current.pop() {
                return Err(WorkspaceError::NotFound {
                    searched_from: start.to_path_buf(),
                });
            }
        }
    }

    /// Open a workspace at an explicit root without walking up
    pub fn open(root: &Path) -> Result<Self, WorkspaceError> {
        let root = root
            .canonicalize()
            .map_err(|e| WorkspaceError::IoError(e.to_string()))?;
        if !root.join(WORKSPACE_DIR).is_dir() {
            return Err(WorkspaceError::NotFound {
                searched_from: root,
            });
        }
        let workspace = Self { root };
        workspace.ensure_layout()?;
        Ok(workspace)
    }

    /// Create a new workspace structure at the given path
    pub fn init(path: &Path) -> Result<Self, WorkspaceError> {
        let root = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());

        if root.join(WORKSPACE_DIR).exists() {
            return Err(WorkspaceError::AlreadyExists(root));
        }

        Self::create_layout(root)
    }

    /// Force initialization even if .csvimp/ exists
    ///
    /// Staged uploads and stored sessions are kept; only the config is rewritten.
    pub fn init_force(path: &Path) -> Result<Self, WorkspaceError> {
        let root = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        Self::create_layout(root)
    }

    fn create_layout(root: PathBuf) -> Result<Self, WorkspaceError> {
        let workspace = Self { root };
        workspace.ensure_layout()?;

        std::fs::write(workspace.config_path(), Self::default_config())
            .map_err(|e| WorkspaceError::IoError(e.to_string()))?;

        Ok(workspace)
    }

    fn ensure_layout(&self) -> Result<(), WorkspaceError> {
        std::fs::create_dir_all(self.uploads_dir())
            .map_err(|e| WorkspaceError::IoError(e.to_string()))
    }

    fn default_config() -> &'static str {
        r#"# csvimp workspace configuration

# Rows handed to the record sink per chunk
chunk_rows: 100

# Wall-clock budget per chunk, in seconds
chunk_seconds: 20

# Minutes of inactivity before an import session expires
session_ttl_minutes: 30

# Error log lines shown in the completion summary
error_preview_lines: 50

# Largest accepted upload, in megabytes
max_upload_mb: 64

# Trim surrounding whitespace from every mapped value
trim_values: false

default_type: item

types:
  item:
    title: Item Import
    columns:
      - { key: code, label: Item code }
      - { key: name, label: Item name }
      - { key: price, label: Price }
    meta_fields:
      - { key: note, label: Note }
"#
    }

    /// Get the workspace root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Get the .csvimp directory
    pub fn data_dir(&self) -> PathBuf {
        self.root.join(WORKSPACE_DIR)
    }

    /// Workspace configuration file
    pub fn config_path(&self) -> PathBuf {
        self.data_dir().join("config.yaml")
    }

    /// Directory holding staged canonical CSVs
    pub fn uploads_dir(&self) -> PathBuf {
        self.data_dir().join("uploads")
    }

    /// SQLite database backing the import session store
    pub fn sessions_db(&self) -> PathBuf {
        self.data_dir().join("sessions.db")
    }

    /// SQLite database backing the bundled record table
    pub fn records_db(&self) -> PathBuf {
        self.data_dir().join("records.db")
    }

    /// Workspace-wide row error log
    pub fn error_log_path(&self) -> PathBuf {
        self.data_dir().join("csv-error-log.txt")
    }

    /// Iterate staged CSV files in the uploads directory
    pub fn staged_csv_files(&self) -> impl Iterator<Item = PathBuf> {
        walkdir::WalkDir::new(self.uploads_dir())
            .max_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter(|e| {
                e.path()
                    .extension()
                    .map(|ext| ext.eq_ignore_ascii_case("csv"))
                    .unwrap_or(false)
            })
            .map(|e| e.path().to_path_buf())
    }
}

/// Errors that can occur during workspace operations
#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("not a csvimp workspace (searched from {searched_from:?}). Run 'csvimp init' to create one.")]
    NotFound { searched_from: PathBuf },

    #[error("csvimp workspace already exists at {0:?}")]
    AlreadyExists(PathBuf),

    #[error("IO error: {0}")]
    IoError(String),
}
