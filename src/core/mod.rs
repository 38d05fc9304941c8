//! Core module - the import session engine and its building blocks

pub mod chunk;
pub mod config;
pub mod encoding;
pub mod engine;
pub mod error;
pub mod error_log;
pub mod identity;
pub mod mapping;
pub mod progress;
pub mod rows;
pub mod session;
pub mod sink;
pub mod upload;
pub mod workspace;

pub use chunk::{ChunkLimits, ChunkOutcome, ChunkProcessor};
pub use config::Config;
pub use encoding::{CharacterEncoding, DetectedEncoding};
pub use engine::{CompletionSummary, ImportEngine, Preview};
pub use error::{ImportError, RowError};
pub use error_log::{ErrorLog, ErrorPreview};
pub use identity::{SessionId, SessionIdError};
pub use mapping::{ColumnMapping, FieldDef, FieldSchema, MappingRequest};
pub use progress::ProgressReport;
pub use session::{ImportSession, SessionPhase, SessionStore, StoreError};
pub use sink::{ImportHook, MappedRow, RecordSink, RowOutcome, TrimValues};
pub use upload::{TransportStatus, UploadRequest};
pub use workspace::{Workspace, WorkspaceError};
