//! The import session engine
//!
//! [`ImportEngine`] ties the session store, the staged files and the error
//! log of one workspace together and exposes the import lifecycle:
//! upload, preview, mapping, chunks, status, finish and cancel.

use chrono::Utc;
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::core::chunk::{ChunkLimits, ChunkProcessor};
use crate::core::config::Config;
use crate::core::encoding::{self, CharacterEncoding, DetectedEncoding};
use crate::core::error::ImportError;
use crate::core::error_log::{ErrorLog, ErrorPreview};
use crate::core::identity::SessionId;
use crate::core::mapping::{self, FieldSchema, MappedColumn, MappingRequest};
use crate::core::progress::{self, ProgressReport};
use crate::core::rows;
use crate::core::session::{ImportSession, SessionLease, SessionPhase, SessionStore};
use crate::core::sink::{ChunkTally, ImportHook, RecordSink, TrimValues};
use crate::core::upload::{self, UploadRequest};
use crate::core::workspace::Workspace;

/// Data rows shown by a preview
pub const PREVIEW_ROWS: usize = 6;

/// What the mapping screen needs to know about a staged file
#[derive(Debug, Clone)]
pub struct Preview {
    pub session_id: SessionId,
    pub source_name: String,
    pub detected: DetectedEncoding,
    pub encoding: CharacterEncoding,
    pub has_header: bool,
    /// Head of the file; empty when the requested decode looks wrong
    pub rows: Vec<Vec<String>>,
    pub column_count: usize,
    /// Data rows in the file, header included
    pub total_rows: u64,
    pub labels: Vec<String>,
    pub suggested: Vec<MappedColumn>,
}

impl Preview {
    /// Rows that will be imported
    pub fn data_rows(&self) -> u64 {
        self.total_rows.saturating_sub(u64::from(self.has_header))
    }
}

/// Summary shown once an import has finished
#[derive(Debug, Clone)]
pub struct CompletionSummary {
    pub session_id: SessionId,
    pub source_name: String,
    pub total: u64,
    pub imported: u64,
    pub added: u64,
    pub updated: u64,
    pub errors: ErrorPreview,
}

/// Drives imports of one type inside one workspace
pub struct ImportEngine {
    workspace: Workspace,
    config: Config,
    import_type: String,
    schema: FieldSchema,
    store: SessionStore,
    error_log: ErrorLog,
    hooks: Vec<Box<dyn ImportHook>>,
}

impl ImportEngine {
    /// Open the engine for an import type, falling back to the configured default
    pub fn open(
        workspace: Workspace,
        config: Config,
        import_type: Option<&str>,
    ) -> Result<Self, ImportError> {
        let import_type = config
            .resolve_type(import_type)
            .ok_or_else(|| ImportError::UnknownType(String::new()))?;
        let schema = config
            .schema(&import_type)
            .ok_or_else(|| ImportError::UnknownType(import_type.clone()))?;

        let store = SessionStore::open(&workspace.sessions_db(), config.session_ttl())?;
        store.purge_expired()?;

        let mut hooks: Vec<Box<dyn ImportHook>> = Vec::new();
        if config.trim_values() {
            hooks.push(Box::new(TrimValues));
        }

        let error_log = ErrorLog::new(workspace.error_log_path());
        Ok(Self {
            workspace,
            config,
            import_type,
            schema,
            store,
            error_log,
            hooks,
        })
    }

    /// Register a hook after the built-in ones
    pub fn with_hook(mut self, hook: impl ImportHook + 'static) -> Self {
        self.hooks.push(Box::new(hook));
        self
    }

    pub fn import_type(&self) -> &str {
        &self.import_type
    }

    pub fn schema(&self) -> &FieldSchema {
        &self.schema
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn error_log(&self) -> &ErrorLog {
        &self.error_log
    }

    /// Stage an upload and open a session for it
    ///
    /// When `supersedes` names an earlier session of this flow, that session
    /// and its staged file are dropped first.
    pub fn upload(
        &self,
        request: &UploadRequest,
        supersedes: Option<&SessionId>,
    ) -> Result<ImportSession, ImportError> {
        if let Some(old) = supersedes {
            if let Some(previous) = self.store.delete(old)? {
                remove_staged(&previous.source_file);
                info!(session = %old, "superseded by new upload");
            }
        }

        let uploads_dir = self.workspace.uploads_dir();
        let keep = self.store.live_source_files()?;
        upload::purge_staged(&uploads_dir, &keep, upload::STAGING_GRACE);
        let staged = upload::stage(request, &uploads_dir, self.config.max_upload_bytes())?;

        let session = ImportSession::new(&self.import_type, staged.path, staged.display_name);
        self.store.insert(&session)?;
        Ok(session)
    }

    /// Fetch a session of this engine's import type
    pub fn session(&self, id: &SessionId) -> Result<ImportSession, ImportError> {
        let session = self.store.get(id)?;
        self.check_type(&session)?;
        Ok(session)
    }

    /// Inspect the head of a staged file under a candidate encoding
    pub fn preview(
        &self,
        id: &SessionId,
        encoding: CharacterEncoding,
        has_header: bool,
    ) -> Result<Preview, ImportError> {
        let session = self.session(id)?;
        let path = &session.source_file;
        if !path.exists() {
            return Err(ImportError::transport(
                17,
                "Temporary file not found. Please start over from the beginning.",
            ));
        }

        let sample = encoding::read_sample(path)
            .map_err(|_| ImportError::transport(18, "Failed to read file. Please start over from the beginning."))?;
        let detected = encoding::detect(&sample);

        let rows = if encoding == CharacterEncoding::Sjis
            && !encoding::needs_transcode(encoding, detected)
        {
            debug!(session = %id, "sample is already UTF-8; skipping SJIS preview");
            Vec::new()
        } else {
            rows::head_rows(path, encoding, PREVIEW_ROWS)?
        };

        let column_count = rows.first().map(Vec::len).unwrap_or(0);
        let total_rows = rows::count_data_rows(path, encoding)?;
        let labels = column_labels(
            rows.first().filter(|_| has_header).map(Vec::as_slice),
            column_count,
        );
        let suggested = if has_header {
            mapping::suggest(&self.schema, &labels)
        } else {
            Vec::new()
        };

        Ok(Preview {
            session_id: session.id,
            source_name: session.source_name,
            detected,
            encoding,
            has_header,
            rows,
            column_count,
            total_rows,
            labels,
            suggested,
        })
    }

    /// Validate and freeze a column mapping, moving the session to processing
    pub fn confirm_mapping(
        &self,
        id: &SessionId,
        request: &MappingRequest,
    ) -> Result<ImportSession, ImportError> {
        let mut session = self.session(id)?;
        if session.phase != SessionPhase::Uploaded {
            return Err(ImportError::validation(
                39,
                "The column mapping of this session is already confirmed.",
            ));
        }
        if !session.source_file.exists() {
            return Err(ImportError::transport(
                21,
                "Temporary file not found. Please re-upload the CSV.",
            ));
        }

        let column_count = rows::head_rows(&session.source_file, request.encoding, 1)?
            .first()
            .map(Vec::len)
            .unwrap_or(0);
        let mapping = mapping::resolve(&self.schema, &request.assignments, column_count)?;

        let total_rows = rows::count_data_rows(&session.source_file, request.encoding)?;
        if total_rows <= u64::from(request.has_header) {
            return Err(ImportError::validation(
                34,
                "CSV file is empty. Please check the content.",
            ));
        }

        session.encoding = request.encoding;
        session.has_header = request.has_header;
        session.mapping = Some(mapping);
        session.total_rows = total_rows;
        session.row_offset = session.header_rows();
        session.rows_processed = 0;
        session.rows_inserted = 0;
        session.rows_updated = 0;
        session.started_at = Utc::now();
        session.resource_limits = progress::resource_limits();
        session.phase = SessionPhase::Processing;

        self.store.save(&session)?;
        self.error_log.truncate()?;

        info!(
            session = %id,
            rows = session.data_rows(),
            encoding = %session.encoding,
            "mapping confirmed"
        );
        Ok(session)
    }

    /// Advance a session by one chunk
    ///
    /// `client_offset` is the offset the caller last saw. It may lag the
    /// stored cursor (the stored one wins) but never lead it.
    pub fn process_chunk(
        &mut self,
        id: &SessionId,
        client_offset: Option<u64>,
        sink: &mut dyn RecordSink,
    ) -> Result<ProgressReport, ImportError> {
        let lease = self.store.lease(id, self.lease_hold())?;
        match self.run_leased(&lease, client_offset, sink) {
            Ok(Some((session, tally))) => {
                self.store.commit(lease, &session)?;
                for hook in self.hooks.iter_mut() {
                    hook.after_chunk(&session, &tally);
                }
                Ok(self.report(&session))
            }
            Ok(None) => {
                let report = self.report(&lease.session);
                self.store.release(lease)?;
                Ok(report)
            }
            Err(e) => {
                if let Err(release_err) = self.store.release(lease) {
                    warn!(session = %id, error = %release_err, "could not release session lease");
                }
                Err(e)
            }
        }
    }

    /// Run the chunk for a leased session; `None` when nothing was left to do
    ///
    /// The `after_chunk` hooks are not run here: they only see chunks that
    /// were committed.
    fn run_leased(
        &mut self,
        lease: &SessionLease,
        client_offset: Option<u64>,
        sink: &mut dyn RecordSink,
    ) -> Result<Option<(ImportSession, ChunkTally)>, ImportError> {
        let stored = &lease.session;
        self.check_type(stored)?;
        if stored.phase == SessionPhase::Uploaded {
            return Err(ImportError::validation(
                40,
                "Column mapping has not been confirmed.",
            ));
        }

        if let Some(requested) = client_offset {
            if requested > stored.row_offset {
                return Err(ImportError::OffsetAhead {
                    requested,
                    stored: stored.row_offset,
                });
            }
            if requested < stored.row_offset {
                debug!(
                    session = %stored.id,
                    requested,
                    stored = stored.row_offset,
                    "client offset is stale; resuming from the stored cursor"
                );
            }
        }

        if stored.is_complete() {
            return Ok(None);
        }

        let limits = ChunkLimits {
            max_rows: self.config.chunk_rows(),
            budget: self.config.chunk_budget(),
        };
        let mut session = stored.clone();
        let outcome =
            ChunkProcessor::new(limits, sink, &mut self.hooks, &self.error_log).run(&mut session)?;

        if session.phase == SessionPhase::Completed {
            info!(
                session = %session.id,
                processed = session.rows_processed,
                inserted = session.rows_inserted,
                updated = session.rows_updated,
                "import complete"
            );
        }
        Ok(Some((session, outcome.tally)))
    }

    /// Current progress of a session
    pub fn status(&self, id: &SessionId) -> Result<ProgressReport, ImportError> {
        let session = self.session(id)?;
        Ok(self.report(&session))
    }

    /// Close out a completed import
    ///
    /// The session itself stays until its TTL runs out. Its staged file goes,
    /// along with settled staged files no live import needs.
    pub fn finish(&self, id: &SessionId) -> Result<CompletionSummary, ImportError> {
        let session = self.session(id)?;
        if !session.is_complete() {
            return Err(ImportError::validation(
                41,
                format!(
                    "The import is still running ({} of {} rows).",
                    session.rows_consumed(),
                    session.data_rows()
                ),
            ));
        }

        self.error_log.finalize()?;
        let errors = self.error_log.preview(self.config.error_preview_lines())?;

        remove_staged(&session.source_file);
        let keep = self.store.live_source_files()?;
        upload::purge_staged(&self.workspace.uploads_dir(), &keep, upload::STAGING_GRACE);

        Ok(CompletionSummary {
            session_id: session.id,
            total: session.data_rows(),
            imported: session.rows_processed,
            added: session.rows_inserted,
            updated: session.rows_updated,
            source_name: session.source_name,
            errors,
        })
    }

    /// Drop a session and its staged file
    pub fn cancel(&self, id: &SessionId) -> Result<ImportSession, ImportError> {
        let session = self.session(id)?;
        self.store.delete(id)?;
        remove_staged(&session.source_file);
        info!(session = %id, "import cancelled");
        Ok(session)
    }

    fn check_type(&self, session: &ImportSession) -> Result<(), ImportError> {
        if session.import_type != self.import_type {
            return Err(ImportError::TypeMismatch {
                expected: session.import_type.clone(),
                actual: self.import_type.clone(),
            });
        }
        Ok(())
    }

    fn report(&self, session: &ImportSession) -> ProgressReport {
        ProgressReport::from_session(session, Utc::now(), progress::memory_usage())
    }

    /// How long a chunk lease lives before another request may take over
    fn lease_hold(&self) -> Duration {
        self.config.chunk_budget() * 2 + Duration::from_secs(30)
    }
}

/// Header cells as labels, `Column N` where a cell is empty or there is no header
fn column_labels(header: Option<&[String]>, column_count: usize) -> Vec<String> {
    (0..column_count)
        .map(|i| {
            header
                .and_then(|cells| cells.get(i))
                .map(|cell| cell.trim())
                .filter(|cell| !cell.is_empty())
                .map(str::to_string)
                .unwrap_or_else(|| format!("Column {}", i + 1))
        })
        .collect()
}

fn remove_staged(path: &Path) {
    if path.exists() {
        if let Err(e) = fs::remove_file(path) {
            warn!(path = %path.display(), error = %e, "could not remove staged csv");
        }
    }
}
