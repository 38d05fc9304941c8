//! The chunk loop
//!
//! One call resumes the cursor at the session's offset, feeds mapped rows to
//! the record sink until a row or time bound is hit, and returns the session
//! with its offset and counters advanced. Persisting the result, and running
//! the `after_chunk` hooks once it is persisted, is the caller's job.

use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::core::error::{ImportError, RowError};
use crate::core::error_log::ErrorLog;
use crate::core::rows::RowReader;
use crate::core::session::{ImportSession, SessionPhase};
use crate::core::sink::{ChunkTally, ImportHook, MappedRow, RecordSink, RowOutcome};

/// Bounds on the work done by one chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkLimits {
    pub max_rows: usize,
    pub budget: Duration,
}

impl Default for ChunkLimits {
    fn default() -> Self {
        Self {
            max_rows: 100,
            budget: Duration::from_secs(20),
        }
    }
}

/// What one chunk did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkOutcome {
    pub start_offset: u64,
    pub next_offset: u64,
    pub tally: ChunkTally,
    /// The stream ended before the expected row count
    pub truncated: bool,
}

/// Runs chunks against a record sink and hook chain
pub struct ChunkProcessor<'a> {
    limits: ChunkLimits,
    sink: &'a mut dyn RecordSink,
    hooks: &'a mut [Box<dyn ImportHook>],
    error_log: &'a ErrorLog,
}

impl<'a> ChunkProcessor<'a> {
    pub fn new(
        limits: ChunkLimits,
        sink: &'a mut dyn RecordSink,
        hooks: &'a mut [Box<dyn ImportHook>],
        error_log: &'a ErrorLog,
    ) -> Self {
        Self {
            limits,
            sink,
            hooks,
            error_log,
        }
    }

    /// Process one chunk, advancing `session` in place
    pub fn run(&mut self, session: &mut ImportSession) -> Result<ChunkOutcome, ImportError> {
        let mapping = session.mapping.clone().ok_or_else(|| {
            ImportError::validation(40, "Column mapping has not been confirmed.")
        })?;

        if !session.source_file.exists() {
            return Err(ImportError::transport(
                21,
                "CSV file not found. Please re-upload the CSV.",
            ));
        }

        // The budget covers seeking to the offset as well as the rows
        let started = Instant::now();
        let start_offset = session.row_offset;
        let mut reader = RowReader::open(&session.source_file, session.encoding)?;
        let skipped = reader.skip(start_offset)?;

        let mut tally = ChunkTally::default();
        let mut offset = skipped;
        let mut truncated = skipped < start_offset;

        for hook in self.hooks.iter_mut() {
            hook.before_chunk(session);
        }

        while !truncated && offset < session.total_rows {
            if tally.processed as usize >= self.limits.max_rows {
                break;
            }
            if tally.processed > 0 && started.elapsed() >= self.limits.budget {
                debug!(session = %session.id, "chunk time budget exhausted");
                break;
            }

            let Some(source) = reader.next_row()? else {
                truncated = true;
                break;
            };
            offset += 1;

            let mut row = MappedRow {
                line: source.line,
                fields: mapping.apply(&source.values),
            };
            let outcome = self.apply_row(&mut row);
            if let RowOutcome::Failed(reason) = &outcome {
                warn!(session = %session.id, line = row.line, reason = %reason, "row failed");
                self.error_log.append(&RowError::new(row.line, reason.clone()))?;
            }
            tally.record(&outcome);
        }

        if truncated {
            warn!(
                session = %session.id,
                expected = session.total_rows,
                found = offset,
                "source ended early; closing the import at the rows found"
            );
            session.total_rows = offset;
        }

        session.row_offset = offset;
        session.rows_processed += tally.processed;
        session.rows_inserted += tally.inserted;
        session.rows_updated += tally.updated;
        if session.row_offset >= session.total_rows {
            session.phase = SessionPhase::Completed;
        }

        debug!(
            session = %session.id,
            from = start_offset,
            to = offset,
            processed = tally.processed,
            "chunk processed"
        );

        Ok(ChunkOutcome {
            start_offset,
            next_offset: offset,
            tally,
            truncated,
        })
    }

    fn apply_row(&mut self, row: &mut MappedRow) -> RowOutcome {
        for hook in self.hooks.iter_mut() {
            if let Err(reason) = hook.prepare_row(row) {
                return RowOutcome::Failed(reason);
            }
        }
        self.sink.apply(row)
    }
}
