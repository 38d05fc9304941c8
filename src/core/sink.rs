//! Record sink contract and row hooks
//!
//! The engine never persists rows itself. Each mapped row is handed to a
//! [`RecordSink`], which reports what it did with it. Hooks registered on the
//! engine run around every chunk and may rewrite rows before the sink sees
//! them.

use crate::core::session::ImportSession;

/// What the sink did with one row
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowOutcome {
    Inserted,
    Updated,
    /// Accepted but nothing changed
    Skipped,
    Failed(String),
}

/// A source row after the column mapping was applied
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappedRow {
    /// Line in the source where the row starts
    pub line: u64,
    /// Field key and raw value, in schema order
    pub fields: Vec<(String, String)>,
}

impl MappedRow {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Persists mapped rows
///
/// Must tolerate seeing the same logical row again after a resume.
pub trait RecordSink {
    fn apply(&mut self, row: &MappedRow) -> RowOutcome;
}

impl<F> RecordSink for F
where
    F: FnMut(&MappedRow) -> RowOutcome,
{
    fn apply(&mut self, row: &MappedRow) -> RowOutcome {
        self(row)
    }
}

/// Tally of one chunk, handed to [`ImportHook::after_chunk`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChunkTally {
    pub processed: u64,
    pub inserted: u64,
    pub updated: u64,
    pub skipped: u64,
    pub failed: u64,
}

impl ChunkTally {
    pub fn record(&mut self, outcome: &RowOutcome) {
        self.processed += 1;
        match outcome {
            RowOutcome::Inserted => self.inserted += 1,
            RowOutcome::Updated => self.updated += 1,
            RowOutcome::Skipped => self.skipped += 1,
            RowOutcome::Failed(_) => self.failed += 1,
        }
    }
}

/// Pre- and post-processing around chunks, run in registration order
pub trait ImportHook {
    fn before_chunk(&mut self, _session: &ImportSession) {}

    /// Rewrite a row before it reaches the sink; an error fails the row
    fn prepare_row(&mut self, _row: &mut MappedRow) -> Result<(), String> {
        Ok(())
    }

    fn after_chunk(&mut self, _session: &ImportSession, _tally: &ChunkTally) {}
}

/// Strips surrounding whitespace from every mapped value
#[derive(Debug, Default)]
pub struct TrimValues;

impl ImportHook for TrimValues {
    fn prepare_row(&mut self, row: &mut MappedRow) -> Result<(), String> {
        for (_, value) in row.fields.iter_mut() {
            let trimmed = value.trim();
            if trimmed.len() != value.len() {
                *value = trimmed.to_string();
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row() -> MappedRow {
        MappedRow {
            line: 3,
            fields: vec![
                ("code".to_string(), " A1 ".to_string()),
                ("name".to_string(), "Apple".to_string()),
            ],
        }
    }

    #[test]
    fn test_closure_is_a_sink() {
        let mut seen = Vec::new();
        let mut sink = |row: &MappedRow| {
            seen.push(row.line);
            RowOutcome::Inserted
        };
        assert_eq!(sink.apply(&row()), RowOutcome::Inserted);
        assert_eq!(seen, vec![3]);
    }

    #[test]
    fn test_trim_hook() {
        let mut r = row();
        TrimValues.prepare_row(&mut r).unwrap();
        assert_eq!(r.get("code"), Some("A1"));
        assert_eq!(r.get("name"), Some("Apple"));
        assert_eq!(r.get("price"), None);
    }

    #[test]
    fn test_tally_counts_every_outcome_as_processed() {
        let mut tally = ChunkTally::default();
        tally.record(&RowOutcome::Inserted);
        tally.record(&RowOutcome::Failed("bad".to_string()));
        tally.record(&RowOutcome::Skipped);
        assert_eq!(tally.processed, 3);
        assert_eq!(tally.inserted + tally.updated, 1);
        assert_eq!(tally.failed, 1);
    }
}
