//! Streaming CSV row access
//!
//! Counting, skipping and processing all go through [`RowReader`], so a row
//! is classified as data or blank in exactly one place. Offsets stored on a
//! session count data rows (the header included), never raw lines.

use csv::{ByteRecord, ReaderBuilder};
use std::io::Read;
use std::path::Path;

use crate::core::encoding::{self, CharacterEncoding};
use crate::core::error::ImportError;

const BOM: char = '\u{FEFF}';

/// A data row read from the canonical CSV
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRow {
    /// Line on which the row starts (1-based)
    pub line: u64,
    pub values: Vec<String>,
}

/// A row is data when at least one field is non-empty
pub fn is_data_row(values: &[String]) -> bool {
    values.iter().any(|v| !v.is_empty())
}

/// Sequential reader yielding only data rows
pub struct RowReader<R: Read> {
    reader: csv::Reader<R>,
    record: ByteRecord,
    at_start: bool,
}

impl RowReader<Box<dyn Read + Send>> {
    /// Open a canonical CSV, decoding it with the session encoding
    pub fn open(path: &Path, encoding: CharacterEncoding) -> Result<Self, ImportError> {
        let source = encoding::open_decoded(path, encoding).map_err(|e| ImportError::io(path, e))?;
        Ok(Self::new(source))
    }
}

impl<R: Read> RowReader<R> {
    pub fn new(source: R) -> Self {
        let reader = ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(source);
        Self {
            reader,
            record: ByteRecord::new(),
            at_start: true,
        }
    }

    /// Read the next data row, passing over blank ones
    pub fn next_row(&mut self) -> Result<Option<SourceRow>, ImportError> {
        loop {
            if !self.reader.read_byte_record(&mut self.record)? {
                return Ok(None);
            }

            let mut values: Vec<String> = self
                .record
                .iter()
                .map(|field| String::from_utf8_lossy(field).into_owned())
                .collect();

            if std::mem::take(&mut self.at_start) {
                if let Some(first) = values.first_mut() {
                    if first.starts_with(BOM) {
                        *first = first.trim_start_matches(BOM).to_string();
                    }
                }
            }

            if !is_data_row(&values) {
                continue;
            }

            let line = self.record.position().map(|p| p.line()).unwrap_or(0);
            return Ok(Some(SourceRow { line, values }));
        }
    }

    /// Advance past up to `n` data rows, returning how many were skipped
    pub fn skip(&mut self, n: u64) -> Result<u64, ImportError> {
        let mut skipped = 0;
        while skipped < n {
            if self.next_row()?.is_none() {
                break;
            }
            skipped += 1;
        }
        Ok(skipped)
    }

    /// Consume the rest of the stream, counting data rows
    pub fn count_remaining(&mut self) -> Result<u64, ImportError> {
        let mut count = 0;
        while self.next_row()?.is_some() {
            count += 1;
        }
        Ok(count)
    }
}

/// Count the data rows of a file in one streaming pass
pub fn count_data_rows(path: &Path, encoding: CharacterEncoding) -> Result<u64, ImportError> {
    RowReader::open(path, encoding)?.count_remaining()
}

/// Read up to `limit` data rows from the head of a file
pub fn head_rows(
    path: &Path,
    encoding: CharacterEncoding,
    limit: usize,
) -> Result<Vec<Vec<String>>, ImportError> {
    let mut reader = RowReader::open(path, encoding)?;
    let mut rows = Vec::with_capacity(limit);
    while rows.len() < limit {
        match reader.next_row()? {
            Some(row) => rows.push(row.values),
            None => break,
        }
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn reader(text: &str) -> RowReader<Cursor<Vec<u8>>> {
        RowReader::new(Cursor::new(text.as_bytes().to_vec()))
    }

    #[test]
    fn test_blank_rows_are_not_data() {
        let mut r = reader("a,b\n\n,,\n1,2\n");
        assert_eq!(r.count_remaining().unwrap(), 2);
    }

    #[test]
    fn test_quoted_newlines_stay_in_one_row() {
        let mut r = reader("code,note\n1,\"two\nlines\"\n2,x\n");
        let _header = r.next_row().unwrap().unwrap();
        let row = r.next_row().unwrap().unwrap();
        assert_eq!(row.values, vec!["1", "two\nlines"]);
        assert_eq!(row.line, 2);
        let row = r.next_row().unwrap().unwrap();
        assert_eq!(row.line, 4);
        assert!(r.next_row().unwrap().is_none());
    }

    #[test]
    fn test_bom_stripped_from_first_field_only() {
        let mut r = reader("\u{FEFF}code,name\n\u{FEFF}x,y\n");
        assert_eq!(r.next_row().unwrap().unwrap().values[0], "code");
        assert_eq!(r.next_row().unwrap().unwrap().values[0], "\u{FEFF}x");
    }

    #[test]
    fn test_bom_only_first_row_is_blank() {
        let mut r = reader("\u{FEFF}\n1,2\n");
        assert_eq!(r.count_remaining().unwrap(), 1);
    }

    #[test]
    fn test_skip_uses_data_rows() {
        let mut r = reader("h\n\n1\n\n2\n3\n");
        assert_eq!(r.skip(2).unwrap(), 2);
        assert_eq!(r.next_row().unwrap().unwrap().values, vec!["2"]);
        assert_eq!(r.skip(10).unwrap(), 1);
    }

    #[test]
    fn test_ragged_rows_are_accepted() {
        let mut r = reader("a,b,c\n1\n1,2,3,4\n");
        assert_eq!(r.count_remaining().unwrap(), 3);
    }

    #[test]
    fn test_count_and_head_from_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("in.csv");
        std::fs::write(&path, "h1,h2\n\n1,a\n2,b\n3,c\n").unwrap();

        assert_eq!(count_data_rows(&path, CharacterEncoding::Utf8).unwrap(), 4);
        let head = head_rows(&path, CharacterEncoding::Utf8, 2).unwrap();
        assert_eq!(head, vec![vec!["h1", "h2"], vec!["1", "a"]]);
    }

    #[test]
    fn test_count_sjis_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("sjis.csv");
        let (bytes, _, _) = encoding_rs::SHIFT_JIS.encode("コード,名前\n1,りんご\n");
        std::fs::write(&path, bytes).unwrap();

        let head = head_rows(&path, CharacterEncoding::Sjis, 6).unwrap();
        assert_eq!(head[1], vec!["1", "りんご"]);
        assert_eq!(count_data_rows(&path, CharacterEncoding::Sjis).unwrap(), 2);
    }
}
