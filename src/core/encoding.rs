//! Source character encodings, sample detection and streaming decode
//!
//! Uploads arrive either as UTF-8 or as Shift_JIS with Windows extensions
//! (code page 932, which `encoding_rs::SHIFT_JIS` implements). The
//! encoding the user picks is authoritative; detection only decides whether
//! a requested Shift_JIS transcode is pointless because the sample is
//! already UTF-8.

use encoding_rs::{CoderResult, Decoder, DecoderResult, Encoding, EUC_JP, SHIFT_JIS, UTF_8};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use std::str::FromStr;

/// Bytes read from the head of a file for detection
pub const SAMPLE_SIZE: usize = 1000;

const READ_BUF_SIZE: usize = 8 * 1024;

/// Encoding a session decodes its CSV with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum CharacterEncoding {
    #[default]
    #[serde(rename = "UTF-8")]
    Utf8,
    #[serde(rename = "SJIS")]
    Sjis,
}

impl CharacterEncoding {
    pub fn as_str(&self) -> &'static str {
        match self {
            CharacterEncoding::Utf8 => "UTF-8",
            CharacterEncoding::Sjis => "SJIS",
        }
    }

    /// The decoder applied to the raw bytes, if any
    fn decoder(&self) -> Option<&'static Encoding> {
        match self {
            CharacterEncoding::Utf8 => None,
            CharacterEncoding::Sjis => Some(SHIFT_JIS),
        }
    }
}

impl fmt::Display for CharacterEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for CharacterEncoding {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "utf-8" | "utf8" => Ok(CharacterEncoding::Utf8),
            "sjis" | "shift-jis" | "sjis-win" | "cp932" | "windows-31j" => {
                Ok(CharacterEncoding::Sjis)
            }
            other => Err(format!(
                "unsupported encoding '{}' (supported: UTF-8, SJIS)",
                other
            )),
        }
    }
}

/// Best guess for the encoding of a byte sample
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DetectedEncoding {
    /// Only 7-bit bytes; every candidate decodes it identically
    Ascii,
    Utf8,
    ShiftJis,
    EucJp,
    /// More than one multi-byte candidate accepts the sample
    Ambiguous,
    /// No candidate accepts the sample
    Unknown,
}

impl DetectedEncoding {
    pub fn as_str(&self) -> &'static str {
        match self {
            DetectedEncoding::Ascii => "ASCII",
            DetectedEncoding::Utf8 => "UTF-8",
            DetectedEncoding::ShiftJis => "SJIS-win",
            DetectedEncoding::EucJp => "EUC-JP",
            DetectedEncoding::Ambiguous => "ambiguous",
            DetectedEncoding::Unknown => "unknown",
        }
    }
}

impl fmt::Display for DetectedEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Classify a byte sample
///
/// Multi-byte UTF-8 that validates is decisive: legacy Japanese text almost
/// never forms well-formed UTF-8. Otherwise exactly one of Shift_JIS and
/// EUC-JP must accept the sample. A multi-byte sequence cut off at the end
/// of the sample is tolerated.
pub fn detect(sample: &[u8]) -> DetectedEncoding {
    if let Some((encoding, _)) = Encoding::for_bom(sample) {
        if encoding == UTF_8 {
            return DetectedEncoding::Utf8;
        }
    }

    if sample.is_ascii() {
        return DetectedEncoding::Ascii;
    }

    if accepts(UTF_8, sample) {
        return DetectedEncoding::Utf8;
    }

    match (accepts(SHIFT_JIS, sample), accepts(EUC_JP, sample)) {
        (true, false) => DetectedEncoding::ShiftJis,
        (false, true) => DetectedEncoding::EucJp,
        (true, true) => DetectedEncoding::Ambiguous,
        (false, false) => DetectedEncoding::Unknown,
    }
}

/// Read the detection sample from the head of a file
pub fn read_sample(path: &Path) -> io::Result<Vec<u8>> {
    let file = File::open(path)?;
    let mut sample = Vec::with_capacity(SAMPLE_SIZE);
    file.take(SAMPLE_SIZE as u64).read_to_end(&mut sample)?;
    Ok(sample)
}

/// Whether decoding with `requested` is needed for a file whose sample was
/// detected as `detected`
pub fn needs_transcode(requested: CharacterEncoding, detected: DetectedEncoding) -> bool {
    requested == CharacterEncoding::Sjis && detected != DetectedEncoding::Utf8
}

fn accepts(encoding: &'static Encoding, sample: &[u8]) -> bool {
    let mut decoder = encoding.new_decoder_without_bom_handling();
    let Some(capacity) = decoder.max_utf8_buffer_length_without_replacement(sample.len()) else {
        return false;
    };
    let mut out = String::with_capacity(capacity);
    // `last = false` keeps a truncated trailing sequence from counting as malformed
    let (result, _read) = decoder.decode_to_string_without_replacement(sample, &mut out, false);
    matches!(result, DecoderResult::InputEmpty)
}

/// Open a file for reading as UTF-8 under the given encoding
pub fn open_decoded(path: &Path, encoding: CharacterEncoding) -> io::Result<Box<dyn Read + Send>> {
    let file = File::open(path)?;
    Ok(match encoding.decoder() {
        Some(enc) => Box::new(DecodingReader::new(file, enc)),
        None => Box::new(file),
    })
}

/// A `Read` adapter that transcodes its input to UTF-8 on the fly
///
/// Malformed input is replaced with U+FFFD so a damaged byte never stops an
/// import; the row containing it is still classified and counted.
pub struct DecodingReader<R> {
    inner: R,
    decoder: Decoder,
    raw: Vec<u8>,
    raw_pos: usize,
    raw_len: usize,
    out: Vec<u8>,
    out_pos: usize,
    out_len: usize,
    eof: bool,
    finished: bool,
}

impl<R: Read> DecodingReader<R> {
    pub fn new(inner: R, encoding: &'static Encoding) -> Self {
        Self {
            inner,
            decoder: encoding.new_decoder_without_bom_handling(),
            raw: vec![0; READ_BUF_SIZE],
            raw_pos: 0,
            raw_len: 0,
            // Room for the worst-case expansion of a full raw buffer
            out: vec![0; READ_BUF_SIZE * 3 + 16],
            out_pos: 0,
            out_len: 0,
            eof: false,
            finished: false,
        }
    }

    fn fill(&mut self) -> io::Result<()> {
        if self.raw_pos == self.raw_len && !self.eof {
            let n = self.inner.read(&mut self.raw)?;
            self.raw_pos = 0;
            self.raw_len = n;
            self.eof = n == 0;
        }

        let (result, read, written, _had_errors) = self.decoder.decode_to_utf8(
            &self.raw[self.raw_pos..self.raw_len],
            &mut self.out,
            self.eof,
        );
        self.raw_pos += read;
        self.out_pos = 0;
        self.out_len = written;

        if self.eof && self.raw_pos == self.raw_len && result == CoderResult::InputEmpty {
            self.finished = true;
        }
        Ok(())
    }
}

impl<R: Read> Read for DecodingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        loop {
            if self.out_pos < self.out_len {
                let n = buf.len().min(self.out_len - self.out_pos);
                buf[..n].copy_from_slice(&self.out[self.out_pos..self.out_pos + n]);
                self.out_pos += n;
                return Ok(n);
            }
            if self.finished {
                return Ok(0);
            }
            self.fill()?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn sjis(text: &str) -> Vec<u8> {
        let (bytes, _, had_errors) = SHIFT_JIS.encode(text);
        assert!(!had_errors);
        bytes.into_owned()
    }

    #[test]
    fn test_detect_ascii() {
        assert_eq!(detect(b"code,name\n1,apple\n"), DetectedEncoding::Ascii);
    }

    #[test]
    fn test_detect_utf8() {
        assert_eq!(detect("商品コード,商品名\n".as_bytes()), DetectedEncoding::Utf8);
    }

    #[test]
    fn test_detect_utf8_bom() {
        assert_eq!(detect(b"\xEF\xBB\xBFcode\n"), DetectedEncoding::Utf8);
    }

    #[test]
    fn test_detect_shift_jis() {
        let sample = sjis("商品コード,商品名,価格\n");
        assert_eq!(detect(&sample), DetectedEncoding::ShiftJis);
    }

    #[test]
    fn test_detect_tolerates_truncated_tail() {
        let mut sample = "コード".as_bytes().to_vec();
        sample.extend_from_slice(&"名".as_bytes()[..2]);
        assert_eq!(detect(&sample), DetectedEncoding::Utf8);
    }

    #[test]
    fn test_needs_transcode() {
        use CharacterEncoding::*;
        assert!(needs_transcode(Sjis, DetectedEncoding::ShiftJis));
        assert!(needs_transcode(Sjis, DetectedEncoding::Ascii));
        assert!(!needs_transcode(Sjis, DetectedEncoding::Utf8));
        assert!(!needs_transcode(Utf8, DetectedEncoding::ShiftJis));
    }

    #[test]
    fn test_encoding_from_str() {
        assert_eq!("utf-8".parse::<CharacterEncoding>().unwrap(), CharacterEncoding::Utf8);
        assert_eq!("UTF8".parse::<CharacterEncoding>().unwrap(), CharacterEncoding::Utf8);
        assert_eq!("SJIS".parse::<CharacterEncoding>().unwrap(), CharacterEncoding::Sjis);
        assert_eq!("shift_jis".parse::<CharacterEncoding>().unwrap(), CharacterEncoding::Sjis);
        assert!("latin1".parse::<CharacterEncoding>().is_err());
    }

    #[test]
    fn test_encoding_serde_names() {
        assert_eq!(serde_json::to_string(&CharacterEncoding::Sjis).unwrap(), "\"SJIS\"");
        assert_eq!(serde_json::to_string(&CharacterEncoding::Utf8).unwrap(), "\"UTF-8\"");
    }

    #[test]
    fn test_decoding_reader_transcodes() {
        let text = "コード,名前\n1,りんご\n";
        let mut reader = DecodingReader::new(Cursor::new(sjis(text)), SHIFT_JIS);
        let mut out = String::new();
        reader.read_to_string(&mut out).unwrap();
        assert_eq!(out, text);
    }

    #[test]
    fn test_decoding_reader_handles_tiny_reads() {
        let text = "価格,数量\n";
        let mut reader = DecodingReader::new(Cursor::new(sjis(text)), SHIFT_JIS);
        let mut out = Vec::new();
        let mut byte = [0u8; 1];
        while reader.read(&mut byte).unwrap() == 1 {
            out.push(byte[0]);
        }
        assert_eq!(String::from_utf8(out).unwrap(), text);
    }

    #[test]
    fn test_decoding_reader_spans_buffer_boundaries() {
        let text = "あ".repeat(READ_BUF_SIZE);
        let mut reader = DecodingReader::new(Cursor::new(sjis(&text)), SHIFT_JIS);
        let mut out = String::new();
        reader.read_to_string(&mut out).unwrap();
        assert_eq!(out, text);
    }

    #[test]
    fn test_decoding_reader_replaces_malformed() {
        let mut reader = DecodingReader::new(Cursor::new(vec![b'a', 0x82]), SHIFT_JIS);
        let mut out = String::new();
        reader.read_to_string(&mut out).unwrap();
        assert_eq!(out, "a\u{FFFD}");
    }
}
