//! Upload validation and staging
//!
//! An upload is either a CSV or a ZIP holding one CSV (plus at most one
//! folder entry). Either way it ends up as a single canonical CSV in the
//! uploads directory under a name no other staged file uses.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};
use zip::ZipArchive;

use crate::core::error::ImportError;

/// Most entries a ZIP upload may contain
pub const MAX_ZIP_ENTRIES: usize = 2;

/// Staged files younger than this survive a purge, so an upload still on
/// its way to a session is never collected
pub const STAGING_GRACE: Duration = Duration::from_secs(5 * 60);

/// Suffixes tried before giving up on a staged name
const MAX_NAME_ATTEMPTS: usize = 10_000;

/// Outcome of the transfer that delivered the upload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportStatus {
    Ok,
    SizeExceeded,
    FormSizeExceeded,
    Partial,
    NoFile,
    NoTempDir,
    CantWrite,
    Extension,
    Unknown(u16),
}

impl TransportStatus {
    /// Map a numeric transfer status as reported by an HTTP front-end
    pub fn from_code(code: u16) -> Self {
        match code {
            0 => TransportStatus::Ok,
            1 => TransportStatus::SizeExceeded,
            2 => TransportStatus::FormSizeExceeded,
            3 => TransportStatus::Partial,
            4 => TransportStatus::NoFile,
            6 => TransportStatus::NoTempDir,
            7 => TransportStatus::CantWrite,
            8 => TransportStatus::Extension,
            other => TransportStatus::Unknown(other),
        }
    }

    /// User-facing message, `None` when the transfer succeeded
    pub fn message(&self) -> Option<&'static str> {
        match self {
            TransportStatus::Ok => None,
            TransportStatus::SizeExceeded => Some("File size is too large."),
            TransportStatus::FormSizeExceeded => {
                Some("Exceeds maximum file size specified in the form.")
            }
            TransportStatus::Partial => Some("File was only partially uploaded."),
            TransportStatus::NoFile => Some("No file selected."),
            TransportStatus::NoTempDir => Some("Missing a temporary folder."),
            TransportStatus::CantWrite => Some("Failed to write file to disk."),
            TransportStatus::Extension => Some("File upload stopped by extension."),
            TransportStatus::Unknown(_) => Some("An unknown error occurred."),
        }
    }
}

/// A raw upload waiting to be staged
#[derive(Debug, Clone)]
pub struct UploadRequest {
    /// Name the user gave the file
    pub file_name: String,
    /// Where the transfer left the bytes
    pub temp_path: PathBuf,
    pub declared_size: u64,
    pub status: TransportStatus,
}

impl UploadRequest {
    /// Describe a local file as an upload
    pub fn from_path(path: &Path) -> Self {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let (declared_size, status) = match fs::metadata(path) {
            Ok(meta) if meta.is_file() => (meta.len(), TransportStatus::Ok),
            _ => (0, TransportStatus::NoFile),
        };
        Self {
            file_name,
            temp_path: path.to_path_buf(),
            declared_size,
            status,
        }
    }
}

/// A canonical CSV ready for a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedUpload {
    pub path: PathBuf,
    pub display_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UploadKind {
    Csv,
    Zip,
}

/// Validate an upload and stage it as a canonical CSV
pub fn stage(
    request: &UploadRequest,
    uploads_dir: &Path,
    max_bytes: u64,
) -> Result<StagedUpload, ImportError> {
    if let Some(message) = request.status.message() {
        return Err(ImportError::transport(8, message));
    }
    if request.declared_size > max_bytes {
        return Err(ImportError::transport(8, "File size is too large."));
    }

    let file_name = sanitize_file_name(&request.file_name);
    if file_name.is_empty() {
        return Err(ImportError::transport(9, "Failed to get file name."));
    }
    let kind = upload_kind(&file_name)
        .ok_or_else(|| ImportError::format(9, "Please specify a CSV or ZIP file."))?;

    let save_failed = || ImportError::transport(9, "Failed to save file.");
    let (stored, mut out) = create_unique(uploads_dir, &file_name).map_err(|_| save_failed())?;
    let copied = File::open(&request.temp_path).and_then(|mut src| io::copy(&mut src, &mut out));
    drop(out);
    if copied.is_err() {
        if let Err(e) = fs::remove_file(&stored) {
            warn!(path = %stored.display(), error = %e, "could not remove partial upload");
        }
        return Err(save_failed());
    }

    match kind {
        UploadKind::Csv => Ok(StagedUpload {
            path: stored,
            display_name: file_name,
        }),
        UploadKind::Zip => {
            let extracted = extract_csv(&stored, uploads_dir);
            if let Err(e) = fs::remove_file(&stored) {
                warn!(path = %stored.display(), error = %e, "could not remove uploaded archive");
            }
            extracted
        }
    }
}

/// Pull the single CSV out of an archive
fn extract_csv(archive_path: &Path, uploads_dir: &Path) -> Result<StagedUpload, ImportError> {
    let file = File::open(archive_path).map_err(|e| ImportError::io(archive_path, e))?;
    let mut archive =
        ZipArchive::new(file).map_err(|_| ImportError::format(13, "Unable to open ZIP file."))?;

    if archive.len() > MAX_ZIP_ENTRIES {
        return Err(ImportError::format(30, "Too many files in ZIP."));
    }

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|_| ImportError::format(13, "Unable to open ZIP file."))?;

        // A folder marker is the one extra entry allowed next to the CSV
        if entry.is_dir() {
            continue;
        }

        let entry_name = entry.name().to_string();
        let base_name = Path::new(&entry_name)
            .file_name()
            .map(|n| sanitize_file_name(&n.to_string_lossy()))
            .unwrap_or_default();
        if upload_kind(&base_name) != Some(UploadKind::Csv) {
            return Err(ImportError::format(31, "CSV file not found in ZIP."));
        }

        let written = create_unique(uploads_dir, &base_name)
            .and_then(|(target, mut out)| io::copy(&mut entry, &mut out).map(|_| target));
        let target = match written {
            Ok(target) => target,
            Err(e) => {
                warn!(entry = %entry_name, error = %e, "zip extraction failed");
                return Err(ImportError::format(15, "Failed to extract CSV file from ZIP."));
            }
        };

        debug!(entry = %entry_name, target = %target.display(), "extracted csv from zip");
        return Ok(StagedUpload {
            path: target,
            display_name: base_name,
        });
    }

    Err(ImportError::format(12, "CSV file not found in ZIP."))
}

fn upload_kind(file_name: &str) -> Option<UploadKind> {
    let ext = Path::new(file_name).extension()?.to_string_lossy().to_lowercase();
    match ext.as_str() {
        "csv" => Some(UploadKind::Csv),
        "zip" => Some(UploadKind::Zip),
        _ => None,
    }
}

/// Reduce a client-supplied name to a safe base name
pub fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .filter_map(|c| match c {
            c if c.is_alphanumeric() => Some(c),
            '.' | '-' | '_' => Some(c),
            c if c.is_whitespace() => Some('-'),
            _ => None,
        })
        .collect();
    cleaned.trim_start_matches('.').to_string()
}

/// Create a file in `dir` for `file_name` under a name no other file holds
///
/// Collisions get a numeric suffix before the extension: `data-1.csv`. The
/// name is claimed with `create_new`, so concurrent uploads of the same name
/// never share a file.
pub fn create_unique(dir: &Path, file_name: &str) -> io::Result<(PathBuf, File)> {
    let path = Path::new(file_name);
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = path.extension().map(|e| e.to_string_lossy().into_owned());

    for n in 0..MAX_NAME_ATTEMPTS {
        let candidate = match (n, &ext) {
            (0, _) => dir.join(file_name),
            (n, Some(ext)) => dir.join(format!("{}-{}.{}", stem, n, ext)),
            (n, None) => dir.join(format!("{}-{}", stem, n)),
        };
        match OpenOptions::new().write(true).create_new(true).open(&candidate) {
            Ok(file) => return Ok((candidate, file)),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e),
        }
    }
    Err(io::Error::new(
        io::ErrorKind::AlreadyExists,
        format!("no free name for {} in {}", file_name, dir.display()),
    ))
}

/// Delete staged CSVs that are not in `keep` and older than `min_age`,
/// returning how many went
pub fn purge_staged(uploads_dir: &Path, keep: &[PathBuf], min_age: Duration) -> usize {
    let mut removed = 0;
    let staged = walkdir::WalkDir::new(uploads_dir)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| upload_kind(&e.file_name().to_string_lossy()) == Some(UploadKind::Csv));

    for entry in staged {
        let path = entry.path();
        if keep.iter().any(|k| k == path) {
            continue;
        }
        let age = entry
            .metadata()
            .ok()
            .and_then(|m| m.modified().ok())
            .and_then(|t| t.elapsed().ok())
            .unwrap_or_default();
        if age < min_age {
            continue;
        }
        match fs::remove_file(path) {
            Ok(()) => removed += 1,
            Err(e) => warn!(path = %path.display(), error = %e, "could not remove staged csv"),
        }
    }
    if removed > 0 {
        debug!(removed, "purged staged csv files");
    }
    removed
}
