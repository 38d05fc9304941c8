//! Progress, ETA and resource reporting
//!
//! Everything here is derived from session state plus the clock. The memory
//! figures are diagnostic and never feed back into control flow.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;
use sysinfo::{Pid, ProcessesToUpdate, System};

use crate::core::session::{ImportSession, SessionPhase};

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// The chunk-advance response body
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgressReport {
    pub next_offset: u64,
    pub percent: u8,
    pub complete: bool,
    /// Data rows, header excluded
    pub total: u64,
    pub imported: u64,
    pub added: u64,
    pub updated: u64,
    pub estimated_time: String,
    pub memory_usage: String,
}

impl ProgressReport {
    pub fn from_session(session: &ImportSession, now: DateTime<Utc>, memory_usage: String) -> Self {
        let elapsed = (now - session.started_at).to_std().unwrap_or_default();
        let remaining = estimate_remaining(elapsed, session.row_offset, session.total_rows);
        // Nothing is counted until the mapping is confirmed
        let percent = match session.phase {
            SessionPhase::Uploaded => 0,
            _ => percent(session.row_offset, session.total_rows),
        };
        Self {
            next_offset: session.row_offset,
            percent,
            complete: session.is_complete(),
            total: session.data_rows(),
            imported: session.rows_processed,
            added: session.rows_inserted,
            updated: session.rows_updated,
            estimated_time: format_duration(remaining),
            memory_usage,
        }
    }
}

/// Whole percent of `offset` over `total`, capped at 100
pub fn percent(offset: u64, total: u64) -> u8 {
    if total == 0 {
        return 100;
    }
    let pct = (offset as u128 * 100) / total as u128;
    pct.min(100) as u8
}

/// Remaining time at the average pace so far
pub fn estimate_remaining(elapsed: Duration, offset: u64, total: u64) -> Duration {
    if offset == 0 || offset >= total {
        return Duration::ZERO;
    }
    let per_row = elapsed.as_secs_f64() / offset as f64;
    let secs = (per_row * (total - offset) as f64).round();
    Duration::from_secs(secs as u64)
}

/// Render as hours, minutes and seconds, omitting leading zero units
pub fn format_duration(duration: Duration) -> String {
    let total = duration.as_secs();
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;

    let mut out = String::new();
    if hours > 0 {
        out.push_str(&format!("{} hours ", hours));
    }
    if minutes > 0 {
        out.push_str(&format!("{} minutes ", minutes));
    }
    out.push_str(&format!("{} seconds", seconds));
    out
}

/// Format a byte count as megabytes with one decimal, e.g. `"12.3 M"`
pub fn format_megabytes(bytes: u64) -> String {
    format!("{:.1} M", bytes as f64 / BYTES_PER_MB)
}

/// Resident memory of the current process in bytes
pub fn process_memory() -> Option<u64> {
    let pid = Pid::from_u32(std::process::id());
    let mut system = System::new();
    system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
    system.process(pid).map(|process| process.memory())
}

/// Current process memory for display, `"-"` when unavailable
pub fn memory_usage() -> String {
    process_memory()
        .map(format_megabytes)
        .unwrap_or_else(|| "-".to_string())
}

/// Snapshot of system memory limits, stored on the session at mapping time
pub fn resource_limits() -> String {
    let mut system = System::new();
    system.refresh_memory();
    format!(
        "{} total, {} available",
        format_megabytes(system.total_memory()),
        format_megabytes(system.available_memory())
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_percent_floors_and_caps() {
        assert_eq!(percent(0, 10), 0);
        assert_eq!(percent(5, 10), 50);
        assert_eq!(percent(2, 3), 66);
        assert_eq!(percent(12, 10), 100);
        assert_eq!(percent(0, 0), 100);
    }

    #[test]
    fn test_estimate_uses_average_pace() {
        let eta = estimate_remaining(Duration::from_secs(10), 5, 10);
        assert_eq!(eta, Duration::from_secs(10));
        assert_eq!(estimate_remaining(Duration::from_secs(10), 0, 10), Duration::ZERO);
        assert_eq!(estimate_remaining(Duration::from_secs(10), 10, 10), Duration::ZERO);
    }

    #[test]
    fn test_format_duration_omits_zero_units() {
        assert_eq!(format_duration(Duration::from_secs(0)), "0 seconds");
        assert_eq!(format_duration(Duration::from_secs(59)), "59 seconds");
        assert_eq!(format_duration(Duration::from_secs(61)), "1 minutes 1 seconds");
        assert_eq!(format_duration(Duration::from_secs(3600)), "1 hours 0 seconds");
        assert_eq!(
            format_duration(Duration::from_secs(3725)),
            "1 hours 2 minutes 5 seconds"
        );
    }

    #[test]
    fn test_format_megabytes() {
        assert_eq!(format_megabytes(0), "0.0 M");
        assert_eq!(format_megabytes(12 * 1024 * 1024 + 300 * 1024), "12.3 M");
    }

    #[test]
    fn test_report_from_session() {
        let mut session = ImportSession::new("item", PathBuf::from("a.csv"), "a.csv");
        session.phase = SessionPhase::Processing;
        session.has_header = true;
        session.total_rows = 10;
        session.row_offset = 5;
        session.rows_processed = 4;
        session.rows_inserted = 3;
        session.rows_updated = 1;

        let now = session.started_at + chrono::Duration::seconds(10);
        let report = ProgressReport::from_session(&session, now, "1.0 M".to_string());
        assert_eq!(report.next_offset, 5);
        assert_eq!(report.percent, 50);
        assert!(!report.complete);
        assert_eq!(report.total, 9);
        assert_eq!(report.imported, 4);
        assert_eq!(report.added, 3);
        assert_eq!(report.updated, 1);
        assert_eq!(report.estimated_time, "10 seconds");

        insta::assert_snapshot!(
            serde_json::to_string(&report).unwrap(),
            @r#"{"next_offset":5,"percent":50,"complete":false,"total":9,"imported":4,"added":3,"updated":1,"estimated_time":"10 seconds","memory_usage":"1.0 M"}"#
        );
    }

    #[test]
    fn test_unmapped_session_reports_no_progress() {
        let session = ImportSession::new("item", PathBuf::from("a.csv"), "a.csv");
        let report = ProgressReport::from_session(&session, session.started_at, "-".to_string());
        assert_eq!(report.percent, 0);
        assert!(!report.complete);
        assert_eq!(report.total, 0);
    }

    #[test]
    fn test_process_memory_is_reported() {
        assert!(memory_usage().ends_with(" M") || memory_usage() == "-");
    }
}
