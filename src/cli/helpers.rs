//! Shared helper functions for CLI commands
//!
//! Workspace and engine setup plus the output pieces several commands print.

use console::style;
use miette::{IntoDiagnostic, Result};
use tabled::{builder::Builder, settings::Style};

use crate::cli::GlobalOpts;
use crate::core::{
    CompletionSummary, Config, ErrorPreview, ImportEngine, ImportError, ProgressReport, Workspace,
};
use crate::records::RecordTable;

/// Find the workspace from `--workspace` or the current directory
pub fn open_workspace(global: &GlobalOpts) -> Result<Workspace> {
    let workspace = match &global.workspace {
        Some(root) => Workspace::open(root).map_err(ImportError::from)?,
        None => Workspace::discover().map_err(ImportError::from)?,
    };
    Ok(workspace)
}

/// Open the engine for the selected import type
pub fn open_engine(global: &GlobalOpts) -> Result<ImportEngine> {
    let workspace = open_workspace(global)?;
    let config = Config::load(&workspace);
    Ok(ImportEngine::open(workspace, config, global.import_type.as_deref())?)
}

/// The bundled record sink for the engine's import type
pub fn open_records(global: &GlobalOpts, engine: &ImportEngine) -> Result<RecordTable> {
    let workspace = open_workspace(global)?;
    RecordTable::open(
        &workspace.records_db(),
        engine.import_type(),
        &engine.schema().primary().key,
    )
    .into_diagnostic()
}

/// Truncate a string to max_chars, adding "..." if truncated
pub fn truncate_str(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{}...", head)
    }
}

/// Render progress counters as a two-column table
pub fn progress_table(report: &ProgressReport) -> String {
    let rows = [
        ("Progress", format!("{}%", report.percent)),
        ("Offset", report.next_offset.to_string()),
        ("Total", report.total.to_string()),
        ("Imported", report.imported.to_string()),
        ("Added", report.added.to_string()),
        ("Updated", report.updated.to_string()),
        ("Estimated remaining", report.estimated_time.clone()),
        ("Memory", report.memory_usage.clone()),
    ];

    let mut builder = Builder::default();
    builder.push_record(["Field", "Value"]);
    for (field, value) in rows {
        builder.push_record([field.to_string(), value]);
    }
    builder.build().with(Style::markdown()).to_string()
}

/// Print the error log preview, with a "More..." marker when capped
pub fn print_error_preview(preview: &ErrorPreview) {
    if preview.lines.is_empty() {
        println!("{}", style("(error log is empty)").dim());
        return;
    }
    for line in &preview.lines {
        println!("  {}", line);
    }
    if preview.more {
        println!("  {}", style("More...").dim());
    }
}

/// Print the completion summary
pub fn print_summary(summary: &CompletionSummary) {
    println!(
        "{} Import of {} finished",
        style("✓").green(),
        style(&summary.source_name).cyan()
    );
    println!();

    let mut builder = Builder::default();
    builder.push_record(["Total", "Imported", "Added", "Updated"]);
    builder.push_record([
        summary.total.to_string(),
        summary.imported.to_string(),
        summary.added.to_string(),
        summary.updated.to_string(),
    ]);
    println!("{}", builder.build().with(Style::markdown()));
    println!();

    println!("{}", style("Error log:").bold());
    print_error_preview(&summary.errors);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_str() {
        assert_eq!(truncate_str("hello", 10), "hello");
        assert_eq!(truncate_str("hello world", 8), "hello...");
        assert_eq!(truncate_str("hi", 2), "hi");
        assert_eq!(truncate_str("りんごりんご", 5), "りん...");
    }

    #[test]
    fn test_progress_table_lists_counters() {
        let report = ProgressReport {
            next_offset: 5,
            percent: 50,
            complete: false,
            total: 9,
            imported: 4,
            added: 3,
            updated: 1,
            estimated_time: "10 seconds".to_string(),
            memory_usage: "1.0 M".to_string(),
        };
        let table = progress_table(&report);
        assert!(table.contains("| Progress"));
        assert!(table.contains("50%"));
        assert!(table.contains("10 seconds"));
    }
}
