//! `csvimp preview` command - Show the head of a staged file

use console::style;
use miette::Result;
use tabled::{builder::Builder, settings::Style};

use crate::cli::helpers::{open_engine, truncate_str};
use crate::cli::GlobalOpts;
use crate::core::{CharacterEncoding, DetectedEncoding, Preview, SessionId};

#[derive(clap::Args, Debug)]
pub struct PreviewArgs {
    /// Session to preview
    pub id: SessionId,

    /// Character encoding to decode with (UTF-8 or SJIS)
    #[arg(long, short = 'e', default_value = "UTF-8")]
    pub encoding: CharacterEncoding,

    /// Treat the first row as column labels
    #[arg(long)]
    pub header: bool,

    /// Print the preview as JSON
    #[arg(long)]
    pub json: bool,
}

pub fn run(args: PreviewArgs, global: &GlobalOpts) -> Result<()> {
    let engine = open_engine(global)?;
    let preview = engine.preview(&args.id, args.encoding, args.header)?;

    if args.json {
        let suggested: Vec<_> = preview
            .suggested
            .iter()
            .map(|m| serde_json::json!({ "key": m.key, "index": m.index }))
            .collect();
        let value = serde_json::json!({
            "id": preview.session_id.to_string(),
            "file": preview.source_name,
            "detected": preview.detected.as_str(),
            "encoding": preview.encoding.as_str(),
            "rows": preview.rows,
            "labels": preview.labels,
            "total": preview.data_rows(),
            "suggested": suggested,
        });
        println!("{}", serde_json::to_string_pretty(&value).unwrap_or_default());
        return Ok(());
    }

    println!(
        "{} {} ({})",
        style("File:").bold(),
        style(&preview.source_name).cyan(),
        preview.session_id
    );
    println!(
        "{} {} (detected: {})",
        style("Encoding:").bold(),
        preview.encoding,
        preview.detected.as_str()
    );
    if preview.encoding == CharacterEncoding::Sjis && preview.detected == DetectedEncoding::Utf8 {
        println!(
            "{} The file is already UTF-8; preview it with {}",
            style("!").yellow(),
            style("--encoding UTF-8").yellow()
        );
    }
    println!();

    if preview.rows.is_empty() {
        println!("{}", style("(no rows to show)").dim());
        return Ok(());
    }

    println!("{}", rows_table(&preview));
    println!();
    println!("{} {} data rows", style("Total:").bold(), preview.data_rows());

    if !preview.suggested.is_empty() {
        println!();
        println!("{}", style("Suggested mapping:").bold());
        let assignments: Vec<String> = preview
            .suggested
            .iter()
            .map(|m| format!("--map {}={}", m.key, m.index))
            .collect();
        println!("  {}", assignments.join(" "));
    }
    Ok(())
}

fn rows_table(preview: &Preview) -> String {
    let mut builder = Builder::default();
    let mut header = vec!["#".to_string()];
    header.extend(preview.labels.iter().map(|l| truncate_str(l, 24)));
    builder.push_record(header);

    let body = preview.rows.iter().skip(usize::from(preview.has_header));
    for (i, row) in body.enumerate() {
        let mut record = vec![(i + 1).to_string()];
        record.extend((0..preview.column_count).map(|c| {
            row.get(c).map(|v| truncate_str(v, 24)).unwrap_or_default()
        }));
        builder.push_record(record);
    }
    builder.build().with(Style::markdown()).to_string()
}
