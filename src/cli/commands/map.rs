//! `csvimp map` command - Confirm the column mapping of a session

use console::style;
use dialoguer::{theme::ColorfulTheme, Select};
use miette::{IntoDiagnostic, Result};

use crate::cli::helpers::open_engine;
use crate::cli::GlobalOpts;
use crate::core::mapping::parse_assignment;
use crate::core::{CharacterEncoding, ImportEngine, MappingRequest, SessionId};

#[derive(clap::Args, Debug)]
pub struct MapArgs {
    /// Session to map
    pub id: SessionId,

    /// Character encoding of the file (UTF-8 or SJIS)
    #[arg(long, short = 'e', default_value = "UTF-8")]
    pub encoding: CharacterEncoding,

    /// The first row holds column labels and is not imported
    #[arg(long)]
    pub header: bool,

    /// Field assignment as KEY=INDEX (0-based column); repeatable
    #[arg(long = "map", short = 'm', value_parser = parse_assignment)]
    pub assignments: Vec<(String, String)>,

    /// Pick the column of every field from a menu
    #[arg(long, short = 'i', conflicts_with = "assignments")]
    pub interactive: bool,
}

pub fn run(args: MapArgs, global: &GlobalOpts) -> Result<()> {
    let engine = open_engine(global)?;

    let assignments = if args.interactive {
        prompt_assignments(&engine, &args)?
    } else {
        args.assignments.clone()
    };

    let request = MappingRequest {
        encoding: args.encoding,
        has_header: args.header,
        assignments,
    };
    let session = engine.confirm_mapping(&args.id, &request)?;

    if global.quiet {
        return Ok(());
    }

    println!(
        "{} Mapping confirmed for {}",
        style("✓").green(),
        style(&session.source_name).cyan()
    );
    if let Some(mapping) = &session.mapping {
        for column in mapping.iter() {
            let label = engine
                .schema()
                .field(&column.key)
                .map(|f| f.label.as_str())
                .unwrap_or(column.key.as_str());
            println!("  {} ← column {}", style(label).bold(), column.index);
        }
    }
    println!();
    println!("{} {} data rows to import", style("Total:").bold(), session.data_rows());
    println!();
    println!(
        "Run {} to import",
        style(format!("csvimp run {}", session.id)).yellow()
    );
    Ok(())
}

fn prompt_assignments(engine: &ImportEngine, args: &MapArgs) -> Result<Vec<(String, String)>> {
    let preview = engine.preview(&args.id, args.encoding, args.header)?;
    if preview.column_count == 0 {
        return Err(miette::miette!(
            "No rows could be decoded as {}; try another --encoding",
            args.encoding
        ));
    }

    let mut items = vec!["(not mapped)".to_string()];
    items.extend(preview.labels.iter().enumerate().map(|(i, label)| {
        let sample = preview
            .rows
            .get(usize::from(args.header))
            .and_then(|row| row.get(i))
            .map(|v| format!("  e.g. {}", v))
            .unwrap_or_default();
        format!("{}: {}{}", i, label, sample)
    }));

    let theme = ColorfulTheme::default();
    let mut assignments = Vec::new();
    for field in engine.schema().fields() {
        let default = preview
            .suggested
            .iter()
            .find(|m| m.key == field.key)
            .map(|m| m.index + 1)
            .unwrap_or(0);

        let choice = Select::with_theme(&theme)
            .with_prompt(&field.label)
            .items(&items)
            .default(default)
            .interact()
            .into_diagnostic()?;

        let index = if choice == 0 {
            String::new()
        } else {
            (choice - 1).to_string()
        };
        assignments.push((field.key.clone(), index));
    }
    Ok(assignments)
}
