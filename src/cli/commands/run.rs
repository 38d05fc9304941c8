//! `csvimp run` command - Import a mapped session to completion

use console::style;
use miette::Result;

use crate::cli::helpers::{open_engine, open_records, print_summary};
use crate::cli::GlobalOpts;
use crate::core::SessionId;

#[derive(clap::Args, Debug)]
pub struct RunArgs {
    /// Session to import
    pub id: SessionId,
}

pub fn run(args: RunArgs, global: &GlobalOpts) -> Result<()> {
    let mut engine = open_engine(global)?;
    let mut records = open_records(global, &engine)?;

    let mut offset = None;
    loop {
        let report = engine.process_chunk(&args.id, offset, &mut records)?;
        if !global.quiet {
            eprintln!(
                "{} {:>3}% {}/{} rows, {} remaining, {}",
                style("→").blue(),
                report.percent,
                report.imported,
                report.total,
                report.estimated_time,
                report.memory_usage
            );
        }
        if report.complete {
            break;
        }
        offset = Some(report.next_offset);
    }

    let summary = engine.finish(&args.id)?;
    if global.quiet {
        return Ok(());
    }
    println!();
    print_summary(&summary);
    Ok(())
}
