//! `csvimp status` command - Show the progress of a session

use console::style;
use miette::Result;

use crate::cli::helpers::{open_engine, progress_table};
use crate::cli::GlobalOpts;
use crate::core::SessionId;

#[derive(clap::Args, Debug)]
pub struct StatusArgs {
    /// Session to inspect
    pub id: SessionId,

    /// Print the progress report as JSON
    #[arg(long)]
    pub json: bool,
}

pub fn run(args: StatusArgs, global: &GlobalOpts) -> Result<()> {
    let engine = open_engine(global)?;
    let session = engine.session(&args.id)?;
    let report = engine.status(&args.id)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report).unwrap_or_default());
        return Ok(());
    }

    println!(
        "{} {} ({})",
        style(&session.id).yellow(),
        style(&session.source_name).cyan(),
        session.phase.as_str()
    );
    println!();
    println!("{}", progress_table(&report));
    Ok(())
}
