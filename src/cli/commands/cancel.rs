//! `csvimp cancel` command - Drop a session and its staged file

use console::style;
use miette::Result;

use crate::cli::helpers::open_engine;
use crate::cli::GlobalOpts;
use crate::core::SessionId;

#[derive(clap::Args, Debug)]
pub struct CancelArgs {
    /// Session to drop
    pub id: SessionId,
}

pub fn run(args: CancelArgs, global: &GlobalOpts) -> Result<()> {
    let engine = open_engine(global)?;
    let session = engine.cancel(&args.id)?;
    if !global.quiet {
        println!(
            "{} Cancelled {} ({})",
            style("✓").green(),
            style(&session.id).yellow(),
            session.source_name
        );
    }
    Ok(())
}
