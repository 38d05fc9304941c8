//! `csvimp finish` command - Show the completion summary

use miette::Result;

use crate::cli::helpers::{open_engine, print_summary};
use crate::cli::GlobalOpts;
use crate::core::SessionId;

#[derive(clap::Args, Debug)]
pub struct FinishArgs {
    /// Completed session
    pub id: SessionId,
}

pub fn run(args: FinishArgs, global: &GlobalOpts) -> Result<()> {
    let engine = open_engine(global)?;
    let summary = engine.finish(&args.id)?;
    print_summary(&summary);
    Ok(())
}
