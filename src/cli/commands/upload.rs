//! `csvimp upload` command - Stage a file and open an import session

use console::style;
use miette::Result;
use std::path::PathBuf;

use crate::cli::helpers::open_engine;
use crate::cli::GlobalOpts;
use crate::core::{SessionId, UploadRequest};

#[derive(clap::Args, Debug)]
pub struct UploadArgs {
    /// CSV file, or ZIP archive holding a single CSV
    pub file: PathBuf,

    /// Session this upload replaces (its staged file is dropped)
    #[arg(long)]
    pub replace: Option<SessionId>,
}

pub fn run(args: UploadArgs, global: &GlobalOpts) -> Result<()> {
    let engine = open_engine(global)?;
    let request = UploadRequest::from_path(&args.file);
    let session = engine.upload(&request, args.replace.as_ref())?;

    if global.quiet {
        println!("{}", session.id);
        return Ok(());
    }

    println!(
        "{} Staged {} as {}",
        style("✓").green(),
        style(&session.source_name).cyan(),
        style(&session.id).yellow()
    );
    println!();
    println!("Next steps:");
    println!(
        "  {} Inspect the first rows",
        style(format!("csvimp preview {} --header", session.id)).yellow()
    );
    println!(
        "  {} Confirm the column mapping",
        style(format!("csvimp map {} --header --interactive", session.id)).yellow()
    );
    Ok(())
}
