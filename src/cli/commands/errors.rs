//! `csvimp errors` command - Show or download the row error log

use console::style;
use miette::Result;
use std::path::PathBuf;

use crate::cli::helpers::{open_engine, print_error_preview};
use crate::cli::GlobalOpts;

#[derive(clap::Args, Debug)]
pub struct ErrorsArgs {
    /// Copy the full log to this file instead of printing a preview
    #[arg(long, short = 'd')]
    pub download: Option<PathBuf>,

    /// Lines to show (default: `error_preview_lines` from config)
    #[arg(long, short = 'n')]
    pub limit: Option<usize>,
}

pub fn run(args: ErrorsArgs, global: &GlobalOpts) -> Result<()> {
    let engine = open_engine(global)?;
    let log = engine.error_log();

    if let Some(target) = &args.download {
        let bytes = log.export_to(target)?;
        if !global.quiet {
            println!(
                "{} Wrote error log to {} ({} bytes)",
                style("✓").green(),
                style(target.display()).cyan(),
                bytes
            );
        }
        return Ok(());
    }

    let limit = args
        .limit
        .unwrap_or_else(|| engine.config().error_preview_lines());
    let preview = log.preview(limit)?;
    print_error_preview(&preview);
    Ok(())
}
