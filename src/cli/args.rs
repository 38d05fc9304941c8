//! CLI argument definitions using clap derive

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::cli::commands::{
    cancel::CancelArgs, chunk::ChunkArgs, completions::CompletionsArgs, errors::ErrorsArgs,
    finish::FinishArgs, init::InitArgs, map::MapArgs, preview::PreviewArgs, run::RunArgs,
    status::StatusArgs, upload::UploadArgs,
};

#[derive(Parser)]
#[command(name = "csvimp")]
#[command(author, version, about = "Resumable, chunked CSV importer")]
#[command(long_about = "Stage a CSV (or a ZIP holding one), map its columns onto an import type, and import it chunk by chunk. Progress is kept server-side, so an interrupted import resumes where it stopped.")]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[command(flatten)]
    pub global: GlobalOpts,
}

#[derive(clap::Args, Clone, Debug)]
pub struct GlobalOpts {
    /// Import type (default: `default_type` from config)
    #[arg(long = "type", short = 't', global = true)]
    pub import_type: Option<String>,

    /// Suppress non-essential output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Enable verbose output
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    /// Workspace root (default: auto-detect by finding .csvimp/)
    #[arg(long, global = true)]
    pub workspace: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new import workspace
    Init(InitArgs),

    /// Stage a CSV or ZIP file and open an import session
    Upload(UploadArgs),

    /// Show the head of a staged file under a candidate encoding
    Preview(PreviewArgs),

    /// Confirm the column mapping of a session
    Map(MapArgs),

    /// Process one chunk and print the progress envelope as JSON
    Chunk(ChunkArgs),

    /// Process chunks until the import completes
    Run(RunArgs),

    /// Show the progress of a session
    Status(StatusArgs),

    /// Show or download the row error log
    Errors(ErrorsArgs),

    /// Show the completion summary and clean up staged files
    Finish(FinishArgs),

    /// Drop a session and its staged file
    Cancel(CancelArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}
