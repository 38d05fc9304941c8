//! `csvimp chunk` command - Process one chunk for a polling client
//!
//! Always prints a single JSON envelope on stdout:
//! `{"success": true, "data": {...progress...}}` or
//! `{"success": false, "data": {"message": "..."}}`.

use miette::Result;
use serde_json::json;

use crate::cli::helpers::{open_engine, open_records};
use crate::cli::GlobalOpts;
use crate::core::{ProgressReport, SessionId};

#[derive(clap::Args, Debug)]
pub struct ChunkArgs {
    /// Session to advance
    pub id: SessionId,

    /// Offset returned by the previous chunk
    #[arg(long)]
    pub offset: Option<u64>,
}

pub fn run(args: ChunkArgs, global: &GlobalOpts) -> Result<()> {
    match process(&args, global) {
        Ok(report) => {
            let envelope = json!({ "success": true, "data": report });
            println!("{}", envelope);
            Ok(())
        }
        Err(e) => {
            tracing::warn!(session = %args.id, error = %e, "chunk failed");
            let envelope = json!({ "success": false, "data": { "message": e.to_string() } });
            println!("{}", envelope);
            std::process::exit(1);
        }
    }
}

fn process(args: &ChunkArgs, global: &GlobalOpts) -> Result<ProgressReport> {
    let mut engine = open_engine(global)?;
    let mut records = open_records(global, &engine)?;
    Ok(engine.process_chunk(&args.id, args.offset, &mut records)?)
}
