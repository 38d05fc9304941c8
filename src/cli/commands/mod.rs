//! CLI command implementations

pub mod cancel;
pub mod chunk;
pub mod completions;
pub mod errors;
pub mod finish;
pub mod init;
pub mod map;
pub mod preview;
pub mod run;
pub mod status;
pub mod upload;
