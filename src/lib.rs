//! csvimp: resumable, chunked CSV importer
//!
//! Stages a CSV (or a ZIP holding one), detects its encoding, maps its
//! columns onto a configured import type, and imports it in bounded chunks
//! whose progress is kept in a session store.

pub mod cli;
pub mod core;
pub mod records;
