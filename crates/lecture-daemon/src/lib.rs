//! Lecture assistant CLI library exports.
//!
//! # Modules
//!
//! - `cli`: Command-line argument parsing with clap
//! - `commands`: Command implementations and gateway wiring

pub mod cli;
pub mod commands;

pub use cli::{Cli, Commands};
pub use commands::{embed_pending, import_lecture, run, ChunkImport, LectureImport};
