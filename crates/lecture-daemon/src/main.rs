//! Lecture Assistant
//!
//! Question answering and topic discovery over lecture material.
//!
//! # Usage
//!
//! ```bash
//! lecture-assistant import week1.json
//! lecture-assistant ask COMP3001 "What is a binary heap?" --week 4
//! lecture-assistant detect COMP3001 --method kmeans
//! lecture-assistant map COMP3001
//! ```
//!
//! # Configuration
//!
//! Configuration is loaded in order (later sources override earlier):
//! 1. Built-in defaults
//! 2. Config file (~/.config/lecture-assistant/config.toml)
//! 3. File given with --config
//! 4. Environment variables (LECTURE_*, e.g. LECTURE_GENERATION__MODEL)
//! 5. CLI flags

use anyhow::Result;

use lecture_daemon::{run, Cli};

#[tokio::main]
async fn main() -> Result<()> {
    run(Cli::parse_args()).await
}
