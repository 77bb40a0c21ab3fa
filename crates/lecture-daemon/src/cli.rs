//! CLI argument parsing for the lecture assistant.
//!
//! CLI flags override every other configuration source.

use clap::{Parser, Subcommand};
use lecture_types::ClusteringMethod;

/// Lecture Assistant
///
/// Answers questions over uploaded lecture material and discovers topics
/// that recur across a module's lectures.
#[derive(Parser, Debug)]
#[command(name = "lecture-assistant")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to config file (overrides default ~/.config/lecture-assistant/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Set log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    pub log_level: Option<String>,

    /// Override database path
    #[arg(long, global = true)]
    pub db_path: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Ask a question about a module's lectures
    Ask {
        /// Module code (case-insensitive)
        module: String,

        /// The question
        question: String,

        /// Number of chunks to retrieve (1-20)
        #[arg(short = 'k', long)]
        top_k: Option<usize>,

        /// Only use lectures up to and including this week
        #[arg(short, long)]
        week: Option<u32>,

        /// Search all weeks even when --week is given
        #[arg(long)]
        no_temporal_filter: bool,
    },

    /// Summarize a detected topic across its lectures
    Summarize {
        module: String,
        topic_id: String,
    },

    /// Run topic detection on a module, replacing its topics
    Detect {
        module: String,

        /// Clustering method (hdbscan or kmeans)
        #[arg(long)]
        method: Option<ClusteringMethod>,

        /// Minimum chunks per topic
        #[arg(long)]
        min_cluster_size: Option<usize>,
    },

    /// List a module's topics with their appearances
    Topics { module: String },

    /// Topic map (nodes and prerequisite edges) for a module
    Map { module: String },

    /// List a module's lectures ordered by week
    Lectures { module: String },

    /// Dashboard statistics, overall or for one module
    Stats {
        /// Restrict to one module
        module: Option<String>,

        /// Include raw storage counters
        #[arg(long)]
        storage: bool,
    },

    /// Import a pre-extracted lecture (JSON) and embed its chunks
    Import {
        /// Path to the lecture JSON file
        file: String,
    },

    /// Compute embeddings for chunks that lack one
    EmbedPending { module: String },

    /// Delete a topic and its appearances
    DeleteTopic { module: String, topic_id: String },

    /// Delete a lecture with its chunks and topic appearances
    DeleteLecture { module: String, lecture_id: String },

    /// Check that the generation backend is reachable
    Health,
}

impl Cli {
    /// Parse CLI arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
