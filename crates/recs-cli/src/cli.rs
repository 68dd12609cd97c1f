//! CLI argument parsing for `recs`.
//!
//! Flags here override every other configuration source.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use recs_types::EmbedderProvider;

/// Video recommendation index
///
/// Stores one embedding per video and finds the videos closest to a text.
#[derive(Parser, Debug)]
#[command(name = "recs")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to config file (overrides default ~/.config/video-recs/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Set log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    pub log_level: Option<String>,

    /// Override the vector store directory
    #[arg(long, global = true)]
    pub store_path: Option<String>,

    /// Override the embedding model
    #[arg(long, global = true, value_enum)]
    pub embedder: Option<EmbedderArg>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Embedding model choices
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbedderArg {
    /// all-MiniLM-L6-v2 run locally with Candle
    Candle,
    /// Feature hashing, no model download
    Hashing,
}

impl From<EmbedderArg> for EmbedderProvider {
    fn from(arg: EmbedderArg) -> Self {
        match arg {
            EmbedderArg::Candle => EmbedderProvider::Candle,
            EmbedderArg::Hashing => EmbedderProvider::Hashing,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Add a video, or replace the one with the same id
    Add {
        /// Video ID
        video_id: String,

        #[arg(short, long)]
        title: String,

        #[arg(short, long, default_value = "")]
        description: String,

        /// Comma-separated tags
        #[arg(long, value_delimiter = ',')]
        tags: Vec<String>,
    },

    /// Delete a video
    Delete {
        /// Video ID
        video_id: String,
    },

    /// Recommend videos similar to a text
    Recommend {
        /// Query text
        text: String,

        /// Maximum results (default from config)
        #[arg(short = 'n', long)]
        limit: Option<usize>,

        /// Print titles and similarity scores
        #[arg(long)]
        scores: bool,
    },

    /// Delete every video in the collection
    Clear {
        /// Skip the confirmation check
        #[arg(long)]
        yes: bool,
    },

    /// Print the embedding of a text as JSON
    Embed {
        /// Text to embed
        text: String,
    },

    /// Show collection statistics
    Stats,

    /// Add videos from a JSON-lines file ("-" reads stdin)
    Import {
        /// File with one video document per line
        path: PathBuf,
    },
}
