//! `recs`: manage and query the video recommendation index.
//!
//! # Usage
//!
//! ```bash
//! recs add v1 --title "Cats" --description "Videos about cats" --tags pets,cats
//! recs recommend "cute cat" --limit 5
//! recs import videos.jsonl
//! recs stats
//! ```
//!
//! # Configuration
//!
//! Configuration is loaded in order (later sources override earlier):
//! 1. Built-in defaults
//! 2. Config file (~/.config/video-recs/config.toml)
//! 3. `--config` file
//! 4. Environment variables (RECS_*)
//! 5. CLI flags

use anyhow::Result;
use clap::Parser;

use recs_cli::{run, Cli};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    run(cli).await
}
