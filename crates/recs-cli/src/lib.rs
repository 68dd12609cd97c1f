//! Library side of the `recs` binary.
//!
//! - `cli`: argument parsing with clap
//! - `embedder`: the embedding model chosen by configuration
//! - `commands`: startup and command implementations

pub mod cli;
pub mod commands;
pub mod embedder;

pub use cli::{Cli, Commands, EmbedderArg};
pub use commands::{apply_overrides, parse_documents, run};
pub use embedder::ConfiguredEmbedder;
