//! Command implementations.
//!
//! Every command follows the same startup: load settings, apply CLI
//! overrides, install logging, open the store, initialize the engine. An
//! engine that cannot initialize is fatal: it is logged and the process
//! exits with status 1.

use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use recs_embeddings::LazyEmbedder;
use recs_engine::{EngineConfig, IndexingStats, RecommendationEngine};
use recs_types::{Settings, VideoDocument};
use recs_vector::{HnswStore, HnswStoreConfig};
use tracing::{error, info, warn};

use crate::cli::{Cli, Commands};
use crate::embedder::ConfiguredEmbedder;

type Engine = RecommendationEngine<ConfiguredEmbedder>;

/// Run one CLI invocation.
pub async fn run(cli: Cli) -> Result<()> {
    let mut settings = Settings::load(cli.config.as_deref()).context("Failed to load configuration")?;
    apply_overrides(&mut settings, &cli);

    init_logging(&settings.log_level)?;
    info!(
        store = %settings.store_path,
        collection = %settings.collection_name,
        provider = ?settings.embedder.provider,
        "Starting recs"
    );

    let engine = start_engine(&settings).await?;

    match cli.command {
        Commands::Add {
            video_id,
            title,
            description,
            tags,
        } => {
            engine
                .add_or_update_video(&video_id, &title, &description, &tags)
                .await?;
            println!("Stored {}", video_id);
        }
        Commands::Delete { video_id } => {
            engine.delete_video(&video_id).await?;
            println!("Deleted {}", video_id);
        }
        Commands::Recommend {
            text,
            limit,
            scores,
        } => {
            let limit = limit.unwrap_or(engine.config().default_limit);
            recommend(&engine, &text, limit, scores).await?;
        }
        Commands::Clear { yes } => {
            if !yes {
                bail!("Refusing to clear collection '{}' without --yes", settings.collection_name);
            }
            engine.clear_collection().await?;
            println!("Cleared collection {}", settings.collection_name);
        }
        Commands::Embed { text } => {
            let embedding = engine.generate_embedding(&text).await?;
            println!("{}", serde_json::to_string(embedding.as_slice())?);
        }
        Commands::Stats => {
            let stats = engine.stats().await?;
            println!("Collection: {}", stats.name);
            println!("Videos:     {}", stats.record_count);
            match stats.dimension {
                Some(dim) => println!("Dimension:  {}", dim),
                None => println!("Dimension:  (empty)"),
            }
        }
        Commands::Import { path } => {
            let stats = import(&engine, &path).await?;
            println!(
                "Processed {} | indexed {} | skipped {} | errors {}",
                stats.processed, stats.indexed, stats.skipped, stats.errors
            );
        }
    }

    Ok(())
}

/// Apply CLI flags on top of loaded settings (highest precedence).
pub fn apply_overrides(settings: &mut Settings, cli: &Cli) {
    if let Some(log_level) = &cli.log_level {
        settings.log_level = log_level.clone();
    }
    if let Some(store_path) = &cli.store_path {
        settings.store_path = store_path.clone();
    }
    if let Some(provider) = cli.embedder {
        settings.embedder.provider = provider.into();
    }
}

fn init_logging(log_level: &str) -> Result<()> {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_writer(io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("Failed to set tracing subscriber")?;
    Ok(())
}

/// Open the store and bring the engine up, exiting the process if the
/// engine cannot initialize.
async fn start_engine(settings: &Settings) -> Result<Engine> {
    let store_path = settings.expanded_store_path();
    let store = HnswStore::open(HnswStoreConfig::from_settings(&store_path, &settings.hnsw))
        .with_context(|| format!("Failed to open vector store at {:?}", store_path))?;

    let loader_settings = settings.clone();
    let embedder = Arc::new(LazyEmbedder::new(move || ConfiguredEmbedder::load(&loader_settings)));
    let engine = RecommendationEngine::new(embedder, Arc::new(store), EngineConfig::from_settings(settings));

    if let Err(e) = engine.initialize().await {
        let cause = e
            .cause()
            .map(ToString::to_string)
            .unwrap_or_default();
        error!(error = %e, cause = %cause, "Recommendation engine failed to initialize, exiting");
        std::process::exit(1);
    }
    Ok(engine)
}

async fn recommend(engine: &Engine, text: &str, limit: usize, scores: bool) -> Result<()> {
    if scores {
        for rec in engine.get_scored_recommendations(text, limit).await? {
            println!("{:.4}\t{}\t{}", rec.score, rec.video_id, rec.title);
        }
    } else {
        for video_id in engine.get_recommendations(text, limit).await? {
            println!("{}", video_id);
        }
    }
    Ok(())
}

async fn import(engine: &Engine, path: &Path) -> Result<IndexingStats> {
    let reader: Box<dyn Read> = if path == Path::new("-") {
        Box::new(io::stdin())
    } else {
        Box::new(File::open(path).with_context(|| format!("Failed to open {:?}", path))?)
    };

    let (documents, rejected) = parse_documents(BufReader::new(reader))?;
    let mut stats = IndexingStats {
        processed: rejected,
        errors: rejected,
        ..Default::default()
    };
    stats.merge(&engine.index_videos(&documents).await?);
    Ok(stats)
}

/// Parse JSON-lines video documents. Blank lines are ignored; lines that do
/// not parse are logged and counted.
pub fn parse_documents(reader: impl BufRead) -> Result<(Vec<VideoDocument>, usize)> {
    let mut documents = Vec::new();
    let mut rejected = 0;

    for (index, line) in reader.lines().enumerate() {
        let line = line.context("Failed to read import input")?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<VideoDocument>(&line) {
            Ok(document) => documents.push(document),
            Err(e) => {
                warn!(line = index + 1, error = %e, "Skipping malformed video document");
                rejected += 1;
            }
        }
    }

    Ok((documents, rejected))
}
