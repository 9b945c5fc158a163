use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use resurface_core::persist::{load_meta, load_snapshot, save_snapshot, IndexPaths, MetaFile};
use resurface_core::{
    reconcile, BuildOutcome, DocumentStore, IndexEngine, IndexStats, NotesDir, ResurfaceConfig, Resurfacer, SyncReport,
};
use serde::Serialize;
use tracing_subscriber::{fmt, EnvFilter};

use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "resurface")]
#[command(about = "Index a notes directory and resurface forgotten notes", long_about = None)]
struct Cli {
    /// Notes directory
    #[arg(long, global = true, default_value = ".")]
    notes: PathBuf,
    /// Index directory (defaults to <notes>/.resurface)
    #[arg(long, global = true)]
    index: Option<PathBuf>,
    /// JSON file overriding ranking and debounce settings
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the index from scratch and write a snapshot
    Build,
    /// Notes most similar to the given note
    Similar {
        /// Note id, relative to the notes directory
        #[arg(long)]
        id: String,
        #[arg(long, default_value_t = 10)]
        k: usize,
    },
    /// Older notes on the same topic as the given note
    Related {
        #[arg(long)]
        id: String,
        #[arg(long, default_value_t = 5)]
        k: usize,
    },
    /// Today's ranked list of forgotten notes
    Digest {
        #[arg(long, default_value_t = 5)]
        count: usize,
    },
    /// Highest-weighted terms of a note
    Terms {
        #[arg(long)]
        id: String,
        #[arg(long, default_value_t = 10)]
        n: usize,
    },
    /// Index size and build time, live and as last saved
    Stats,
}

#[derive(Serialize)]
struct SimilarOut {
    id: String,
    similarity: f64,
    shared_terms: Vec<String>,
}

/// Live index figures next to what the last saved snapshot recorded.
#[derive(Serialize)]
struct StatsOut {
    index: IndexStats,
    snapshot: Option<MetaFile>,
}

#[derive(Serialize)]
struct TermOut {
    term: String,
    weight: f64,
}

fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let cli = Cli::parse();
    let config = ResurfaceConfig::load_or_default(cli.config.as_ref())?;
    let notes = NotesDir::open(&cli.notes);
    let paths = IndexPaths::new(cli.index.clone().unwrap_or_else(|| cli.notes.join(".resurface")));

    match cli.command {
        Commands::Build => {
            let mut engine = IndexEngine::new();
            build_index(&notes, &paths, &mut engine)?;
            print_json(&engine.stats())
        }
        Commands::Similar { id, k } => {
            let engine = open_index(&notes, &paths)?;
            let hits: Vec<SimilarOut> = engine
                .find_similar(&id, k)
                .into_iter()
                .map(|hit| SimilarOut { shared_terms: engine.shared_terms(&id, &hit.id, 5), id: hit.id, similarity: hit.similarity })
                .collect();
            print_json(&hits)
        }
        Commands::Related { id, k } => {
            let engine = open_index(&notes, &paths)?;
            print_json(&Resurfacer::new(&engine, &notes, &config).contextual_related(&id, k))
        }
        Commands::Digest { count } => {
            let engine = open_index(&notes, &paths)?;
            print_json(&Resurfacer::new(&engine, &notes, &config).daily_digest(count))
        }
        Commands::Terms { id, n } => {
            let engine = open_index(&notes, &paths)?;
            let terms: Vec<TermOut> =
                engine.top_terms(&id, n).into_iter().map(|(term, weight)| TermOut { term, weight }).collect();
            print_json(&terms)
        }
        Commands::Stats => {
            let engine = open_index(&notes, &paths)?;
            let snapshot = match load_meta(&paths) {
                Ok(meta) => Some(meta),
                Err(e) => {
                    tracing::warn!(path = %paths.meta().display(), error = %e, "no readable meta file");
                    None
                }
            };
            print_json(&StatsOut { index: engine.stats(), snapshot })
        }
    }
}

fn build_index(notes: &NotesDir, paths: &IndexPaths, engine: &mut IndexEngine) -> Result<()> {
    let docs = notes.list_documents();
    tracing::info!(num_docs = docs.len(), root = %notes.root().display(), "read notes");
    match engine.build_full(&docs) {
        BuildOutcome::Indexed { documents, terms } => {
            save_snapshot(paths, engine)?;
            tracing::info!(documents, terms, index = %paths.root.display(), "index build complete");
            Ok(())
        }
        BuildOutcome::NothingToIndex => bail!("nothing to index in {}", notes.root().display()),
    }
}

/// Restores the snapshot and catches it up with the notes, or rebuilds when
/// there is no usable snapshot.
fn open_index(notes: &NotesDir, paths: &IndexPaths) -> Result<IndexEngine> {
    let mut engine = IndexEngine::new();
    if load_snapshot(paths, &mut engine) {
        if reconcile(&mut engine, notes) != SyncReport::default() {
            save_snapshot(paths, &engine)?;
        }
    } else {
        tracing::info!("rebuilding index");
        build_index(notes, paths, &mut engine)?;
    }
    Ok(engine)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
