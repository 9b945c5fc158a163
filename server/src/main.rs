use anyhow::Result;
use axum::Router;
use clap::Parser;
use resurface_core::{NotesDir, ResurfaceConfig};
use resurface_server::{build_app, AppState, ServerOptions, SharedStore};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
struct Args {
    /// Notes directory
    #[arg(long, default_value = ".")]
    notes: PathBuf,
    /// Index directory path (defaults to <notes>/.resurface)
    #[arg(long)]
    index: Option<PathBuf>,
    /// JSON file overriding ranking and debounce settings
    #[arg(long)]
    config: Option<PathBuf>,
    /// Host to bind
    #[arg(long, default_value = "127.0.0.1")]
    host: String,
    /// Port to bind
    #[arg(long, default_value_t = 8080)]
    port: u16,
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let args = Args::parse();
    let config = ResurfaceConfig::load_or_default(args.config.as_ref())?;
    let index_dir = args.index.clone().unwrap_or_else(|| args.notes.join(".resurface"));
    let store: SharedStore = Arc::new(NotesDir::open(&args.notes));

    let state = AppState::start(ServerOptions::from_env(store, config, Some(index_dir)));
    tracing::info!(num_docs = state.engine.read().len(), "index ready");
    let app: Router = build_app(state);

    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "server listening");
    axum::serve(listener, app).await?;
    Ok(())
}
