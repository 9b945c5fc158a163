use axum::{extract::{Query, State}, http::StatusCode, routing::{get, post}, Json, Router};
use parking_lot::RwLock;
use resurface_core::persist::{load_snapshot, save_snapshot, IndexPaths};
use resurface_core::{
    apply_changes, reconcile, BuildOutcome, DigestEntry, DocId, DocumentStore, IndexEngine, IndexStats, NoteChange,
    ResurfaceConfig, Resurfacer, SimilarNote, SyncReport,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use time::OffsetDateTime;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub mod debounce;

use debounce::Debouncer;

pub type SharedEngine = Arc<RwLock<IndexEngine>>;
pub type SharedStore = Arc<dyn DocumentStore + Send + Sync>;

const MAX_RESULTS: usize = 100;

#[derive(Deserialize)]
pub struct SimilarParams {
    pub id: String,
    #[serde(default = "default_k")]
    pub k: usize,
}
fn default_k() -> usize { 10 }

#[derive(Deserialize)]
pub struct DigestParams {
    pub count: Option<usize>,
}

#[derive(Deserialize)]
pub struct NoteRef {
    pub id: String,
}

#[derive(Deserialize)]
pub struct Rename {
    pub from: String,
    pub to: String,
}

#[derive(Serialize)]
pub struct SimilarHit {
    pub id: String,
    pub similarity: f64,
    pub shared_terms: Vec<String>,
}

#[derive(Serialize)]
pub struct Queued {
    pub queued: usize,
}

pub struct ServerOptions {
    pub store: SharedStore,
    pub config: ResurfaceConfig,
    /// Where snapshots live; `None` keeps the index in memory only.
    pub index_dir: Option<PathBuf>,
    pub admin_token: Option<String>,
}

impl ServerOptions {
    pub fn from_env(store: SharedStore, config: ResurfaceConfig, index_dir: Option<PathBuf>) -> Self {
        Self { store, config, index_dir, admin_token: std::env::var("ADMIN_TOKEN").ok() }
    }
}

struct CachedDigest {
    day: time::Date,
    entries: Vec<DigestEntry>,
}

#[derive(Clone)]
pub struct AppState {
    pub engine: SharedEngine,
    pub store: SharedStore,
    pub config: Arc<ResurfaceConfig>,
    pub paths: Option<IndexPaths>,
    pub changes: Debouncer<DocId, NoteChange>,
    refresh: Debouncer<(), ()>,
    digest_cache: Arc<RwLock<Option<CachedDigest>>>,
    pub admin_token: Option<String>,
}

impl AppState {
    /// Loads or builds the index and starts the change and refresh debouncers.
    /// Must run inside a tokio runtime.
    pub fn start(options: ServerOptions) -> Self {
        let ServerOptions { store, config, index_dir, admin_token } = options;
        let config = Arc::new(config);
        let paths = index_dir.map(IndexPaths::new);
        let engine: SharedEngine = Arc::new(RwLock::new(open_engine(store.as_ref(), paths.as_ref())));
        let digest_cache: Arc<RwLock<Option<CachedDigest>>> = Arc::new(RwLock::new(None));

        let (refresh, _) = {
            let engine = engine.clone();
            let store = store.clone();
            let config = config.clone();
            let cache = digest_cache.clone();
            Debouncer::spawn(config.refresh_debounce(), move |_| {
                let entries = compute_digest(&engine, store.as_ref(), &config, config.digest_count);
                *cache.write() = Some(CachedDigest { day: OffsetDateTime::now_utc().date(), entries });
            })
        };

        let (changes, _) = {
            let engine = engine.clone();
            let store = store.clone();
            let paths = paths.clone();
            let refresh = refresh.clone();
            Debouncer::spawn(config.index_debounce(), move |batch| {
                let report = apply_changes(&mut engine.write(), store.as_ref(), batch);
                if report != SyncReport::default() {
                    persist(&engine, paths.as_ref());
                }
                refresh.notify((), ());
            })
        };

        refresh.notify((), ());
        Self { engine, store, config, paths, changes, refresh, digest_cache, admin_token }
    }
}

/// Restores the snapshot and catches up with the store, falling back to a
/// full build when there is no valid snapshot.
fn open_engine(store: &(dyn DocumentStore + Send + Sync), paths: Option<&IndexPaths>) -> IndexEngine {
    let mut engine = IndexEngine::new();
    let restored = paths.map(|p| load_snapshot(p, &mut engine)).unwrap_or(false);
    let changed = if restored {
        reconcile(&mut engine, store) != SyncReport::default()
    } else {
        matches!(engine.build_full(&store.list_documents()), BuildOutcome::Indexed { .. })
    };
    if changed {
        if let Some(paths) = paths {
            if let Err(e) = save_snapshot(paths, &engine) {
                tracing::error!(error = %e, "failed to save snapshot");
            }
        }
    }
    engine
}

fn persist(engine: &SharedEngine, paths: Option<&IndexPaths>) {
    if let Some(paths) = paths {
        if let Err(e) = save_snapshot(paths, &engine.read()) {
            tracing::error!(error = %e, "failed to save snapshot");
        }
    }
}

fn compute_digest(engine: &SharedEngine, store: &(dyn DocumentStore + Send + Sync), config: &ResurfaceConfig, count: usize) -> Vec<DigestEntry> {
    let engine = engine.read();
    Resurfacer::new(&engine, store, config).daily_digest(count)
}

pub fn build_app(state: AppState) -> Router {
    // CORS: read CORS_ALLOW_ORIGIN (comma-separated) or allow Any by default
    let cors = match std::env::var("CORS_ALLOW_ORIGIN") {
        Ok(val) => {
            let origins: Vec<_> = val
                .split(',')
                .filter_map(|s| s.trim().parse().ok())
                .collect();
            if origins.is_empty() {
                CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any)
            } else {
                CorsLayer::new().allow_origin(AllowOrigin::list(origins)).allow_methods(Any).allow_headers(Any)
            }
        }
        Err(_) => CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any),
    };

    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/stats", get(stats_handler))
        .route("/similar", get(similar_handler))
        .route("/related", get(related_handler))
        .route("/digest", get(digest_handler))
        .route("/notes/changed", post(note_changed))
        .route("/notes/removed", post(note_removed))
        .route("/notes/renamed", post(note_renamed))
        .route("/index/rebuild", post(rebuild_handler))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

pub async fn stats_handler(State(state): State<AppState>) -> Json<IndexStats> {
    Json(state.engine.read().stats())
}

pub async fn similar_handler(State(state): State<AppState>, Query(params): Query<SimilarParams>) -> Json<Vec<SimilarHit>> {
    let engine = state.engine.read();
    let hits = engine
        .find_similar(&params.id, params.k.clamp(1, MAX_RESULTS))
        .into_iter()
        .map(|hit| SimilarHit { shared_terms: engine.shared_terms(&params.id, &hit.id, 5), id: hit.id, similarity: hit.similarity })
        .collect();
    Json(hits)
}

pub async fn related_handler(State(state): State<AppState>, Query(params): Query<SimilarParams>) -> Json<Vec<SimilarNote>> {
    let engine = state.engine.read();
    let related = Resurfacer::new(&engine, state.store.as_ref(), &state.config)
        .contextual_related(&params.id, params.k.clamp(1, MAX_RESULTS));
    Json(related)
}

pub async fn digest_handler(State(state): State<AppState>, Query(params): Query<DigestParams>) -> Json<Vec<DigestEntry>> {
    let count = params.count.unwrap_or(state.config.digest_count).clamp(1, MAX_RESULTS);
    if count == state.config.digest_count {
        let today = OffsetDateTime::now_utc().date();
        if let Some(cached) = state.digest_cache.read().as_ref().filter(|c| c.day == today) {
            return Json(cached.entries.clone());
        }
    }
    Json(compute_digest(&state.engine, state.store.as_ref(), &state.config, count))
}

async fn note_changed(State(state): State<AppState>, Json(note): Json<NoteRef>) -> (StatusCode, Json<Queued>) {
    let queued = state.changes.notify(note.id, NoteChange::Modified) as usize;
    (StatusCode::ACCEPTED, Json(Queued { queued }))
}

async fn note_removed(State(state): State<AppState>, Json(note): Json<NoteRef>) -> (StatusCode, Json<Queued>) {
    let queued = state.changes.notify(note.id, NoteChange::Removed) as usize;
    (StatusCode::ACCEPTED, Json(Queued { queued }))
}

async fn note_renamed(State(state): State<AppState>, Json(rename): Json<Rename>) -> (StatusCode, Json<Queued>) {
    let queued = state.changes.notify(rename.from, NoteChange::Removed) as usize
        + state.changes.notify(rename.to, NoteChange::Modified) as usize;
    (StatusCode::ACCEPTED, Json(Queued { queued }))
}

async fn rebuild_handler(State(state): State<AppState>, headers: axum::http::HeaderMap) -> Result<Json<IndexStats>, (StatusCode, String)> {
    authorize(&state, &headers)?;
    let stats = tokio::task::spawn_blocking(move || rebuild(&state))
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    match stats {
        Some(stats) => Ok(Json(stats)),
        None => Err((StatusCode::UNPROCESSABLE_ENTITY, "nothing to index".into())),
    }
}

/// Full rebuild from the store. `None` when there is nothing to index.
fn rebuild(state: &AppState) -> Option<IndexStats> {
    let docs = state.store.list_documents();
    state.store.reload(&docs);
    let stats = {
        // holds the write lock for the whole build; pending change batches wait and re-read content afterwards
        let mut engine = state.engine.write();
        match engine.build_full(&docs) {
            BuildOutcome::Indexed { .. } => engine.stats(),
            BuildOutcome::NothingToIndex => return None,
        }
    };
    persist(&state.engine, state.paths.as_ref());
    state.refresh.notify((), ());
    Some(stats)
}

fn authorize(state: &AppState, headers: &axum::http::HeaderMap) -> Result<(), (StatusCode, String)> {
    let required = match &state.admin_token {
        Some(t) => t,
        None => return Err((StatusCode::UNAUTHORIZED, "ADMIN_TOKEN not set".into())),
    };
    let provided = headers.get("X-ADMIN-TOKEN").and_then(|v| v.to_str().ok()).unwrap_or("");
    if provided == required {
        Ok(())
    } else {
        Err((StatusCode::UNAUTHORIZED, "invalid admin token".into()))
    }
}
