//! Local semantic indexing and resurfacing for a collection of notes.
//!
//! Notes are tokenized into stemmed terms, weighted with TF-IDF and compared
//! by cosine similarity. The [`resurface::Resurfacer`] blends similarity with
//! staleness and connectivity to rank notes worth revisiting.

use serde::{Deserialize, Serialize};

pub mod config;
pub mod index;
pub mod persist;
pub mod resurface;
pub mod scoring;
pub mod store;
pub mod sync;
pub mod tokenizer;
pub mod vault;
pub mod vector;

pub type DocId = String;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocId,
    pub text: String,
}

impl Document {
    pub fn new(id: impl Into<DocId>, text: impl Into<String>) -> Self {
        Self { id: id.into(), text: text.into() }
    }
}

pub use config::ResurfaceConfig;
pub use index::{BuildOutcome, IndexEngine, IndexState, IndexStats, SimilarNote};
pub use resurface::{DigestEntry, Reason, Resurfacer};
pub use store::{DocumentStore, MemoryStore};
pub use sync::{apply_changes, reconcile, NoteChange, SyncReport};
pub use vault::NotesDir;
