use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use time::OffsetDateTime;

use crate::tokenizer::tokenize;
use crate::vector::{
    compute_tf, compute_tfidf, cosine_similarity, document_frequencies, idf_from_frequencies, shared_contributions, TermVector,
};
use crate::{DocId, Document};

/// Similarities at or below this are treated as noise.
pub const SIMILARITY_FLOOR: f64 = 0.01;

pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexState {
    Unbuilt,
    Ready { built_at: OffsetDateTime },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildOutcome {
    Indexed { documents: usize, terms: usize },
    NothingToIndex,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarNote {
    pub id: DocId,
    pub similarity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexStats {
    pub num_docs: usize,
    pub num_terms: usize,
    #[serde(with = "time::serde::rfc3339::option")]
    pub built_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub updated_at: Option<OffsetDateTime>,
}

/// Persisted corpus state. TF-IDF vectors are derived on restore.
#[derive(Debug, Serialize, Deserialize)]
pub struct Snapshot {
    pub version: u32,
    pub term_frequencies: HashMap<DocId, TermVector>,
    pub idf: TermVector,
    /// Unix seconds of the last full build.
    pub built_at: i64,
    /// Unix seconds of the last change of any kind.
    pub updated_at: i64,
}

/// Owns the corpus: per-note TF vectors, document frequencies, the shared IDF
/// table and the derived TF-IDF vectors.
///
/// After an incremental upsert only that note's TF-IDF vector is recomputed,
/// so other notes keep weights derived from the IDF table as it stood when
/// they were last computed. A full build brings every vector up to date.
#[derive(Debug)]
pub struct IndexEngine {
    state: IndexState,
    term_frequencies: HashMap<DocId, TermVector>,
    tfidf: HashMap<DocId, TermVector>,
    doc_frequencies: HashMap<String, u32>,
    idf: TermVector,
    updated_at: Option<OffsetDateTime>,
}

impl Default for IndexEngine {
    fn default() -> Self { Self::new() }
}

impl IndexEngine {
    pub fn new() -> Self {
        Self {
            state: IndexState::Unbuilt,
            term_frequencies: HashMap::new(),
            tfidf: HashMap::new(),
            doc_frequencies: HashMap::new(),
            idf: TermVector::new(),
            updated_at: None,
        }
    }

    pub fn state(&self) -> IndexState { self.state }

    pub fn is_ready(&self) -> bool { matches!(self.state, IndexState::Ready { .. }) }

    pub fn len(&self) -> usize { self.term_frequencies.len() }

    pub fn is_empty(&self) -> bool { self.term_frequencies.is_empty() }

    pub fn contains(&self, id: &str) -> bool { self.term_frequencies.contains_key(id) }

    pub fn ids(&self) -> impl Iterator<Item = &DocId> { self.term_frequencies.keys() }

    pub fn idf(&self) -> &TermVector { &self.idf }

    pub fn term_frequencies(&self, id: &str) -> Option<&TermVector> { self.term_frequencies.get(id) }

    pub fn tfidf(&self, id: &str) -> Option<&TermVector> { self.tfidf.get(id) }

    /// When the corpus last changed through a build, upsert, removal or restore.
    pub fn updated_at(&self) -> Option<OffsetDateTime> { self.updated_at }

    pub fn stats(&self) -> IndexStats {
        IndexStats {
            num_docs: self.term_frequencies.len(),
            num_terms: self.idf.len(),
            built_at: match self.state {
                IndexState::Ready { built_at } => Some(built_at),
                IndexState::Unbuilt => None,
            },
            updated_at: self.updated_at,
        }
    }

    /// Drops the whole corpus and returns to `Unbuilt`.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Rebuilds everything from `documents`. An empty slice leaves the engine
    /// untouched. Duplicate ids keep the last occurrence.
    pub fn build_full(&mut self, documents: &[Document]) -> BuildOutcome {
        if documents.is_empty() {
            tracing::info!("nothing to index");
            return BuildOutcome::NothingToIndex;
        }
        let mut term_frequencies: HashMap<DocId, TermVector> = HashMap::with_capacity(documents.len());
        for doc in documents {
            term_frequencies.insert(doc.id.clone(), compute_tf(&tokenize(&doc.text)));
        }
        self.term_frequencies = term_frequencies;
        self.doc_frequencies = document_frequencies(self.term_frequencies.values());
        self.refresh_idf();
        self.tfidf = self
            .term_frequencies
            .iter()
            .map(|(id, tf)| (id.clone(), compute_tfidf(tf, &self.idf)))
            .collect();
        let now = OffsetDateTime::now_utc();
        self.state = IndexState::Ready { built_at: now };
        self.updated_at = Some(now);

        let outcome = BuildOutcome::Indexed { documents: self.term_frequencies.len(), terms: self.idf.len() };
        tracing::info!(num_docs = self.term_frequencies.len(), num_terms = self.idf.len(), "index built");
        outcome
    }

    /// Re-indexes one note. Ignored until a full build has completed.
    pub fn upsert_one(&mut self, id: &str, text: &str) {
        if !self.is_ready() {
            tracing::debug!(id, "index not built; ignoring upsert");
            return;
        }
        let tf = compute_tf(&tokenize(text));
        if let Some(old) = self.term_frequencies.remove(id) {
            self.forget_terms(&old);
        }
        for term in tf.keys() {
            *self.doc_frequencies.entry(term.clone()).or_insert(0) += 1;
        }
        self.term_frequencies.insert(id.to_string(), tf);
        self.refresh_idf();
        let tfidf = compute_tfidf(&self.term_frequencies[id], &self.idf);
        self.tfidf.insert(id.to_string(), tfidf);
        self.updated_at = Some(OffsetDateTime::now_utc());
        tracing::debug!(id, num_terms = self.idf.len(), "note upserted");
    }

    /// Deletes a note's vectors. The IDF table is refreshed on the next
    /// upsert or full build.
    pub fn remove(&mut self, id: &str) -> bool {
        self.tfidf.remove(id);
        match self.term_frequencies.remove(id) {
            Some(old) => {
                self.forget_terms(&old);
                self.updated_at = Some(OffsetDateTime::now_utc());
                tracing::debug!(id, "note removed");
                true
            }
            None => false,
        }
    }

    /// Rename as remove-old plus upsert-new.
    pub fn rename(&mut self, from: &str, to: &str, text: &str) {
        self.remove(from);
        self.upsert_one(to, text);
    }

    /// Up to `top_k` other notes by descending cosine similarity, ties broken
    /// by ascending id. Empty when not ready or `id` is unknown.
    pub fn find_similar(&self, id: &str, top_k: usize) -> Vec<SimilarNote> {
        if !self.is_ready() || top_k == 0 {
            return Vec::new();
        }
        let Some(target) = self.tfidf.get(id) else { return Vec::new() };
        let mut hits: Vec<SimilarNote> = self
            .tfidf
            .iter()
            .filter(|(other, _)| other.as_str() != id)
            .filter_map(|(other, vector)| {
                let similarity = cosine_similarity(target, vector);
                (similarity > SIMILARITY_FLOOR).then(|| SimilarNote { id: other.clone(), similarity })
            })
            .collect();
        hits.sort_by(|a, b| b.similarity.total_cmp(&a.similarity).then_with(|| a.id.cmp(&b.id)));
        hits.truncate(top_k);
        hits
    }

    /// Highest-weighted TF-IDF terms of a note.
    pub fn top_terms(&self, id: &str, n: usize) -> Vec<(String, f64)> {
        let Some(vector) = self.tfidf.get(id) else { return Vec::new() };
        let mut terms: Vec<(String, f64)> = vector.iter().map(|(t, w)| (t.clone(), *w)).collect();
        terms.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        terms.truncate(n);
        terms
    }

    /// Terms that contribute most to the similarity of `a` and `b`.
    pub fn shared_terms(&self, a: &str, b: &str, n: usize) -> Vec<String> {
        match (self.tfidf.get(a), self.tfidf.get(b)) {
            (Some(va), Some(vb)) => shared_contributions(va, vb).into_iter().take(n).map(|(t, _)| t).collect(),
            _ => Vec::new(),
        }
    }

    pub fn snapshot(&self) -> Result<Vec<u8>> {
        let built_at = match self.state {
            IndexState::Ready { built_at } => built_at.unix_timestamp(),
            IndexState::Unbuilt => 0,
        };
        let snapshot = Snapshot {
            version: SNAPSHOT_VERSION,
            term_frequencies: self.term_frequencies.clone(),
            idf: self.idf.clone(),
            built_at,
            updated_at: self.updated_at.map(|t| t.unix_timestamp()).unwrap_or(built_at),
        };
        Ok(bincode::serialize(&snapshot)?)
    }

    /// Replaces the corpus with a snapshot. Returns `false`, leaving the engine
    /// untouched, when the blob is not a usable snapshot.
    pub fn restore(&mut self, blob: &[u8]) -> bool {
        match decode_snapshot(blob) {
            Ok(snapshot) => {
                self.load_snapshot(snapshot);
                tracing::info!(num_docs = self.term_frequencies.len(), "index restored from snapshot");
                true
            }
            Err(e) => {
                tracing::warn!(error = %e, "no valid snapshot");
                false
            }
        }
    }

    fn load_snapshot(&mut self, snapshot: Snapshot) {
        let built_at = OffsetDateTime::from_unix_timestamp(snapshot.built_at).unwrap_or_else(|_| OffsetDateTime::now_utc());
        let updated_at = OffsetDateTime::from_unix_timestamp(snapshot.updated_at).unwrap_or(built_at);
        self.doc_frequencies = document_frequencies(snapshot.term_frequencies.values());
        self.idf = snapshot.idf;
        self.tfidf = snapshot
            .term_frequencies
            .iter()
            .map(|(id, tf)| (id.clone(), compute_tfidf(tf, &self.idf)))
            .collect();
        self.term_frequencies = snapshot.term_frequencies;
        self.state = IndexState::Ready { built_at };
        self.updated_at = Some(updated_at);
    }

    fn forget_terms(&mut self, tf: &TermVector) {
        for term in tf.keys() {
            if let Some(count) = self.doc_frequencies.get_mut(term) {
                *count -= 1;
                if *count == 0 {
                    self.doc_frequencies.remove(term);
                }
            }
        }
    }

    fn refresh_idf(&mut self) {
        self.idf = idf_from_frequencies(&self.doc_frequencies, self.term_frequencies.len());
    }
}

fn decode_snapshot(blob: &[u8]) -> Result<Snapshot> {
    let snapshot: Snapshot = bincode::deserialize(blob)?;
    if snapshot.version != SNAPSHOT_VERSION {
        bail!("unsupported snapshot version {}", snapshot.version);
    }
    if snapshot.term_frequencies.is_empty() {
        bail!("snapshot holds no documents");
    }
    let finite = |v: &TermVector| v.values().all(|w| w.is_finite());
    if !finite(&snapshot.idf) || !snapshot.term_frequencies.values().all(finite) {
        bail!("snapshot holds non-finite weights");
    }
    Ok(snapshot)
}
