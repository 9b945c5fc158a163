use parking_lot::RwLock;
use std::collections::BTreeMap;
use time::OffsetDateTime;

use crate::{DocId, Document};

/// The host's view of the notes: content, modification times and link
/// metadata. I/O failures are the store's concern; unreadable notes come
/// back as `None` or empty text.
pub trait DocumentStore {
    fn list_documents(&self) -> Vec<Document>;

    fn read_document(&self, id: &str) -> Option<String>;

    fn modified_time(&self, id: &str) -> Option<OffsetDateTime>;

    fn backlink_count(&self, id: &str) -> usize;

    /// Rebuilds cached link metadata from a full listing.
    fn reload(&self, _documents: &[Document]) {}

    /// Updates cached link metadata for one note; `None` means it is gone.
    fn note_changed(&self, _id: &str, _text: Option<&str>) {}
}

#[derive(Debug, Clone)]
struct StoredNote {
    text: String,
    modified: OffsetDateTime,
    backlinks: usize,
}

/// In-memory store for tests and embedding.
#[derive(Debug, Default)]
pub struct MemoryStore {
    notes: RwLock<BTreeMap<DocId, StoredNote>>,
}

impl MemoryStore {
    pub fn new() -> Self { Self::default() }

    pub fn insert(&self, id: impl Into<DocId>, text: impl Into<String>, modified: OffsetDateTime, backlinks: usize) {
        self.notes.write().insert(id.into(), StoredNote { text: text.into(), modified, backlinks });
    }

    /// Replaces a note's text and bumps its modified time.
    pub fn edit(&self, id: &str, text: impl Into<String>, modified: OffsetDateTime) {
        if let Some(note) = self.notes.write().get_mut(id) {
            note.text = text.into();
            note.modified = modified;
        }
    }

    pub fn remove(&self, id: &str) -> bool { self.notes.write().remove(id).is_some() }

    pub fn rename(&self, from: &str, to: impl Into<DocId>) -> bool {
        let mut notes = self.notes.write();
        match notes.remove(from) {
            Some(note) => {
                notes.insert(to.into(), note);
                true
            }
            None => false,
        }
    }
}

impl DocumentStore for MemoryStore {
    fn list_documents(&self) -> Vec<Document> {
        self.notes
            .read()
            .iter()
            .map(|(id, note)| Document { id: id.clone(), text: note.text.clone() })
            .collect()
    }

    fn read_document(&self, id: &str) -> Option<String> { self.notes.read().get(id).map(|n| n.text.clone()) }

    fn modified_time(&self, id: &str) -> Option<OffsetDateTime> { self.notes.read().get(id).map(|n| n.modified) }

    fn backlink_count(&self, id: &str) -> usize { self.notes.read().get(id).map(|n| n.backlinks).unwrap_or(0) }
}
