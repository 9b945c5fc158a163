//! Bringing the index in line with the document store after changes.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::index::IndexEngine;
use crate::store::DocumentStore;
use crate::DocId;

/// Last known change to a note. A rename is a `Removed` for the old id and
/// a `Modified` for the new one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoteChange {
    Modified,
    Removed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub upserted: usize,
    pub removed: usize,
}

/// Applies a coalesced batch. Content is read from the store now, so each note
/// is indexed once with its latest text; a `Modified` note the store no
/// longer has is removed. The store hears about each note so it can update
/// its link metadata.
pub fn apply_changes<S>(engine: &mut IndexEngine, store: &S, batch: HashMap<DocId, NoteChange>) -> SyncReport
where
    S: DocumentStore + ?Sized,
{
    let mut report = SyncReport::default();
    if !engine.is_ready() {
        tracing::debug!(pending = batch.len(), "index not built; dropping change batch");
        return report;
    }
    let mut batch: Vec<(DocId, NoteChange)> = batch.into_iter().collect();
    batch.sort_by(|a, b| a.0.cmp(&b.0));
    for (id, change) in batch {
        let text = match change {
            NoteChange::Modified => store.read_document(&id),
            NoteChange::Removed => None,
        };
        store.note_changed(&id, text.as_deref());
        match text {
            Some(text) => {
                engine.upsert_one(&id, &text);
                report.upserted += 1;
            }
            None => {
                if engine.remove(&id) {
                    report.removed += 1;
                }
            }
        }
    }
    tracing::info!(upserted = report.upserted, removed = report.removed, "change batch applied");
    report
}

/// After a snapshot restore: re-indexes notes modified since the index last
/// changed, adds notes it never saw and drops notes that are gone.
pub fn reconcile<S>(engine: &mut IndexEngine, store: &S) -> SyncReport
where
    S: DocumentStore + ?Sized,
{
    let Some(since) = engine.updated_at().filter(|_| engine.is_ready()) else { return SyncReport::default() };
    let docs = store.list_documents();
    let live: HashSet<&DocId> = docs.iter().map(|d| &d.id).collect();
    let gone: Vec<DocId> = engine.ids().filter(|id| !live.contains(id)).cloned().collect();

    let mut report = SyncReport::default();
    for id in gone {
        engine.remove(&id);
        report.removed += 1;
    }
    for doc in &docs {
        let changed = store.modified_time(&doc.id).map(|t| t > since).unwrap_or(true);
        if !engine.contains(&doc.id) || changed {
            engine.upsert_one(&doc.id, &doc.text);
            report.upserted += 1;
        }
    }
    if report != SyncReport::default() {
        tracing::info!(upserted = report.upserted, removed = report.removed, "index reconciled with notes");
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use time::{Duration, OffsetDateTime};

    fn setup() -> (IndexEngine, MemoryStore) {
        let old = OffsetDateTime::now_utc() - Duration::days(30);
        let store = MemoryStore::new();
        store.insert("bread.md", "sourdough starter hydration levels", old, 0);
        store.insert("bike.md", "mountain bike suspension tuning", old, 0);
        store.insert("paint.md", "watercolor palette mixing", old, 0);
        store.insert("garden.md", "roses and tomatoes", old, 0);
        store.insert("music.md", "violin concerto rehearsal", old, 0);
        let mut engine = IndexEngine::new();
        engine.build_full(&store.list_documents());
        (engine, store)
    }

    #[test]
    fn batch_reads_latest_content() {
        let (mut engine, store) = setup();
        store.edit("bike.md", "sourdough loaves for the bike trip", OffsetDateTime::now_utc());
        let batch = HashMap::from([("bike.md".to_string(), NoteChange::Modified)]);
        let report = apply_changes(&mut engine, &store, batch);
        assert_eq!(report, SyncReport { upserted: 1, removed: 0 });
        assert_eq!(engine.find_similar("bread.md", 1)[0].id, "bike.md");
    }

    #[test]
    fn missing_modified_note_is_removed() {
        let (mut engine, store) = setup();
        store.remove("paint.md");
        let batch = HashMap::from([
            ("paint.md".to_string(), NoteChange::Modified),
            ("bike.md".to_string(), NoteChange::Removed),
        ]);
        let report = apply_changes(&mut engine, &store, batch);
        assert_eq!(report, SyncReport { upserted: 0, removed: 2 });
        assert_eq!(engine.len(), 3);
    }

    #[test]
    fn batches_before_build_are_dropped() {
        let (_, store) = setup();
        let mut engine = IndexEngine::new();
        let batch = HashMap::from([("bike.md".to_string(), NoteChange::Modified)]);
        assert_eq!(apply_changes(&mut engine, &store, batch), SyncReport::default());
        assert!(engine.is_empty());
    }

    #[test]
    fn reconcile_catches_up_after_restore() {
        let (engine, store) = setup();
        let blob = engine.snapshot().unwrap();
        let mut restored = IndexEngine::new();
        assert!(restored.restore(&blob));

        // the restored timestamp is truncated to whole seconds, so edits made now are newer
        let later = OffsetDateTime::now_utc();
        store.edit("bike.md", "sourdough starter on the bike", later);
        store.remove("paint.md");
        store.insert("new.md", "fresh sourdough notes", later, 0);

        let report = reconcile(&mut restored, &store);
        assert_eq!(report, SyncReport { upserted: 2, removed: 1 });
        assert!(restored.contains("new.md"));
        assert!(!restored.contains("paint.md"));
        // nothing changed since the catch-up
        assert_eq!(reconcile(&mut restored, &store), SyncReport::default());
    }
}
