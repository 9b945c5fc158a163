//! Ranked "forgotten note" queries on top of the index and the scoring model.

use serde::Serialize;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use time::OffsetDateTime;

use crate::config::ResurfaceConfig;
use crate::index::{IndexEngine, SimilarNote};
use crate::scoring::{composite, connectivity_boost, days_since, relevance, staleness};
use crate::store::DocumentStore;
use crate::DocId;

const RELATED_SIMILARITY: f64 = 0.3;
const LONG_AGO_STALENESS: f64 = 0.8;
const UNLINKED_BOOST: f64 = 0.5;

/// Why a note made it into the digest, by threshold priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Reason {
    #[serde(rename = "related to recent work")]
    RelatedToRecentWork,
    #[serde(rename = "written long ago")]
    WrittenLongAgo,
    #[serde(rename = "unlinked, consider connecting")]
    Unlinked,
    #[serde(rename = "forgotten note")]
    Forgotten,
}

impl Reason {
    pub fn classify(similarity: f64, staleness: f64, boost: f64) -> Self {
        if similarity > RELATED_SIMILARITY {
            Reason::RelatedToRecentWork
        } else if staleness > LONG_AGO_STALENESS {
            Reason::WrittenLongAgo
        } else if boost > UNLINKED_BOOST {
            Reason::Unlinked
        } else {
            Reason::Forgotten
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Reason::RelatedToRecentWork => "related to recent work",
            Reason::WrittenLongAgo => "written long ago",
            Reason::Unlinked => "unlinked, consider connecting",
            Reason::Forgotten => "forgotten note",
        }
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DigestEntry {
    pub id: DocId,
    pub score: f64,
    pub reason: Reason,
    pub days_since_modified: f64,
}

/// Borrows the index, the store and the tunables for one round of queries.
pub struct Resurfacer<'a, S: DocumentStore + ?Sized> {
    engine: &'a IndexEngine,
    store: &'a S,
    config: &'a ResurfaceConfig,
}

impl<'a, S: DocumentStore + ?Sized> Resurfacer<'a, S> {
    pub fn new(engine: &'a IndexEngine, store: &'a S, config: &'a ResurfaceConfig) -> Self {
        Self { engine, store, config }
    }

    pub fn daily_digest(&self, count: usize) -> Vec<DigestEntry> {
        self.daily_digest_at(count, OffsetDateTime::now_utc())
    }

    /// Old notes ranked by composite score. Recently modified notes act as
    /// anchors; each candidate keeps its best similarity to any anchor. With
    /// no anchors every old-enough note is ranked on staleness and
    /// connectivity alone.
    pub fn daily_digest_at(&self, count: usize, now: OffsetDateTime) -> Vec<DigestEntry> {
        if !self.engine.is_ready() || count == 0 {
            return Vec::new();
        }
        let modified: HashMap<&DocId, OffsetDateTime> = self
            .engine
            .ids()
            .filter_map(|id| self.store.modified_time(id).map(|t| (id, t)))
            .collect();

        let mut anchors: Vec<(&DocId, OffsetDateTime)> = modified
            .iter()
            .filter(|(_, t)| days_since(**t, now) < self.config.recent_window_days)
            .map(|(id, t)| (*id, *t))
            .collect();
        anchors.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        anchors.truncate(self.config.max_anchors);

        let mut entries: Vec<DigestEntry> = if anchors.is_empty() {
            tracing::debug!("no recent anchors; ranking by staleness and connectivity");
            modified
                .iter()
                .map(|(id, t)| (*id, days_since(*t, now)))
                .filter(|(_, days)| *days >= self.config.min_days_old)
                .map(|(id, days)| self.score(id, 0.0, self.config.fallback_relevance, days))
                .collect()
        } else {
            let mut best: HashMap<&DocId, f64> = HashMap::new();
            for (anchor, _) in &anchors {
                for SimilarNote { id, similarity } in self.engine.find_similar(anchor, self.config.anchor_fanout) {
                    let Some((id, t)) = modified.get_key_value(&id) else { continue };
                    if days_since(*t, now) < self.config.min_days_old {
                        continue;
                    }
                    let slot = best.entry(*id).or_insert(similarity);
                    if similarity > *slot {
                        *slot = similarity;
                    }
                }
            }
            tracing::debug!(anchors = anchors.len(), candidates = best.len(), "digest candidates gathered");
            best.into_iter()
                .map(|(id, similarity)| self.score(id, similarity, relevance(similarity), days_since(modified[id], now)))
                .collect()
        };

        entries.sort_by(|a, b| match b.score.total_cmp(&a.score) {
            Ordering::Equal => a.id.cmp(&b.id),
            other => other,
        });
        entries.truncate(count);
        entries
    }

    pub fn contextual_related(&self, id: &str, count: usize) -> Vec<SimilarNote> {
        self.contextual_related_at(id, count, OffsetDateTime::now_utc())
    }

    /// Notes on the same topic as `id`, by similarity alone, skipping notes
    /// touched within `min_days_old`.
    pub fn contextual_related_at(&self, id: &str, count: usize, now: OffsetDateTime) -> Vec<SimilarNote> {
        if !self.engine.is_ready() || count == 0 {
            return Vec::new();
        }
        self.engine
            .find_similar(id, count.saturating_mul(3))
            .into_iter()
            .filter(|hit| {
                self.store
                    .modified_time(&hit.id)
                    .map(|t| days_since(t, now) >= self.config.min_days_old)
                    .unwrap_or(false)
            })
            .take(count)
            .collect()
    }

    fn score(&self, id: &DocId, similarity: f64, relevance: f64, days: f64) -> DigestEntry {
        let staleness = staleness(days, self.config.staleness_time_constant_days);
        let boost = connectivity_boost(self.store.backlink_count(id));
        DigestEntry {
            id: id.clone(),
            score: composite(relevance, staleness, boost, &self.config.weights),
            reason: Reason::classify(similarity, staleness, boost),
            days_since_modified: days,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use time::macros::datetime;
    use time::Duration;

    const NOW: OffsetDateTime = datetime!(2026-06-01 12:00 UTC);

    fn add(store: &MemoryStore, id: &str, text: &str, days_old: i64, backlinks: usize) {
        store.insert(id, text, NOW - Duration::days(days_old), backlinks);
    }

    fn garden_store() -> MemoryStore {
        let store = MemoryStore::new();
        add(&store, "plan.md", "Planning the spring garden: roses along the fence, tomatoes in raised beds.", 1, 0);
        add(&store, "journal.md", "Journal: pruned the roses today, compost pile steaming.", 2, 0);
        add(&store, "roses.md", "Rose pruning guide: cut roses above an outward bud.", 30, 0);
        add(&store, "tomatoes.md", "Tomatoes love raised beds and warm soil.", 60, 5);
        add(&store, "compost.md", "Compost pile needs greens, browns and turning.", 45, 1);
        add(&store, "rust.md", "Rust lifetimes and the borrow checker.", 90, 0);
        add(&store, "recent.md", "Roses roses roses fence.", 5, 0);
        store
    }

    fn engine_for(store: &MemoryStore) -> IndexEngine {
        let mut engine = IndexEngine::new();
        engine.build_full(&store.list_documents());
        engine
    }

    #[test]
    fn reasons_follow_threshold_priority() {
        assert_eq!(Reason::classify(0.31, 0.9, 1.0), Reason::RelatedToRecentWork);
        assert_eq!(Reason::classify(0.3, 0.81, 1.0), Reason::WrittenLongAgo);
        assert_eq!(Reason::classify(0.1, 0.8, 1.0), Reason::Unlinked);
        assert_eq!(Reason::classify(0.1, 0.5, 0.5), Reason::Forgotten);
        assert_eq!(Reason::Unlinked.to_string(), "unlinked, consider connecting");
        assert_eq!(serde_json::to_string(&Reason::Forgotten).unwrap(), "\"forgotten note\"");
    }

    #[test]
    fn nothing_before_build() {
        let store = garden_store();
        let engine = IndexEngine::new();
        let config = ResurfaceConfig::default();
        let resurfacer = Resurfacer::new(&engine, &store, &config);
        assert!(resurfacer.daily_digest_at(5, NOW).is_empty());
        assert!(resurfacer.contextual_related_at("plan.md", 5, NOW).is_empty());
    }

    #[test]
    fn digest_ranks_old_notes_related_to_anchors() {
        let store = garden_store();
        let engine = engine_for(&store);
        let config = ResurfaceConfig::default();
        let digest = Resurfacer::new(&engine, &store, &config).daily_digest_at(10, NOW);

        let mut ids: Vec<&str> = digest.iter().map(|e| e.id.as_str()).collect();
        ids.sort();
        assert_eq!(ids, vec!["compost.md", "roses.md", "tomatoes.md"]);
        assert!(digest.windows(2).all(|w| w[0].score >= w[1].score));

        for entry in &digest {
            let best = ["plan.md", "journal.md"]
                .iter()
                .flat_map(|anchor| engine.find_similar(anchor, 20))
                .filter(|hit| hit.id == entry.id)
                .map(|hit| hit.similarity)
                .fold(0.0, f64::max);
            let days = days_since(store.modified_time(&entry.id).unwrap(), NOW);
            let expected = composite(
                relevance(best),
                staleness(days, config.staleness_time_constant_days),
                connectivity_boost(store.backlink_count(&entry.id)),
                &config.weights,
            );
            assert!((entry.score - expected).abs() < 1e-12, "{}", entry.id);
            assert!((entry.days_since_modified - days).abs() < 1e-9);
        }
    }

    #[test]
    fn digest_respects_count() {
        let store = garden_store();
        let engine = engine_for(&store);
        let config = ResurfaceConfig::default();
        let resurfacer = Resurfacer::new(&engine, &store, &config);
        let full = resurfacer.daily_digest_at(10, NOW);
        let top = resurfacer.daily_digest_at(1, NOW);
        assert_eq!(top.len(), 1);
        assert_eq!(top[0], full[0]);
        assert!(resurfacer.daily_digest_at(0, NOW).is_empty());
    }

    #[test]
    fn digest_falls_back_without_anchors() {
        let store = MemoryStore::new();
        add(&store, "a.md", "sourdough starter feeding schedule", 10, 0);
        add(&store, "b.md", "mountain bike suspension tuning", 40, 2);
        add(&store, "c.md", "quarterly budget spreadsheet review", 90, 6);
        add(&store, "d.md", "watercolor landscape painting palette", 8, 1);
        add(&store, "e.md", "sourdough crumb structure photos", 4, 0);
        let engine = engine_for(&store);
        let config = ResurfaceConfig::default();
        let digest = Resurfacer::new(&engine, &store, &config).daily_digest_at(10, NOW);

        let mut expected: Vec<(String, f64)> = ["a.md", "b.md", "c.md", "d.md"]
            .iter()
            .map(|id| {
                let days = days_since(store.modified_time(id).unwrap(), NOW);
                let s = staleness(days, config.staleness_time_constant_days);
                let b = connectivity_boost(store.backlink_count(id));
                (id.to_string(), composite(0.3, s, b, &config.weights))
            })
            .collect();
        expected.sort_by(|a, b| b.1.total_cmp(&a.1));

        let got: Vec<(String, f64)> = digest.iter().map(|e| (e.id.clone(), e.score)).collect();
        assert_eq!(got.len(), expected.len());
        for (g, e) in got.iter().zip(&expected) {
            assert_eq!(g.0, e.0);
            assert!((g.1 - e.1).abs() < 1e-12);
        }
        let c = digest.iter().find(|e| e.id == "c.md").unwrap();
        assert_eq!(c.reason, Reason::WrittenLongAgo);
        let a = digest.iter().find(|e| e.id == "a.md").unwrap();
        assert_eq!(a.reason, Reason::Unlinked);
    }

    #[test]
    fn anchors_are_capped_and_most_recent_first() {
        let store = garden_store();
        let engine = engine_for(&store);
        // only the single most recent note (plan.md) anchors the digest
        let config = ResurfaceConfig { max_anchors: 1, ..ResurfaceConfig::default() };
        let digest = Resurfacer::new(&engine, &store, &config).daily_digest_at(10, NOW);
        assert!(digest.iter().all(|e| e.id != "compost.md"));
        assert!(digest.iter().any(|e| e.id == "tomatoes.md"));
    }

    #[test]
    fn related_skips_recent_notes() {
        let store = garden_store();
        let engine = engine_for(&store);
        let config = ResurfaceConfig::default();
        let resurfacer = Resurfacer::new(&engine, &store, &config);

        let related = resurfacer.contextual_related_at("plan.md", 2, NOW);
        assert!(!related.is_empty());
        assert!(related.len() <= 2);
        assert!(related.iter().all(|hit| !["journal.md", "recent.md"].contains(&hit.id.as_str())));
        let expected: Vec<SimilarNote> = engine
            .find_similar("plan.md", 6)
            .into_iter()
            .filter(|hit| days_since(store.modified_time(&hit.id).unwrap(), NOW) >= config.min_days_old)
            .take(2)
            .collect();
        assert_eq!(related, expected);
        assert_eq!(resurfacer.contextual_related_at("plan.md", 1, NOW).len(), 1);
        assert!(resurfacer.contextual_related_at("missing.md", 3, NOW).is_empty());
    }
}
