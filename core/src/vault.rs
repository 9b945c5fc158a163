//! A directory of markdown/text notes as a [`DocumentStore`].

use lazy_static::lazy_static;
use parking_lot::RwLock;
use regex::Regex;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fs;
use std::path::{Component, Path, PathBuf};
use time::OffsetDateTime;
use walkdir::{DirEntry, WalkDir};

use crate::store::DocumentStore;
use crate::{DocId, Document};

lazy_static! {
    // [[target]], [[target|alias]], [[target#heading]]
    static ref WIKI_LINK: Regex = Regex::new(r"\[\[([^\]|#]+)(?:[|#][^\]]*)?\]\]").expect("valid regex");
    // [text](target.md)
    static ref MD_LINK: Regex = Regex::new(r"\]\(([^)\s]+?\.md)(?:#[^)]*)?\)").expect("valid regex");
}

const NOTE_EXTENSIONS: &[&str] = &["md", "markdown", "txt"];

/// Notes under `root`. Ids are root-relative paths joined with `/`.
/// Backlink counts come from a link graph scanned once at open and then kept
/// current note by note through [`DocumentStore::note_changed`].
pub struct NotesDir {
    root: PathBuf,
    links: RwLock<LinkGraph>,
}

impl NotesDir {
    pub fn open<P: AsRef<Path>>(root: P) -> Self {
        let dir = Self { root: root.as_ref().to_path_buf(), links: RwLock::new(LinkGraph::default()) };
        let docs = dir.list_documents();
        dir.reload(&docs);
        dir
    }

    pub fn root(&self) -> &Path { &self.root }

    /// Location of a note under the root. `None` for ids that could leave the
    /// root (`..`, absolute paths, empty segments), point into hidden
    /// directories or do not name a note file.
    pub fn path_of(&self, id: &str) -> Option<PathBuf> {
        if !is_note(Path::new(id)) {
            return None;
        }
        let mut path = self.root.clone();
        for part in id.split('/') {
            if part.starts_with('.') {
                return None;
            }
            let mut components = Path::new(part).components();
            match (components.next(), components.next()) {
                (Some(Component::Normal(name)), None) => path.push(name),
                _ => return None,
            }
        }
        Some(path)
    }

    /// An existing note file that really lives under the root, symlinks resolved.
    fn note_file(&self, id: &str) -> Option<PathBuf> {
        let path = self.path_of(id)?;
        let real = fs::canonicalize(&path).ok()?;
        let root = fs::canonicalize(&self.root).ok()?;
        (real.starts_with(&root) && real.is_file()).then_some(path)
    }

    fn notes(&self) -> Vec<(DocId, PathBuf)> {
        let mut notes: Vec<(DocId, PathBuf)> = WalkDir::new(&self.root)
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !is_hidden(e))
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file() && is_note(e.path()))
            .filter_map(|e| to_id(&self.root, e.path()).map(|id| (id, e.into_path())))
            .collect();
        notes.sort();
        notes
    }
}

fn read_or_empty(id: &str, path: &Path) -> String {
    match fs::read(path) {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(e) => {
            tracing::warn!(id, error = %e, "unreadable note; indexing as empty");
            String::new()
        }
    }
}

impl DocumentStore for NotesDir {
    fn list_documents(&self) -> Vec<Document> {
        self.notes()
            .into_iter()
            .map(|(id, path)| {
                let text = read_or_empty(&id, &path);
                Document { id, text }
            })
            .collect()
    }

    fn read_document(&self, id: &str) -> Option<String> {
        let Some(path) = self.note_file(id) else {
            tracing::debug!(id, "not a note under the notes root");
            return None;
        };
        Some(read_or_empty(id, &path))
    }

    fn modified_time(&self, id: &str) -> Option<OffsetDateTime> {
        let modified = fs::metadata(self.note_file(id)?).and_then(|m| m.modified()).ok()?;
        Some(OffsetDateTime::from(modified))
    }

    fn backlink_count(&self, id: &str) -> usize { self.links.read().backlink_count(id) }

    fn reload(&self, documents: &[Document]) {
        let graph = LinkGraph::from_documents(documents);
        tracing::debug!(num_notes = documents.len(), linking = graph.outgoing.len(), "links rescanned");
        *self.links.write() = graph;
    }

    fn note_changed(&self, id: &str, text: Option<&str>) { self.links.write().update(id, text); }
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry.file_name().to_str().map(|s| s.starts_with('.')).unwrap_or(false)
}

fn is_note(path: &Path) -> bool {
    path.extension()
        .and_then(|s| s.to_str())
        .map(|ext| NOTE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

fn to_id(root: &Path, path: &Path) -> Option<DocId> {
    let rel = path.strip_prefix(root).ok()?;
    let parts: Vec<String> = rel.components().map(|c| c.as_os_str().to_string_lossy().into_owned()).collect();
    (!parts.is_empty()).then(|| parts.join("/"))
}

fn strip_note_extension(target: &str) -> &str {
    match target.rsplit_once('.') {
        Some((stem, ext)) if NOTE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()) => stem,
        _ => target,
    }
}

/// Lowercased path without extension; note ids and link targets meet here.
fn link_key(raw: &str) -> String {
    let target = raw.trim().trim_start_matches("./").replace("%20", " ");
    strip_note_extension(&target).to_lowercase()
}

fn stem_of(key: &str) -> &str { key.rsplit('/').next().unwrap_or(key) }

/// Removes `value` from the set under `key`, dropping the set once empty.
/// Returns whether `key` is gone.
fn remove_from(map: &mut HashMap<String, BTreeSet<String>>, key: &str, value: &str) -> bool {
    if let Some(set) = map.get_mut(key) {
        set.remove(value);
        if set.is_empty() {
            map.remove(key);
        }
    }
    !map.contains_key(key)
}

/// Who links to what. A target resolves by full path, else by file stem; when
/// several notes share a key the lowest id wins. Counts are answered from the
/// reverse index, so a changed note costs only its own links.
#[derive(Debug, Default)]
struct LinkGraph {
    by_path: HashMap<String, BTreeSet<DocId>>,
    by_stem: HashMap<String, BTreeSet<DocId>>,
    outgoing: HashMap<DocId, BTreeSet<String>>,
    referrers: HashMap<String, BTreeSet<DocId>>,
    /// Linked keys grouped by stem.
    targets_by_stem: HashMap<String, BTreeSet<String>>,
}

impl LinkGraph {
    fn from_documents(docs: &[Document]) -> Self {
        let mut graph = Self::default();
        for doc in docs {
            graph.update(&doc.id, Some(&doc.text));
        }
        graph
    }

    /// Replaces what is known about `id`; `None` means the note is gone.
    fn update(&mut self, id: &str, text: Option<&str>) {
        self.forget(id);
        let Some(text) = text else { return };

        let key = link_key(id);
        self.by_stem.entry(stem_of(&key).to_string()).or_default().insert(id.to_string());
        self.by_path.entry(key).or_default().insert(id.to_string());

        let targets: BTreeSet<String> = WIKI_LINK
            .captures_iter(text)
            .chain(MD_LINK.captures_iter(text))
            .map(|caps| link_key(&caps[1]))
            .filter(|target| !target.is_empty())
            .collect();
        for target in &targets {
            self.referrers.entry(target.clone()).or_default().insert(id.to_string());
            self.targets_by_stem.entry(stem_of(target).to_string()).or_default().insert(target.clone());
        }
        if !targets.is_empty() {
            self.outgoing.insert(id.to_string(), targets);
        }
    }

    fn forget(&mut self, id: &str) {
        let key = link_key(id);
        remove_from(&mut self.by_stem, stem_of(&key), id);
        remove_from(&mut self.by_path, &key, id);
        for target in self.outgoing.remove(id).unwrap_or_default() {
            if remove_from(&mut self.referrers, &target, id) {
                remove_from(&mut self.targets_by_stem, stem_of(&target), &target);
            }
        }
    }

    fn resolve(&self, key: &str) -> Option<&DocId> {
        self.by_path
            .get(key)
            .or_else(|| self.by_stem.get(stem_of(key)))
            .and_then(|ids| ids.iter().next())
    }

    /// Distinct notes linking to `id`, self-links excluded.
    fn backlink_count(&self, id: &str) -> usize {
        let key = link_key(id);
        let Some(targets) = self.targets_by_stem.get(stem_of(&key)) else { return 0 };
        let mut from: HashSet<&DocId> = HashSet::new();
        for target in targets {
            if self.resolve(target).map(|t| t == id).unwrap_or(false) {
                if let Some(notes) = self.referrers.get(target) {
                    from.extend(notes.iter().filter(|n| n.as_str() != id));
                }
            }
        }
        from.len()
    }
}
