use crate::index::{IndexEngine, SNAPSHOT_VERSION};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs::{create_dir_all, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use time::format_description::well_known::Rfc3339;

#[derive(Debug, Serialize, Deserialize)]
pub struct MetaFile {
    pub num_docs: usize,
    pub num_terms: usize,
    pub created_at: String,
    pub version: u32,
}

#[derive(Debug, Clone)]
pub struct IndexPaths {
    pub root: PathBuf,
}

impl IndexPaths {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self { root: root.as_ref().to_path_buf() }
    }
    pub fn snapshot(&self) -> PathBuf { self.root.join("snapshot.bin") }
    pub fn meta(&self) -> PathBuf { self.root.join("meta.json") }
}

/// Writes the engine snapshot and a human-readable meta file.
pub fn save_snapshot(paths: &IndexPaths, engine: &IndexEngine) -> Result<()> {
    create_dir_all(&paths.root)?;
    let bytes = engine.snapshot()?;
    // replaced atomically
    let tmp = paths.root.join("snapshot.bin.tmp");
    let mut f = File::create(&tmp)?;
    f.write_all(&bytes)?;
    f.sync_all()?;
    std::fs::rename(&tmp, paths.snapshot())?;

    let stats = engine.stats();
    let meta = MetaFile {
        num_docs: stats.num_docs,
        num_terms: stats.num_terms,
        created_at: stats.built_at.and_then(|t| t.format(&Rfc3339).ok()).unwrap_or_default(),
        version: SNAPSHOT_VERSION,
    };
    save_meta(paths, &meta)?;
    tracing::info!(path = %paths.snapshot().display(), num_docs = stats.num_docs, "snapshot saved");
    Ok(())
}

/// Restores `engine` from disk. `false` means there is no usable snapshot and
/// the caller should run a full build.
pub fn load_snapshot(paths: &IndexPaths, engine: &mut IndexEngine) -> bool {
    match read_snapshot_bytes(paths) {
        Ok(bytes) => engine.restore(&bytes),
        Err(e) => {
            tracing::warn!(path = %paths.snapshot().display(), error = %e, "no valid snapshot");
            false
        }
    }
}

fn read_snapshot_bytes(paths: &IndexPaths) -> Result<Vec<u8>> {
    let mut f = File::open(paths.snapshot())?;
    let mut buf = Vec::new();
    f.read_to_end(&mut buf)?;
    Ok(buf)
}

pub fn save_meta(paths: &IndexPaths, meta: &MetaFile) -> Result<()> {
    create_dir_all(&paths.root)?;
    let mut f = File::create(paths.meta())?;
    let json = serde_json::to_string_pretty(meta)?;
    f.write_all(json.as_bytes())?;
    Ok(())
}

pub fn load_meta(paths: &IndexPaths) -> Result<MetaFile> {
    let mut f = File::open(paths.meta())?;
    let mut buf = String::new();
    f.read_to_string(&mut buf)?;
    let meta: MetaFile = serde_json::from_str(&buf)?;
    Ok(meta)
}
