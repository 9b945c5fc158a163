use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::time::Duration;

use crate::scoring::{ScoreWeights, DEFAULT_STALENESS_TIME_CONSTANT_DAYS};

/// Tunables for ranking and change ingestion. Every field has a default, so a
/// config file only needs the keys it overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResurfaceConfig {
    pub weights: ScoreWeights,
    pub staleness_time_constant_days: f64,
    /// Notes modified more recently than this are never resurfaced.
    pub min_days_old: f64,
    /// Lookback for choosing digest anchors.
    pub recent_window_days: f64,
    pub max_anchors: usize,
    /// Similar notes pulled per anchor.
    pub anchor_fanout: usize,
    /// Relevance assigned to every candidate when there are no anchors.
    pub fallback_relevance: f64,
    /// Digest length served when a caller does not ask for one.
    pub digest_count: usize,
    pub index_debounce_ms: u64,
    pub refresh_debounce_ms: u64,
}

impl Default for ResurfaceConfig {
    fn default() -> Self {
        Self {
            weights: ScoreWeights::default(),
            staleness_time_constant_days: DEFAULT_STALENESS_TIME_CONSTANT_DAYS,
            min_days_old: 7.0,
            recent_window_days: 3.0,
            max_anchors: 10,
            anchor_fanout: 20,
            fallback_relevance: 0.3,
            digest_count: 5,
            index_debounce_ms: 2_000,
            refresh_debounce_ms: 250,
        }
    }
}

impl ResurfaceConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let f = File::open(path).with_context(|| format!("opening config {}", path.display()))?;
        let config: ResurfaceConfig = serde_json::from_reader(BufReader::new(f))
            .with_context(|| format!("parsing config {}", path.display()))?;
        if (config.weights.total() - 1.0).abs() > 1e-6 {
            tracing::warn!(total = config.weights.total(), "score weights do not sum to 1.0");
        }
        Ok(config)
    }

    /// Defaults when `path` is `None`.
    pub fn load_or_default<P: AsRef<Path>>(path: Option<P>) -> Result<Self> {
        match path {
            Some(p) => Self::load(p),
            None => Ok(Self::default()),
        }
    }

    pub fn index_debounce(&self) -> Duration { Duration::from_millis(self.index_debounce_ms) }

    pub fn refresh_debounce(&self) -> Duration { Duration::from_millis(self.refresh_debounce_ms) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn partial_file_keeps_defaults() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        write!(f, r#"{{ "min_days_old": 14, "weights": {{ "boost": 0.25 }} }}"#).unwrap();
        let config = ResurfaceConfig::load(f.path()).unwrap();
        assert_eq!(config.min_days_old, 14.0);
        assert_eq!(config.weights.boost, 0.25);
        assert_eq!(config.weights.relevance, 0.5);
        assert_eq!(config.max_anchors, 10);
        assert_eq!(config.index_debounce(), Duration::from_secs(2));
    }

    #[test]
    fn malformed_file_is_an_error() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        write!(f, "not json").unwrap();
        assert!(ResurfaceConfig::load(f.path()).is_err());
    }

    #[test]
    fn no_path_means_defaults() {
        let config = ResurfaceConfig::load_or_default(None::<&str>).unwrap();
        assert_eq!(config, ResurfaceConfig::default());
    }
}
