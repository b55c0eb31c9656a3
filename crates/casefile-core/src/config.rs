//! Configuration and data directory management.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Paths to all Casefile data directories.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataPaths {
    /// Root data directory (e.g., `data/`).
    pub root: PathBuf,
    /// SQLite database directory (`data/db/`).
    pub db: PathBuf,
    /// Uploaded source files (`data/uploads/`).
    pub uploads: PathBuf,
    /// Analysis parameters (`data/analysis.json`).
    pub analysis_config_file: PathBuf,
}

impl DataPaths {
    /// Create data paths from a root directory. Creates directories if needed.
    pub fn new(root: impl AsRef<Path>) -> std::io::Result<Self> {
        let root = root.as_ref().to_path_buf();
        let paths = Self {
            db: root.join("db"),
            uploads: root.join("uploads"),
            analysis_config_file: root.join("analysis.json"),
            root,
        };
        paths.ensure_dirs()?;
        Ok(paths)
    }

    fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.db)?;
        std::fs::create_dir_all(&self.uploads)?;
        Ok(())
    }
}

/// How the timeline clusterer decides whether an event joins the open cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClusterWindow {
    /// Measure from the cluster's first event. A cluster never spans more
    /// than `cluster_max_days`.
    #[default]
    Anchored,
    /// Measure from the previous event, so clusters chain.
    Rolling,
}

/// Tunable parameters for the derived analyses (persisted to analysis.json).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Minimum number of shared documents for a pair to be kept.
    pub min_cooccurrence: usize,
    /// Per-document entity fan-out cap applied before pairwise expansion.
    pub max_entities_per_document: usize,
    /// Restrict co-occurrence aggregation to one entity type.
    pub cooccurrence_entity_type: Option<String>,
    /// Default entity type for the network projection.
    pub network_entity_type: String,
    /// Default node count for the network projection.
    pub network_limit: usize,
    /// Cluster window width in days.
    pub cluster_max_days: i64,
    /// Smallest cluster that is kept.
    pub cluster_min_events: usize,
    pub cluster_window: ClusterWindow,
    /// Upper bound on distinct entities pulled from a single document.
    pub max_entities_per_extraction: usize,
    /// Characters of context kept on each side of a mention.
    pub context_radius: usize,
    #[serde(skip)]
    pub config_path: PathBuf,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            min_cooccurrence: 5,
            max_entities_per_document: 150,
            cooccurrence_entity_type: None,
            network_entity_type: "person".into(),
            network_limit: 50,
            cluster_max_days: 7,
            cluster_min_events: 3,
            cluster_window: ClusterWindow::Anchored,
            max_entities_per_extraction: 200,
            context_radius: 80,
            config_path: PathBuf::new(),
        }
    }
}

impl AnalysisConfig {
    /// Load from file, falling back to defaults, then apply env overrides.
    pub fn load(config_path: &Path) -> Self {
        let mut config: AnalysisConfig = match std::fs::read_to_string(config_path) {
            Ok(s) => serde_json::from_str(&s).unwrap_or_else(|e| {
                warn!("Ignoring malformed {}: {}", config_path.display(), e);
                AnalysisConfig::default()
            }),
            Err(_) => AnalysisConfig::default(),
        };
        config.config_path = config_path.to_path_buf();
        config.apply_overrides(|key| std::env::var(key).ok());
        config
    }

    /// Apply `CASEFILE_*` overrides from a key lookup.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("CASEFILE_MIN_COOCCURRENCE").and_then(|v| v.parse().ok()) {
            self.min_cooccurrence = v;
        }
        if let Some(v) = lookup("CASEFILE_MAX_ENTITIES_PER_DOC").and_then(|v| v.parse().ok()) {
            self.max_entities_per_document = v;
        }
        if let Some(v) = lookup("CASEFILE_CLUSTER_MAX_DAYS").and_then(|v| v.parse().ok()) {
            self.cluster_max_days = v;
        }
        if let Some(v) = lookup("CASEFILE_CLUSTER_MIN_EVENTS").and_then(|v| v.parse().ok()) {
            self.cluster_min_events = v;
        }
    }

    /// Save config to disk.
    pub fn save(&self) -> std::io::Result<()> {
        if let Some(parent) = self.config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
        std::fs::write(&self.config_path, json)?;
        info!("Saved analysis config to {}", self.config_path.display());
        Ok(())
    }
}

/// Top-level Casefile configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CasefileConfig {
    /// HTTP server port.
    pub port: u16,
    /// Data directory paths.
    pub data_paths: DataPaths,
    #[serde(skip)]
    pub analysis: AnalysisConfig,
}

impl CasefileConfig {
    /// Create configuration from environment and defaults.
    pub fn from_env(data_dir: impl AsRef<Path>) -> std::io::Result<Self> {
        let port = std::env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(3004);

        let data_paths = DataPaths::new(data_dir)?;
        let analysis = AnalysisConfig::load(&data_paths.analysis_config_file);

        Ok(Self {
            port,
            data_paths,
            analysis,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let c = AnalysisConfig::default();
        assert_eq!(c.min_cooccurrence, 5);
        assert_eq!(c.network_limit, 50);
        assert_eq!(c.network_entity_type, "person");
        assert_eq!(c.cluster_max_days, 7);
        assert_eq!(c.cluster_min_events, 3);
        assert_eq!(c.cluster_window, ClusterWindow::Anchored);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("analysis.json");
        std::fs::write(&path, r#"{"min_cooccurrence": 2, "cluster_window": "rolling"}"#).unwrap();

        let c = AnalysisConfig::load(&path);
        assert_eq!(c.min_cooccurrence, 2);
        assert_eq!(c.cluster_window, ClusterWindow::Rolling);
        assert_eq!(c.network_limit, 50);
        assert_eq!(c.config_path, path);
    }

    #[test]
    fn test_overrides() {
        let mut c = AnalysisConfig::default();
        c.apply_overrides(|key| match key {
            "CASEFILE_MIN_COOCCURRENCE" => Some("9".into()),
            "CASEFILE_CLUSTER_MAX_DAYS" => Some("not-a-number".into()),
            _ => None,
        });
        assert_eq!(c.min_cooccurrence, 9);
        assert_eq!(c.cluster_max_days, 7);
    }

    #[test]
    fn test_save_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let mut c = AnalysisConfig::default();
        c.config_path = dir.path().join("nested/analysis.json");
        c.network_limit = 12;
        c.save().unwrap();

        let loaded = AnalysisConfig::load(&c.config_path);
        assert_eq!(loaded.network_limit, 12);
    }

    #[test]
    fn test_data_paths_created() {
        let dir = tempfile::tempdir().unwrap();
        let paths = DataPaths::new(dir.path()).unwrap();
        assert!(paths.db.is_dir());
        assert!(paths.uploads.is_dir());
    }
}
