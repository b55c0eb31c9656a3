//! Runtime types.

use serde::Serialize;

use casefile_analyze::{ClusterReport, CoOccurrenceReport, TimelineReport};
use casefile_consolidate::ConsolidationReport;
use casefile_ingest::IngestOutcome;
use casefile_store::MergeOutcome;

/// Which derived tables a rebuild recomputes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RebuildTarget {
    /// Entity co-occurrence pairs.
    Cooccurrences,
    /// Timeline events and their clusters.
    Timeline,
    /// Clusters only, over the stored timeline.
    Clusters,
    All,
}

impl RebuildTarget {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "cooccurrences" | "cooccurrence" | "co-occurrences" => Some(Self::Cooccurrences),
            "timeline" => Some(Self::Timeline),
            "clusters" => Some(Self::Clusters),
            "all" => Some(Self::All),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cooccurrences => "cooccurrences",
            Self::Timeline => "timeline",
            Self::Clusters => "clusters",
            Self::All => "all",
        }
    }
}

impl std::fmt::Display for RebuildTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one rebuild. Sections not covered by the target are absent.
#[derive(Debug, Clone, Serialize)]
pub struct RebuildReport {
    pub target: RebuildTarget,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cooccurrence: Option<CoOccurrenceReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeline: Option<TimelineReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clusters: Option<ClusterReport>,
    pub duration_ms: u64,
}

/// Consolidation followed by the co-occurrence rebuild it makes necessary.
#[derive(Debug, Clone, Serialize)]
pub struct ConsolidateOutcome {
    pub consolidation: ConsolidationReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cooccurrence: Option<CoOccurrenceReport>,
}

/// Manual merge followed by a co-occurrence rebuild.
#[derive(Debug, Clone, Serialize)]
pub struct MergeReport {
    pub merge: MergeOutcome,
    pub cooccurrence: CoOccurrenceReport,
}

/// Content backfill followed by a co-occurrence rebuild.
#[derive(Debug, Clone, Serialize)]
pub struct ReplaceReport {
    #[serde(flatten)]
    pub outcome: IngestOutcome,
    pub cooccurrence: CoOccurrenceReport,
}

/// Document deletion followed by a co-occurrence rebuild.
#[derive(Debug, Clone, Serialize)]
pub struct DeleteReport {
    pub doc_id: i64,
    pub cooccurrence: CoOccurrenceReport,
}

/// Runtime status information.
#[derive(Debug, Clone, Serialize)]
pub struct RuntimeStatus {
    /// Work currently holding the rebuild guard.
    pub active: Option<String>,
    pub min_cooccurrence: usize,
    pub max_entities_per_document: usize,
    pub cluster_max_days: i64,
    pub cluster_min_events: usize,
}
