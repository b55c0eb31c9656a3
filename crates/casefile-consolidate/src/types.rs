//! Consolidation types.

use serde::Serialize;

use casefile_store::EntityType;

/// Pipeline stages that can be run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsolidationStage {
    PruneOrphans,
    MergeDuplicates,
    RecountMentions,
}

impl ConsolidationStage {
    pub fn all() -> &'static [ConsolidationStage] {
        &[
            Self::PruneOrphans,
            Self::MergeDuplicates,
            Self::RecountMentions,
        ]
    }
}

/// Entities that share a canonical key within one type.
#[derive(Debug, Clone, Serialize)]
pub struct DuplicateGroup {
    pub entity_type: EntityType,
    pub canonical_key: String,
    pub survivor_id: i64,
    pub survivor_name: String,
    pub duplicate_ids: Vec<i64>,
}

/// Result of running the consolidation pipeline.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ConsolidationReport {
    pub orphan_mentions_pruned: usize,
    pub orphan_entities_pruned: usize,
    pub duplicate_groups: usize,
    pub entities_merged: usize,
    pub mentions_moved: usize,
    pub counters_fixed: usize,
    pub groups: Vec<DuplicateGroup>,
    pub duration_ms: u64,
}

impl ConsolidationReport {
    /// Whether any entity was merged away (co-occurrence is then stale).
    pub fn changed_entities(&self) -> bool {
        self.entities_merged > 0 || self.orphan_entities_pruned > 0
    }
}
