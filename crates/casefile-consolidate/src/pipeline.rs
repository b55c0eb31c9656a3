//! Consolidation pipeline execution.

use std::collections::BTreeMap;

use casefile_store::{Entity, EntityType, SqliteStore};
use tracing::{info, warn};

use crate::types::*;

const HONORIFICS: &[&str] = &[
    "mr", "mrs", "ms", "miss", "dr", "prof", "sir", "lady", "sen", "rep", "gov", "judge",
];

/// Canonical form of an entity name: lowercased, punctuation removed,
/// leading honorifics dropped, whitespace collapsed.
pub fn canonical_key(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .filter_map(|c| {
            if c.is_alphanumeric() {
                Some(c.to_lowercase().collect::<String>())
            } else if c.is_whitespace() || c == '-' {
                Some(" ".to_string())
            } else {
                None
            }
        })
        .collect();
    let words: Vec<&str> = cleaned.split_whitespace().collect();
    let first_kept = words
        .iter()
        .position(|w| !HONORIFICS.contains(w))
        .unwrap_or(words.len());
    // A name made only of honorifics stays as written.
    let kept = if first_kept == words.len() {
        &words[..]
    } else {
        &words[first_kept..]
    };
    kept.join(" ")
}

/// Group entities by (type, canonical key). Only groups with more than one
/// member are returned. The survivor is the most-mentioned entity, ties by
/// lowest id.
pub fn find_duplicate_groups(entities: &[Entity]) -> Vec<DuplicateGroup> {
    let mut buckets: BTreeMap<(EntityType, String), Vec<&Entity>> = BTreeMap::new();
    for entity in entities {
        let key = canonical_key(&entity.name);
        if key.is_empty() {
            continue;
        }
        buckets
            .entry((entity.entity_type.clone(), key))
            .or_default()
            .push(entity);
    }

    let mut groups: Vec<DuplicateGroup> = buckets
        .into_iter()
        .filter(|(_, members)| members.len() > 1)
        .map(|((entity_type, canonical_key), mut members)| {
            members.sort_by(|a, b| b.mention_count.cmp(&a.mention_count).then(a.id.cmp(&b.id)));
            let survivor = members[0];
            DuplicateGroup {
                entity_type,
                canonical_key,
                survivor_id: survivor.id,
                survivor_name: survivor.name.clone(),
                duplicate_ids: members[1..].iter().map(|e| e.id).collect(),
            }
        })
        .collect();
    groups.sort_by_key(|g| g.survivor_id);
    groups
}

/// Consolidation pipeline that runs maintenance stages.
pub struct ConsolidationPipeline;

impl ConsolidationPipeline {
    /// Run all stages. Stage failures are logged and the stage counts as
    /// having done nothing.
    pub fn run(store: &SqliteStore) -> ConsolidationReport {
        let start = std::time::Instant::now();
        let mut report = ConsolidationReport::default();

        info!("Starting entity consolidation");

        // Stage 1: Prune orphans
        match store.prune_orphans() {
            Ok((mentions, entities)) => {
                report.orphan_mentions_pruned = mentions;
                report.orphan_entities_pruned = entities;
            }
            Err(e) => warn!("Failed to prune orphans: {}", e),
        }

        // Stage 2: Merge canonical duplicates
        Self::merge_duplicates(store, &mut report);

        // Stage 3: Repair counters
        match store.recount_mentions() {
            Ok(n) => report.counters_fixed = n,
            Err(e) => warn!("Failed to recount mentions: {}", e),
        }

        report.duration_ms = start.elapsed().as_millis() as u64;

        info!(
            "Consolidation complete: pruned={}/{}, groups={}, merged={}, recounted={}, duration={}ms",
            report.orphan_mentions_pruned,
            report.orphan_entities_pruned,
            report.duplicate_groups,
            report.entities_merged,
            report.counters_fixed,
            report.duration_ms
        );

        report
    }

    fn merge_duplicates(store: &SqliteStore, report: &mut ConsolidationReport) {
        let entities = match store.all_entities() {
            Ok(e) => e,
            Err(e) => {
                warn!("Failed to load entities: {}", e);
                return;
            }
        };

        let groups = find_duplicate_groups(&entities);
        for group in &groups {
            for &duplicate in &group.duplicate_ids {
                match store.merge_entities(group.survivor_id, duplicate) {
                    Ok(outcome) => {
                        report.entities_merged += 1;
                        report.mentions_moved += outcome.mentions_moved;
                    }
                    Err(e) => warn!(
                        "Failed to merge entity {} into {}: {}",
                        duplicate, group.survivor_id, e
                    ),
                }
            }
        }
        if !groups.is_empty() {
            info!(
                "Merged {} entities in {} duplicate groups",
                report.entities_merged,
                groups.len()
            );
        }
        report.duplicate_groups = groups.len();
        report.groups = groups;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use casefile_store::NewMention;

    fn test_store() -> (SqliteStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::open(dir.path()).unwrap();
        (store, dir)
    }

    fn person(name: &str) -> NewMention {
        NewMention {
            name: name.into(),
            entity_type: EntityType::Person,
            context: String::new(),
        }
    }

    #[test]
    fn test_canonical_key() {
        assert_eq!(canonical_key("Mr. Jeffrey  Smith"), "jeffrey smith");
        assert_eq!(canonical_key("JEFFREY SMITH"), "jeffrey smith");
        assert_eq!(canonical_key("O'Brien-Hale"), "obrien hale");
        assert_eq!(canonical_key("Dr."), "dr");
        assert_eq!(canonical_key("$1.2 million"), "12 million");
        assert_eq!(canonical_key("..."), "");
    }

    #[test]
    fn test_find_groups_picks_most_mentioned() {
        let entities = vec![
            Entity { id: 1, name: "Jeffrey Smith".into(), entity_type: EntityType::Person, mention_count: 3 },
            Entity { id: 2, name: "Mr. Jeffrey Smith".into(), entity_type: EntityType::Person, mention_count: 8 },
            Entity { id: 3, name: "JEFFREY SMITH".into(), entity_type: EntityType::Person, mention_count: 8 },
            Entity { id: 4, name: "Jeffrey Smith".into(), entity_type: EntityType::Organization, mention_count: 1 },
            Entity { id: 5, name: "Bob".into(), entity_type: EntityType::Person, mention_count: 1 },
        ];
        let groups = find_duplicate_groups(&entities);
        assert_eq!(groups.len(), 1, "types are never merged together");
        assert_eq!(groups[0].survivor_id, 2);
        assert_eq!(groups[0].duplicate_ids, vec![3, 1]);
        assert_eq!(groups[0].canonical_key, "jeffrey smith");
    }

    #[test]
    fn test_pipeline_empty_db() {
        let (store, _dir) = test_store();
        let report = ConsolidationPipeline::run(&store);
        assert_eq!(report.duplicate_groups, 0);
        assert_eq!(report.entities_merged, 0);
        assert!(!report.changed_entities());
    }

    #[test]
    fn test_pipeline_merges_variants() {
        let (store, _dir) = test_store();
        let d1 = store.add_document("1.txt", "one", Default::default()).unwrap();
        let d2 = store.add_document("2.txt", "two", Default::default()).unwrap();
        store
            .record_mentions(d1, &[person("Jeffrey Smith"), person("Jeffrey Smith"), person("Bob Jones")])
            .unwrap();
        store
            .record_mentions(d2, &[person("Mr. Jeffrey Smith"), person("Bob Jones")])
            .unwrap();

        let report = ConsolidationPipeline::run(&store);
        assert_eq!(report.duplicate_groups, 1);
        assert_eq!(report.entities_merged, 1);
        assert_eq!(report.mentions_moved, 1);
        assert_eq!(report.counters_fixed, 0);
        assert!(report.changed_entities());

        let people = store.list_entities(Some(&EntityType::Person), 10).unwrap();
        assert_eq!(people.len(), 2);
        assert_eq!(people[0].name, "Jeffrey Smith");
        assert_eq!(people[0].mention_count, 3);

        // Second run finds nothing left to do.
        let again = ConsolidationPipeline::run(&store);
        assert_eq!(again.entities_merged, 0);
    }

    #[test]
    fn test_consolidation_stages() {
        let stages = ConsolidationStage::all();
        assert_eq!(stages.len(), 3);
        assert!(stages.contains(&ConsolidationStage::MergeDuplicates));
    }
}
