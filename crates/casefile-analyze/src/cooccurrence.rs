//! Entity co-occurrence aggregation.
//!
//! For every document, the distinct entities mentioned in it form a set S.
//! Each unordered pair in S (after the fan-out cap) gains one count and the
//! document id. Pairs below `min_count` shared documents are discarded.
//!
//! Fan-out cap: a document contributes at most `max_entities_per_document`
//! entities, the ones with the highest corpus-wide mention count (ties by
//! lowest id). This bounds the C(|S|, 2) expansion on pathological
//! documents such as contact lists.

use std::collections::BTreeMap;
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, info};

use casefile_core::{AnalysisConfig, Result};
use casefile_store::{CoOccurrenceRecord, DocumentEntities, DocumentEntity, EntityType, SqliteStore};

#[derive(Debug, Clone)]
pub struct CoOccurrenceOptions {
    pub min_count: usize,
    pub max_entities_per_document: usize,
    /// Only aggregate entities of this type.
    pub entity_type: Option<EntityType>,
}

impl Default for CoOccurrenceOptions {
    fn default() -> Self {
        Self {
            min_count: 5,
            max_entities_per_document: 150,
            entity_type: None,
        }
    }
}

impl From<&AnalysisConfig> for CoOccurrenceOptions {
    fn from(config: &AnalysisConfig) -> Self {
        Self {
            min_count: config.min_cooccurrence,
            max_entities_per_document: config.max_entities_per_document,
            entity_type: config
                .cooccurrence_entity_type
                .as_deref()
                .filter(|t| !t.is_empty() && !t.eq_ignore_ascii_case("all"))
                .map(EntityType::parse),
        }
    }
}

/// Summary of one aggregation run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CoOccurrenceReport {
    pub documents_scanned: usize,
    /// Documents whose entity set was cut down by the fan-out cap.
    pub documents_capped: usize,
    /// Distinct pairs seen before thresholding.
    pub candidate_pairs: usize,
    pub pairs_kept: usize,
    pub pairs_below_threshold: usize,
    pub min_count: usize,
    pub duration_ms: u64,
}

pub struct CoOccurrenceAggregator {
    options: CoOccurrenceOptions,
}

impl CoOccurrenceAggregator {
    pub fn new(options: CoOccurrenceOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &CoOccurrenceOptions {
        &self.options
    }

    /// Pure aggregation over per-document entity sets. `sets` must be
    /// ordered by document id so that each pair's document list comes out
    /// ascending. Records are ordered by (entity_a, entity_b).
    pub fn aggregate(&self, sets: &[DocumentEntities]) -> (Vec<CoOccurrenceRecord>, CoOccurrenceReport) {
        let mut report = CoOccurrenceReport {
            min_count: self.options.min_count,
            ..Default::default()
        };
        let mut pairs: BTreeMap<(i64, i64), Vec<i64>> = BTreeMap::new();

        for doc in sets {
            report.documents_scanned += 1;
            let (ids, capped) = self.capped_entity_ids(&doc.entities);
            if capped {
                report.documents_capped += 1;
                debug!(
                    "Document {} capped: {} entities → {}",
                    doc.doc_id,
                    doc.entities.len(),
                    ids.len()
                );
            }
            for (i, &a) in ids.iter().enumerate() {
                for &b in &ids[i + 1..] {
                    let docs = pairs.entry((a, b)).or_default();
                    if docs.last() != Some(&doc.doc_id) {
                        docs.push(doc.doc_id);
                    }
                }
            }
        }

        report.candidate_pairs = pairs.len();
        let min_count = self.options.min_count;
        let records: Vec<CoOccurrenceRecord> = pairs
            .into_iter()
            .filter(|(_, docs)| docs.len() >= min_count)
            .map(|((entity_a, entity_b), document_ids)| CoOccurrenceRecord {
                entity_a,
                entity_b,
                count: document_ids.len() as i64,
                document_ids,
            })
            .collect();
        report.pairs_kept = records.len();
        report.pairs_below_threshold = report.candidate_pairs - report.pairs_kept;
        (records, report)
    }

    /// Distinct entity ids of one document, capped and sorted ascending.
    fn capped_entity_ids(&self, entities: &[DocumentEntity]) -> (Vec<i64>, bool) {
        let mut chosen: Vec<DocumentEntity> = entities.to_vec();
        chosen.sort_by(|x, y| {
            y.mention_count
                .cmp(&x.mention_count)
                .then(x.entity_id.cmp(&y.entity_id))
        });
        chosen.dedup_by_key(|e| e.entity_id);
        let capped = chosen.len() > self.options.max_entities_per_document;
        chosen.truncate(self.options.max_entities_per_document);

        let mut ids: Vec<i64> = chosen.into_iter().map(|e| e.entity_id).collect();
        ids.sort_unstable();
        ids.dedup();
        (ids, capped)
    }

    /// Recompute the co-occurrence table from the mention index and replace
    /// it in one transaction.
    pub fn rebuild(&self, store: &SqliteStore) -> Result<CoOccurrenceReport> {
        let start = Instant::now();
        let sets = store.document_entity_sets(self.options.entity_type.as_ref())?;
        let (records, mut report) = self.aggregate(&sets);
        store.replace_cooccurrences(&records)?;
        report.duration_ms = start.elapsed().as_millis() as u64;

        info!(
            "Co-occurrence rebuilt: {} docs scanned ({} capped), {} pairs kept, {} below min_count={} ({}ms)",
            report.documents_scanned,
            report.documents_capped,
            report.pairs_kept,
            report.pairs_below_threshold,
            report.min_count,
            report.duration_ms
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use casefile_store::{CoOccurrenceFilter, NewMention};
    use tempfile::TempDir;

    fn set(doc_id: i64, ids: &[i64]) -> DocumentEntities {
        DocumentEntities {
            doc_id,
            entities: ids
                .iter()
                .map(|&entity_id| DocumentEntity {
                    entity_id,
                    mention_count: 1,
                })
                .collect(),
        }
    }

    fn aggregator(min_count: usize) -> CoOccurrenceAggregator {
        CoOccurrenceAggregator::new(CoOccurrenceOptions {
            min_count,
            ..Default::default()
        })
    }

    #[test]
    fn test_five_shared_documents_kept() {
        let (alice, bob) = (1, 2);
        let sets: Vec<_> = (1..=5).map(|d| set(d, &[alice, bob])).collect();
        let (records, report) = aggregator(5).aggregate(&sets);

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].entity_a, alice);
        assert_eq!(records[0].entity_b, bob);
        assert_eq!(records[0].count, 5);
        assert_eq!(records[0].document_ids, vec![1, 2, 3, 4, 5]);
        assert_eq!(report.documents_scanned, 5);
    }

    #[test]
    fn test_four_shared_documents_excluded() {
        let sets: Vec<_> = (1..=4).map(|d| set(d, &[1, 2])).collect();
        let (records, report) = aggregator(5).aggregate(&sets);
        assert!(records.is_empty());
        assert_eq!(report.candidate_pairs, 1);
        assert_eq!(report.pairs_below_threshold, 1);
    }

    #[test]
    fn test_threshold_boundary() {
        let sets: Vec<_> = (1..=3).map(|d| set(d, &[7, 9])).collect();
        assert_eq!(aggregator(3).aggregate(&sets).0.len(), 1);
        assert_eq!(aggregator(4).aggregate(&sets).0.len(), 0);
    }

    #[test]
    fn test_all_pairs_and_only_cooccurring_pairs() {
        let sets = vec![set(1, &[3, 1, 2]), set(2, &[4])];
        let (records, _) = aggregator(1).aggregate(&sets);
        let pairs: Vec<(i64, i64)> = records.iter().map(|r| (r.entity_a, r.entity_b)).collect();
        assert_eq!(pairs, vec![(1, 2), (1, 3), (2, 3)]);
        assert!(records.iter().all(|r| r.document_ids == vec![1]));
        assert!(records.iter().all(|r| r.entity_a < r.entity_b));
    }

    #[test]
    fn test_fan_out_cap_keeps_most_mentioned() {
        let agg = CoOccurrenceAggregator::new(CoOccurrenceOptions {
            min_count: 1,
            max_entities_per_document: 2,
            entity_type: None,
        });
        let doc = DocumentEntities {
            doc_id: 1,
            entities: vec![
                DocumentEntity { entity_id: 10, mention_count: 3 },
                DocumentEntity { entity_id: 11, mention_count: 9 },
                DocumentEntity { entity_id: 12, mention_count: 3 },
            ],
        };
        let (records, report) = agg.aggregate(&[doc]);
        assert_eq!(report.documents_capped, 1);
        assert_eq!(records.len(), 1);
        // 11 has the most mentions; 10 wins the tie with 12 by id.
        assert_eq!((records[0].entity_a, records[0].entity_b), (10, 11));
    }

    #[test]
    fn test_rebuild_against_store_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let store = SqliteStore::open(dir.path()).unwrap();
        for i in 0..5 {
            let doc = store
                .add_document(&format!("d{}.txt", i), &format!("doc {}", i), Default::default())
                .unwrap();
            let mut mentions = vec![
                NewMention { name: "Alice".into(), entity_type: EntityType::Person, context: String::new() },
                NewMention { name: "Bob".into(), entity_type: EntityType::Person, context: String::new() },
            ];
            if i == 0 {
                mentions.push(NewMention {
                    name: "Paris".into(),
                    entity_type: EntityType::Location,
                    context: String::new(),
                });
            }
            store.record_mentions(doc, &mentions).unwrap();
        }

        let agg = CoOccurrenceAggregator::new(CoOccurrenceOptions::default());
        let first = agg.rebuild(&store).unwrap();
        let rows = store.list_cooccurrences(&CoOccurrenceFilter::default()).unwrap();
        assert_eq!(first.pairs_kept, 1);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].entity_a_name, "Alice");
        assert_eq!(rows[0].count, 5);

        agg.rebuild(&store).unwrap();
        let again = store.list_cooccurrences(&CoOccurrenceFilter::default()).unwrap();
        assert_eq!(again.len(), 1);
        assert_eq!(again[0].document_ids, rows[0].document_ids);
    }

    #[test]
    fn test_type_filter() {
        let config = AnalysisConfig {
            cooccurrence_entity_type: Some("person".into()),
            ..Default::default()
        };
        assert_eq!(CoOccurrenceOptions::from(&config).entity_type, Some(EntityType::Person));

        let all = AnalysisConfig {
            cooccurrence_entity_type: Some("all".into()),
            ..Default::default()
        };
        assert_eq!(CoOccurrenceOptions::from(&all).entity_type, None);
    }
}
