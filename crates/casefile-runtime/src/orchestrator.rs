//! Orchestrator — sequences ingestion and derived-table rebuilds.
//!
//! Every write to a derived table goes through [`Orchestrator::guard`]. A
//! second rebuild attempted while one is running fails fast with
//! `Error::RebuildInProgress`; it never waits or interleaves.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::{Mutex, MutexGuard};
use tracing::{debug, info};

use casefile_analyze::{
    ClusterOptions, Clusterer, CoOccurrenceAggregator, CoOccurrenceOptions, CoOccurrenceReport,
    Network, NetworkProjector, NetworkQuery, TimelineBuilder,
};
use casefile_consolidate::ConsolidationPipeline;
use casefile_core::{AnalysisConfig, Error, Result};
use casefile_ingest::{ExtractOptions, IngestOutcome, Ingester};
use casefile_store::{EntityConnection, SqliteStore};

use crate::types::*;

/// Held while a derived-table writer runs.
pub struct RebuildGuard<'a> {
    _lock: MutexGuard<'a, ()>,
    active: &'a Mutex<Option<String>>,
}

impl Drop for RebuildGuard<'_> {
    fn drop(&mut self) {
        *self.active.lock() = None;
    }
}

/// Top-level context object shared by the HTTP server and the CLI.
pub struct Orchestrator {
    store: Arc<SqliteStore>,
    analysis: AnalysisConfig,
    rebuild_lock: Mutex<()>,
    active: Mutex<Option<String>>,
}

impl Orchestrator {
    pub fn new(store: Arc<SqliteStore>, analysis: AnalysisConfig) -> Self {
        info!(
            "Orchestrator initialized: min_cooccurrence={}, fan-out cap={}, cluster window={}d/{:?}",
            analysis.min_cooccurrence,
            analysis.max_entities_per_document,
            analysis.cluster_max_days,
            analysis.cluster_window
        );
        Self {
            store,
            analysis,
            rebuild_lock: Mutex::new(()),
            active: Mutex::new(None),
        }
    }

    pub fn store(&self) -> &Arc<SqliteStore> {
        &self.store
    }

    pub fn analysis(&self) -> &AnalysisConfig {
        &self.analysis
    }

    pub fn status(&self) -> RuntimeStatus {
        RuntimeStatus {
            active: self.active.lock().clone(),
            min_cooccurrence: self.analysis.min_cooccurrence,
            max_entities_per_document: self.analysis.max_entities_per_document,
            cluster_max_days: self.analysis.cluster_max_days,
            cluster_min_events: self.analysis.cluster_min_events,
        }
    }

    /// Take the single-writer guard or fail immediately.
    pub fn guard(&self, what: &str) -> Result<RebuildGuard<'_>> {
        let lock = self.rebuild_lock.try_lock().ok_or_else(|| {
            let running = self.active.lock().clone().unwrap_or_else(|| "rebuild".into());
            Error::RebuildInProgress(running)
        })?;
        *self.active.lock() = Some(what.to_string());
        debug!("Rebuild guard taken: {}", what);
        Ok(RebuildGuard {
            _lock: lock,
            active: &self.active,
        })
    }

    fn ingester(&self) -> Ingester<'_> {
        Ingester::new(&self.store, ExtractOptions::from(&self.analysis))
    }

    fn aggregator(&self) -> CoOccurrenceAggregator {
        CoOccurrenceAggregator::new(CoOccurrenceOptions::from(&self.analysis))
    }

    fn clusterer(&self) -> Clusterer {
        Clusterer::new(ClusterOptions::from(&self.analysis))
    }

    // ---------------------------------------------------------------
    // Ingestion
    // ---------------------------------------------------------------

    /// Verb: ingest raw text as a document.
    pub fn ingest_text(&self, filename: &str, text: &str) -> Result<IngestOutcome> {
        self.ingester().ingest_text(filename, text)
    }

    /// Verb: ingest a file. `None` when the file has no readable text.
    pub fn ingest_file(&self, path: &Path) -> Result<Option<IngestOutcome>> {
        self.ingester().ingest_file(path)
    }

    /// Verb: replace a document's content, re-extract its mentions, then
    /// rebuild co-occurrence.
    pub fn replace_content(&self, doc_id: i64, text: &str) -> Result<ReplaceReport> {
        let _guard = self.guard("replace content")?;
        let outcome = self.ingester().replace_content(doc_id, text)?;
        let cooccurrence = self.aggregator().rebuild(&self.store)?;
        Ok(ReplaceReport {
            outcome,
            cooccurrence,
        })
    }

    /// Verb: delete a document and its mentions, then rebuild co-occurrence.
    pub fn delete_document(&self, doc_id: i64) -> Result<DeleteReport> {
        let _guard = self.guard("delete document")?;
        if !self.store.delete_document(doc_id)? {
            return Err(Error::NotFound(format!("document {}", doc_id)));
        }
        info!("Deleted document {}", doc_id);
        let cooccurrence = self.aggregator().rebuild(&self.store)?;
        Ok(DeleteReport {
            doc_id,
            cooccurrence,
        })
    }

    // ---------------------------------------------------------------
    // Rebuilds
    // ---------------------------------------------------------------

    /// Verb: rebuild derived tables.
    pub fn rebuild(&self, target: RebuildTarget) -> Result<RebuildReport> {
        let _guard = self.guard(&format!("rebuild {}", target))?;
        let start = Instant::now();

        let mut report = RebuildReport {
            target,
            cooccurrence: None,
            timeline: None,
            clusters: None,
            duration_ms: 0,
        };
        match target {
            RebuildTarget::Cooccurrences => {
                report.cooccurrence = Some(self.aggregator().rebuild(&self.store)?);
            }
            RebuildTarget::Timeline => {
                report.timeline =
                    Some(TimelineBuilder::new().rebuild(&self.store, &self.clusterer())?);
            }
            RebuildTarget::Clusters => {
                report.clusters = Some(self.clusterer().rebuild(&self.store)?);
            }
            RebuildTarget::All => {
                report.cooccurrence = Some(self.aggregator().rebuild(&self.store)?);
                report.timeline =
                    Some(TimelineBuilder::new().rebuild(&self.store, &self.clusterer())?);
            }
        }
        report.duration_ms = start.elapsed().as_millis() as u64;
        info!("Rebuild {} finished in {}ms", target, report.duration_ms);
        Ok(report)
    }

    pub fn rebuild_cooccurrences(&self) -> Result<CoOccurrenceReport> {
        self.rebuild(RebuildTarget::Cooccurrences)?
            .cooccurrence
            .ok_or_else(|| Error::Internal("co-occurrence report missing".into()))
    }

    pub fn rebuild_all(&self) -> Result<RebuildReport> {
        self.rebuild(RebuildTarget::All)
    }

    // ---------------------------------------------------------------
    // Entity maintenance
    // ---------------------------------------------------------------

    /// Verb: consolidate entities, then rebuild co-occurrence if any entity
    /// was merged or pruned.
    pub fn consolidate(&self) -> Result<ConsolidateOutcome> {
        let _guard = self.guard("consolidate")?;
        let consolidation = ConsolidationPipeline::run(&self.store);
        let cooccurrence = if consolidation.changed_entities() {
            Some(self.aggregator().rebuild(&self.store)?)
        } else {
            None
        };
        Ok(ConsolidateOutcome {
            consolidation,
            cooccurrence,
        })
    }

    /// Verb: fold one entity into another, then rebuild co-occurrence.
    pub fn merge_entities(&self, survivor_id: i64, duplicate_id: i64) -> Result<MergeReport> {
        let _guard = self.guard("merge")?;
        let merge = self.store.merge_entities(survivor_id, duplicate_id)?;
        info!(
            "Merged entity {} into {} ({} mentions moved)",
            duplicate_id, survivor_id, merge.mentions_moved
        );
        let cooccurrence = self.aggregator().rebuild(&self.store)?;
        Ok(MergeReport { merge, cooccurrence })
    }

    // ---------------------------------------------------------------
    // Reads
    // ---------------------------------------------------------------

    /// Verb: project the relationship network.
    pub fn network(&self, query: &NetworkQuery) -> Result<Network> {
        NetworkProjector::new(&self.store).project(query)
    }

    /// Network query with the configured defaults.
    pub fn default_network_query(&self) -> NetworkQuery {
        NetworkQuery::from(&self.analysis)
    }

    pub fn connections(&self, entity_id: i64, limit: usize) -> Result<Vec<EntityConnection>> {
        if self.store.get_entity(entity_id)?.is_none() {
            return Err(Error::NotFound(format!("entity {}", entity_id)));
        }
        NetworkProjector::new(&self.store).connections(entity_id, limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use casefile_store::{
        ClusterFilter, CoOccurrenceFilter, EntityType, NewFlight, NewMention, NewTransaction,
        TimelineFilter,
    };
    use tempfile::TempDir;

    fn setup(analysis: AnalysisConfig) -> (Orchestrator, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(SqliteStore::open(dir.path()).unwrap());
        (Orchestrator::new(store, analysis), dir)
    }

    fn low_threshold() -> AnalysisConfig {
        AnalysisConfig {
            min_cooccurrence: 2,
            ..Default::default()
        }
    }

    fn flight(date: &str, passengers: &[&str], level: i64) -> NewFlight {
        NewFlight {
            flight_date: Some(date.into()),
            origin: "TEB".into(),
            destination: "PBI".into(),
            passengers: passengers.iter().map(|s| s.to_string()).collect(),
            suspicion_level: level,
            ..Default::default()
        }
    }

    #[test]
    fn test_ingest_then_rebuild_cooccurrences() {
        let (orch, _dir) = setup(low_threshold());
        orch.ingest_text("a.txt", "x Alice Smith met Bob Jones").unwrap();
        orch.ingest_text("b.txt", "y Alice Smith called Bob Jones").unwrap();
        orch.ingest_text("c.txt", "z Alice Smith alone").unwrap();

        let report = orch.rebuild_cooccurrences().unwrap();
        assert_eq!(report.documents_scanned, 3);
        assert_eq!(report.pairs_kept, 1);

        let pairs = orch.store().list_cooccurrences(&CoOccurrenceFilter::default()).unwrap();
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].count, 2);
    }

    #[test]
    fn test_rebuild_timeline_and_recluster() {
        let (orch, _dir) = setup(AnalysisConfig::default());
        let store = orch.store();
        store.add_flight(&flight("2020-01-01", &["Alice"], 4)).unwrap();
        store.add_flight(&flight("2020-01-03", &["Alice", "Bob"], 5)).unwrap();
        store
            .add_transaction(&NewTransaction {
                transaction_date: Some("2020-01-06".into()),
                amount: 10_000.0,
                currency: "USD".into(),
                from_party: "Acme Holdings".into(),
                to_party: "Alice".into(),
                suspicion_level: 3,
                ..Default::default()
            })
            .unwrap();
        store.add_flight(&flight("2020-01-20", &["Carol"], 0)).unwrap();
        store.add_flight(&flight("not a date", &["Dave"], 0)).unwrap();

        let report = orch.rebuild(RebuildTarget::Timeline).unwrap();
        let timeline = report.timeline.unwrap();
        assert_eq!(timeline.events, 4);
        assert_eq!(timeline.flights.dropped, 1);
        assert_eq!(timeline.clusters.clusters_emitted, 1);

        let clusters = store.list_clusters(&ClusterFilter::default()).unwrap();
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].event_count, 3);
        assert_eq!(clusters[0].avg_suspicion, 4.0);
        assert_eq!(clusters[0].top_entities[0], "Alice");

        // Reclustering the stored timeline gives the same result.
        let again = orch.rebuild(RebuildTarget::Clusters).unwrap();
        assert_eq!(again.clusters.unwrap().clusters_emitted, 1);
        let reclustered = store.list_clusters(&ClusterFilter::default()).unwrap();
        assert_eq!(reclustered[0].event_ids, clusters[0].event_ids);
        assert_eq!(store.list_timeline_events(&TimelineFilter::default()).unwrap().len(), 4);
    }

    #[test]
    fn test_rebuild_all_is_idempotent() {
        let (orch, _dir) = setup(low_threshold());
        orch.ingest_text("a.txt", "x Alice Smith met Bob Jones").unwrap();
        orch.ingest_text("b.txt", "y Alice Smith met Bob Jones").unwrap();
        let store = orch.store();
        store.add_flight(&flight("2020-01-01", &["Alice"], 4)).unwrap();
        store.add_flight(&flight("2020-01-02", &["Alice", "Bob"], 4)).unwrap();
        store.add_flight(&flight("2020-01-03", &["Bob"], 4)).unwrap();

        let snapshot = || {
            (
                store.list_cooccurrences(&CoOccurrenceFilter::default()).unwrap(),
                store.list_timeline_events(&TimelineFilter::default()).unwrap(),
                store.list_clusters(&ClusterFilter::default()).unwrap(),
            )
        };

        orch.rebuild_all().unwrap();
        let first = snapshot();
        assert_eq!(first.0.len(), 1);
        assert_eq!(first.1.iter().map(|e| e.id).collect::<Vec<_>>(), vec![1, 2, 3]);
        assert_eq!(first.2.len(), 1);
        assert_eq!(first.2[0].event_ids, vec![1, 2, 3]);

        orch.rebuild_all().unwrap();
        assert_eq!(snapshot(), first);

        orch.rebuild(RebuildTarget::Timeline).unwrap();
        orch.rebuild(RebuildTarget::Clusters).unwrap();
        assert_eq!(snapshot(), first);
    }

    #[test]
    fn test_concurrent_rebuild_rejected() {
        let (orch, _dir) = setup(AnalysisConfig::default());
        let guard = orch.guard("rebuild all").unwrap();
        assert_eq!(orch.status().active.as_deref(), Some("rebuild all"));

        let err = orch.rebuild(RebuildTarget::Cooccurrences).unwrap_err();
        assert!(matches!(err, Error::RebuildInProgress(ref what) if what == "rebuild all"));
        assert!(matches!(orch.consolidate(), Err(Error::RebuildInProgress(_))));

        drop(guard);
        assert!(orch.status().active.is_none());
        assert!(orch.rebuild(RebuildTarget::Cooccurrences).is_ok());
    }

    #[test]
    fn test_concurrent_rebuild_across_threads() {
        let (orch, _dir) = setup(AnalysisConfig::default());
        let orch = Arc::new(orch);
        let guard = orch.guard("held").unwrap();

        let other = Arc::clone(&orch);
        let handle = std::thread::spawn(move || other.rebuild(RebuildTarget::All).is_err());
        assert!(handle.join().unwrap());
        drop(guard);
    }

    #[test]
    fn test_consolidate_rebuilds_cooccurrence() {
        let (orch, _dir) = setup(low_threshold());
        let store = orch.store();
        let person = |name: &str| NewMention {
            name: name.into(),
            entity_type: EntityType::Person,
            context: String::new(),
        };
        let d1 = store.add_document("a.txt", "one", Default::default()).unwrap();
        let d2 = store.add_document("b.txt", "two", Default::default()).unwrap();
        store.record_mentions(d1, &[person("Jeffrey Smith"), person("Bob Jones")]).unwrap();
        store.record_mentions(d2, &[person("Mr. Jeffrey Smith"), person("Bob Jones")]).unwrap();
        orch.rebuild_cooccurrences().unwrap();
        assert!(orch
            .store()
            .list_cooccurrences(&CoOccurrenceFilter::default())
            .unwrap()
            .is_empty());

        let outcome = orch.consolidate().unwrap();
        assert_eq!(outcome.consolidation.entities_merged, 1);
        assert_eq!(outcome.cooccurrence.unwrap().pairs_kept, 1);
    }

    #[test]
    fn test_merge_and_connections() {
        let (orch, _dir) = setup(low_threshold());
        orch.ingest_text("a.txt", "x Alice Smith met Bob Jones").unwrap();
        orch.ingest_text("b.txt", "x Alicia Smith met Bob Jones").unwrap();
        let people = orch.store().list_entities(Some(&EntityType::Person), 10).unwrap();
        let id = |name: &str| people.iter().find(|e| e.name == name).unwrap().id;

        let report = orch.merge_entities(id("Alice Smith"), id("Alicia Smith")).unwrap();
        assert_eq!(report.merge.mentions_moved, 1);
        assert_eq!(report.cooccurrence.pairs_kept, 1);

        let conns = orch.connections(id("Alice Smith"), 10).unwrap();
        assert_eq!(conns.len(), 1);
        assert_eq!(conns[0].entity.name, "Bob Jones");
        assert!(matches!(orch.connections(9999, 10), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_replace_content_refreshes_cooccurrence() {
        let (orch, _dir) = setup(low_threshold());
        let a = orch.ingest_text("a.txt", "x Alice Smith met Bob Jones").unwrap();
        orch.ingest_text("b.txt", "y Alice Smith met Bob Jones").unwrap();
        orch.rebuild_cooccurrences().unwrap();
        let pairs = orch.store().list_cooccurrences(&CoOccurrenceFilter::default()).unwrap();
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].document_ids.len(), 2);

        let report = orch.replace_content(a.doc_id, "x Alice Smith was alone").unwrap();
        assert_eq!(report.outcome.doc_id, a.doc_id);
        assert_eq!(report.cooccurrence.pairs_kept, 0);
        assert!(orch
            .store()
            .list_cooccurrences(&CoOccurrenceFilter::default())
            .unwrap()
            .is_empty());
        assert!(orch.status().active.is_none());

        assert!(matches!(orch.replace_content(999, "text"), Err(Error::NotFound(_))));
        let _guard = orch.guard("rebuild all").unwrap();
        assert!(matches!(
            orch.replace_content(a.doc_id, "x Alice Smith met Bob Jones again"),
            Err(Error::RebuildInProgress(_))
        ));
    }

    #[test]
    fn test_delete_document_refreshes_cooccurrence() {
        let (orch, _dir) = setup(low_threshold());
        let a = orch.ingest_text("a.txt", "x Alice Smith met Bob Jones").unwrap();
        orch.ingest_text("b.txt", "y Alice Smith met Bob Jones").unwrap();
        orch.ingest_text("c.txt", "z Alice Smith met Bob Jones").unwrap();
        orch.rebuild_cooccurrences().unwrap();

        let report = orch.delete_document(a.doc_id).unwrap();
        assert_eq!(report.cooccurrence.pairs_kept, 1);
        let pairs = orch.store().list_cooccurrences(&CoOccurrenceFilter::default()).unwrap();
        assert_eq!(pairs[0].count, 2);
        assert!(!pairs[0].document_ids.contains(&a.doc_id));

        assert!(matches!(orch.delete_document(a.doc_id), Err(Error::NotFound(_))));
        assert!(orch.status().active.is_none());
    }

    #[test]
    fn test_network_defaults() {
        let (orch, _dir) = setup(low_threshold());
        orch.ingest_text("a.txt", "x Alice Smith met Bob Jones in Paris").unwrap();
        orch.ingest_text("b.txt", "x Alice Smith met Bob Jones in Paris").unwrap();
        orch.rebuild_cooccurrences().unwrap();

        let network = orch.network(&orch.default_network_query()).unwrap();
        assert_eq!(network.nodes.len(), 2, "people only by default");
        assert_eq!(network.edges.len(), 1);
    }

    #[test]
    fn test_target_parse() {
        assert_eq!(RebuildTarget::parse("Co-Occurrences"), Some(RebuildTarget::Cooccurrences));
        assert_eq!(RebuildTarget::parse("all"), Some(RebuildTarget::All));
        assert_eq!(RebuildTarget::parse("everything"), None);
    }
}
