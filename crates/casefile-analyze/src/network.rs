//! Relationship network projection: the top-N entities by mention count and
//! the co-occurrence edges among them.

use serde::Serialize;
use tracing::debug;

use casefile_core::{AnalysisConfig, Result};
use casefile_store::{
    EntityConnection, EntityType, GraphStats, NetworkEdge, NetworkGraph, NetworkNode, SqliteStore,
};

#[derive(Debug, Clone)]
pub struct NetworkQuery {
    /// `None` means every entity type.
    pub entity_type: Option<EntityType>,
    pub limit: usize,
    pub min_weight: i64,
}

impl NetworkQuery {
    /// Resolve a type filter string. Empty or `all` disables filtering.
    pub fn parse_type(s: &str) -> Option<EntityType> {
        let s = s.trim();
        if s.is_empty() || s.eq_ignore_ascii_case("all") {
            None
        } else {
            Some(EntityType::parse(s))
        }
    }
}

impl From<&AnalysisConfig> for NetworkQuery {
    fn from(config: &AnalysisConfig) -> Self {
        Self {
            entity_type: Self::parse_type(&config.network_entity_type),
            limit: config.network_limit,
            min_weight: 1,
        }
    }
}

impl Default for NetworkQuery {
    fn default() -> Self {
        Self::from(&AnalysisConfig::default())
    }
}

/// Projected network: nodes, edges restricted to the node set, and stats.
#[derive(Debug, Clone, Serialize)]
pub struct Network {
    pub nodes: Vec<NetworkNode>,
    pub edges: Vec<NetworkEdge>,
    pub stats: GraphStats,
}

pub struct NetworkProjector<'a> {
    store: &'a SqliteStore,
}

impl<'a> NetworkProjector<'a> {
    pub fn new(store: &'a SqliteStore) -> Self {
        Self { store }
    }

    pub fn project(&self, query: &NetworkQuery) -> Result<Network> {
        if query.limit == 0 {
            return Ok(Network {
                nodes: Vec::new(),
                edges: Vec::new(),
                stats: GraphStats::default(),
            });
        }

        let nodes: Vec<NetworkNode> = self
            .store
            .list_entities(query.entity_type.as_ref(), query.limit)?
            .into_iter()
            .map(|e| NetworkNode {
                id: e.id,
                label: e.name,
                entity_type: e.entity_type,
                weight: e.mention_count,
            })
            .collect();
        let ids: Vec<i64> = nodes.iter().map(|n| n.id).collect();
        let edges = self.store.network_edges(&ids, query.min_weight)?;
        let stats = NetworkGraph::from_parts(&nodes, &edges).stats();

        debug!(
            "Network projected: {} nodes, {} edges, {} components",
            stats.node_count, stats.edge_count, stats.components
        );
        Ok(Network { nodes, edges, stats })
    }

    /// Strongest co-occurrence partners of one entity.
    pub fn connections(&self, entity_id: i64, limit: usize) -> Result<Vec<EntityConnection>> {
        self.store.entity_connections(entity_id, limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use casefile_store::CoOccurrenceRecord;
    use std::collections::HashSet;
    use tempfile::TempDir;

    /// Five people with mention counts 50, 40, 30, 20, 10 and a location.
    fn seeded() -> (SqliteStore, TempDir, Vec<i64>) {
        let dir = TempDir::new().unwrap();
        let store = SqliteStore::open(dir.path()).unwrap();
        let mut ids = Vec::new();
        for (i, name) in ["P1", "P2", "P3", "P4", "P5"].iter().enumerate() {
            let mut id = 0;
            for _ in 0..(50 - i * 10) {
                id = store.upsert_entity(name, &EntityType::Person).unwrap();
            }
            ids.push(id);
        }
        let place = store.upsert_entity("Paris", &EntityType::Location).unwrap();
        let pair = |a: i64, b: i64, count: i64| CoOccurrenceRecord {
            entity_a: a.min(b),
            entity_b: a.max(b),
            count,
            document_ids: (1..=count).collect(),
        };
        store
            .replace_cooccurrences(&[
                pair(ids[0], ids[1], 9),
                pair(ids[1], ids[2], 6),
                pair(ids[0], ids[4], 7),
                pair(ids[3], ids[4], 5),
                pair(ids[0], place, 8),
            ])
            .unwrap();
        (store, dir, ids)
    }

    #[test]
    fn test_edges_stay_inside_top_n() {
        let (store, _dir, ids) = seeded();
        let network = NetworkProjector::new(&store)
            .project(&NetworkQuery {
                entity_type: Some(EntityType::Person),
                limit: 3,
                min_weight: 1,
            })
            .unwrap();

        let node_ids: HashSet<i64> = network.nodes.iter().map(|n| n.id).collect();
        assert_eq!(node_ids, ids[..3].iter().copied().collect());
        assert_eq!(network.nodes[0].weight, 50);
        assert!(network
            .edges
            .iter()
            .all(|e| node_ids.contains(&e.from) && node_ids.contains(&e.to)));
        assert_eq!(network.edges.len(), 2);
        assert_eq!(network.stats.components, 1);
    }

    #[test]
    fn test_zero_limit_and_oversized_limit() {
        let (store, _dir, _) = seeded();
        let projector = NetworkProjector::new(&store);

        let empty = projector
            .project(&NetworkQuery {
                limit: 0,
                ..Default::default()
            })
            .unwrap();
        assert!(empty.nodes.is_empty() && empty.edges.is_empty());

        let all_people = projector
            .project(&NetworkQuery {
                limit: 500,
                ..Default::default()
            })
            .unwrap();
        assert_eq!(all_people.nodes.len(), 5);
        assert_eq!(all_people.edges.len(), 4);
    }

    #[test]
    fn test_all_types_and_min_weight() {
        let (store, _dir, _) = seeded();
        let network = NetworkProjector::new(&store)
            .project(&NetworkQuery {
                entity_type: NetworkQuery::parse_type("all"),
                limit: 10,
                min_weight: 7,
            })
            .unwrap();
        assert_eq!(network.nodes.len(), 6);
        assert_eq!(network.edges.len(), 3);
        assert_eq!(network.stats.isolated_nodes, 2);
        assert_eq!(network.stats.components, 3);
    }

    #[test]
    fn test_connections() {
        let (store, _dir, ids) = seeded();
        let conns = NetworkProjector::new(&store).connections(ids[0], 10).unwrap();
        let counts: Vec<i64> = conns.iter().map(|c| c.count).collect();
        assert_eq!(counts, vec![9, 8, 7]);
    }
}
