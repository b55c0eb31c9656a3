//! In-memory relationship network using petgraph.

use petgraph::algo::connected_components;
use petgraph::graph::{NodeIndex, UnGraph};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::types::{NetworkEdge, NetworkNode};

/// Undirected entity network built from projected nodes and edges.
pub struct NetworkGraph {
    graph: UnGraph<NetworkNode, i64>,
    node_index: HashMap<i64, NodeIndex>,
}

impl NetworkGraph {
    pub fn new() -> Self {
        Self {
            graph: UnGraph::new_undirected(),
            node_index: HashMap::new(),
        }
    }

    /// Build from nodes and edges. Edges naming an unknown node are skipped.
    pub fn from_parts(nodes: &[NetworkNode], edges: &[NetworkEdge]) -> Self {
        let mut g = Self::new();
        for node in nodes {
            g.add_node(node.clone());
        }
        for edge in edges {
            g.add_edge(edge);
        }
        g
    }

    pub fn add_node(&mut self, node: NetworkNode) -> NodeIndex {
        if let Some(&idx) = self.node_index.get(&node.id) {
            return idx;
        }
        let id = node.id;
        let idx = self.graph.add_node(node);
        self.node_index.insert(id, idx);
        idx
    }

    /// Returns false when either endpoint is not in the graph.
    pub fn add_edge(&mut self, edge: &NetworkEdge) -> bool {
        match (self.node_index.get(&edge.from), self.node_index.get(&edge.to)) {
            (Some(&a), Some(&b)) => {
                self.graph.update_edge(a, b, edge.weight);
                true
            }
            _ => false,
        }
    }

    pub fn contains(&self, entity_id: i64) -> bool {
        self.node_index.contains_key(&entity_id)
    }

    /// Ids of direct neighbours.
    pub fn neighbors(&self, entity_id: i64) -> Vec<i64> {
        let Some(&idx) = self.node_index.get(&entity_id) else {
            return Vec::new();
        };
        let mut ids: Vec<i64> = self
            .graph
            .neighbors(idx)
            .map(|n| self.graph[n].id)
            .collect();
        ids.sort_unstable();
        ids
    }

    pub fn stats(&self) -> GraphStats {
        let isolated_nodes = self
            .graph
            .node_indices()
            .filter(|&n| self.graph.neighbors(n).next().is_none())
            .count();
        GraphStats {
            node_count: self.graph.node_count(),
            edge_count: self.graph.edge_count(),
            components: connected_components(&self.graph),
            isolated_nodes,
        }
    }
}

impl Default for NetworkGraph {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphStats {
    pub node_count: usize,
    pub edge_count: usize,
    pub components: usize,
    pub isolated_nodes: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EntityType;

    fn node(id: i64) -> NetworkNode {
        NetworkNode {
            id,
            label: format!("E{}", id),
            entity_type: EntityType::Person,
            weight: 10,
        }
    }

    fn edge(from: i64, to: i64) -> NetworkEdge {
        NetworkEdge { from, to, weight: 5 }
    }

    #[test]
    fn test_stats() {
        let g = NetworkGraph::from_parts(
            &[node(1), node(2), node(3), node(4)],
            &[edge(1, 2), edge(2, 3), edge(3, 99)],
        );
        assert_eq!(
            g.stats(),
            GraphStats {
                node_count: 4,
                edge_count: 2,
                components: 2,
                isolated_nodes: 1,
            }
        );
        assert_eq!(g.neighbors(2), vec![1, 3]);
        assert!(g.neighbors(42).is_empty());
        assert!(!g.contains(99));
    }

    #[test]
    fn test_empty() {
        let g = NetworkGraph::default();
        assert_eq!(g.stats(), GraphStats::default());
    }
}
