//! Adjacency-list projection of the entity graph.

use std::collections::{BTreeMap, BTreeSet};

use crate::models::{Edge, Entity};

#[derive(Debug, Clone, Default)]
struct Links {
    outgoing: BTreeSet<String>,
    incoming: BTreeSet<String>,
}

/// Directed graph keyed by entity id.
///
/// Parallel edges collapse into one link and self-loops are dropped. Node and
/// neighbour iteration is ordered by id, so every algorithm built on top is
/// deterministic.
#[derive(Debug, Clone, Default)]
pub struct EntityGraph {
    nodes: BTreeMap<String, Links>,
}

impl EntityGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a graph over `entity_ids` using the edges accepted by `filter`.
    /// Edges with an endpoint outside the id set are ignored.
    pub fn from_edges<F>(entity_ids: &[String], edges: &[Edge], filter: F) -> Self
    where
        F: Fn(&Edge) -> bool,
    {
        let mut graph = Self::new();
        for id in entity_ids {
            graph.add_node(id);
        }
        for edge in edges.iter().filter(|e| filter(e)) {
            if graph.contains(&edge.from_id) && graph.contains(&edge.to_id) {
                graph.add_edge(&edge.from_id, &edge.to_id);
            }
        }
        graph
    }

    /// Build a graph over entities using every edge kind.
    pub fn from_entities(entities: &[Entity], edges: &[Edge]) -> Self {
        let ids: Vec<String> = entities.iter().map(|e| e.id.clone()).collect();
        Self::from_edges(&ids, edges, |_| true)
    }

    pub fn add_node(&mut self, id: &str) {
        self.nodes.entry(id.to_string()).or_default();
    }

    /// Add a directed link. Self-loops are ignored.
    pub fn add_edge(&mut self, from: &str, to: &str) {
        if from == to {
            self.add_node(from);
            return;
        }
        self.nodes
            .entry(from.to_string())
            .or_default()
            .outgoing
            .insert(to.to_string());
        self.nodes
            .entry(to.to_string())
            .or_default()
            .incoming
            .insert(from.to_string());
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.nodes.values().map(|l| l.outgoing.len()).sum()
    }

    /// Node ids in ascending order.
    pub fn nodes(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(String::as_str)
    }

    pub fn successors(&self, id: &str) -> impl Iterator<Item = &str> {
        self.nodes
            .get(id)
            .into_iter()
            .flat_map(|l| l.outgoing.iter().map(String::as_str))
    }

    pub fn predecessors(&self, id: &str) -> impl Iterator<Item = &str> {
        self.nodes
            .get(id)
            .into_iter()
            .flat_map(|l| l.incoming.iter().map(String::as_str))
    }

    pub fn out_degree(&self, id: &str) -> usize {
        self.nodes.get(id).map(|l| l.outgoing.len()).unwrap_or(0)
    }

    pub fn in_degree(&self, id: &str) -> usize {
        self.nodes.get(id).map(|l| l.incoming.len()).unwrap_or(0)
    }

    /// Whether the node has no links in either direction.
    pub fn is_isolated(&self, id: &str) -> bool {
        self.out_degree(id) == 0 && self.in_degree(id) == 0
    }

    /// Undirected, deduplicated edge list as pairs of node indices, where the
    /// index is the position in [`EntityGraph::nodes`]. Each pair has `a < b`.
    pub fn undirected_pairs(&self) -> Vec<(usize, usize)> {
        let index: BTreeMap<&str, usize> = self
            .nodes
            .keys()
            .enumerate()
            .map(|(i, id)| (id.as_str(), i))
            .collect();

        let mut pairs = BTreeSet::new();
        for (from, links) in &self.nodes {
            let a = index[from.as_str()];
            for to in &links.outgoing {
                let b = index[to.as_str()];
                pairs.insert((a.min(b), a.max(b)));
            }
        }
        pairs.into_iter().collect()
    }
}
