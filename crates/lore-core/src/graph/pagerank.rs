//! PageRank over the directed entity graph.

use std::collections::HashMap;

use super::EntityGraph;
use crate::models::{Edge, Entity};

pub const DAMPING: f64 = 0.85;
pub const TOLERANCE: f64 = 1e-6;
pub const MAX_ITERATIONS: usize = 100;

/// Raw PageRank scores keyed by node id. Rank flows from caller to callee;
/// dangling nodes spread their rank uniformly.
pub fn pagerank(graph: &EntityGraph) -> HashMap<String, f64> {
    let ids: Vec<&str> = graph.nodes().collect();
    let n = ids.len();
    if n == 0 {
        return HashMap::new();
    }

    let index: HashMap<&str, usize> = ids.iter().enumerate().map(|(i, id)| (*id, i)).collect();
    let out_degree: Vec<usize> = ids.iter().map(|id| graph.out_degree(id)).collect();
    let incoming: Vec<Vec<usize>> = ids
        .iter()
        .map(|id| graph.predecessors(id).map(|p| index[p]).collect())
        .collect();

    let uniform = 1.0 / n as f64;
    let mut rank = vec![uniform; n];

    for _ in 0..MAX_ITERATIONS {
        let dangling: f64 = (0..n).filter(|&i| out_degree[i] == 0).map(|i| rank[i]).sum();
        let base = (1.0 - DAMPING) * uniform + DAMPING * dangling * uniform;

        let next: Vec<f64> = (0..n)
            .map(|i| {
                let flow: f64 = incoming[i]
                    .iter()
                    .map(|&j| rank[j] / out_degree[j] as f64)
                    .sum();
                base + DAMPING * flow
            })
            .collect();

        let delta: f64 = next.iter().zip(&rank).map(|(a, b)| (a - b).abs()).sum();
        rank = next;
        if delta < TOLERANCE {
            break;
        }
    }

    ids.into_iter()
        .map(str::to_string)
        .zip(rank)
        .collect()
}

/// Percentile rank of each score in [0, 1]: the share of other nodes with a
/// strictly lower score. A single node gets 1.0.
pub fn percentiles(scores: &HashMap<String, f64>) -> HashMap<String, f64> {
    let n = scores.len();
    if n == 1 {
        return scores.keys().map(|id| (id.clone(), 1.0)).collect();
    }

    let mut sorted: Vec<f64> = scores.values().copied().collect();
    sorted.sort_by(f64::total_cmp);

    scores
        .iter()
        .map(|(id, score)| {
            let below = sorted.partition_point(|s| *s < score - 1e-12);
            (id.clone(), below as f64 / (n - 1) as f64)
        })
        .collect()
}

/// Compute PageRank over every edge kind and store the percentile on each
/// entity.
pub fn annotate_pagerank(entities: &mut [Entity], edges: &[Edge]) {
    let graph = EntityGraph::from_entities(entities, edges);
    let ranks = percentiles(&pagerank(&graph));
    for entity in entities.iter_mut() {
        entity.pagerank_percentile = ranks.get(&entity.id).copied();
    }
}
