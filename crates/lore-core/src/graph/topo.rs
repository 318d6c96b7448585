//! Dependency-ordered leveling of entities.

use std::collections::{BTreeSet, HashMap};

use tracing::debug;

use super::EntityGraph;
use crate::models::Edge;

/// Group entities into levels so that every entity's callees sit at an
/// equal-or-lower level.
///
/// Only `calls` and `references` edges between entities of the set order
/// anything. Entities touched by no such edge are emitted together as the
/// first level. The remaining entities are leveled leaves-first; within a
/// level ids are sorted. When a cycle blocks progress, the lowest remaining
/// id is forced into a level of its own.
pub fn topological_sort_entities(entity_ids: &[String], edges: &[Edge]) -> Vec<Vec<String>> {
    let graph = EntityGraph::from_edges(entity_ids, edges, |e| e.kind.is_ordering());
    let mut levels = Vec::new();

    let (isolated, connected): (Vec<&str>, Vec<&str>) =
        graph.nodes().partition(|id| graph.is_isolated(id));
    if !isolated.is_empty() {
        levels.push(isolated.iter().map(|id| id.to_string()).collect());
    }

    // Number of callees not yet leveled.
    let mut pending: HashMap<&str, usize> = connected
        .iter()
        .map(|id| (*id, graph.out_degree(id)))
        .collect();
    let mut remaining: BTreeSet<&str> = connected.into_iter().collect();
    let mut ready: BTreeSet<&str> = remaining
        .iter()
        .copied()
        .filter(|id| pending[id] == 0)
        .collect();

    while !remaining.is_empty() {
        let level: Vec<&str> = if ready.is_empty() {
            // Cycle: every remaining node waits on another remaining node.
            let forced = remaining.iter().next().copied().into_iter().collect::<Vec<_>>();
            debug!(entity = ?forced.first(), "Breaking dependency cycle");
            forced
        } else {
            std::mem::take(&mut ready).into_iter().collect()
        };

        for id in &level {
            remaining.remove(id);
        }
        for id in &level {
            for caller in graph.predecessors(id) {
                if !remaining.contains(caller) {
                    continue;
                }
                if let Some(count) = pending.get_mut(caller) {
                    *count = count.saturating_sub(1);
                    if *count == 0 {
                        ready.insert(caller);
                    }
                }
            }
        }

        levels.push(level.into_iter().map(str::to_string).collect());
    }

    levels
}
