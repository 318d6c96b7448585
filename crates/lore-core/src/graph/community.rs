//! Louvain community detection.
//!
//! Communities are a pre-signal for justification: members of the same
//! cluster tend to serve the same feature, and the community label is passed
//! into the prompt.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::EntityGraph;
use crate::config::CommunityConfig;
use crate::models::{Edge, Entity};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Community {
    pub id: u32,
    pub label: String,
    /// Member entity ids, sorted.
    pub members: Vec<String>,
}

impl Community {
    pub fn size(&self) -> usize {
        self.members.len()
    }
}

/// Result of a detection run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CommunityDetection {
    /// Kept communities, largest first.
    pub communities: Vec<Community>,
    /// Modularity of the full partition, including discarded communities.
    pub modularity: f64,
}

impl CommunityDetection {
    /// Community id per member entity.
    pub fn assignments(&self) -> HashMap<&str, &Community> {
        self.communities
            .iter()
            .flat_map(|c| c.members.iter().map(move |m| (m.as_str(), c)))
            .collect()
    }
}

/// Weighted undirected graph over node indices.
///
/// `links[i]` holds the weight to every other node; `loops[i]` is the weight
/// of edges folded inside node `i` by aggregation, each counted once.
#[derive(Debug, Clone)]
struct WeightedGraph {
    links: Vec<BTreeMap<usize, f64>>,
    loops: Vec<f64>,
}

impl WeightedGraph {
    fn from_pairs(n: usize, pairs: &[(usize, usize)]) -> Self {
        let mut links = vec![BTreeMap::new(); n];
        for &(a, b) in pairs {
            *links[a].entry(b).or_insert(0.0) += 1.0;
            *links[b].entry(a).or_insert(0.0) += 1.0;
        }
        Self {
            links,
            loops: vec![0.0; n],
        }
    }

    fn len(&self) -> usize {
        self.links.len()
    }

    fn degree(&self, i: usize) -> f64 {
        self.links[i].values().sum::<f64>() + 2.0 * self.loops[i]
    }

    /// Twice the total edge weight.
    fn total_degree(&self) -> f64 {
        (0..self.len()).map(|i| self.degree(i)).sum()
    }

    /// Collapse each community into a single node.
    fn aggregate(&self, community: &[usize], count: usize) -> Self {
        let mut links = vec![BTreeMap::new(); count];
        let mut loops = vec![0.0; count];

        for i in 0..self.len() {
            let ci = community[i];
            loops[ci] += self.loops[i];
            for (&j, &w) in &self.links[i] {
                let cj = community[j];
                if ci == cj {
                    // Seen from both ends.
                    loops[ci] += w / 2.0;
                } else {
                    *links[ci].entry(cj).or_insert(0.0) += w;
                }
            }
        }

        Self { links, loops }
    }
}

/// One round of local moving. Returns the community of each node and whether
/// any node changed community.
fn local_moving(graph: &WeightedGraph, max_passes: usize) -> (Vec<usize>, bool) {
    let n = graph.len();
    let mut community: Vec<usize> = (0..n).collect();
    let m2 = graph.total_degree();
    if m2 == 0.0 {
        return (community, false);
    }

    let degree: Vec<f64> = (0..n).map(|i| graph.degree(i)).collect();
    let mut totals = degree.clone();
    let mut improved = false;

    for _ in 0..max_passes {
        let mut moved = false;

        for i in 0..n {
            let current = community[i];
            let k_i = degree[i];

            let mut weights: BTreeMap<usize, f64> = BTreeMap::new();
            for (&j, &w) in &graph.links[i] {
                *weights.entry(community[j]).or_insert(0.0) += w;
            }

            totals[current] -= k_i;
            let mut best = current;
            let mut best_gain = weights.get(&current).copied().unwrap_or(0.0) - totals[current] * k_i / m2;
            for (&candidate, &w) in &weights {
                let gain = w - totals[candidate] * k_i / m2;
                if gain > best_gain + 1e-12 {
                    best = candidate;
                    best_gain = gain;
                }
            }
            totals[best] += k_i;

            if best != current {
                community[i] = best;
                moved = true;
            }
        }

        if !moved {
            break;
        }
        improved = true;
    }

    (community, improved)
}

/// Renumber community labels densely in order of first appearance.
fn renumber(community: &[usize]) -> (Vec<usize>, usize) {
    let mut mapping: HashMap<usize, usize> = HashMap::new();
    let renumbered = community
        .iter()
        .map(|c| {
            let next = mapping.len();
            *mapping.entry(*c).or_insert(next)
        })
        .collect();
    (renumbered, mapping.len())
}

fn modularity(graph: &WeightedGraph, membership: &[usize]) -> f64 {
    let m2 = graph.total_degree();
    if m2 == 0.0 {
        return 0.0;
    }

    let mut internal: HashMap<usize, f64> = HashMap::new();
    let mut totals: HashMap<usize, f64> = HashMap::new();
    for i in 0..graph.len() {
        let c = membership[i];
        *totals.entry(c).or_insert(0.0) += graph.degree(i);
        *internal.entry(c).or_insert(0.0) += graph.loops[i];
        for (&j, &w) in &graph.links[i] {
            if membership[j] == c && i < j {
                *internal.entry(c).or_insert(0.0) += w;
            }
        }
    }

    totals
        .iter()
        .map(|(c, tot)| {
            let inside = internal.get(c).copied().unwrap_or(0.0);
            2.0 * inside / m2 - (tot / m2).powi(2)
        })
        .sum()
}

/// Partition the nodes of `graph`. Returns the community index of each node,
/// in [`EntityGraph::nodes`] order, and the partition's modularity.
pub fn louvain(graph: &EntityGraph, max_passes: usize) -> (Vec<usize>, f64) {
    let n = graph.node_count();
    let base = WeightedGraph::from_pairs(n, &graph.undirected_pairs());

    let mut membership: Vec<usize> = (0..n).collect();
    let mut current = base.clone();

    loop {
        let (community, improved) = local_moving(&current, max_passes);
        if !improved {
            break;
        }
        let (community, count) = renumber(&community);
        for m in membership.iter_mut() {
            *m = community[*m];
        }
        if count == current.len() {
            break;
        }
        current = current.aggregate(&community, count);
    }

    let (membership, _) = renumber(&membership);
    let q = modularity(&base, &membership);
    (membership, q)
}

/// Cluster entities and label every community with at least
/// `min_community_size` members.
pub fn detect_communities(entities: &[Entity], edges: &[Edge], config: &CommunityConfig) -> CommunityDetection {
    let graph = EntityGraph::from_entities(entities, edges);
    let (membership, modularity) = louvain(&graph, config.max_passes.max(1));

    let by_id: HashMap<&str, &Entity> = entities.iter().map(|e| (e.id.as_str(), e)).collect();
    let mut groups: BTreeMap<usize, Vec<&str>> = BTreeMap::new();
    for (id, c) in graph.nodes().zip(membership) {
        groups.entry(c).or_default().push(id);
    }

    let mut kept: Vec<Vec<&str>> = groups
        .into_values()
        .filter(|members| members.len() >= config.min_community_size)
        .collect();
    kept.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a[0].cmp(b[0])));

    let communities: Vec<Community> = kept
        .into_iter()
        .enumerate()
        .map(|(idx, members)| {
            let label = community_label(&members, &by_id, config.label_members);
            Community {
                id: idx as u32,
                label,
                members: members.into_iter().map(str::to_string).collect(),
            }
        })
        .collect();

    debug!(
        communities = communities.len(),
        modularity,
        "Community detection finished"
    );

    CommunityDetection {
        communities,
        modularity,
    }
}

fn community_label(members: &[&str], by_id: &HashMap<&str, &Entity>, shown: usize) -> String {
    let mut ranked: Vec<&Entity> = members.iter().filter_map(|id| by_id.get(id).copied()).collect();
    ranked.sort_by(|a, b| {
        let pa = a.pagerank_percentile.unwrap_or(0.0);
        let pb = b.pagerank_percentile.unwrap_or(0.0);
        pb.total_cmp(&pa).then_with(|| a.name.cmp(&b.name))
    });

    let names: Vec<&str> = ranked.iter().take(shown).map(|e| e.name.as_str()).collect();
    format!("{} ({} members)", names.join(", "), members.len())
}

/// Write community id and label onto entities. Entities outside every kept
/// community have both fields cleared.
pub fn annotate_communities(entities: &mut [Entity], detection: &CommunityDetection) {
    let assignments = detection.assignments();
    for entity in entities.iter_mut() {
        match assignments.get(entity.id.as_str()) {
            Some(community) => {
                entity.community_id = Some(community.id);
                entity.community_label = Some(community.label.clone());
            }
            None => {
                entity.community_id = None;
                entity.community_label = None;
            }
        }
    }
}
