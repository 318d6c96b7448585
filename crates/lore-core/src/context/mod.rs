use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::ContextConfig;
use crate::models::{EdgeKind, Entity, EntityKind};
use crate::store::{GraphStore, GraphStoreError, Subgraph};

/// Builds graph context for entities from their N-hop neighbourhood.
pub struct GraphContextBuilder<'a> {
    store: &'a dyn GraphStore,
    config: ContextConfig,
}

impl<'a> GraphContextBuilder<'a> {
    /// Creates a new context builder over the given store with default config.
    pub fn new(store: &'a dyn GraphStore) -> Self {
        Self {
            store,
            config: ContextConfig::default(),
        }
    }

    /// Creates a new context builder with custom configuration.
    pub fn with_config(store: &'a dyn GraphStore, config: ContextConfig) -> Self {
        Self { store, config }
    }

    /// Sets the neighbourhood depth.
    pub fn depth(mut self, depth: usize) -> Self {
        self.config.subgraph_depth = depth;
        self
    }

    /// Sets how many neighbour names the summary shows per direction.
    pub fn summary_names(mut self, count: usize) -> Self {
        self.config.summary_names = count;
        self
    }

    /// Builds context for a batch of entities with a single subgraph query.
    pub async fn build(&self, entities: &[Entity]) -> Result<HashMap<String, GraphContext>, ContextError> {
        if entities.is_empty() {
            return Ok(HashMap::new());
        }

        let ids: Vec<String> = entities.iter().map(|e| e.id.clone()).collect();
        let subgraphs = self
            .store
            .get_batch_subgraphs(&ids, self.config.subgraph_depth)
            .await?;

        let empty = Subgraph::default();
        Ok(entities
            .iter()
            .map(|entity| {
                let subgraph = subgraphs.get(&entity.id).unwrap_or(&empty);
                (entity.id.clone(), self.context_for(entity, subgraph))
            })
            .collect())
    }

    fn context_for(&self, entity: &Entity, subgraph: &Subgraph) -> GraphContext {
        let names: HashMap<&str, &Entity> = subgraph
            .entities
            .iter()
            .map(|e| (e.id.as_str(), e))
            .collect();

        let neighbor = |id: &str, edge_kind: EdgeKind, symbols: &[String]| {
            let found = names.get(id);
            Neighbor {
                id: id.to_string(),
                name: found.map(|e| e.name.clone()).unwrap_or_else(|| id.to_string()),
                kind: found.map(|e| e.kind),
                edge_kind,
                imported_symbols: symbols.to_vec(),
            }
        };

        let mut inbound = Vec::new();
        let mut outbound = Vec::new();
        for edge in &subgraph.edges {
            if edge.from_id == edge.to_id {
                continue;
            }
            if edge.to_id == entity.id {
                inbound.push(neighbor(&edge.from_id, edge.kind, &[]));
            } else if edge.from_id == entity.id {
                outbound.push(neighbor(&edge.to_id, edge.kind, &edge.imported_symbols));
            }
        }

        let centrality = centrality(inbound.len() + outbound.len(), subgraph.entities.len());
        let summary = summarize(&inbound, &outbound, self.config.summary_names, entity.community_label.as_deref());

        GraphContext {
            entity_id: entity.id.clone(),
            inbound,
            outbound,
            centrality,
            summary,
            community_label: entity.community_label.clone(),
            subgraph_size: subgraph.entities.len(),
        }
    }
}

/// Builds graph context for a batch of entities at the given depth.
pub async fn build_graph_contexts(
    entities: &[Entity],
    store: &dyn GraphStore,
    depth: usize,
) -> Result<HashMap<String, GraphContext>, ContextError> {
    GraphContextBuilder::new(store).depth(depth).build(entities).await
}

/// Degree normalised by the largest possible directed degree in the
/// subgraph. A rough heuristic: sparse subgraphs keep every node low.
pub fn centrality(degree: usize, subgraph_entities: usize) -> f64 {
    if subgraph_entities <= 1 {
        return 0.0;
    }
    let max = ((subgraph_entities - 1) * 2) as f64;
    (degree as f64 / max).clamp(0.0, 1.0)
}

fn summarize(inbound: &[Neighbor], outbound: &[Neighbor], shown: usize, community: Option<&str>) -> String {
    let mut parts = Vec::new();
    if !inbound.is_empty() {
        parts.push(format!("Called by: {}.", name_list(inbound, shown)));
    }
    if !outbound.is_empty() {
        parts.push(format!("Calls: {}.", name_list(outbound, shown)));
    }

    let mut summary = if parts.is_empty() {
        "Isolated entity with no direct connections".to_string()
    } else {
        parts.join(" ")
    };

    if let Some(label) = community {
        summary.push_str(&format!(" Community: {}.", label));
    }
    summary
}

fn name_list(neighbors: &[Neighbor], shown: usize) -> String {
    let names: Vec<&str> = neighbors.iter().take(shown).map(|n| n.name.as_str()).collect();
    let rest = neighbors.len().saturating_sub(shown);
    if rest > 0 {
        format!("{} and {} more", names.join(", "), rest)
    } else {
        names.join(", ")
    }
}

/// A direct neighbour of an entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Neighbor {
    pub id: String,
    pub name: String,
    /// Unknown when the neighbour is outside the fetched subgraph.
    pub kind: Option<EntityKind>,
    pub edge_kind: EdgeKind,
    /// Symbols pulled in through an import edge.
    #[serde(default)]
    pub imported_symbols: Vec<String>,
}

/// Graph context of one entity, rendered into justification prompts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphContext {
    pub entity_id: String,
    pub inbound: Vec<Neighbor>,
    pub outbound: Vec<Neighbor>,
    pub centrality: f64,
    pub summary: String,
    pub community_label: Option<String>,
    /// Number of entities in the fetched neighbourhood.
    pub subgraph_size: usize,
}

impl GraphContext {
    /// Symbols imported by the entity, in edge order.
    pub fn imported_symbols(&self) -> Vec<&str> {
        self.outbound
            .iter()
            .filter(|n| n.edge_kind == EdgeKind::Imports)
            .flat_map(|n| n.imported_symbols.iter().map(String::as_str))
            .collect()
    }

    /// Neighbours reached through ordering edges (calls, references).
    pub fn callee_ids(&self) -> Vec<&str> {
        self.outbound
            .iter()
            .filter(|n| n.edge_kind.is_ordering())
            .map(|n| n.id.as_str())
            .collect()
    }

    /// Formats the context for inclusion in a prompt.
    pub fn to_prompt_string(&self) -> String {
        let mut result = String::new();
        result.push_str(&format!("Graph: {}\n", self.summary));
        result.push_str(&format!("Centrality: {:.2}\n", self.centrality));

        let symbols = self.imported_symbols();
        if !symbols.is_empty() {
            result.push_str(&format!("Imports: {}\n", symbols.join(", ")));
        }
        result
    }
}

/// Errors that can occur during context building.
#[derive(Debug, Error)]
pub enum ContextError {
    #[error("Graph context query failed: {0}")]
    Graph(#[from] GraphStoreError),
}
