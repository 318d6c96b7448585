//! In-memory graph store.

use std::collections::{BTreeMap, HashMap, HashSet};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use super::error::GraphStoreError;
use super::{GraphStore, Subgraph};
use crate::models::{DriftScore, Edge, Entity, FeatureAggregation, Justification};
use crate::pipeline::PipelineRun;

#[derive(Default)]
struct MemoryState {
    entities: BTreeMap<String, Entity>,
    edges: BTreeMap<String, Edge>,
    /// Append-only justification log; at most one current row per entity.
    justifications: Vec<Justification>,
    features: HashMap<String, Vec<FeatureAggregation>>,
    drift_scores: Vec<DriftScore>,
    runs: HashMap<String, PipelineRun>,
}

/// Graph store held entirely in memory.
///
/// Every write takes the state lock once, which makes the close-then-insert
/// of justifications atomic.
#[derive(Default)]
pub struct InMemoryGraphStore {
    state: RwLock<MemoryState>,
}

impl InMemoryGraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-loaded with a graph snapshot.
    pub async fn with_graph(entities: Vec<Entity>, edges: Vec<Edge>) -> Self {
        let store = Self::new();
        store.upsert_entities(entities).await;
        store.upsert_edges(edges).await;
        store
    }

    pub async fn upsert_entities(&self, entities: Vec<Entity>) {
        let mut state = self.state.write().await;
        for entity in entities {
            state.entities.insert(entity.id.clone(), entity);
        }
    }

    /// Remove entity records. Their edges are left for edge repair.
    pub async fn remove_entities(&self, entity_ids: &[String]) {
        let mut state = self.state.write().await;
        for id in entity_ids {
            state.entities.remove(id);
        }
    }

    pub async fn upsert_edges(&self, edges: Vec<Edge>) {
        let mut state = self.state.write().await;
        for edge in edges {
            state.edges.insert(edge.id.clone(), edge);
        }
    }

    pub async fn entities(&self) -> Vec<Entity> {
        self.state.read().await.entities.values().cloned().collect()
    }

    pub async fn edges(&self) -> Vec<Edge> {
        self.state.read().await.edges.values().cloned().collect()
    }

    /// Full justification history of an entity, oldest first.
    pub async fn justification_history(&self, entity_id: &str) -> Vec<Justification> {
        self.state
            .read()
            .await
            .justifications
            .iter()
            .filter(|j| j.entity_id == entity_id)
            .cloned()
            .collect()
    }

    pub async fn drift_history(&self) -> Vec<DriftScore> {
        self.state.read().await.drift_scores.clone()
    }

    pub async fn feature_aggregations(&self, repo_id: &str) -> Vec<FeatureAggregation> {
        self.state
            .read()
            .await
            .features
            .get(repo_id)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn get_run(&self, run_id: &str) -> Option<PipelineRun> {
        self.state.read().await.runs.get(run_id).cloned()
    }

    /// Every recorded run, oldest first.
    pub async fn runs(&self) -> Vec<PipelineRun> {
        let mut runs: Vec<PipelineRun> = self.state.read().await.runs.values().cloned().collect();
        runs.sort_by_key(|r| r.started_at);
        runs
    }

    fn adjacency(edges: &BTreeMap<String, Edge>) -> HashMap<&str, Vec<&Edge>> {
        let mut adjacency: HashMap<&str, Vec<&Edge>> = HashMap::new();
        for edge in edges.values() {
            adjacency.entry(edge.from_id.as_str()).or_default().push(edge);
            if edge.to_id != edge.from_id {
                adjacency.entry(edge.to_id.as_str()).or_default().push(edge);
            }
        }
        adjacency
    }
}

#[async_trait]
impl GraphStore for InMemoryGraphStore {
    async fn get_batch_subgraphs(
        &self,
        entity_ids: &[String],
        depth: usize,
    ) -> Result<HashMap<String, Subgraph>, GraphStoreError> {
        let state = self.state.read().await;
        let adjacency = Self::adjacency(&state.edges);
        let mut result = HashMap::with_capacity(entity_ids.len());

        for root in entity_ids {
            let mut visited: HashSet<&str> = HashSet::from([root.as_str()]);
            let mut frontier: Vec<&str> = vec![root.as_str()];
            let mut edges: BTreeMap<&str, &Edge> = BTreeMap::new();

            for _ in 0..depth {
                let mut next = Vec::new();
                for node in &frontier {
                    for edge in adjacency.get(node).into_iter().flatten() {
                        edges.insert(edge.id.as_str(), edge);
                        let other = edge.other_end(node);
                        if visited.insert(other) {
                            next.push(other);
                        }
                    }
                }
                if next.is_empty() {
                    break;
                }
                frontier = next;
            }

            let mut entities: Vec<Entity> = visited
                .iter()
                .filter_map(|id| state.entities.get(*id).cloned())
                .collect();
            entities.sort_by(|a, b| a.id.cmp(&b.id));

            result.insert(
                root.clone(),
                Subgraph {
                    entities,
                    edges: edges.into_values().cloned().collect(),
                },
            );
        }

        Ok(result)
    }

    async fn get_edges_for_entities(&self, entity_ids: &[String]) -> Result<Vec<Edge>, GraphStoreError> {
        let ids: HashSet<&str> = entity_ids.iter().map(String::as_str).collect();
        let state = self.state.read().await;
        Ok(state
            .edges
            .values()
            .filter(|e| ids.contains(e.from_id.as_str()) || ids.contains(e.to_id.as_str()))
            .cloned()
            .collect())
    }

    async fn find_broken_edges(&self, entity_ids: &[String]) -> Result<Vec<Edge>, GraphStoreError> {
        let ids: HashSet<&str> = entity_ids.iter().map(String::as_str).collect();
        let state = self.state.read().await;
        Ok(state
            .edges
            .values()
            .filter(|e| ids.contains(e.from_id.as_str()) || ids.contains(e.to_id.as_str()))
            .filter(|e| {
                !state.entities.contains_key(&e.from_id) || !state.entities.contains_key(&e.to_id)
            })
            .cloned()
            .collect())
    }

    async fn batch_delete_edges_by_entity(&self, entity_ids: &[String]) -> Result<usize, GraphStoreError> {
        let ids: HashSet<&str> = entity_ids.iter().map(String::as_str).collect();
        let mut state = self.state.write().await;
        let before = state.edges.len();
        state
            .edges
            .retain(|_, e| !ids.contains(e.from_id.as_str()) && !ids.contains(e.to_id.as_str()));
        Ok(before - state.edges.len())
    }

    async fn delete_edges(&self, edge_ids: &[String]) -> Result<usize, GraphStoreError> {
        let mut state = self.state.write().await;
        Ok(edge_ids
            .iter()
            .filter(|id| state.edges.remove(id.as_str()).is_some())
            .count())
    }

    async fn get_current_justifications(
        &self,
        entity_ids: &[String],
    ) -> Result<HashMap<String, Justification>, GraphStoreError> {
        let ids: HashSet<&str> = entity_ids.iter().map(String::as_str).collect();
        let state = self.state.read().await;
        Ok(state
            .justifications
            .iter()
            .filter(|j| j.is_current() && ids.contains(j.entity_id.as_str()))
            .map(|j| (j.entity_id.clone(), j.clone()))
            .collect())
    }

    async fn list_current_justifications(&self, repo_id: &str) -> Result<Vec<Justification>, GraphStoreError> {
        let state = self.state.read().await;
        Ok(state
            .justifications
            .iter()
            .filter(|j| j.is_current() && j.repo_id == repo_id)
            .cloned()
            .collect())
    }

    async fn bulk_upsert_justifications(&self, justifications: &[Justification]) -> Result<usize, GraphStoreError> {
        let mut state = self.state.write().await;
        let now = Utc::now();

        for incoming in justifications {
            for row in state
                .justifications
                .iter_mut()
                .filter(|j| j.entity_id == incoming.entity_id && j.is_current())
            {
                row.valid_to = Some(now);
            }

            let mut row = incoming.clone();
            row.valid_from = now;
            row.valid_to = None;
            state.justifications.push(row);
        }

        Ok(justifications.len())
    }

    async fn close_justifications(&self, entity_ids: &[String]) -> Result<usize, GraphStoreError> {
        let ids: HashSet<&str> = entity_ids.iter().map(String::as_str).collect();
        let mut state = self.state.write().await;
        let now = Utc::now();
        let mut closed = 0;
        for row in state
            .justifications
            .iter_mut()
            .filter(|j| j.is_current() && ids.contains(j.entity_id.as_str()))
        {
            row.valid_to = Some(now);
            closed += 1;
        }
        Ok(closed)
    }

    async fn bulk_upsert_feature_aggregations(
        &self,
        repo_id: &str,
        aggregations: &[FeatureAggregation],
    ) -> Result<(), GraphStoreError> {
        let mut state = self.state.write().await;
        state
            .features
            .insert(repo_id.to_string(), aggregations.to_vec());
        Ok(())
    }

    async fn append_drift_scores(&self, scores: &[DriftScore]) -> Result<(), GraphStoreError> {
        let mut state = self.state.write().await;
        state.drift_scores.extend_from_slice(scores);
        Ok(())
    }

    async fn save_run(&self, run: &PipelineRun) -> Result<(), GraphStoreError> {
        let mut state = self.state.write().await;
        state.runs.insert(run.id.clone(), run.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EdgeKind, EntityKind, Taxonomy};

    fn entity(name: &str) -> Entity {
        Entity::new("org", "repo", EntityKind::Function, name, "src/lib.rs")
    }

    #[tokio::test]
    async fn test_upsert_closes_previous_row() {
        let store = InMemoryGraphStore::new();
        let first = Justification::new("e1", "org", "repo", Taxonomy::Utility, "first", "misc");
        let second = Justification::new("e1", "org", "repo", Taxonomy::Vertical, "second", "auth");

        store.bulk_upsert_justifications(&[first]).await.unwrap();
        store.bulk_upsert_justifications(&[second]).await.unwrap();

        let history = store.justification_history("e1").await;
        assert_eq!(history.len(), 2);
        assert!(history[0].valid_to.is_some());
        assert!(history[1].valid_to.is_none());

        let current = store.get_current_justifications(&["e1".to_string()]).await.unwrap();
        assert_eq!(current["e1"].business_purpose, "second");
    }

    #[tokio::test]
    async fn test_close_keeps_history() {
        let store = InMemoryGraphStore::new();
        let row = Justification::new("e1", "org", "repo", Taxonomy::Utility, "first", "misc");
        store.bulk_upsert_justifications(&[row]).await.unwrap();

        assert_eq!(store.close_justifications(&["e1".to_string()]).await.unwrap(), 1);
        assert_eq!(store.close_justifications(&["e1".to_string()]).await.unwrap(), 0);
        assert!(store.list_current_justifications("repo").await.unwrap().is_empty());
        assert_eq!(store.justification_history("e1").await.len(), 1);
    }

    #[tokio::test]
    async fn test_subgraph_respects_depth() {
        let (a, b, c) = (entity("a"), entity("b"), entity("c"));
        let edges = vec![
            Edge::new(&a.id, &b.id, EdgeKind::Calls),
            Edge::new(&b.id, &c.id, EdgeKind::Calls),
        ];
        let store = InMemoryGraphStore::with_graph(vec![a.clone(), b, c], edges).await;

        let one_hop = store.get_batch_subgraphs(&[a.id.clone()], 1).await.unwrap();
        assert_eq!(one_hop[&a.id].entities.len(), 2);
        assert_eq!(one_hop[&a.id].edges.len(), 1);

        let two_hop = store.get_batch_subgraphs(&[a.id.clone()], 2).await.unwrap();
        assert_eq!(two_hop[&a.id].entities.len(), 3);
        assert_eq!(two_hop[&a.id].edges.len(), 2);
    }

    #[tokio::test]
    async fn test_find_broken_edges() {
        let (a, b) = (entity("a"), entity("b"));
        let edge = Edge::new(&a.id, &b.id, EdgeKind::Calls);
        let store = InMemoryGraphStore::with_graph(vec![a.clone(), b.clone()], vec![edge]).await;

        assert!(store.find_broken_edges(&[a.id.clone()]).await.unwrap().is_empty());
        store.remove_entities(&[b.id.clone()]).await;
        assert_eq!(store.find_broken_edges(&[a.id.clone()]).await.unwrap().len(), 1);
    }
}
