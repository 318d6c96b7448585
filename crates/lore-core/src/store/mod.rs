//! Graph store port.
//!
//! The storage engine itself lives outside this crate. The pipeline talks to
//! it through [`GraphStore`]; [`InMemoryGraphStore`] is a complete adapter
//! used by tests and the CLI.

mod error;
mod memory;

pub use error::GraphStoreError;
pub use memory::InMemoryGraphStore;

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::models::{DriftScore, Edge, Entity, FeatureAggregation, Justification};
use crate::pipeline::PipelineRun;

/// Entities and edges reachable from one root entity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Subgraph {
    pub entities: Vec<Entity>,
    pub edges: Vec<Edge>,
}

/// Trait for graph storage backends.
///
/// Justification writes are bi-temporal: for every justification passed to
/// [`GraphStore::bulk_upsert_justifications`] the adapter closes the entity's
/// current row and inserts the new one in a single transaction, so a retried
/// write never leaves two current rows.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// N-hop neighbourhoods for a batch of entities, keyed by entity id.
    /// One call per batch, never one per entity.
    async fn get_batch_subgraphs(
        &self,
        entity_ids: &[String],
        depth: usize,
    ) -> Result<HashMap<String, Subgraph>, GraphStoreError>;

    /// All edges touching any of the given entities.
    async fn get_edges_for_entities(&self, entity_ids: &[String]) -> Result<Vec<Edge>, GraphStoreError>;

    /// Edges touching the given entities whose other endpoint no longer exists.
    async fn find_broken_edges(&self, entity_ids: &[String]) -> Result<Vec<Edge>, GraphStoreError>;

    /// Delete every edge touching the given entities. Returns the number deleted.
    async fn batch_delete_edges_by_entity(&self, entity_ids: &[String]) -> Result<usize, GraphStoreError>;

    /// Delete edges by id. Returns the number deleted.
    async fn delete_edges(&self, edge_ids: &[String]) -> Result<usize, GraphStoreError>;

    /// Current justifications for the given entities, keyed by entity id.
    async fn get_current_justifications(
        &self,
        entity_ids: &[String],
    ) -> Result<HashMap<String, Justification>, GraphStoreError>;

    /// All current justifications of a repository.
    async fn list_current_justifications(&self, repo_id: &str) -> Result<Vec<Justification>, GraphStoreError>;

    /// Close-then-insert each justification. Returns the number inserted.
    async fn bulk_upsert_justifications(&self, justifications: &[Justification]) -> Result<usize, GraphStoreError>;

    /// Close the current justification of each entity without inserting a
    /// successor. Returns the number of rows closed.
    async fn close_justifications(&self, entity_ids: &[String]) -> Result<usize, GraphStoreError>;

    /// Replace the feature rollup of a repository.
    async fn bulk_upsert_feature_aggregations(
        &self,
        repo_id: &str,
        aggregations: &[FeatureAggregation],
    ) -> Result<(), GraphStoreError>;

    /// Append drift classifications to the history.
    async fn append_drift_scores(&self, scores: &[DriftScore]) -> Result<(), GraphStoreError>;

    /// Persist the status of a pipeline run.
    async fn save_run(&self, run: &PipelineRun) -> Result<(), GraphStoreError>;
}
