//! Edge repair after entity deletion or move.

use std::collections::{BTreeSet, HashSet};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::models::EntityDiff;
use crate::store::{GraphStore, GraphStoreError};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeRepairResult {
    /// Always 0: repair only removes edges, the indexer re-creates them.
    pub edges_created: usize,
    pub edges_deleted: usize,
}

/// Remove edges invalidated by a diff.
///
/// Every edge touching a deleted entity goes first. Then the edges of updated
/// entities are checked, and those whose other endpoint was deleted or no
/// longer exists are removed. Running the repair twice deletes nothing the
/// second time.
pub async fn repair_edges(diff: &EntityDiff, store: &dyn GraphStore) -> Result<EdgeRepairResult, GraphStoreError> {
    let deleted_ids = diff.deleted_ids();
    let mut result = EdgeRepairResult::default();

    if !deleted_ids.is_empty() {
        result.edges_deleted += store.batch_delete_edges_by_entity(&deleted_ids).await?;
    }

    let updated_ids = diff.updated_ids();
    if updated_ids.is_empty() {
        return Ok(result);
    }

    let deleted: HashSet<&str> = deleted_ids.iter().map(String::as_str).collect();
    let updated: HashSet<&str> = updated_ids.iter().map(String::as_str).collect();

    let mut stale: BTreeSet<String> = store
        .get_edges_for_entities(&updated_ids)
        .await?
        .into_iter()
        .filter(|edge| {
            let other = if updated.contains(edge.from_id.as_str()) {
                edge.to_id.as_str()
            } else {
                edge.from_id.as_str()
            };
            deleted.contains(other)
        })
        .map(|edge| edge.id)
        .collect();

    stale.extend(
        store
            .find_broken_edges(&updated_ids)
            .await?
            .into_iter()
            .map(|edge| edge.id),
    );

    if !stale.is_empty() {
        let ids: Vec<String> = stale.into_iter().collect();
        result.edges_deleted += store.delete_edges(&ids).await?;
    }

    debug!(
        deleted_entities = deleted_ids.len(),
        updated_entities = updated_ids.len(),
        edges_deleted = result.edges_deleted,
        "Edge repair finished"
    );

    Ok(result)
}
