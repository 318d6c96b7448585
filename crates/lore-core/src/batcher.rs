//! Token-budget bin-packing of entities into justification batches.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;

use crate::config::{BatchingConfig, TierConfig};
use crate::justification::{select_model_tier, ModelTier};
use crate::models::{Edge, Entity};

/// Fixed per-entity overhead for ids, labels and separators.
const ENTITY_OVERHEAD_TOKENS: usize = 25;

/// Body lines counted towards an entity's cost.
const BODY_PREVIEW_LINES: usize = 10;

/// Neighbour names counted towards an entity's cost.
const NEIGHBOR_PREVIEW: usize = 5;

/// Rough token estimate: one token per 3.5 characters, rounded up.
pub fn estimate_tokens(text: &str) -> usize {
    let chars = text.chars().count();
    (chars * 2).div_ceil(7)
}

/// Estimated prompt and output tokens for one entity.
pub fn entity_cost(entity: &Entity, neighbor_names: &[String], config: &BatchingConfig) -> usize {
    let header = format!("{}{}{}", entity.name, entity.kind, entity.file_path);
    let signature = entity.signature.as_deref().unwrap_or("");
    let body: String = entity
        .body
        .as_deref()
        .map(|b| b.lines().take(BODY_PREVIEW_LINES).collect::<Vec<_>>().join("\n"))
        .unwrap_or_default();
    let neighbors = neighbor_names
        .iter()
        .take(NEIGHBOR_PREVIEW)
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(", ");

    ENTITY_OVERHEAD_TOKENS
        + estimate_tokens(&header)
        + estimate_tokens(signature)
        + estimate_tokens(&body)
        + estimate_tokens(&neighbors)
        + config.output_tokens_per_entity
}

/// A group of entities justified in one LLM call.
#[derive(Debug, Clone, Serialize)]
pub struct EntityBatch {
    pub entities: Vec<Entity>,
    /// Estimated tokens including the system prompt.
    pub estimated_tokens: usize,
    /// Single entity whose cost alone exceeds the budget.
    pub solo: bool,
}

impl EntityBatch {
    pub fn entity_ids(&self) -> Vec<String> {
        self.entities.iter().map(|e| e.id.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

/// Pack entities greedily, in input order, into batches that fit the token
/// and entity-count budgets.
///
/// An entity that alone exceeds the token budget gets a batch of its own
/// after the batch being built is flushed.
pub fn create_batches(
    entities: &[Entity],
    neighbor_names: &HashMap<String, Vec<String>>,
    config: &BatchingConfig,
) -> Vec<EntityBatch> {
    let max_entities = config.max_entities_per_batch.max(1);
    let mut batches = Vec::new();
    let mut current: Vec<Entity> = Vec::new();
    let mut current_tokens = config.system_prompt_tokens;

    let flush = |current: &mut Vec<Entity>, tokens: &mut usize, batches: &mut Vec<EntityBatch>| {
        if !current.is_empty() {
            batches.push(EntityBatch {
                entities: std::mem::take(current),
                estimated_tokens: *tokens,
                solo: false,
            });
        }
        *tokens = config.system_prompt_tokens;
    };

    for entity in entities {
        let neighbors = neighbor_names
            .get(&entity.id)
            .map(Vec::as_slice)
            .unwrap_or(&[]);
        let cost = entity_cost(entity, neighbors, config);

        if config.system_prompt_tokens + cost > config.max_input_tokens {
            flush(&mut current, &mut current_tokens, &mut batches);
            batches.push(EntityBatch {
                entities: vec![entity.clone()],
                estimated_tokens: config.system_prompt_tokens + cost,
                solo: true,
            });
            continue;
        }

        if current_tokens + cost > config.max_input_tokens || current.len() >= max_entities {
            flush(&mut current, &mut current_tokens, &mut batches);
        }

        current.push(entity.clone());
        current_tokens += cost;
    }
    flush(&mut current, &mut current_tokens, &mut batches);

    batches
}

/// Split one topological level by model tier, then pack each tier.
///
/// Tiers come out fast first; within a tier entities keep their input order.
pub fn batches_by_tier(
    entities: &[Entity],
    neighbor_names: &HashMap<String, Vec<String>>,
    batching: &BatchingConfig,
    tiers: &TierConfig,
) -> Vec<(ModelTier, EntityBatch)> {
    let mut by_tier: BTreeMap<ModelTier, Vec<Entity>> = BTreeMap::new();
    for entity in entities {
        by_tier
            .entry(select_model_tier(entity, tiers))
            .or_default()
            .push(entity.clone());
    }

    by_tier
        .into_iter()
        .flat_map(|(tier, group)| {
            create_batches(&group, neighbor_names, batching)
                .into_iter()
                .map(move |batch| (tier, batch))
        })
        .collect()
}

/// Names of each entity's direct neighbours within the set, for cost estimation.
pub fn neighbor_names(entities: &[Entity], edges: &[Edge]) -> HashMap<String, Vec<String>> {
    let names: HashMap<&str, &str> = entities.iter().map(|e| (e.id.as_str(), e.name.as_str())).collect();
    let mut neighbors: HashMap<String, Vec<String>> = HashMap::new();

    for edge in edges {
        if edge.from_id == edge.to_id {
            continue;
        }
        if let (Some(from), Some(to)) = (names.get(edge.from_id.as_str()), names.get(edge.to_id.as_str())) {
            neighbors.entry(edge.from_id.clone()).or_default().push(to.to_string());
            neighbors.entry(edge.to_id.clone()).or_default().push(from.to_string());
        }
    }

    neighbors
}
