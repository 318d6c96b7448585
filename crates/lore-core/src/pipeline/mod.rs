//! Pipeline orchestration.
//!
//! A [`Pipeline`] sequences the pure components of this crate over the
//! store, LLM and embedder ports. Topological levels run strictly one after
//! another; the batches of a level run concurrently. Every run leaves a
//! [`PipelineRun`] record in the store.

mod activity;
mod run;

pub use activity::ActivityPolicy;
pub use run::{PipelineRun, RunKind, RunStats, RunStatus};

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::try_join_all;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::batcher::{batches_by_tier, neighbor_names, EntityBatch};
use crate::config::{Config, ConfigError};
use crate::context::{ContextError, GraphContext, GraphContextBuilder};
use crate::drift::{compute_drift, DriftInput};
use crate::graph::{annotate_communities, annotate_pagerank, detect_communities, topological_sort_entities};
use crate::justification::{
    apply_quality, build_justification_prompt, deduplicate_features, normalize_justification,
    normalize_justifications, JustificationResponse, ModelTier, HUMAN_TIER, LOW_QUALITY_THRESHOLD,
};
use crate::llm::{build_embedder, generate_object, Embedder, LLMError, Provider, RateLimiter, LLM};
use crate::models::{
    DriftScore, Edge, Entity, EntityDiff, EntityMove, Justification, Taxonomy, UpdatedEntity,
};
use crate::normalizer::AstNormalizer;
use crate::repair::{repair_edges, EdgeRepairResult};
use crate::store::{GraphStore, GraphStoreError, Subgraph};

/// Errors that fail a pipeline run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Graph store error: {0}")]
    Store(#[from] GraphStoreError),

    #[error("LLM error: {0}")]
    LLM(#[from] LLMError),

    #[error("Context error: {0}")]
    Context(#[from] ContextError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Activity '{activity}' failed after {attempts} attempts: {last_error}")]
    ActivityExhausted {
        activity: String,
        attempts: u32,
        last_error: String,
    },

    #[error("Activity '{activity}' timed out after {after:?}")]
    Timeout { activity: String, after: Duration },
}

/// Result of justifying one batch.
#[derive(Debug, Default)]
struct BatchOutcome {
    justified: usize,
    low_quality: usize,
    llm_calls: usize,
}

/// Incremental annotation pipeline over the store, LLM and embedder ports.
pub struct Pipeline {
    store: Arc<dyn GraphStore>,
    llm: Arc<dyn LLM>,
    embedder: Arc<dyn Embedder>,
    config: Config,
    limiter: RateLimiter,
    normalizer: AstNormalizer,
    activity: ActivityPolicy,
}

impl Pipeline {
    pub fn new(
        store: Arc<dyn GraphStore>,
        llm: Arc<dyn LLM>,
        embedder: Arc<dyn Embedder>,
        config: Config,
    ) -> Self {
        Self {
            store,
            llm,
            embedder,
            limiter: RateLimiter::from_config(&config.rate_limit),
            normalizer: AstNormalizer::default()
                .with_structural_comparison(config.pipeline.structural_comparison),
            activity: ActivityPolicy::from_config(&config.pipeline),
            config,
        }
    }

    /// Build the LLM and embedder from configuration.
    pub fn from_config(config: Config, store: Arc<dyn GraphStore>) -> Result<Self, PipelineError> {
        config.validate()?;
        let llm: Arc<dyn LLM> = Arc::from(Provider::build_from_config(&config.llm)?);
        let embedder = build_embedder(&config.embedding, &config.llm)?;
        Ok(Self::new(store, llm, embedder, config))
    }

    /// Replace the activity policy (timeouts and retries).
    pub fn with_activity_policy(mut self, policy: ActivityPolicy) -> Self {
        self.activity = policy;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Justify a set of entities bottom-up.
    ///
    /// Entities are annotated with PageRank and community signals, split
    /// into topological levels and justified level by level so each prompt
    /// can quote the justifications of its callees.
    pub async fn justify_entities(
        &self,
        entities: Vec<Entity>,
        edges: &[Edge],
    ) -> Result<PipelineRun, PipelineError> {
        let (org_id, repo_id) = scope_of(entities.iter());
        let mut run = PipelineRun::start(org_id, repo_id, RunKind::Full);
        self.store.save_run(&run).await?;
        info!(run_id = %run.id, entities = entities.len(), "Starting justification run");

        let repo_id = run.repo_id.clone();
        let result: Result<(), PipelineError> = async {
            self.justify(entities, edges, &mut run.stats).await?;
            self.refresh_features(&repo_id, &mut run.stats).await
        }
        .await;
        self.finish(run, result).await
    }

    /// Apply an incremental diff.
    ///
    /// The store is expected to already reflect the post-diff snapshot:
    /// added and updated entities present, deleted ones gone.
    pub async fn apply_diff(&self, diff: &EntityDiff) -> Result<PipelineRun, PipelineError> {
        let (org_id, repo_id) = scope_of(
            diff.added
                .iter()
                .chain(diff.updated.iter().map(|u| &u.after))
                .chain(diff.deleted.iter()),
        );
        let mut run = PipelineRun::start(org_id, repo_id, RunKind::Incremental);
        self.store.save_run(&run).await?;
        info!(
            run_id = %run.id,
            added = diff.added.len(),
            updated = diff.updated.len(),
            deleted = diff.deleted.len(),
            "Starting incremental run"
        );

        let repo_id = run.repo_id.clone();
        let result: Result<(), PipelineError> = async {
            self.apply_diff_inner(diff, &mut run.stats).await?;
            self.refresh_features(&repo_id, &mut run.stats).await
        }
        .await;
        self.finish(run, result).await
    }

    /// Store a human-written justification for an entity.
    pub async fn override_justification(
        &self,
        entity: &Entity,
        taxonomy: Taxonomy,
        business_purpose: &str,
        feature_tag: &str,
        domain_concepts: Vec<String>,
    ) -> Result<Justification, PipelineError> {
        let mut justification = Justification::new(
            &entity.id,
            &entity.org_id,
            &entity.repo_id,
            taxonomy,
            business_purpose,
            feature_tag,
        )
        .with_confidence(1.0)
        .with_domain_concepts(domain_concepts)
        .with_model_tier(HUMAN_TIER);
        normalize_justification(&mut justification);
        apply_quality(&mut justification);

        self.store
            .bulk_upsert_justifications(std::slice::from_ref(&justification))
            .await?;
        info!(entity_id = %entity.id, "Stored human justification");
        Ok(justification)
    }

    async fn finish(
        &self,
        mut run: PipelineRun,
        result: Result<(), PipelineError>,
    ) -> Result<PipelineRun, PipelineError> {
        match result {
            Ok(()) => {
                run.complete();
                self.store.save_run(&run).await?;
                info!(run_id = %run.id, stats = ?run.stats, "Run completed");
                Ok(run)
            }
            Err(e) => {
                run.fail(&e);
                if let Err(save_err) = self.store.save_run(&run).await {
                    warn!(run_id = %run.id, error = %save_err, "Failed to record failed run");
                }
                warn!(run_id = %run.id, error = %e, "Run failed");
                Err(e)
            }
        }
    }

    async fn justify(
        &self,
        mut entities: Vec<Entity>,
        edges: &[Edge],
        stats: &mut RunStats,
    ) -> Result<(), PipelineError> {
        if entities.is_empty() {
            return Ok(());
        }

        annotate_pagerank(&mut entities, edges);
        let detection = detect_communities(&entities, edges, &self.config.community);
        annotate_communities(&mut entities, &detection);

        let ids: Vec<String> = entities.iter().map(|e| e.id.clone()).collect();
        let levels = topological_sort_entities(&ids, edges);
        let neighbors = neighbor_names(&entities, edges);
        let by_id: HashMap<&str, &Entity> = entities.iter().map(|e| (e.id.as_str(), e)).collect();

        for (index, level) in levels.iter().enumerate() {
            let members: Vec<Entity> = level
                .iter()
                .filter_map(|id| by_id.get(id.as_str()).map(|e| (*e).clone()))
                .collect();
            let batches = batches_by_tier(&members, &neighbors, &self.config.batching, &self.config.llm.tiers);

            info!(level = index, entities = level.len(), batches = batches.len(), "Justifying level");

            let outcomes = try_join_all(
                batches
                    .iter()
                    .map(|(tier, batch)| self.justify_batch(*tier, batch)),
            )
            .await?;

            stats.levels += 1;
            stats.batches += batches.len();
            for outcome in outcomes {
                stats.justified += outcome.justified;
                stats.low_quality += outcome.low_quality;
                stats.llm_calls += outcome.llm_calls;
            }
        }

        Ok(())
    }

    /// Rebuild the feature rollup of a repository from its current
    /// justifications.
    async fn refresh_features(&self, repo_id: &str, stats: &mut RunStats) -> Result<(), PipelineError> {
        if repo_id.is_empty() {
            return Ok(());
        }

        let current = self
            .activity
            .run("list_justifications", || self.list_current(repo_id))
            .await?;
        let features = deduplicate_features(&current);
        self.activity
            .run("store_features", || self.store_features(repo_id, &features))
            .await?;
        stats.features = features.len();

        Ok(())
    }

    async fn justify_batch(&self, tier: ModelTier, batch: &EntityBatch) -> Result<BatchOutcome, PipelineError> {
        let contexts = self
            .activity
            .run("build_context", || self.build_contexts(&batch.entities))
            .await?;

        let callee_ids: Vec<String> = contexts
            .values()
            .flat_map(|c| c.callee_ids())
            .map(str::to_string)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let callees = if callee_ids.is_empty() {
            HashMap::new()
        } else {
            self.activity
                .run("fetch_callee_justifications", || self.current_justifications(&callee_ids))
                .await?
        };

        let prompt = build_justification_prompt(
            &batch.entities,
            &contexts,
            &callees,
            self.config.context.prompt_body_lines,
        );
        let model = self.config.llm.model_for_tier(tier);
        let system = self.config.pipeline.system_prompt_or_default();
        let calls = AtomicUsize::new(0);

        let justifications = self
            .activity
            .run_gated(
                "justify_batch",
                || self.limiter.acquire(batch.estimated_tokens as u64),
                || self.call_llm(&calls, batch, tier, &model, system, &prompt),
            )
            .await?;

        let mut justifications = normalize_justifications(justifications);
        let mut low_quality = 0;
        for justification in &mut justifications {
            let quality = apply_quality(justification);
            if quality.is_low(LOW_QUALITY_THRESHOLD) {
                low_quality += 1;
                warn!(
                    entity_id = %justification.entity_id,
                    score = quality.score,
                    flags = ?quality.flags,
                    "Low quality justification"
                );
            }
        }

        let stored = self
            .activity
            .run("store_justifications", || self.store_justifications(&justifications))
            .await?;

        debug!(
            tier = %tier,
            model = %model,
            entities = batch.len(),
            tokens = batch.estimated_tokens,
            "Batch justified"
        );

        Ok(BatchOutcome {
            justified: stored,
            low_quality,
            llm_calls: calls.load(Ordering::SeqCst),
        })
    }

    async fn call_llm(
        &self,
        calls: &AtomicUsize,
        batch: &EntityBatch,
        tier: ModelTier,
        model: &str,
        system: &str,
        prompt: &str,
    ) -> Result<Vec<Justification>, PipelineError> {
        calls.fetch_add(1, Ordering::SeqCst);
        let response: JustificationResponse =
            generate_object(self.llm.as_ref(), model, system, prompt).await?;
        Ok(response.into_justifications(&batch.entities, tier.as_str(), model)?)
    }

    async fn apply_diff_inner(&self, diff: &EntityDiff, stats: &mut RunStats) -> Result<(), PipelineError> {
        let moves = self.normalizer.detect_moves(&diff.added, &diff.deleted, None);
        stats.moves = moves.len();
        let inherited = self.inherit_justifications(&moves).await?;

        let repair = self.activity.run("repair_edges", || self.repair(diff)).await?;
        stats.edges_deleted = repair.edges_deleted;

        // Deleted entities, move sources included, keep no current justification.
        let deleted_ids = diff.deleted_ids();
        if !deleted_ids.is_empty() {
            let closed = self
                .activity
                .run("close_justifications", || self.close_justifications(&deleted_ids))
                .await?;
            debug!(deleted = deleted_ids.len(), closed, "Closed justifications of deleted entities");
        }

        let (changed, cosmetic): (Vec<&UpdatedEntity>, Vec<&UpdatedEntity>) =
            diff.updated.iter().partition(|u| self.is_semantic_update(u));
        stats.cosmetic_skipped = cosmetic.len();

        let scores = self.score_drift(&changed).await?;
        if !scores.is_empty() {
            self.activity
                .run("append_drift_scores", || self.append_drift(&scores))
                .await?;
        }
        stats.drift_scored = scores.len();

        let mut targets: BTreeMap<String, Entity> = BTreeMap::new();
        for entity in diff.added.iter().filter(|e| !inherited.contains(&e.id)) {
            targets.insert(entity.id.clone(), entity.clone());
        }
        for update in &changed {
            targets.insert(update.after.id.clone(), update.after.clone());
        }

        let drifted: Vec<String> = scores
            .iter()
            .filter(|s| s.category.triggers_cascade())
            .map(|s| s.entity_id.clone())
            .collect();
        let mut excluded: HashSet<String> = targets.keys().cloned().collect();
        excluded.extend(deleted_ids);
        excluded.extend(inherited);
        let cascaded = self.cascade_callers(&drifted, &excluded).await?;
        stats.cascaded = cascaded.len();
        for entity in cascaded {
            targets.insert(entity.id.clone(), entity);
        }

        if targets.is_empty() {
            return Ok(());
        }

        let ids: Vec<String> = targets.keys().cloned().collect();
        let edges = self
            .activity
            .run("load_edges", || self.edges_for(&ids))
            .await?;
        self.justify(targets.into_values().collect(), &edges, stats).await
    }

    /// Copy the current justification of each moved entity to its new id.
    /// Returns the ids that inherited one.
    async fn inherit_justifications(&self, moves: &[EntityMove]) -> Result<HashSet<String>, PipelineError> {
        if moves.is_empty() {
            return Ok(HashSet::new());
        }

        let from_ids: Vec<String> = moves.iter().map(|m| m.from.id.clone()).collect();
        let prior = self
            .activity
            .run("fetch_moved_justifications", || self.current_justifications(&from_ids))
            .await?;

        let now = Utc::now();
        let inherited: Vec<Justification> = moves
            .iter()
            .filter_map(|m| {
                prior.get(&m.from.id).map(|j| Justification {
                    id: uuid::Uuid::new_v4().to_string(),
                    entity_id: m.to.id.clone(),
                    org_id: m.to.org_id.clone(),
                    repo_id: m.to.repo_id.clone(),
                    valid_from: now,
                    valid_to: None,
                    ..j.clone()
                })
            })
            .collect();

        if !inherited.is_empty() {
            self.activity
                .run("store_moved_justifications", || self.store_justifications(&inherited))
                .await?;
        }
        debug!(moves = moves.len(), inherited = inherited.len(), "Moved entities processed");

        Ok(inherited.into_iter().map(|j| j.entity_id).collect())
    }

    fn is_semantic_update(&self, update: &UpdatedEntity) -> bool {
        match (update.before.body.as_deref(), update.after.body.as_deref()) {
            (Some(old), Some(new)) => {
                self.normalizer
                    .is_semantic_change(old, new, update.after.language())
            }
            (old, new) => old != new,
        }
    }

    /// Classify semantic updates. Embeddings are requested only for
    /// entities whose fingerprints differ.
    async fn score_drift(&self, changed: &[&UpdatedEntity]) -> Result<Vec<DriftScore>, PipelineError> {
        if changed.is_empty() {
            return Ok(Vec::new());
        }

        let fingerprints: Vec<(Option<String>, Option<String>)> = changed
            .iter()
            .map(|u| {
                let language = u.after.language();
                let fingerprint = |e: &Entity| {
                    e.body
                        .as_deref()
                        .and_then(|b| self.normalizer.compute_semantic_fingerprint(b, language))
                };
                (fingerprint(&u.before), fingerprint(&u.after))
            })
            .collect();

        let mut pending: Vec<usize> = Vec::new();
        let mut texts: Vec<String> = Vec::new();
        for (i, (update, (old, new))) in changed.iter().zip(&fingerprints).enumerate() {
            if old.is_some() && old == new {
                continue;
            }
            // An entity that gains or loses its body has nothing to compare;
            // empty embeddings classify it as intent drift.
            let bodies = (update.before.body.as_deref(), update.after.body.as_deref());
            if let (Some(before), Some(after)) = bodies {
                if !before.trim().is_empty() && !after.trim().is_empty() {
                    pending.push(i);
                    texts.push(before.to_string());
                    texts.push(after.to_string());
                }
            }
        }

        let vectors = if texts.is_empty() {
            Vec::new()
        } else {
            self.activity.run("embed", || self.embed(&texts)).await?
        };
        if vectors.len() != texts.len() {
            return Err(PipelineError::LLM(LLMError::Embedding(format!(
                "expected {} vectors, got {}",
                texts.len(),
                vectors.len()
            ))));
        }

        let detected_at = Utc::now();
        let empty: &[f32] = &[];
        let scores = changed
            .iter()
            .zip(&fingerprints)
            .enumerate()
            .map(|(i, (update, (old, new)))| {
                let slot = pending.iter().position(|&p| p == i);
                let vector = |offset: usize| {
                    slot.and_then(|s| vectors.get(s * 2 + offset))
                        .map(Vec::as_slice)
                        .unwrap_or(empty)
                };
                let result = compute_drift(
                    &DriftInput {
                        ast_hash_old: old.as_deref(),
                        ast_hash_new: new.as_deref(),
                        embedding_old: vector(0),
                        embedding_new: vector(1),
                    },
                    &self.config.drift,
                );
                DriftScore {
                    entity_id: update.id().to_string(),
                    category: result.category,
                    embedding_similarity: result.similarity,
                    detected_at,
                }
            })
            .collect();

        Ok(scores)
    }

    /// Inbound callers of drifted entities, at most `max_cascade_callers`
    /// per entity.
    async fn cascade_callers(
        &self,
        drifted: &[String],
        excluded: &HashSet<String>,
    ) -> Result<Vec<Entity>, PipelineError> {
        if drifted.is_empty() {
            return Ok(Vec::new());
        }

        let subgraphs = self
            .activity
            .run("cascade_subgraphs", || self.subgraphs(drifted, 1))
            .await?;

        let limit = self.config.pipeline.max_cascade_callers;
        let mut seen: HashSet<String> = HashSet::new();
        let mut callers = Vec::new();

        for id in drifted {
            let Some(subgraph) = subgraphs.get(id) else {
                continue;
            };
            let caller_ids: BTreeSet<&str> = subgraph
                .edges
                .iter()
                .filter(|e| e.to_id == *id && e.from_id != *id && e.kind.is_ordering())
                .map(|e| e.from_id.as_str())
                .filter(|caller| !excluded.contains(*caller))
                .collect();

            if caller_ids.len() > limit {
                warn!(entity_id = %id, callers = caller_ids.len(), limit, "Cascade truncated");
            }

            for caller in caller_ids.into_iter().take(limit) {
                if !seen.insert(caller.to_string()) {
                    continue;
                }
                if let Some(entity) = subgraph.entities.iter().find(|e| e.id == caller) {
                    callers.push(entity.clone());
                }
            }
        }

        debug!(drifted = drifted.len(), callers = callers.len(), "Cascade resolved");
        Ok(callers)
    }

    async fn build_contexts(&self, entities: &[Entity]) -> Result<HashMap<String, GraphContext>, PipelineError> {
        let builder = GraphContextBuilder::with_config(self.store.as_ref(), self.config.context.clone());
        Ok(builder.build(entities).await?)
    }

    async fn current_justifications(
        &self,
        entity_ids: &[String],
    ) -> Result<HashMap<String, Justification>, PipelineError> {
        Ok(self.store.get_current_justifications(entity_ids).await?)
    }

    async fn list_current(&self, repo_id: &str) -> Result<Vec<Justification>, PipelineError> {
        Ok(self.store.list_current_justifications(repo_id).await?)
    }

    async fn store_justifications(&self, justifications: &[Justification]) -> Result<usize, PipelineError> {
        Ok(self.store.bulk_upsert_justifications(justifications).await?)
    }

    async fn close_justifications(&self, entity_ids: &[String]) -> Result<usize, PipelineError> {
        Ok(self.store.close_justifications(entity_ids).await?)
    }

    async fn store_features(
        &self,
        repo_id: &str,
        features: &[crate::models::FeatureAggregation],
    ) -> Result<(), PipelineError> {
        Ok(self.store.bulk_upsert_feature_aggregations(repo_id, features).await?)
    }

    async fn append_drift(&self, scores: &[DriftScore]) -> Result<(), PipelineError> {
        Ok(self.store.append_drift_scores(scores).await?)
    }

    async fn repair(&self, diff: &EntityDiff) -> Result<EdgeRepairResult, PipelineError> {
        Ok(repair_edges(diff, self.store.as_ref()).await?)
    }

    async fn edges_for(&self, entity_ids: &[String]) -> Result<Vec<Edge>, PipelineError> {
        Ok(self.store.get_edges_for_entities(entity_ids).await?)
    }

    async fn subgraphs(
        &self,
        entity_ids: &[String],
        depth: usize,
    ) -> Result<HashMap<String, Subgraph>, PipelineError> {
        Ok(self.store.get_batch_subgraphs(entity_ids, depth).await?)
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, PipelineError> {
        Ok(self.embedder.embed(texts).await?)
    }
}

/// Scope of a run, taken from its first entity.
fn scope_of<'a>(mut entities: impl Iterator<Item = &'a Entity>) -> (String, String) {
    entities
        .next()
        .map(|e| (e.org_id.clone(), e.repo_id.clone()))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_of_empty() {
        assert_eq!(scope_of(std::iter::empty()), (String::new(), String::new()));
    }
}
