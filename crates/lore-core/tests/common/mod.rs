//! Shared fixtures: scripted LLM, deterministic embedder, flaky store.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use lore_core::config::Config;
use lore_core::llm::{Embedder, LLMError, LLM};
use lore_core::models::{DriftScore, Edge, EdgeKind, Entity, EntityKind, FeatureAggregation, Justification};
use lore_core::pipeline::{ActivityPolicy, Pipeline, PipelineRun};
use lore_core::store::{GraphStore, GraphStoreError, InMemoryGraphStore, Subgraph};

/// LLM that answers every prompt with a well-formed justification for each
/// `- id:` line it contains, unless a scripted reply is queued.
#[derive(Default)]
pub struct MockLLM {
    scripted: Mutex<VecDeque<Result<String, String>>>,
    fixed: Option<String>,
    prompts: Mutex<Vec<String>>,
    models: Mutex<Vec<String>>,
}

impl MockLLM {
    pub fn new() -> Self {
        Self::default()
    }

    /// Always reply with `response`.
    pub fn always(response: impl Into<String>) -> Self {
        Self {
            fixed: Some(response.into()),
            ..Self::default()
        }
    }

    /// Queue a reply for the next call.
    pub fn push_response(&self, response: impl Into<String>) {
        self.scripted.lock().unwrap().push_back(Ok(response.into()));
    }

    /// Queue a failure for the next call.
    pub fn push_error(&self, message: impl Into<String>) {
        self.scripted.lock().unwrap().push_back(Err(message.into()));
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    pub fn models(&self) -> Vec<String> {
        self.models.lock().unwrap().clone()
    }

    /// Ids of every entity ever sent, in call order.
    pub fn prompted_ids(&self) -> Vec<String> {
        self.prompts().iter().flat_map(|p| ids_in_prompt(p)).collect()
    }
}

pub fn ids_in_prompt(prompt: &str) -> Vec<String> {
    prompt
        .lines()
        .filter_map(|line| line.strip_prefix("- id: "))
        .map(|id| id.trim().to_string())
        .collect()
}

/// A valid response covering the given ids.
pub fn justification_response(ids: &[String]) -> String {
    let items: Vec<String> = ids
        .iter()
        .map(|id| {
            format!(
                r#"{{"entity_id":"{id}","taxonomy":"VERTICAL","confidence":0.8,"business_purpose":"Calculates the order total shown to shoppers at checkout","domain_concepts":["Checkout","Order Total"],"feature_tag":"Order Checkout","semantic_triples":[{{"subject":"checkout","predicate":"computes","object":"order total"}}]}}"#
            )
        })
        .collect();
    format!("{{\"justifications\":[{}]}}", items.join(","))
}

#[async_trait]
impl LLM for MockLLM {
    async fn complete(&self, prompt: &str) -> Result<String, LLMError> {
        self.complete_with_system("", prompt).await
    }

    async fn complete_with_system(&self, _system: &str, prompt: &str) -> Result<String, LLMError> {
        self.prompts.lock().unwrap().push(prompt.to_string());

        if let Some(next) = self.scripted.lock().unwrap().pop_front() {
            return next.map_err(|message| LLMError::ApiError { status: 500, message });
        }
        if let Some(ref fixed) = self.fixed {
            return Ok(fixed.clone());
        }
        Ok(justification_response(&ids_in_prompt(prompt)))
    }

    async fn complete_with_model(&self, model: &str, system: &str, prompt: &str) -> Result<String, LLMError> {
        self.models.lock().unwrap().push(model.to_string());
        self.complete_with_system(system, prompt).await
    }

    fn model_name(&self) -> &str {
        "mock-model"
    }
}

/// Embedder returning scripted vectors per text, `[1, 0]` otherwise.
#[derive(Default)]
pub struct MockEmbedder {
    vectors: HashMap<String, Vec<f32>>,
    calls: AtomicU32,
    texts: Mutex<Vec<String>>,
    drop_last: bool,
}

impl MockEmbedder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_vector(mut self, text: impl Into<String>, vector: Vec<f32>) -> Self {
        self.vectors.insert(text.into(), vector);
        self
    }

    /// Answer every request with one vector too few.
    pub fn dropping_last(mut self) -> Self {
        self.drop_last = true;
        self
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Every text embedded so far, in request order.
    pub fn texts(&self) -> Vec<String> {
        self.texts.lock().unwrap().clone()
    }
}

#[async_trait]
impl Embedder for MockEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, LLMError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.texts.lock().unwrap().extend_from_slice(texts);
        let mut vectors: Vec<Vec<f32>> = texts
            .iter()
            .map(|t| self.vectors.get(t).cloned().unwrap_or_else(|| vec![1.0, 0.0]))
            .collect();
        if self.drop_last {
            vectors.pop();
        }
        Ok(vectors)
    }

    fn model_name(&self) -> &str {
        "mock-embedder"
    }
}

/// In-memory store whose first `failures` subgraph queries fail.
pub struct FlakyStore {
    pub inner: InMemoryGraphStore,
    failures: AtomicU32,
}

impl FlakyStore {
    pub fn new(inner: InMemoryGraphStore, failures: u32) -> Self {
        Self {
            inner,
            failures: AtomicU32::new(failures),
        }
    }
}

#[async_trait]
impl GraphStore for FlakyStore {
    async fn get_batch_subgraphs(
        &self,
        entity_ids: &[String],
        depth: usize,
    ) -> Result<HashMap<String, Subgraph>, GraphStoreError> {
        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures.store(remaining - 1, Ordering::SeqCst);
            return Err(GraphStoreError::Unavailable("connection reset".to_string()));
        }
        self.inner.get_batch_subgraphs(entity_ids, depth).await
    }

    async fn get_edges_for_entities(&self, entity_ids: &[String]) -> Result<Vec<Edge>, GraphStoreError> {
        self.inner.get_edges_for_entities(entity_ids).await
    }

    async fn find_broken_edges(&self, entity_ids: &[String]) -> Result<Vec<Edge>, GraphStoreError> {
        self.inner.find_broken_edges(entity_ids).await
    }

    async fn batch_delete_edges_by_entity(&self, entity_ids: &[String]) -> Result<usize, GraphStoreError> {
        self.inner.batch_delete_edges_by_entity(entity_ids).await
    }

    async fn delete_edges(&self, edge_ids: &[String]) -> Result<usize, GraphStoreError> {
        self.inner.delete_edges(edge_ids).await
    }

    async fn get_current_justifications(
        &self,
        entity_ids: &[String],
    ) -> Result<HashMap<String, Justification>, GraphStoreError> {
        self.inner.get_current_justifications(entity_ids).await
    }

    async fn list_current_justifications(&self, repo_id: &str) -> Result<Vec<Justification>, GraphStoreError> {
        self.inner.list_current_justifications(repo_id).await
    }

    async fn bulk_upsert_justifications(&self, justifications: &[Justification]) -> Result<usize, GraphStoreError> {
        self.inner.bulk_upsert_justifications(justifications).await
    }

    async fn close_justifications(&self, entity_ids: &[String]) -> Result<usize, GraphStoreError> {
        self.inner.close_justifications(entity_ids).await
    }

    async fn bulk_upsert_feature_aggregations(
        &self,
        repo_id: &str,
        aggregations: &[FeatureAggregation],
    ) -> Result<(), GraphStoreError> {
        self.inner.bulk_upsert_feature_aggregations(repo_id, aggregations).await
    }

    async fn append_drift_scores(&self, scores: &[DriftScore]) -> Result<(), GraphStoreError> {
        self.inner.append_drift_scores(scores).await
    }

    async fn save_run(&self, run: &PipelineRun) -> Result<(), GraphStoreError> {
        self.inner.save_run(run).await
    }
}

pub fn function(name: &str) -> Entity {
    function_with_body(name, &format!("fn {name}(total: u32) -> u32 {{ total }}"))
}

pub fn function_with_body(name: &str, body: &str) -> Entity {
    Entity::new("org", "shop", EntityKind::Function, name, "src/checkout.rs").with_body(body)
}

pub fn calls(from: &Entity, to: &Entity) -> Edge {
    Edge::new(&from.id, &to.id, EdgeKind::Calls)
}

/// Activity policy without timeouts or backoff worth waiting for.
pub fn fast_policy(max_attempts: u32) -> ActivityPolicy {
    ActivityPolicy {
        max_attempts,
        timeout: std::time::Duration::from_secs(30),
        initial_backoff: std::time::Duration::from_millis(1),
    }
}

pub fn pipeline(store: Arc<dyn GraphStore>, llm: Arc<MockLLM>, embedder: Arc<MockEmbedder>) -> Pipeline {
    Pipeline::new(store, llm, embedder, Config::default()).with_activity_policy(fast_policy(1))
}
