mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{calls, fast_policy, function, function_with_body, pipeline, FlakyStore, MockEmbedder, MockLLM};
use lore_core::config::Config;
use lore_core::llm::LLMError;
use lore_core::store::GraphStore;
use lore_core::models::{DriftCategory, Edge, EdgeKind, Entity, EntityDiff, EntityKind, Taxonomy, UpdatedEntity};
use lore_core::pipeline::{Pipeline, PipelineError, RunKind, RunStatus};
use lore_core::store::InMemoryGraphStore;

async fn checkout_graph() -> (Vec<Entity>, Vec<Edge>, Arc<InMemoryGraphStore>) {
    let checkout = function("checkout");
    let price = function("price_cart");
    let tax = function("apply_tax");
    let edges = vec![calls(&checkout, &price), calls(&price, &tax)];
    let entities = vec![checkout, price, tax];
    let store = Arc::new(InMemoryGraphStore::with_graph(entities.clone(), edges.clone()).await);
    (entities, edges, store)
}

#[tokio::test]
async fn test_chain_is_justified_callees_first() {
    let (entities, edges, store) = checkout_graph().await;
    let llm = Arc::new(MockLLM::new());
    let pipeline = pipeline(store.clone(), llm.clone(), Arc::new(MockEmbedder::new()));

    let run = pipeline.justify_entities(entities.clone(), &edges).await.unwrap();

    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.kind, RunKind::Full);
    assert_eq!(run.stats.levels, 3);
    assert_eq!(run.stats.justified, 3);
    assert_eq!(run.stats.llm_calls, 3);

    let order = llm.prompted_ids();
    assert_eq!(order, vec![entities[2].id.clone(), entities[1].id.clone(), entities[0].id.clone()]);

    // price_cart's prompt quotes the stored purpose of apply_tax
    let prompts = llm.prompts();
    assert!(prompts[1].contains("Callee purposes:"));
    assert!(prompts[1].contains("- apply_tax: Calculates the order total shown to shoppers at checkout [order_checkout]"));

    let stored = store.get_run(&run.id).await.unwrap();
    assert_eq!(stored.status, RunStatus::Completed);
}

#[tokio::test]
async fn test_justifications_are_normalized_and_scored() {
    let (entities, edges, store) = checkout_graph().await;
    let pipeline = pipeline(store.clone(), Arc::new(MockLLM::new()), Arc::new(MockEmbedder::new()));

    pipeline.justify_entities(entities.clone(), &edges).await.unwrap();

    let history = store.justification_history(&entities[0].id).await;
    assert_eq!(history.len(), 1);
    let j = &history[0];
    assert_eq!(j.feature_tag, "order_checkout");
    assert_eq!(j.domain_concepts, vec!["checkout", "order total"]);
    assert_eq!(j.quality_score, Some(1.0));
    assert!(!j.model_tier.is_empty());
    assert!(j.model_used.is_some());
}

#[tokio::test]
async fn test_feature_rollup_after_run() {
    let (entities, edges, store) = checkout_graph().await;
    let pipeline = pipeline(store.clone(), Arc::new(MockLLM::new()), Arc::new(MockEmbedder::new()));

    let run = pipeline.justify_entities(entities, &edges).await.unwrap();

    let features = store.feature_aggregations("shop").await;
    assert_eq!(run.stats.features, 1);
    assert_eq!(features.len(), 1);
    assert_eq!(features[0].feature_tag, "order_checkout");
    assert_eq!(features[0].entity_count, 3);
    assert!((features[0].average_confidence - 0.8).abs() < 1e-9);
}

#[tokio::test]
async fn test_rerun_keeps_one_current_row() {
    let (entities, edges, store) = checkout_graph().await;
    let pipeline = pipeline(store.clone(), Arc::new(MockLLM::new()), Arc::new(MockEmbedder::new()));

    pipeline.justify_entities(entities.clone(), &edges).await.unwrap();
    pipeline.justify_entities(entities.clone(), &edges).await.unwrap();

    for entity in &entities {
        let history = store.justification_history(&entity.id).await;
        assert_eq!(history.len(), 2);
        assert_eq!(history.iter().filter(|j| j.is_current()).count(), 1);
    }
}

#[tokio::test(start_paused = true)]
async fn test_rate_limit_wait_does_not_time_out_batches() {
    let price = function("price_cart");
    let tax = function("apply_tax");
    let edges = vec![calls(&price, &tax)];
    let entities = vec![price, tax];
    let store = Arc::new(InMemoryGraphStore::with_graph(entities.clone(), edges.clone()).await);

    let mut config = Config::default();
    config.rate_limit.requests_per_minute = 1;
    let llm = Arc::new(MockLLM::new());
    let pipeline = Pipeline::new(store.clone(), llm.clone(), Arc::new(MockEmbedder::new()), config)
        .with_activity_policy(fast_policy(1));

    let start = tokio::time::Instant::now();
    let run = pipeline.justify_entities(entities, &edges).await.unwrap();

    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.stats.llm_calls, 2);
    assert_eq!(llm.calls(), 2);
    assert!(start.elapsed() >= Duration::from_secs(60));
}

#[tokio::test]
async fn test_malformed_response_fails_run_and_stores_nothing() {
    let (entities, edges, store) = checkout_graph().await;
    let llm = Arc::new(MockLLM::always("I could not decide, sorry."));
    let pipeline = pipeline(store.clone(), llm, Arc::new(MockEmbedder::new()));

    let err = pipeline.justify_entities(entities.clone(), &edges).await.unwrap_err();
    assert!(matches!(err, PipelineError::ActivityExhausted { ref activity, .. } if activity == "justify_batch"));

    let runs = store.runs().await;
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].status, RunStatus::Failed);
    assert_eq!(runs[0].last_error.as_deref(), Some(err.to_string().as_str()));

    for entity in &entities {
        assert!(store.justification_history(&entity.id).await.is_empty());
    }
}

#[tokio::test]
async fn test_missing_entity_in_response_is_retried() {
    let (entities, edges, store) = checkout_graph().await;
    let llm = Arc::new(MockLLM::new());
    llm.push_response(r#"{"justifications":[]}"#);
    let pipeline = Pipeline::new(store.clone(), llm.clone(), Arc::new(MockEmbedder::new()), Config::default())
        .with_activity_policy(fast_policy(2));

    let run = pipeline.justify_entities(entities, &edges).await.unwrap();
    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.stats.llm_calls, 4);
    assert_eq!(llm.calls(), 4);
}

#[tokio::test]
async fn test_graph_query_failure_is_retried_then_surfaces() {
    let (entities, edges, _) = checkout_graph().await;

    let store = Arc::new(FlakyStore::new(
        InMemoryGraphStore::with_graph(entities.clone(), edges.clone()).await,
        1,
    ));
    let pipeline = Pipeline::new(store.clone(), Arc::new(MockLLM::new()), Arc::new(MockEmbedder::new()), Config::default())
        .with_activity_policy(fast_policy(2));
    let run = pipeline.justify_entities(entities.clone(), &edges).await.unwrap();
    assert_eq!(run.status, RunStatus::Completed);

    let store = Arc::new(FlakyStore::new(
        InMemoryGraphStore::with_graph(entities.clone(), edges.clone()).await,
        5,
    ));
    let pipeline = Pipeline::new(store.clone(), Arc::new(MockLLM::new()), Arc::new(MockEmbedder::new()), Config::default())
        .with_activity_policy(fast_policy(2));
    let err = pipeline.justify_entities(entities, &edges).await.unwrap_err();
    assert!(err.to_string().contains("connection reset"));
    assert_eq!(store.inner.runs().await[0].status, RunStatus::Failed);
}

#[tokio::test]
async fn test_cosmetic_update_is_skipped() {
    let (entities, _, store) = checkout_graph().await;
    let before = entities[1].clone();
    let after = function_with_body(
        "price_cart",
        "fn price_cart(total: u32) -> u32 {\n    // unchanged\n    total\n}",
    );
    assert_eq!(before.id, after.id);
    store.upsert_entities(vec![after.clone()]).await;

    let llm = Arc::new(MockLLM::new());
    let embedder = Arc::new(MockEmbedder::new());
    let pipeline = pipeline(store.clone(), llm.clone(), embedder.clone());

    let diff = EntityDiff {
        updated: vec![UpdatedEntity::new(before, after)],
        ..Default::default()
    };
    let run = pipeline.apply_diff(&diff).await.unwrap();

    assert_eq!(run.kind, RunKind::Incremental);
    assert_eq!(run.stats.cosmetic_skipped, 1);
    assert_eq!(run.stats.drift_scored, 0);
    assert_eq!(llm.calls(), 0);
    assert_eq!(embedder.calls(), 0);
    assert!(store.drift_history().await.is_empty());
}

#[tokio::test]
async fn test_intent_drift_cascades_to_callers_only() {
    let (mut entities, mut edges, store) = checkout_graph().await;
    let cart_view = function("cart_view");
    edges.push(Edge::new(&cart_view.id, &entities[1].id, EdgeKind::Imports));
    entities.push(cart_view.clone());
    store.upsert_entities(vec![cart_view.clone()]).await;
    store.upsert_edges(edges.clone()).await;

    let before = entities[1].clone();
    let new_body = "fn price_cart(total: u32) -> u32 { total * 2 }";
    let after = function_with_body("price_cart", new_body);
    store.upsert_entities(vec![after.clone()]).await;

    let old_body = before.body.clone().unwrap();
    let embedder = Arc::new(
        MockEmbedder::new()
            .with_vector(old_body, vec![1.0, 0.0])
            .with_vector(new_body, vec![0.0, 1.0]),
    );
    let llm = Arc::new(MockLLM::new());
    let pipeline = pipeline(store.clone(), llm.clone(), embedder.clone());

    let diff = EntityDiff {
        updated: vec![UpdatedEntity::new(before, after.clone())],
        ..Default::default()
    };
    let run = pipeline.apply_diff(&diff).await.unwrap();

    assert_eq!(run.stats.drift_scored, 1);
    assert_eq!(run.stats.cascaded, 1);
    assert_eq!(embedder.calls(), 1);

    let drift = store.drift_history().await;
    assert_eq!(drift.len(), 1);
    assert_eq!(drift[0].category, DriftCategory::IntentDrift);
    assert_eq!(drift[0].embedding_similarity, 0.0);

    let mut prompted = llm.prompted_ids();
    prompted.sort();
    let mut expected = vec![after.id.clone(), entities[0].id.clone()];
    expected.sort();
    assert_eq!(prompted, expected);
    assert!(!prompted.contains(&cart_view.id));
    assert!(!prompted.contains(&entities[2].id));
}

#[tokio::test]
async fn test_update_gaining_a_body_is_not_embedded() {
    let (entities, _, store) = checkout_graph().await;
    let before = Entity::new("org", "shop", EntityKind::Function, "price_cart", "src/checkout.rs");
    let after = entities[1].clone();
    assert_eq!(before.id, after.id);
    assert!(before.body.is_none());

    let embedder = Arc::new(MockEmbedder::new());
    let pipeline = pipeline(store.clone(), Arc::new(MockLLM::new()), embedder.clone());
    let diff = EntityDiff {
        updated: vec![UpdatedEntity::new(before, after.clone())],
        ..Default::default()
    };
    let run = pipeline.apply_diff(&diff).await.unwrap();

    assert_eq!(embedder.calls(), 0);
    assert!(embedder.texts().is_empty());
    assert_eq!(run.stats.drift_scored, 1);

    let drift = store.drift_history().await;
    assert_eq!(drift[0].entity_id, after.id);
    assert_eq!(drift[0].category, DriftCategory::IntentDrift);
    assert_eq!(drift[0].embedding_similarity, 0.0);
}

#[tokio::test]
async fn test_short_embedding_response_fails_run() {
    let (entities, _, store) = checkout_graph().await;
    let before = entities[1].clone();
    let after = function_with_body("price_cart", "fn price_cart(total: u32) -> u32 { total * 2 }");
    store.upsert_entities(vec![after.clone()]).await;

    let embedder = Arc::new(MockEmbedder::new().dropping_last());
    let llm = Arc::new(MockLLM::new());
    let pipeline = pipeline(store.clone(), llm.clone(), embedder.clone());
    let diff = EntityDiff {
        updated: vec![UpdatedEntity::new(before.clone(), after)],
        ..Default::default()
    };
    let err = pipeline.apply_diff(&diff).await.unwrap_err();

    assert!(matches!(err, PipelineError::LLM(LLMError::Embedding(_))));
    assert_eq!(embedder.texts(), vec![before.body.clone().unwrap(), "fn price_cart(total: u32) -> u32 { total * 2 }".to_string()]);
    assert!(store.drift_history().await.is_empty());
    assert_eq!(llm.calls(), 0);
    assert_eq!(store.runs().await[0].status, RunStatus::Failed);
}

#[tokio::test]
async fn test_refactor_drift_does_not_cascade() {
    let (entities, _, store) = checkout_graph().await;
    let before = entities[1].clone();
    let new_body = "fn price_cart(total: u32) -> u32 { let t = total; t }";
    let after = function_with_body("price_cart", new_body);
    store.upsert_entities(vec![after.clone()]).await;

    let old_body = before.body.clone().unwrap();
    let embedder = Arc::new(
        MockEmbedder::new()
            .with_vector(old_body, vec![1.0, 0.0])
            .with_vector(new_body, vec![0.85, 0.526_782_7]),
    );
    let llm = Arc::new(MockLLM::new());
    let pipeline = pipeline(store.clone(), llm.clone(), embedder);

    let diff = EntityDiff {
        updated: vec![UpdatedEntity::new(before, after.clone())],
        ..Default::default()
    };
    let run = pipeline.apply_diff(&diff).await.unwrap();

    assert_eq!(store.drift_history().await[0].category, DriftCategory::Refactor);
    assert_eq!(run.stats.cascaded, 0);
    assert_eq!(llm.prompted_ids(), vec![after.id]);
}

#[tokio::test]
async fn test_moved_entity_inherits_justification() {
    let (entities, edges, store) = checkout_graph().await;
    let pipeline = pipeline(store.clone(), Arc::new(MockLLM::new()), Arc::new(MockEmbedder::new()));
    pipeline.justify_entities(entities.clone(), &edges).await.unwrap();

    let old = entities[2].clone();
    let moved = Entity::new("org", "shop", EntityKind::Function, "apply_tax", "src/tax.rs")
        .with_body(old.body.clone().unwrap());
    assert_ne!(old.id, moved.id);
    store.remove_entities(&[old.id.clone()]).await;
    store.upsert_entities(vec![moved.clone()]).await;

    let llm = Arc::new(MockLLM::new());
    let pipeline = common::pipeline(store.clone(), llm.clone(), Arc::new(MockEmbedder::new()));
    let diff = EntityDiff {
        added: vec![moved.clone()],
        deleted: vec![old.clone()],
        ..Default::default()
    };
    let run = pipeline.apply_diff(&diff).await.unwrap();

    assert_eq!(run.stats.moves, 1);
    assert_eq!(run.stats.edges_deleted, 1);
    assert_eq!(llm.calls(), 0);

    let old_history = store.justification_history(&old.id).await;
    let history = store.justification_history(&moved.id).await;
    assert_eq!(history.len(), 1);
    assert!(history[0].is_current());
    assert_eq!(history[0].business_purpose, old_history[0].business_purpose);
    assert_ne!(history[0].id, old_history[0].id);

    // the source row is closed and the rollup rebuilt even though nothing was justified
    assert_eq!(old_history.len(), 1);
    assert!(!old_history[0].is_current());
    assert_eq!(store.list_current_justifications("shop").await.unwrap().len(), 3);
    assert_eq!(run.stats.features, 1);
    assert_eq!(store.feature_aggregations("shop").await[0].entity_count, 3);
}

#[tokio::test]
async fn test_deleted_entity_leaves_current_set_and_rollup() {
    let (entities, edges, store) = checkout_graph().await;
    let pipeline = pipeline(store.clone(), Arc::new(MockLLM::new()), Arc::new(MockEmbedder::new()));
    pipeline.justify_entities(entities.clone(), &edges).await.unwrap();

    let tax = entities[2].clone();
    let refund = function("refund");
    store.remove_entities(&[tax.id.clone()]).await;
    store.upsert_entities(vec![refund.clone()]).await;

    let diff = EntityDiff {
        added: vec![refund.clone()],
        deleted: vec![tax.clone()],
        ..Default::default()
    };
    let run = pipeline.apply_diff(&diff).await.unwrap();
    assert_eq!(run.stats.moves, 0);

    let current = store.get_current_justifications(&[tax.id.clone()]).await.unwrap();
    assert!(current.is_empty());
    assert_eq!(store.justification_history(&tax.id).await.len(), 1);

    let mut ids: Vec<String> = store
        .list_current_justifications("shop")
        .await
        .unwrap()
        .into_iter()
        .map(|j| j.entity_id)
        .collect();
    ids.sort();
    let mut expected = vec![entities[0].id.clone(), entities[1].id.clone(), refund.id.clone()];
    expected.sort();
    assert_eq!(ids, expected);

    let features = store.feature_aggregations("shop").await;
    assert_eq!(features.len(), 1);
    assert_eq!(features[0].entity_count, 3);
}

#[tokio::test]
async fn test_added_entity_is_justified() {
    let (_, _, store) = checkout_graph().await;
    let refund = function("refund");
    store.upsert_entities(vec![refund.clone()]).await;

    let llm = Arc::new(MockLLM::new());
    let pipeline = pipeline(store.clone(), llm.clone(), Arc::new(MockEmbedder::new()));
    let diff = EntityDiff {
        added: vec![refund.clone()],
        ..Default::default()
    };
    let run = pipeline.apply_diff(&diff).await.unwrap();

    assert_eq!(run.stats.justified, 1);
    assert_eq!(llm.prompted_ids(), vec![refund.id.clone()]);
    assert_eq!(store.justification_history(&refund.id).await.len(), 1);
}

#[tokio::test]
async fn test_human_override_closes_previous_row() {
    let (entities, edges, store) = checkout_graph().await;
    let pipeline = pipeline(store.clone(), Arc::new(MockLLM::new()), Arc::new(MockEmbedder::new()));
    pipeline.justify_entities(entities.clone(), &edges).await.unwrap();

    let j = pipeline
        .override_justification(
            &entities[0],
            Taxonomy::Vertical,
            "Entry point that turns a shopping cart into a placed order",
            "Order Placement",
            vec!["Order".to_string()],
        )
        .await
        .unwrap();

    assert_eq!(j.model_tier, "human");
    assert_eq!(j.feature_tag, "order_placement");

    let history = store.justification_history(&entities[0].id).await;
    assert_eq!(history.len(), 2);
    let current: Vec<_> = history.iter().filter(|j| j.is_current()).collect();
    assert_eq!(current.len(), 1);
    assert_eq!(current[0].model_tier, "human");
}

#[tokio::test]
async fn test_empty_run_completes() {
    let store = Arc::new(InMemoryGraphStore::new());
    let llm = Arc::new(MockLLM::new());
    let pipeline = pipeline(store.clone(), llm.clone(), Arc::new(MockEmbedder::new()));

    let run = pipeline.apply_diff(&EntityDiff::default()).await.unwrap();
    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(llm.calls(), 0);
}
