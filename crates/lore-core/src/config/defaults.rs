//! Default values for Lore configuration.
//!
//! All hardcoded defaults are centralized here for easy maintenance.

// ============================================================================
// LLM Defaults
// ============================================================================

/// Default LLM provider.
pub const DEFAULT_LLM_PROVIDER: &str = "openai";

/// Default max tokens for LLM responses.
pub const DEFAULT_MAX_TOKENS: u32 = 4096;

// OpenAI defaults
/// Default OpenAI API URL.
pub const DEFAULT_OPENAI_URL: &str = "https://api.openai.com/v1";
/// Default OpenAI model.
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o";

// Anthropic defaults
/// Default Anthropic API URL.
pub const DEFAULT_ANTHROPIC_URL: &str = "https://api.anthropic.com/v1/messages";
/// Default Anthropic model.
pub const DEFAULT_ANTHROPIC_MODEL: &str = "claude-sonnet-4-20250514";
/// Default Anthropic API version.
pub const DEFAULT_ANTHROPIC_API_VERSION: &str = "2023-06-01";

// Ollama defaults
/// Default Ollama API URL.
pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434/v1";
/// Default Ollama model.
pub const DEFAULT_OLLAMA_MODEL: &str = "llama3";

// OpenRouter defaults
/// Default OpenRouter API URL.
pub const DEFAULT_OPENROUTER_URL: &str = "https://openrouter.ai/api/v1";

// ============================================================================
// Model Tier Defaults
// ============================================================================

/// Bodies longer than this many lines go to the premium tier.
pub const DEFAULT_PREMIUM_BODY_LINES: usize = 80;

/// Entities at or above this PageRank percentile go to the premium tier.
pub const DEFAULT_PREMIUM_PAGERANK_PERCENTILE: f64 = 0.9;

// ============================================================================
// Embedding Defaults
// ============================================================================

/// Default embedding provider: "openai" (any compatible endpoint) or "local".
pub const DEFAULT_EMBEDDING_PROVIDER: &str = "openai";

/// Default remote embedding model.
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";

// ============================================================================
// Batching Defaults
// ============================================================================

/// Input token budget of one justification call.
pub const DEFAULT_MAX_INPUT_TOKENS: usize = 7000;

/// Maximum entities in one batch.
pub const DEFAULT_MAX_ENTITIES_PER_BATCH: usize = 15;

/// Estimated size of the system prompt.
pub const DEFAULT_SYSTEM_PROMPT_TOKENS: usize = 500;

/// Output allowance reserved per entity.
pub const DEFAULT_OUTPUT_TOKENS_PER_ENTITY: usize = 150;

// ============================================================================
// Context Defaults
// ============================================================================

/// Neighbourhood depth of graph context queries.
pub const DEFAULT_SUBGRAPH_DEPTH: usize = 2;

/// Neighbour names shown per direction in a context summary.
pub const DEFAULT_SUMMARY_NAMES: usize = 3;

/// Body lines rendered into a justification prompt.
pub const DEFAULT_PROMPT_BODY_LINES: usize = 60;

// ============================================================================
// Community Defaults
// ============================================================================

/// Smallest community that is kept.
pub const DEFAULT_MIN_COMMUNITY_SIZE: usize = 3;

/// Member names shown in a community label.
pub const DEFAULT_LABEL_MEMBERS: usize = 5;

/// Local-moving sweeps per Louvain level.
pub const DEFAULT_LOUVAIN_MAX_PASSES: usize = 100;

// ============================================================================
// Drift Defaults
// ============================================================================

/// Similarity above which a change is cosmetic.
pub const DEFAULT_COSMETIC_THRESHOLD: f64 = 0.95;

/// Similarity above which a change is a refactor.
pub const DEFAULT_REFACTOR_THRESHOLD: f64 = 0.8;

// ============================================================================
// Rate Limit Defaults
// ============================================================================

/// Requests admitted per sliding minute.
pub const DEFAULT_REQUESTS_PER_MINUTE: u32 = 500;

/// Tokens admitted per sliding minute.
pub const DEFAULT_TOKENS_PER_MINUTE: u64 = 200_000;

// ============================================================================
// Pipeline Defaults
// ============================================================================

/// Callers re-justified per drifted entity.
pub const DEFAULT_MAX_CASCADE_CALLERS: usize = 50;

/// Timeout of a single activity attempt, in seconds.
pub const DEFAULT_ACTIVITY_TIMEOUT_SECS: u64 = 300;

/// Attempts per activity before the run fails.
pub const DEFAULT_ACTIVITY_MAX_ATTEMPTS: u32 = 3;

/// Backoff before the first retry, doubled on each further retry.
pub const DEFAULT_INITIAL_BACKOFF_MS: u64 = 1000;

// ============================================================================
// System Prompts
// ============================================================================

/// Default system prompt for justification calls.
pub const DEFAULT_JUSTIFICATION_SYSTEM_PROMPT: &str = r#"You are a senior engineer annotating a codebase's knowledge graph.

For every entity you are given, explain the business purpose it serves and classify it:
- VERTICAL: implements a user-facing business feature (checkout, onboarding, billing).
- HORIZONTAL: cross-cutting infrastructure shared by many features (auth, logging, persistence).
- UTILITY: generic helpers with no business meaning of their own (string formatting, math).

Use the graph context and the justifications of callees to ground your answer. Describe
what the entity achieves for the product, not how its code reads.

IMPORTANT: Output valid JSON matching this exact structure:
{
  "justifications": [
    {
      "entity_id": "the id given for the entity",
      "taxonomy": "VERTICAL | HORIZONTAL | UTILITY",
      "confidence": 0.0,
      "business_purpose": "One or two sentences on the business purpose",
      "domain_concepts": ["invoice", "payment method"],
      "feature_tag": "billing",
      "semantic_triples": [
        {"subject": "charge_card", "predicate": "charges", "object": "payment method"}
      ],
      "compliance_tags": ["PCI"]
    }
  ]
}

Return exactly one entry per entity id. Only output the JSON, no additional text."#;
