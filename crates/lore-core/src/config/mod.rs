//! Configuration management for Lore.
//!
//! Configuration is loaded from multiple sources with the following priority:
//! 1. Environment variables (highest priority)
//! 2. Project-local `lore.toml` file
//! 3. User config `~/.config/lore/config.toml`
//! 4. Built-in defaults (lowest priority)

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

mod defaults;

pub use defaults::*;

use crate::justification::ModelTier;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// LLM provider configuration.
    pub llm: LLMConfig,

    /// Embedding provider configuration.
    pub embedding: EmbeddingConfig,

    /// Token-budget batching.
    pub batching: BatchingConfig,

    /// Graph context extraction.
    pub context: ContextConfig,

    /// Community detection.
    pub community: CommunityConfig,

    /// Drift classification thresholds.
    pub drift: DriftConfig,

    /// Provider rate limits.
    pub rate_limit: RateLimitConfig,

    /// Pipeline orchestration.
    pub pipeline: PipelineConfig,
}

impl Config {
    /// Load configuration from default locations.
    ///
    /// Searches for config in order:
    /// 1. `./lore.toml` (project local)
    /// 2. `~/.config/lore/config.toml` (user config)
    /// 3. Falls back to defaults
    ///
    /// Environment overrides apply in every case.
    pub fn load() -> Result<Self, ConfigError> {
        if Path::new("lore.toml").exists() {
            return Self::from_file("lore.toml");
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("lore").join("config.toml");
            if user_config.exists() {
                return Self::from_file(&user_config);
            }
        }

        let mut config = Self::default();
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&content)?;

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Apply environment variable overrides.
    fn apply_env_overrides(&mut self) {
        // LLM overrides
        if let Ok(provider) = std::env::var("LORE_LLM_PROVIDER") {
            self.llm.provider = provider;
        }
        if let Ok(model) = std::env::var("LORE_LLM_MODEL") {
            self.llm.model = Some(model);
        }
        if let Ok(url) = std::env::var("LORE_LLM_BASE_URL") {
            self.llm.base_url = Some(url);
        }
        if let Ok(key) = std::env::var("LORE_LLM_API_KEY") {
            self.llm.api_key = Some(key);
        }
        if let Ok(tokens) = std::env::var("LORE_LLM_MAX_TOKENS") {
            if let Ok(n) = tokens.parse() {
                self.llm.max_tokens = n;
            }
        }

        // Batching overrides
        if let Ok(tokens) = std::env::var("LORE_MAX_INPUT_TOKENS") {
            if let Ok(n) = tokens.parse() {
                self.batching.max_input_tokens = n;
            }
        }

        // Rate limit overrides
        if let Ok(rpm) = std::env::var("LORE_RPM") {
            if let Ok(n) = rpm.parse() {
                self.rate_limit.requests_per_minute = n;
            }
        }
        if let Ok(tpm) = std::env::var("LORE_TPM") {
            if let Ok(n) = tpm.parse() {
                self.rate_limit.tokens_per_minute = n;
            }
        }
    }

    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batching.max_entities_per_batch == 0 {
            return Err(ConfigError::Invalid(
                "batching.max_entities_per_batch must be at least 1".to_string(),
            ));
        }
        if self.rate_limit.requests_per_minute == 0 || self.rate_limit.tokens_per_minute == 0 {
            return Err(ConfigError::Invalid(
                "rate_limit values must be greater than 0".to_string(),
            ));
        }
        if self.drift.refactor_threshold > self.drift.cosmetic_threshold {
            return Err(ConfigError::Invalid(
                "drift.refactor_threshold must not exceed drift.cosmetic_threshold".to_string(),
            ));
        }
        if self.pipeline.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "pipeline.max_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Create a default config file content as a string.
    pub fn default_config_string() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

/// LLM provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LLMConfig {
    /// Provider name: "openai", "anthropic", "ollama", or "openrouter".
    pub provider: String,

    /// Model name (provider-specific). Used for tiers without an explicit model.
    pub model: Option<String>,

    /// Base URL for API (for openai-compatible providers).
    pub base_url: Option<String>,

    /// API key (can also be set via environment variable).
    #[serde(skip_serializing)]
    pub api_key: Option<String>,

    /// Maximum tokens for response.
    pub max_tokens: u32,

    /// API version (for Anthropic).
    pub api_version: Option<String>,

    /// Model per tier and tier routing thresholds.
    pub tiers: TierConfig,
}

impl Default for LLMConfig {
    fn default() -> Self {
        Self {
            provider: DEFAULT_LLM_PROVIDER.to_string(),
            model: None, // Use provider default
            base_url: None, // Use provider default
            api_key: None, // Load from env
            max_tokens: DEFAULT_MAX_TOKENS,
            api_version: Some(DEFAULT_ANTHROPIC_API_VERSION.to_string()),
            tiers: TierConfig::default(),
        }
    }
}

impl LLMConfig {
    /// Get the model name, falling back to provider defaults.
    pub fn model_or_default(&self) -> String {
        self.model.clone().unwrap_or_else(|| {
            match self.provider.as_str() {
                "anthropic" | "claude" => DEFAULT_ANTHROPIC_MODEL.to_string(),
                "ollama" => DEFAULT_OLLAMA_MODEL.to_string(),
                _ => DEFAULT_OPENAI_MODEL.to_string(),
            }
        })
    }

    /// Model used for a tier, falling back to the provider model.
    pub fn model_for_tier(&self, tier: ModelTier) -> String {
        let configured = match tier {
            ModelTier::Fast => &self.tiers.fast,
            ModelTier::Standard => &self.tiers.standard,
            ModelTier::Premium => &self.tiers.premium,
        };
        configured.clone().unwrap_or_else(|| self.model_or_default())
    }

    /// Get the base URL, falling back to provider defaults.
    pub fn base_url_or_default(&self) -> String {
        self.base_url.clone().unwrap_or_else(|| {
            match self.provider.as_str() {
                "anthropic" | "claude" => DEFAULT_ANTHROPIC_URL.to_string(),
                "ollama" => DEFAULT_OLLAMA_URL.to_string(),
                "openrouter" => DEFAULT_OPENROUTER_URL.to_string(),
                _ => DEFAULT_OPENAI_URL.to_string(),
            }
        })
    }

    /// Get API key from config or environment.
    pub fn api_key_or_env(&self) -> Option<String> {
        self.api_key.clone()
            .or_else(|| std::env::var("LORE_LLM_API_KEY").ok())
            .or_else(|| match self.provider.as_str() {
                "anthropic" | "claude" => std::env::var("ANTHROPIC_API_KEY").ok(),
                "openrouter" => std::env::var("OPENROUTER_API_KEY").ok(),
                _ => std::env::var("OPENAI_API_KEY").ok(),
            })
    }
}

/// Model names per tier and the thresholds that route entities to premium.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TierConfig {
    pub fast: Option<String>,
    pub standard: Option<String>,
    pub premium: Option<String>,

    /// Bodies longer than this go to premium.
    pub premium_body_lines: usize,

    /// PageRank percentile at which entities go to premium.
    pub premium_pagerank_percentile: f64,
}

impl Default for TierConfig {
    fn default() -> Self {
        Self {
            fast: None,
            standard: None,
            premium: None,
            premium_body_lines: DEFAULT_PREMIUM_BODY_LINES,
            premium_pagerank_percentile: DEFAULT_PREMIUM_PAGERANK_PERCENTILE,
        }
    }
}

/// Embedding provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// "openai" for any OpenAI-compatible endpoint, or "local" for the
    /// bundled model (requires the `local-embeddings` feature).
    pub provider: String,

    pub model: String,

    /// Defaults to the LLM base URL.
    pub base_url: Option<String>,

    #[serde(skip_serializing)]
    pub api_key: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: DEFAULT_EMBEDDING_PROVIDER.to_string(),
            model: DEFAULT_EMBEDDING_MODEL.to_string(),
            base_url: None,
            api_key: None,
        }
    }
}

/// Token-budget batching configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchingConfig {
    pub max_input_tokens: usize,
    pub max_entities_per_batch: usize,
    pub system_prompt_tokens: usize,
    pub output_tokens_per_entity: usize,
}

impl Default for BatchingConfig {
    fn default() -> Self {
        Self {
            max_input_tokens: DEFAULT_MAX_INPUT_TOKENS,
            max_entities_per_batch: DEFAULT_MAX_ENTITIES_PER_BATCH,
            system_prompt_tokens: DEFAULT_SYSTEM_PROMPT_TOKENS,
            output_tokens_per_entity: DEFAULT_OUTPUT_TOKENS_PER_ENTITY,
        }
    }
}

/// Graph context configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    /// Hops fetched around each entity.
    pub subgraph_depth: usize,

    /// Neighbour names listed per direction in the summary.
    pub summary_names: usize,

    /// Body lines rendered into prompts.
    pub prompt_body_lines: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            subgraph_depth: DEFAULT_SUBGRAPH_DEPTH,
            summary_names: DEFAULT_SUMMARY_NAMES,
            prompt_body_lines: DEFAULT_PROMPT_BODY_LINES,
        }
    }
}

/// Community detection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CommunityConfig {
    /// Communities smaller than this are discarded.
    pub min_community_size: usize,

    /// Number of member names shown in a label.
    pub label_members: usize,

    /// Upper bound on local-moving sweeps per aggregation level.
    pub max_passes: usize,
}

impl Default for CommunityConfig {
    fn default() -> Self {
        Self {
            min_community_size: DEFAULT_MIN_COMMUNITY_SIZE,
            label_members: DEFAULT_LABEL_MEMBERS,
            max_passes: DEFAULT_LOUVAIN_MAX_PASSES,
        }
    }
}

/// Drift classification thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DriftConfig {
    pub cosmetic_threshold: f64,
    pub refactor_threshold: f64,
}

impl Default for DriftConfig {
    fn default() -> Self {
        Self {
            cosmetic_threshold: DEFAULT_COSMETIC_THRESHOLD,
            refactor_threshold: DEFAULT_REFACTOR_THRESHOLD,
        }
    }
}

/// Provider rate limits over a sliding minute.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub requests_per_minute: u32,
    pub tokens_per_minute: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: DEFAULT_REQUESTS_PER_MINUTE,
            tokens_per_minute: DEFAULT_TOKENS_PER_MINUTE,
        }
    }
}

/// Pipeline orchestration configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Compare updated bodies structurally instead of byte-wise.
    pub structural_comparison: bool,

    /// Callers re-justified per drifted entity.
    pub max_cascade_callers: usize,

    /// Timeout of one activity attempt, in seconds.
    pub activity_timeout_secs: u64,

    /// Attempts per activity before the run fails.
    pub max_attempts: u32,

    /// Backoff before the first retry, in milliseconds.
    pub initial_backoff_ms: u64,

    /// System prompt for justification calls.
    /// If not set, uses the built-in default.
    pub system_prompt: Option<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            structural_comparison: true,
            max_cascade_callers: DEFAULT_MAX_CASCADE_CALLERS,
            activity_timeout_secs: DEFAULT_ACTIVITY_TIMEOUT_SECS,
            max_attempts: DEFAULT_ACTIVITY_MAX_ATTEMPTS,
            initial_backoff_ms: DEFAULT_INITIAL_BACKOFF_MS,
            system_prompt: None, // Use built-in default
        }
    }
}

impl PipelineConfig {
    pub fn activity_timeout(&self) -> Duration {
        Duration::from_secs(self.activity_timeout_secs)
    }

    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    pub fn system_prompt_or_default(&self) -> &str {
        self.system_prompt
            .as_deref()
            .unwrap_or(DEFAULT_JUSTIFICATION_SYSTEM_PROMPT)
    }
}
