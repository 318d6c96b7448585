//! Embedding generation for drift scoring.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::LLMError;
use crate::config::{EmbeddingConfig, LLMConfig, DEFAULT_OPENAI_URL};

/// Trait for embedding generation.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Generate one embedding per input text, in input order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, LLMError>;

    /// Get the model name.
    fn model_name(&self) -> &str;
}

/// Embedder backed by an OpenAI-compatible `/embeddings` endpoint.
pub struct OpenAIEmbedder {
    base_url: String,
    api_key: String,
    model: String,
    client: Client,
}

impl OpenAIEmbedder {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
            client: Client::new(),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/embeddings", self.base_url)
    }
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    #[serde(default)]
    index: usize,
}

impl EmbeddingResponse {
    fn into_vectors(mut self, expected: usize) -> Result<Vec<Vec<f32>>, LLMError> {
        if self.data.len() != expected {
            return Err(LLMError::Embedding(format!(
                "Expected {} embeddings, got {}",
                expected,
                self.data.len()
            )));
        }
        self.data.sort_by_key(|d| d.index);
        Ok(self.data.into_iter().map(|d| d.embedding).collect())
    }
}

#[async_trait]
impl Embedder for OpenAIEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, LLMError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let request = EmbeddingRequest {
            model: &self.model,
            input: texts,
        };

        let mut req = self
            .client
            .post(self.endpoint())
            .header("Content-Type", "application/json")
            .json(&request);
        if !self.api_key.is_empty() {
            req = req.header("Authorization", format!("Bearer {}", self.api_key));
        }

        let response = req.send().await?;
        let status = response.status();

        if status == 429 {
            return Err(LLMError::RateLimited);
        }

        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(LLMError::ApiError {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| LLMError::ParseError(e.to_string()))?;
        parsed.into_vectors(texts.len())
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// FastEmbed-based local embedder.
#[cfg(feature = "local-embeddings")]
pub struct FastEmbedder {
    model: std::sync::Mutex<fastembed::TextEmbedding>,
    model_name: String,
}

#[cfg(feature = "local-embeddings")]
impl FastEmbedder {
    /// Create an embedder with the default BGE-Small model.
    /// Models are cached under `~/.lore/cache/`.
    pub fn new() -> Result<Self, LLMError> {
        Self::with_model(fastembed::EmbeddingModel::BGESmallENV15)
    }

    pub fn with_model(model: fastembed::EmbeddingModel) -> Result<Self, LLMError> {
        use fastembed::{InitOptions, TextEmbedding};

        let model_name = format!("{:?}", model);
        let cache_dir = dirs::home_dir()
            .unwrap_or_else(|| std::path::PathBuf::from("."))
            .join(".lore")
            .join("cache");

        std::fs::create_dir_all(&cache_dir).map_err(|e| {
            LLMError::Embedding(format!("Failed to create cache directory: {}", e))
        })?;

        let embedding = TextEmbedding::try_new(
            InitOptions::new(model)
                .with_cache_dir(cache_dir)
                .with_show_download_progress(false),
        )
        .map_err(|e| LLMError::Embedding(e.to_string()))?;

        Ok(Self {
            model: std::sync::Mutex::new(embedding),
            model_name,
        })
    }
}

#[cfg(feature = "local-embeddings")]
#[async_trait]
impl Embedder for FastEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, LLMError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let inputs: Vec<&str> = texts.iter().map(String::as_str).collect();
        let model = self
            .model
            .lock()
            .map_err(|_| LLMError::Embedding("embedding model lock poisoned".to_string()))?;
        model
            .embed(inputs, None)
            .map_err(|e| LLMError::Embedding(e.to_string()))
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}

/// Build the configured embedder.
///
/// The HTTP embedder reuses the LLM section's key and endpoint when the
/// embedding section does not set its own.
pub fn build_embedder(
    config: &EmbeddingConfig,
    llm: &LLMConfig,
) -> Result<Arc<dyn Embedder>, LLMError> {
    match config.provider.as_str() {
        "local" | "fastembed" => {
            #[cfg(feature = "local-embeddings")]
            {
                Ok(Arc::new(FastEmbedder::new()?))
            }
            #[cfg(not(feature = "local-embeddings"))]
            {
                Err(LLMError::MissingConfig(
                    "local embeddings require the `local-embeddings` feature".to_string(),
                ))
            }
        }
        "openai" | "openrouter" | "ollama" => {
            let base_url = config.base_url.clone().unwrap_or_else(|| {
                if llm.provider == config.provider {
                    llm.base_url_or_default()
                } else {
                    DEFAULT_OPENAI_URL.to_string()
                }
            });
            let api_key = config
                .api_key
                .clone()
                .or_else(|| std::env::var("LORE_EMBEDDING_API_KEY").ok())
                .or_else(|| llm.api_key_or_env())
                .unwrap_or_default();
            Ok(Arc::new(OpenAIEmbedder::new(base_url, api_key, &config.model)))
        }
        other => Err(LLMError::UnknownProvider(other.to_string())),
    }
}
