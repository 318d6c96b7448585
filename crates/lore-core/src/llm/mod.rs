mod claude;
mod embedder;
mod error;
mod openai;
mod provider;
pub mod rate_limit;

pub use claude::ClaudeClient;
pub use embedder::{build_embedder, Embedder, OpenAIEmbedder};
#[cfg(feature = "local-embeddings")]
pub use embedder::FastEmbedder;
pub use error::LLMError;
pub use openai::OpenAIClient;
pub use provider::Provider;
pub use rate_limit::RateLimiter;

use async_trait::async_trait;
use serde::de::DeserializeOwned;

/// Trait for Large Language Model providers.
///
/// This abstraction allows swapping between different LLM providers
/// without changing the rest of the code.
///
/// # Supported Providers
///
/// - **OpenAI-compatible** (default): Works with OpenAI, Azure, Ollama, vLLM, OpenRouter, etc.
/// - **Anthropic**: Claude models via Anthropic API
/// - **Ollama**: Local models via Ollama
///
/// # Example
///
/// ```ignore
/// use lore_core::llm::{Provider, LLM};
///
/// let llm = Provider::from_env()?;
/// let response = llm.complete_with_model("gpt-4o-mini", "You are terse.", "Hello!").await?;
/// ```
#[async_trait]
pub trait LLM: Send + Sync {
    /// Complete a prompt and return the response.
    async fn complete(&self, prompt: &str) -> Result<String, LLMError>;

    /// Complete a prompt with a system message.
    async fn complete_with_system(
        &self,
        system: &str,
        prompt: &str,
    ) -> Result<String, LLMError>;

    /// Complete with a system message on a specific model.
    ///
    /// Default implementation ignores `model` and uses the client's own.
    async fn complete_with_model(
        &self,
        model: &str,
        system: &str,
        prompt: &str,
    ) -> Result<String, LLMError> {
        let _ = model;
        self.complete_with_system(system, prompt).await
    }

    /// Model used when none is given.
    fn model_name(&self) -> &str;
}

/// Blanket implementation for boxed trait objects.
#[async_trait]
impl LLM for Box<dyn LLM> {
    async fn complete(&self, prompt: &str) -> Result<String, LLMError> {
        (**self).complete(prompt).await
    }

    async fn complete_with_system(
        &self,
        system: &str,
        prompt: &str,
    ) -> Result<String, LLMError> {
        (**self).complete_with_system(system, prompt).await
    }

    async fn complete_with_model(
        &self,
        model: &str,
        system: &str,
        prompt: &str,
    ) -> Result<String, LLMError> {
        (**self).complete_with_model(model, system, prompt).await
    }

    fn model_name(&self) -> &str {
        (**self).model_name()
    }
}

/// Extract the JSON payload from a model response, stripping a Markdown
/// code fence when present.
pub fn extract_json(response: &str) -> &str {
    let trimmed = response.trim();

    // Check for ```json ... ``` or ``` ... ```
    if trimmed.starts_with("```") {
        if let Some(start) = trimmed.find('\n') {
            let rest = &trimmed[start + 1..];
            if let Some(end) = rest.rfind("```") {
                return rest[..end].trim();
            }
        }
    }

    // Prose around a bare object
    if !trimmed.starts_with('{') {
        if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) {
            if start < end {
                return &trimmed[start..=end];
            }
        }
    }

    trimmed
}

/// Request structured output and deserialize it.
pub async fn generate_object<T: DeserializeOwned>(
    llm: &dyn LLM,
    model: &str,
    system: &str,
    prompt: &str,
) -> Result<T, LLMError> {
    let response = llm.complete_with_model(model, system, prompt).await?;
    serde_json::from_str(extract_json(&response))
        .map_err(|e| LLMError::ParseError(format!("Invalid structured output: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_json_variants() {
        assert_eq!(extract_json("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(extract_json("```\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(extract_json("  {\"a\":1}  "), "{\"a\":1}");
        assert_eq!(extract_json("Here you go: {\"a\":1} hope it helps"), "{\"a\":1}");
        assert_eq!(extract_json("no json"), "no json");
    }
}
