use std::io::Write;

use lore_core::config::{
    ConfigError, LLMConfig, DEFAULT_ANTHROPIC_MODEL, DEFAULT_LLM_PROVIDER, DEFAULT_MAX_INPUT_TOKENS,
    DEFAULT_OLLAMA_MODEL, DEFAULT_OPENAI_MODEL,
};
use lore_core::justification::ModelTier;
use lore_core::Config;
use tempfile::NamedTempFile;

#[test]
fn test_default_config() {
    let config = Config::default();
    assert_eq!(config.llm.provider, DEFAULT_LLM_PROVIDER);
    assert_eq!(config.batching.max_input_tokens, DEFAULT_MAX_INPUT_TOKENS);
    assert_eq!(config.drift.cosmetic_threshold, 0.95);
    assert_eq!(config.drift.refactor_threshold, 0.8);
    assert!(config.pipeline.structural_comparison);
    assert!(config.validate().is_ok());
}

#[test]
fn test_config_to_toml() {
    let toml_str = Config::default_config_string();
    for section in ["[llm]", "[embedding]", "[batching]", "[context]", "[community]", "[drift]", "[rate_limit]", "[pipeline]"] {
        assert!(toml_str.contains(section), "missing {section}");
    }
    assert!(!toml_str.contains("api_key"));
}

#[test]
fn test_config_from_toml() {
    let toml_str = r#"
[llm]
provider = "ollama"
model = "llama3"

[llm.tiers]
premium = "llama3:70b"

[batching]
max_input_tokens = 4000

[drift]
cosmetic_threshold = 0.97
"#;
    let config: Config = toml::from_str(toml_str).unwrap();
    assert_eq!(config.llm.provider, "ollama");
    assert_eq!(config.llm.model, Some("llama3".to_string()));
    assert_eq!(config.llm.model_for_tier(ModelTier::Premium), "llama3:70b");
    assert_eq!(config.llm.model_for_tier(ModelTier::Fast), "llama3");
    assert_eq!(config.batching.max_input_tokens, 4000);
    assert_eq!(config.batching.max_entities_per_batch, 15);
    assert_eq!(config.drift.cosmetic_threshold, 0.97);
}

#[test]
fn test_from_file_rejects_invalid_thresholds() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "[drift]\ncosmetic_threshold = 0.7\nrefactor_threshold = 0.9").unwrap();

    let result = Config::from_file(file.path());
    assert!(matches!(result, Err(ConfigError::Invalid(_))));
}

#[test]
fn test_from_file_parse_error() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "[batching\nmax_input_tokens = ").unwrap();

    assert!(matches!(Config::from_file(file.path()), Err(ConfigError::ParseError(_))));
}

#[test]
fn test_from_file_missing() {
    let result = Config::from_file("/nonexistent/lore.toml");
    assert!(matches!(result, Err(ConfigError::ReadError(_))));
}

#[test]
fn test_model_or_default() {
    let mut config = LLMConfig {
        provider: "anthropic".to_string(),
        ..Default::default()
    };
    assert_eq!(config.model_or_default(), DEFAULT_ANTHROPIC_MODEL);

    config.provider = "ollama".to_string();
    assert_eq!(config.model_or_default(), DEFAULT_OLLAMA_MODEL);

    config.provider = "openai".to_string();
    assert_eq!(config.model_or_default(), DEFAULT_OPENAI_MODEL);

    config.model = Some("custom-model".to_string());
    assert_eq!(config.model_or_default(), "custom-model");
}
