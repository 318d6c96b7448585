use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::context::GraphContext;
use crate::llm::{extract_json, LLMError};
use crate::models::{Entity, Justification, SemanticTriple, Taxonomy};

/// Builds the user prompt for one batch.
///
/// Each entity is rendered with its graph context and the current
/// justifications of the callees it depends on.
pub fn build_justification_prompt(
    entities: &[Entity],
    contexts: &HashMap<String, GraphContext>,
    callee_justifications: &HashMap<String, Justification>,
    body_lines: usize,
) -> String {
    let mut prompt = String::from("## Entities\n\n");

    for entity in entities {
        prompt.push_str(&format!("### {} ({})\n\n", entity.name, entity.kind));
        prompt.push_str(&format!("- id: {}\n", entity.id));
        prompt.push_str(&format!("- path: {}\n", entity.file_path));
        if let Some(ref signature) = entity.signature {
            prompt.push_str(&format!("- signature: `{}`\n", signature));
        }
        if let Some(ref label) = entity.community_label {
            prompt.push_str(&format!("- community: {}\n", label));
        }
        prompt.push('\n');

        if let Some(context) = contexts.get(&entity.id) {
            prompt.push_str(&context.to_prompt_string());

            let callees: Vec<String> = context
                .outbound
                .iter()
                .filter(|n| n.edge_kind.is_ordering())
                .filter_map(|n| {
                    callee_justifications.get(&n.id).map(|j| {
                        format!("- {}: {} [{}]", n.name, j.business_purpose, j.feature_tag)
                    })
                })
                .collect();
            if !callees.is_empty() {
                prompt.push_str("Callee purposes:\n");
                prompt.push_str(&callees.join("\n"));
                prompt.push('\n');
            }
            prompt.push('\n');
        }

        if let Some(ref body) = entity.body {
            let total = body.lines().count();
            let shown: Vec<&str> = body.lines().take(body_lines).collect();
            prompt.push_str("```\n");
            prompt.push_str(&shown.join("\n"));
            if total > body_lines {
                prompt.push_str(&format!("\n// ... {} more lines", total - body_lines));
            }
            prompt.push_str("\n```\n\n");
        }
    }

    prompt.push_str(&format!(
        "Justify each of the {} entities above. Use the exact ids given.",
        entities.len()
    ));
    prompt
}

/// Structured response of a justification call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JustificationResponse {
    pub justifications: Vec<RawJustification>,
}

/// One justification as returned by the model, before validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawJustification {
    pub entity_id: String,
    pub taxonomy: String,
    pub confidence: f64,
    pub business_purpose: String,
    #[serde(default)]
    pub domain_concepts: Vec<String>,
    pub feature_tag: String,
    #[serde(default)]
    pub semantic_triples: Vec<SemanticTriple>,
    #[serde(default)]
    pub compliance_tags: Vec<String>,
}

impl JustificationResponse {
    /// Validate the response against the batch it answers.
    ///
    /// Every batch entity must be present with a known taxonomy; a response
    /// that misses one is malformed. Extra entries are ignored.
    pub fn into_justifications(
        self,
        batch: &[Entity],
        model_tier: &str,
        model_used: &str,
    ) -> Result<Vec<Justification>, LLMError> {
        let mut by_id: HashMap<String, RawJustification> = HashMap::new();
        for raw in self.justifications {
            by_id.entry(raw.entity_id.clone()).or_insert(raw);
        }

        let mut justifications = Vec::with_capacity(batch.len());
        for entity in batch {
            let raw = by_id.remove(&entity.id).ok_or_else(|| {
                LLMError::ParseError(format!("Response is missing entity {}", entity.id))
            })?;
            let taxonomy = Taxonomy::parse(&raw.taxonomy).ok_or_else(|| {
                LLMError::ParseError(format!(
                    "Unknown taxonomy '{}' for entity {}",
                    raw.taxonomy, entity.id
                ))
            })?;
            let confidence = if raw.confidence.is_finite() {
                raw.confidence.clamp(0.0, 1.0)
            } else {
                0.0
            };

            let mut justification = Justification::new(
                &entity.id,
                &entity.org_id,
                &entity.repo_id,
                taxonomy,
                raw.business_purpose,
                raw.feature_tag,
            )
            .with_confidence(confidence)
            .with_domain_concepts(raw.domain_concepts)
            .with_model_tier(model_tier);
            justification.semantic_triples = raw.semantic_triples;
            justification.compliance_tags = raw.compliance_tags;
            justification.model_used = Some(model_used.to_string());

            justifications.push(justification);
        }

        if !by_id.is_empty() {
            warn!(extra = by_id.len(), "Response contained entities outside the batch");
        }

        Ok(justifications)
    }
}

/// Parse raw model output into validated justifications.
pub fn parse_justification_response(
    response: &str,
    batch: &[Entity],
    model_tier: &str,
    model_used: &str,
) -> Result<Vec<Justification>, LLMError> {
    let json = extract_json(response);
    let parsed: JustificationResponse = serde_json::from_str(json)
        .map_err(|e| LLMError::ParseError(format!("Invalid justification JSON: {}", e)))?;
    parsed.into_justifications(batch, model_tier, model_used)
}
