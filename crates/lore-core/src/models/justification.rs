//! Annotation records produced by the pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Business classification of an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Taxonomy {
    /// Implements a specific business capability.
    Vertical,
    /// Cross-cutting infrastructure shared by several capabilities.
    Horizontal,
    /// Generic helper with no business meaning on its own.
    Utility,
}

impl Taxonomy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Vertical => "VERTICAL",
            Self::Horizontal => "HORIZONTAL",
            Self::Utility => "UTILITY",
        }
    }

    /// Parse a taxonomy label, case-insensitively.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_uppercase().as_str() {
            "VERTICAL" => Some(Self::Vertical),
            "HORIZONTAL" => Some(Self::Horizontal),
            "UTILITY" => Some(Self::Utility),
            _ => None,
        }
    }
}

impl std::fmt::Display for Taxonomy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A (subject, predicate, object) fact extracted by the model.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SemanticTriple {
    pub subject: String,
    pub predicate: String,
    pub object: String,
}

impl SemanticTriple {
    pub fn new(
        subject: impl Into<String>,
        predicate: impl Into<String>,
        object: impl Into<String>,
    ) -> Self {
        Self {
            subject: subject.into(),
            predicate: predicate.into(),
            object: object.into(),
        }
    }
}

/// LLM-derived semantic annotation of an entity.
///
/// Rows are bi-temporal: superseding a justification closes the current row
/// (`valid_to` set) and inserts a new one. A row with `valid_to == None` is
/// the entity's current justification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Justification {
    pub id: String,
    pub entity_id: String,
    pub org_id: String,
    pub repo_id: String,
    pub taxonomy: Taxonomy,
    pub confidence: f64,
    pub business_purpose: String,
    #[serde(default)]
    pub domain_concepts: Vec<String>,
    pub feature_tag: String,
    #[serde(default)]
    pub semantic_triples: Vec<SemanticTriple>,
    #[serde(default)]
    pub compliance_tags: Vec<String>,
    pub model_tier: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_used: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality_score: Option<f64>,
    #[serde(default)]
    pub quality_flags: Vec<String>,
    pub valid_from: DateTime<Utc>,
    #[serde(default)]
    pub valid_to: Option<DateTime<Utc>>,
}

impl Justification {
    /// Create a new current justification with an empty annotation.
    pub fn new(
        entity_id: impl Into<String>,
        org_id: impl Into<String>,
        repo_id: impl Into<String>,
        taxonomy: Taxonomy,
        business_purpose: impl Into<String>,
        feature_tag: impl Into<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            entity_id: entity_id.into(),
            org_id: org_id.into(),
            repo_id: repo_id.into(),
            taxonomy,
            confidence: 0.0,
            business_purpose: business_purpose.into(),
            domain_concepts: Vec::new(),
            feature_tag: feature_tag.into(),
            semantic_triples: Vec::new(),
            compliance_tags: Vec::new(),
            model_tier: String::new(),
            model_used: None,
            quality_score: None,
            quality_flags: Vec::new(),
            valid_from: Utc::now(),
            valid_to: None,
        }
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn with_domain_concepts(mut self, concepts: Vec<String>) -> Self {
        self.domain_concepts = concepts;
        self
    }

    pub fn with_model_tier(mut self, tier: impl Into<String>) -> Self {
        self.model_tier = tier.into();
        self
    }

    pub fn is_current(&self) -> bool {
        self.valid_to.is_none()
    }
}

/// Feature rollup derived from current justifications.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureAggregation {
    pub feature_tag: String,
    pub entity_count: usize,
    pub average_confidence: f64,
}

/// Significance of a change between two versions of an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriftCategory {
    /// Structure unchanged.
    Stable,
    /// Meaning effectively unchanged.
    Cosmetic,
    /// Restructured but same intent.
    Refactor,
    /// Behaviour changed; callers need re-justification.
    IntentDrift,
}

impl DriftCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stable => "stable",
            Self::Cosmetic => "cosmetic",
            Self::Refactor => "refactor",
            Self::IntentDrift => "intent_drift",
        }
    }

    pub fn triggers_cascade(&self) -> bool {
        matches!(self, Self::IntentDrift)
    }
}

impl std::fmt::Display for DriftCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Append-only record of a drift classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftScore {
    pub entity_id: String,
    pub category: DriftCategory,
    pub embedding_similarity: f64,
    pub detected_at: DateTime<Utc>,
}
