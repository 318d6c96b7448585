//! Justification: prompts, response parsing, post-processing and quality.

pub mod postprocess;
pub mod prompts;
pub mod quality;

pub use postprocess::{
    deduplicate_features, extract_semantic_triples, normalize_justification, normalize_justifications,
    to_snake_case,
};
pub use prompts::{build_justification_prompt, parse_justification_response, JustificationResponse, RawJustification};
pub use quality::{apply_quality, score_justification, QualityScore, LOW_QUALITY_THRESHOLD};

use serde::{Deserialize, Serialize};

use crate::config::TierConfig;
use crate::models::{Entity, EntityKind};

/// Model size class an entity is routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelTier {
    Fast,
    Standard,
    Premium,
}

impl ModelTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fast => "fast",
            Self::Standard => "standard",
            Self::Premium => "premium",
        }
    }
}

impl std::fmt::Display for ModelTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tier recorded on human overrides.
pub const HUMAN_TIER: &str = "human";

/// Route an entity to a model tier.
///
/// Declarations with little logic of their own go to the fast tier. Long
/// bodies and the most central entities go to premium.
pub fn select_model_tier(entity: &Entity, config: &TierConfig) -> ModelTier {
    if matches!(
        entity.kind,
        EntityKind::File | EntityKind::Variable | EntityKind::Constant | EntityKind::Module
    ) {
        return ModelTier::Fast;
    }

    let central = entity
        .pagerank_percentile
        .is_some_and(|p| p >= config.premium_pagerank_percentile);
    if entity.body_lines() > config.premium_body_lines || central {
        return ModelTier::Premium;
    }

    ModelTier::Standard
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entity(kind: EntityKind) -> Entity {
        Entity::new("org", "repo", kind, "thing", "src/thing.go")
    }

    #[test]
    fn test_tier_routing() {
        let config = TierConfig::default();
        assert_eq!(select_model_tier(&entity(EntityKind::Constant), &config), ModelTier::Fast);
        assert_eq!(select_model_tier(&entity(EntityKind::Function), &config), ModelTier::Standard);

        let long = entity(EntityKind::Function).with_body("x := 1\n".repeat(81));
        assert_eq!(select_model_tier(&long, &config), ModelTier::Premium);

        let mut central = entity(EntityKind::Class);
        central.pagerank_percentile = Some(0.9);
        assert_eq!(select_model_tier(&central, &config), ModelTier::Premium);
    }

    #[test]
    fn test_fast_kinds_ignore_size() {
        let config = TierConfig::default();
        let file = entity(EntityKind::File).with_body("line\n".repeat(500));
        assert_eq!(select_model_tier(&file, &config), ModelTier::Fast);
    }
}
