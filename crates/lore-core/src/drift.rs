//! Change significance from AST and embedding evidence.

use serde::{Deserialize, Serialize};

use crate::config::DriftConfig;
use crate::models::DriftCategory;

/// Evidence about one entity before and after a change.
#[derive(Debug, Clone, Default)]
pub struct DriftInput<'a> {
    pub ast_hash_old: Option<&'a str>,
    pub ast_hash_new: Option<&'a str>,
    pub embedding_old: &'a [f32],
    pub embedding_new: &'a [f32],
}

impl<'a> DriftInput<'a> {
    /// Whether both AST hashes are known and equal, in which case no
    /// embedding work is needed.
    pub fn is_structurally_equal(&self) -> bool {
        matches!((self.ast_hash_old, self.ast_hash_new), (Some(a), Some(b)) if a == b)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DriftResult {
    pub category: DriftCategory,
    pub similarity: f64,
}

/// Cosine similarity of two vectors. Empty or length-mismatched vectors, and
/// zero vectors, score 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.is_empty() || a.len() != b.len() {
        return 0.0;
    }

    let (mut dot, mut norm_a, mut norm_b) = (0.0f64, 0.0f64, 0.0f64);
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (*x as f64, *y as f64);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// Classify a similarity score against the configured thresholds.
pub fn classify_similarity(similarity: f64, config: &DriftConfig) -> DriftCategory {
    if similarity > config.cosmetic_threshold {
        DriftCategory::Cosmetic
    } else if similarity > config.refactor_threshold {
        DriftCategory::Refactor
    } else {
        DriftCategory::IntentDrift
    }
}

/// Classify a change. Equal AST hashes are stable regardless of embeddings.
pub fn compute_drift(input: &DriftInput<'_>, config: &DriftConfig) -> DriftResult {
    if input.is_structurally_equal() {
        return DriftResult {
            category: DriftCategory::Stable,
            similarity: 1.0,
        };
    }

    let similarity = cosine_similarity(input.embedding_old, input.embedding_new);
    DriftResult {
        category: classify_similarity(similarity, config),
        similarity,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_edge_cases() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[1.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
        assert!((cosine_similarity(&[1.0, 2.0], &[2.0, 4.0]) - 1.0).abs() < 1e-9);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-9);
    }

    #[test]
    fn test_missing_hash_is_not_stable() {
        let input = DriftInput {
            ast_hash_old: None,
            ast_hash_new: None,
            embedding_old: &[1.0, 0.0],
            embedding_new: &[1.0, 0.0],
        };
        let result = compute_drift(&input, &DriftConfig::default());
        assert_eq!(result.category, DriftCategory::Cosmetic);
    }

    #[test]
    fn test_thresholds_are_exclusive() {
        let config = DriftConfig::default();
        assert_eq!(classify_similarity(0.95, &config), DriftCategory::Refactor);
        assert_eq!(classify_similarity(0.8, &config), DriftCategory::IntentDrift);
    }
}
