//! Heuristic quality scoring of justifications.
//!
//! Scores are metadata. A low score is logged and stored next to the
//! justification but never blocks the pipeline.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::models::Justification;

/// Phrases that signal a non-answer. Only the first match is penalised.
const BOILERPLATE_PHRASES: &[&str] = &[
    "handles various",
    "performs various",
    "various operations",
    "does something",
    "provides functionality",
    "helper function",
    "utility function",
    "no description",
    "unknown purpose",
    "not enough context",
];

/// Domain concepts that only restate programming vocabulary.
const STOP_TERMS: &[&str] = &[
    "function", "class", "method", "variable", "string", "array", "object", "interface",
    "type", "module", "parameter", "return", "value", "data", "code", "boolean", "integer",
    "list", "map", "null", "undefined", "async", "promise", "callback",
];

const GENERIC_FEATURE_TAGS: &[&str] = &["utility", "misc", "other"];

const LAZY_OPENER: &str =
    r"(?i)^(a|an|the|this)\s+(function|class|method|interface|type|variable|module|component)\b";

const MIN_PURPOSE_CHARS: usize = 30;

/// Scores below this are logged as low quality.
pub const LOW_QUALITY_THRESHOLD: f64 = 0.5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityScore {
    /// In [0, 1], rounded to two decimals.
    pub score: f64,
    pub flags: Vec<String>,
}

impl QualityScore {
    pub fn is_low(&self, threshold: f64) -> bool {
        self.score < threshold
    }
}

fn lazy_opener() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(LAZY_OPENER).ok()).as_ref()
}

/// Score a justification. Never fails.
pub fn score_justification(justification: &Justification) -> QualityScore {
    let purpose = justification.business_purpose.trim();
    let lowered = purpose.to_lowercase();

    if lowered.contains("classification failed") {
        return QualityScore {
            score: 0.0,
            flags: vec!["classification_failed".to_string()],
        };
    }

    let mut score = 1.0f64;
    let mut flags = Vec::new();

    if BOILERPLATE_PHRASES.iter().any(|p| lowered.contains(p)) {
        score -= 0.3;
        flags.push("boilerplate_phrase".to_string());
    }

    if purpose.chars().count() < MIN_PURPOSE_CHARS {
        score -= 0.2;
        flags.push("short_purpose".to_string());
    }

    if justification.confidence >= 0.8 && justification.domain_concepts.is_empty() {
        score -= 0.2;
        flags.push("overconfident_without_concepts".to_string());
    }

    let stop_terms = justification
        .domain_concepts
        .iter()
        .filter(|c| STOP_TERMS.contains(&c.trim().to_lowercase().as_str()))
        .count();
    if stop_terms > 0 {
        score -= (0.15 * stop_terms as f64).min(0.3);
        flags.push("generic_concepts".to_string());
    }

    if GENERIC_FEATURE_TAGS.contains(&justification.feature_tag.trim().to_lowercase().as_str()) {
        score -= 0.1;
        flags.push("generic_feature_tag".to_string());
    }

    if lazy_opener().is_some_and(|re| re.is_match(purpose)) {
        score -= 0.15;
        flags.push("lazy_opener".to_string());
    }

    QualityScore {
        score: (score.max(0.0) * 100.0).round() / 100.0,
        flags,
    }
}

/// Score a justification and record the result on it.
pub fn apply_quality(justification: &mut Justification) -> QualityScore {
    let quality = score_justification(justification);
    justification.quality_score = Some(quality.score);
    justification.quality_flags = quality.flags.clone();
    quality
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Taxonomy;

    fn justification(purpose: &str, tag: &str) -> Justification {
        Justification::new("e", "o", "r", Taxonomy::Vertical, purpose, tag)
            .with_confidence(0.7)
            .with_domain_concepts(vec!["invoice".to_string()])
    }

    #[test]
    fn test_good_justification_scores_full() {
        let j = justification("Issues monthly invoices to enterprise customers on renewal", "billing");
        let q = score_justification(&j);
        assert_eq!(q.score, 1.0);
        assert!(q.flags.is_empty());
    }

    #[test]
    fn test_lazy_opener_and_generic_tag() {
        let j = justification("This function computes the totals shown on the invoice page", "misc");
        let q = score_justification(&j);
        assert_eq!(q.score, 0.75);
        assert_eq!(q.flags, vec!["generic_feature_tag", "lazy_opener"]);
    }

    #[test]
    fn test_stop_term_penalty_is_capped() {
        let j = justification("Keeps the customer ledger consistent across currency changes", "billing")
            .with_domain_concepts(vec!["string".into(), "array".into(), "object".into()]);
        assert_eq!(score_justification(&j).score, 0.7);
    }

    #[test]
    fn test_overconfident_without_concepts() {
        let j = justification("Keeps the customer ledger consistent across currency changes", "billing")
            .with_confidence(0.9)
            .with_domain_concepts(vec![]);
        assert_eq!(score_justification(&j).score, 0.8);
    }

    #[test]
    fn test_score_never_negative() {
        let j = justification("A function, helper function", "utility")
            .with_confidence(0.95)
            .with_domain_concepts(vec![]);
        let q = score_justification(&j);
        assert_eq!(q.score, 0.05);
        assert_eq!(q.flags.len(), 5);
    }

    #[test]
    fn test_apply_records_metadata() {
        let mut j = justification("short", "billing");
        let q = apply_quality(&mut j);
        assert_eq!(j.quality_score, Some(q.score));
        assert_eq!(j.quality_flags, vec!["short_purpose"]);
    }
}
