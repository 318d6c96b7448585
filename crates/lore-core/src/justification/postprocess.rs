//! Normalisation and rollups over justifications.

use std::collections::{BTreeMap, HashSet};

use crate::models::{FeatureAggregation, Justification, SemanticTriple};

/// Lowercase snake_case: word boundaries become `_`, runs of other
/// characters collapse into one `_`, and leading or trailing `_` is trimmed.
pub fn to_snake_case(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 4);
    let mut prev: Option<char> = None;

    for c in value.chars() {
        if c.is_alphanumeric() {
            let boundary = c.is_uppercase()
                && prev.is_some_and(|p| p.is_lowercase() || p.is_ascii_digit());
            if boundary && !out.ends_with('_') {
                out.push('_');
            }
            out.extend(c.to_lowercase());
        } else if !out.is_empty() && !out.ends_with('_') {
            out.push('_');
        }
        prev = Some(c);
    }

    out.trim_matches('_').to_string()
}

fn clean_list(values: &[String], transform: fn(&str) -> String) -> Vec<String> {
    values
        .iter()
        .map(|v| transform(v.trim()))
        .filter(|v| !v.is_empty())
        .collect()
}

/// Normalise one justification in place.
pub fn normalize_justification(justification: &mut Justification) {
    justification.feature_tag = to_snake_case(&justification.feature_tag);
    justification.domain_concepts = clean_list(&justification.domain_concepts, str::to_lowercase);
    justification.compliance_tags = clean_list(&justification.compliance_tags, str::to_uppercase);
    justification.business_purpose = justification.business_purpose.trim().to_string();
}

/// Normalise feature tags, domain concepts and compliance tags.
/// Applying it twice gives the same result as applying it once.
pub fn normalize_justifications(mut justifications: Vec<Justification>) -> Vec<Justification> {
    for justification in justifications.iter_mut() {
        normalize_justification(justification);
    }
    justifications
}

/// All semantic triples, exact duplicates removed, in first-seen order.
pub fn extract_semantic_triples(justifications: &[Justification]) -> Vec<SemanticTriple> {
    let mut seen = HashSet::new();
    justifications
        .iter()
        .flat_map(|j| j.semantic_triples.iter())
        .filter(|t| seen.insert((*t).clone()))
        .cloned()
        .collect()
}

/// Roll justifications up per feature tag, sorted by tag.
pub fn deduplicate_features(justifications: &[Justification]) -> Vec<FeatureAggregation> {
    let mut groups: BTreeMap<&str, (HashSet<&str>, f64, usize)> = BTreeMap::new();
    for j in justifications {
        let entry = groups.entry(j.feature_tag.as_str()).or_default();
        entry.0.insert(j.entity_id.as_str());
        entry.1 += j.confidence;
        entry.2 += 1;
    }

    groups
        .into_iter()
        .map(|(tag, (entities, total, rows))| FeatureAggregation {
            feature_tag: tag.to_string(),
            entity_count: entities.len(),
            average_confidence: total / rows as f64,
        })
        .collect()
}
