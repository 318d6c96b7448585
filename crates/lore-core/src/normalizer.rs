//! Cosmetic-versus-semantic comparison and move detection.
//!
//! Parse failures never propagate from here: an unparseable body is treated
//! as changed, and fingerprints fall back to hashing whitespace-normalised
//! text.

use std::collections::HashMap;
use std::sync::Arc;

use sha2::{Digest, Sha256};
use tracing::warn;

use crate::models::{Entity, EntityMove};
use crate::parser::ParserRegistry;

/// Hex characters kept for semantic fingerprints (128 bits).
const FINGERPRINT_HEX_LEN: usize = 32;

/// Structural comparison over a parser registry.
#[derive(Clone)]
pub struct AstNormalizer {
    registry: Arc<ParserRegistry>,
    structural_comparison: bool,
}

impl AstNormalizer {
    pub fn new(registry: Arc<ParserRegistry>) -> Self {
        Self {
            registry,
            structural_comparison: true,
        }
    }

    /// Enable or disable structural comparison. When disabled every byte
    /// difference counts as semantic.
    pub fn with_structural_comparison(mut self, enabled: bool) -> Self {
        self.structural_comparison = enabled;
        self
    }

    /// Canonical text of `body`, or `None` when no parser applies or parsing fails.
    fn canonical(&self, body: &str, language: Option<&str>) -> Option<String> {
        let parser = self.registry.get(language?)?;
        match parser.parse(body) {
            Ok(text) => Some(text),
            Err(e) => {
                warn!(language = parser.language_name(), error = %e, "Structural parse failed, comparing text");
                None
            }
        }
    }

    /// Whether `new_body` differs from `old_body` in more than layout and comments.
    pub fn is_semantic_change(&self, old_body: &str, new_body: &str, language: Option<&str>) -> bool {
        if old_body == new_body {
            return false;
        }
        if !self.structural_comparison {
            return true;
        }

        match (
            self.canonical(old_body, language),
            self.canonical(new_body, language),
        ) {
            (Some(old), Some(new)) => old != new,
            _ => true,
        }
    }

    /// Location-independent structural hash of a body.
    ///
    /// Returns `None` for empty bodies.
    pub fn compute_semantic_fingerprint(&self, body: &str, language: Option<&str>) -> Option<String> {
        if body.trim().is_empty() {
            return None;
        }

        let text = self
            .canonical(body, language)
            .unwrap_or_else(|| body.split_whitespace().collect::<Vec<_>>().join(" "));

        let mut hasher = Sha256::new();
        hasher.update(text.as_bytes());
        let mut digest = hex::encode(hasher.finalize());
        digest.truncate(FINGERPRINT_HEX_LEN);
        Some(digest)
    }

    /// Pair deleted entities with added ones that carry the same code.
    ///
    /// A pair requires an identical fingerprint and an identical kind. Each
    /// deleted entity is consumed at most once. When `language` is `None`
    /// the language is derived per entity from its file path.
    pub fn detect_moves(
        &self,
        added: &[Entity],
        deleted: &[Entity],
        language: Option<&str>,
    ) -> Vec<EntityMove> {
        let mut by_fingerprint: HashMap<String, Vec<&Entity>> = HashMap::new();
        for entity in deleted {
            let lang = language.or_else(|| entity.language());
            if let Some(fp) = entity
                .body
                .as_deref()
                .and_then(|b| self.compute_semantic_fingerprint(b, lang))
            {
                by_fingerprint.entry(fp).or_default().push(entity);
            }
        }

        let mut moves = Vec::new();
        for entity in added {
            let lang = language.or_else(|| entity.language());
            let Some(fp) = entity
                .body
                .as_deref()
                .and_then(|b| self.compute_semantic_fingerprint(b, lang))
            else {
                continue;
            };

            if let Some(candidates) = by_fingerprint.get_mut(&fp) {
                if let Some(pos) = candidates.iter().position(|d| d.kind == entity.kind) {
                    let from = candidates.remove(pos);
                    moves.push(EntityMove {
                        from: from.clone(),
                        to: entity.clone(),
                    });
                }
            }
        }

        moves
    }
}

impl Default for AstNormalizer {
    fn default() -> Self {
        Self::new(Arc::new(ParserRegistry::new()))
    }
}
