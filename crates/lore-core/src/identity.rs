//! Deterministic entity and edge keys.
//!
//! Ids are content addresses: re-indexing the same code yields the same ids,
//! so snapshots can be diffed by address instead of by content.

use sha2::{Digest, Sha256};

/// Number of hex characters kept from the digest (64 bits).
const ID_HEX_LEN: usize = 16;

fn hash_fields(fields: &[&str]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(fields.join("\0").as_bytes());
    let mut digest = hex::encode(hasher.finalize());
    digest.truncate(ID_HEX_LEN);
    digest
}

/// Key for an entity. A missing signature hashes as the empty string.
pub fn entity_hash(
    repo_id: &str,
    file_path: &str,
    kind: &str,
    name: &str,
    signature: Option<&str>,
) -> String {
    hash_fields(&[repo_id, file_path, kind, name, signature.unwrap_or("")])
}

/// Key for a directed edge.
pub fn edge_hash(from_id: &str, to_id: &str, kind: &str) -> String {
    hash_fields(&[from_id, to_id, kind])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_hash_is_stable() {
        let a = entity_hash("repo", "src/a.rs", "function", "run", Some("fn run()"));
        let b = entity_hash("repo", "src/a.rs", "function", "run", Some("fn run()"));
        assert_eq!(a, b);
        assert_eq!(a.len(), 16);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_missing_signature_is_empty_string() {
        assert_eq!(
            entity_hash("repo", "src/a.rs", "function", "run", None),
            entity_hash("repo", "src/a.rs", "function", "run", Some("")),
        );
    }

    #[test]
    fn test_separator_prevents_field_bleed() {
        assert_ne!(edge_hash("ab", "c", "calls"), edge_hash("a", "bc", "calls"));
    }
}
