//! JSON files read and written by the CLI.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use lore_core::models::{Edge, Entity, EntityDiff, Justification};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// An indexed graph: every entity and edge of one repository.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub entities: Vec<Entity>,
    #[serde(default)]
    pub edges: Vec<Edge>,
}

fn read_json<T: DeserializeOwned>(path: &Path, what: &str) -> Result<T> {
    let content = fs::read_to_string(path).with_context(|| format!("Failed to read {} {}", what, path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Invalid {} JSON in {}", what, path.display()))
}

pub fn read_snapshot(path: &Path) -> Result<Snapshot> {
    read_json(path, "snapshot")
}

pub fn read_diff(path: &Path) -> Result<EntityDiff> {
    read_json(path, "diff")
}

pub fn read_justifications(path: &Path) -> Result<Vec<Justification>> {
    read_json(path, "justifications")
}

/// Write pretty JSON to `path`, or to stdout when no path is given.
pub fn write_json<T: Serialize>(value: &T, path: Option<&Path>) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    match path {
        Some(path) => fs::write(path, json).with_context(|| format!("Failed to write {}", path.display())),
        None => {
            println!("{}", json);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_sections_default_to_empty() {
        let snapshot: Snapshot = serde_json::from_str("{}").unwrap();
        assert!(snapshot.entities.is_empty());
        assert!(snapshot.edges.is_empty());
    }

    #[test]
    fn test_snapshot_roundtrip_keeps_ids() {
        use lore_core::models::{EdgeKind, EntityKind};

        let a = Entity::new("org", "shop", EntityKind::Function, "cart", "src/cart.rs");
        let b = Entity::new("org", "shop", EntityKind::Function, "total", "src/cart.rs");
        let snapshot = Snapshot {
            edges: vec![Edge::new(&a.id, &b.id, EdgeKind::Calls)],
            entities: vec![a.clone(), b],
        };

        let json = serde_json::to_string(&snapshot).unwrap();
        let back: Snapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back.entities[0].id, a.id);
        assert_eq!(back.edges[0].from_id, a.id);
    }
}
