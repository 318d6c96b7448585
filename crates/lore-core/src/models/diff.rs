//! Incremental change set between two indexed snapshots.

use serde::{Deserialize, Serialize};

use super::entity::Entity;

/// An entity present in both snapshots under the same id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdatedEntity {
    pub before: Entity,
    pub after: Entity,
}

impl UpdatedEntity {
    pub fn new(before: Entity, after: Entity) -> Self {
        Self { before, after }
    }

    pub fn id(&self) -> &str {
        &self.after.id
    }
}

/// Entities added, updated and deleted by one commit (or batch of commits).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityDiff {
    #[serde(default)]
    pub added: Vec<Entity>,
    #[serde(default)]
    pub updated: Vec<UpdatedEntity>,
    #[serde(default)]
    pub deleted: Vec<Entity>,
}

impl EntityDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.updated.is_empty() && self.deleted.is_empty()
    }

    pub fn deleted_ids(&self) -> Vec<String> {
        self.deleted.iter().map(|e| e.id.clone()).collect()
    }

    pub fn updated_ids(&self) -> Vec<String> {
        self.updated.iter().map(|u| u.id().to_string()).collect()
    }
}

/// A deleted entity that reappeared under a new identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityMove {
    pub from: Entity,
    pub to: Entity,
}
