//! Data models for the knowledge graph and its annotations.

mod diff;
mod entity;
mod justification;

pub use diff::{EntityDiff, EntityMove, UpdatedEntity};
pub use entity::{language_for_path, Edge, EdgeKind, Entity, EntityKind};
pub use justification::{
    DriftCategory, DriftScore, FeatureAggregation, Justification, SemanticTriple, Taxonomy,
};
