//! In-memory graph algorithms over the entity graph.
//!
//! All algorithms run on [`EntityGraph`], an adjacency-list projection keyed
//! by entity id, and are deterministic for a given input.

mod adjacency;
pub mod community;
pub mod pagerank;
pub mod topo;

pub use adjacency::EntityGraph;
pub use community::{annotate_communities, detect_communities, Community, CommunityDetection};
pub use pagerank::annotate_pagerank;
pub use topo::topological_sort_entities;
