pub mod batcher;
pub mod config;
pub mod context;
pub mod drift;
pub mod graph;
pub mod identity;
pub mod justification;
pub mod llm;
pub mod models;
pub mod normalizer;
pub mod parser;
pub mod pipeline;
pub mod repair;
pub mod store;

pub use config::Config;
pub use models::{Edge, EdgeKind, Entity, EntityDiff, EntityKind, Justification};
pub use normalizer::AstNormalizer;
pub use pipeline::{Pipeline, PipelineError, PipelineRun};
pub use store::{GraphStore, InMemoryGraphStore};
