//! Structural parsers used to tell cosmetic edits from semantic ones.
//!
//! ## Components
//!
//! - `StructuralParser` trait - Reduces code to canonical text
//! - `ParserRegistry` - Maps language names to parsers
//!
//! ## Supported Languages
//!
//! - Rust (syn, with token-level fallback for fragments)
//! - TypeScript/TSX/JavaScript, Python, Go, Java, C# (tree-sitter)

mod registry;
mod rust;
mod traits;
mod treesitter;

pub use registry::ParserRegistry;
pub use rust::RustParser;
pub use traits::StructuralParser;
pub use treesitter::TreeSitterParser;
