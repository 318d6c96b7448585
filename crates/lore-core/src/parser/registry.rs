//! Parser registry keyed by language name.

use std::collections::HashMap;
use std::sync::Arc;

use super::rust::RustParser;
use super::traits::StructuralParser;
use super::treesitter::TreeSitterParser;

/// Registry of structural parsers.
///
/// Maps language names (and aliases) to their parser. A missing entry is a
/// normal condition: callers fall back to conservative comparisons.
pub struct ParserRegistry {
    parsers: HashMap<String, Arc<dyn StructuralParser>>,
}

impl ParserRegistry {
    /// Create a new registry with all built-in parsers.
    pub fn new() -> Self {
        let mut registry = Self::empty();

        registry.register(Arc::new(RustParser::new()));
        registry.register(Arc::new(TreeSitterParser::typescript()));
        registry.register(Arc::new(TreeSitterParser::tsx()));
        registry.register(Arc::new(TreeSitterParser::javascript()));
        registry.register(Arc::new(TreeSitterParser::python()));
        registry.register(Arc::new(TreeSitterParser::go()));
        registry.register(Arc::new(TreeSitterParser::java()));
        registry.register(Arc::new(TreeSitterParser::csharp()));

        registry
    }

    /// Create a registry with no parsers registered.
    pub fn empty() -> Self {
        Self {
            parsers: HashMap::new(),
        }
    }

    /// Register a parser under its language name and aliases.
    pub fn register(&mut self, parser: Arc<dyn StructuralParser>) {
        self.parsers
            .insert(parser.language_name().to_lowercase(), Arc::clone(&parser));
        for alias in parser.aliases() {
            self.parsers.insert(alias.to_lowercase(), Arc::clone(&parser));
        }
    }

    /// Get the parser for a language, if one is registered.
    pub fn get(&self, language: &str) -> Option<Arc<dyn StructuralParser>> {
        self.parsers.get(&language.to_lowercase()).cloned()
    }

    /// Check if a parser is registered for the language.
    pub fn supports(&self, language: &str) -> bool {
        self.parsers.contains_key(&language.to_lowercase())
    }

    /// List the primary language names of all registered parsers.
    pub fn languages(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self
            .parsers
            .values()
            .map(|p| p.language_name())
            .collect();
        names.sort_unstable();
        names.dedup();
        names
    }
}

impl Default for ParserRegistry {
    fn default() -> Self {
        Self::new()
    }
}
