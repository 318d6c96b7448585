//! Graph node and edge types.

use serde::{Deserialize, Serialize};

use crate::identity::{edge_hash, entity_hash};

/// Kind of code construct an entity represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    File,
    Module,
    Function,
    Method,
    Class,
    Interface,
    Type,
    Variable,
    Constant,
}

impl EntityKind {
    /// Lowercase name used in hashes and prompts.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::File => "file",
            Self::Module => "module",
            Self::Function => "function",
            Self::Method => "method",
            Self::Class => "class",
            Self::Interface => "interface",
            Self::Type => "type",
            Self::Variable => "variable",
            Self::Constant => "constant",
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A node in the knowledge graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// Content address, see [`entity_hash`].
    pub id: String,
    pub org_id: String,
    pub repo_id: String,
    pub kind: EntityKind,
    pub name: String,
    /// Path relative to the repository root.
    pub file_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exported: Option<bool>,
    /// PageRank expressed as a percentile in [0, 1].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pagerank_percentile: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub community_id: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub community_label: Option<String>,
}

impl Entity {
    /// Create an entity whose id is derived from its identifying fields.
    pub fn new(
        org_id: impl Into<String>,
        repo_id: impl Into<String>,
        kind: EntityKind,
        name: impl Into<String>,
        file_path: impl Into<String>,
    ) -> Self {
        let repo_id = repo_id.into();
        let name = name.into();
        let file_path = file_path.into();
        let id = entity_hash(&repo_id, &file_path, kind.as_str(), &name, None);

        Self {
            id,
            org_id: org_id.into(),
            repo_id,
            kind,
            name,
            file_path,
            signature: None,
            body: None,
            exported: None,
            pagerank_percentile: None,
            community_id: None,
            community_label: None,
        }
    }

    /// Set the signature. The id is recomputed since it is part of the identity.
    pub fn with_signature(mut self, signature: impl Into<String>) -> Self {
        let signature = signature.into();
        self.id = entity_hash(
            &self.repo_id,
            &self.file_path,
            self.kind.as_str(),
            &self.name,
            Some(&signature),
        );
        self.signature = Some(signature);
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn with_exported(mut self, exported: bool) -> Self {
        self.exported = Some(exported);
        self
    }

    /// Override the derived id. Used when the store assigns ids externally.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Language name derived from the file extension, if recognised.
    pub fn language(&self) -> Option<&'static str> {
        language_for_path(&self.file_path)
    }

    /// Number of lines in the body (0 when absent).
    pub fn body_lines(&self) -> usize {
        self.body.as_deref().map(|b| b.lines().count()).unwrap_or(0)
    }
}

/// Map a file path to the language name used by the parser registry.
pub fn language_for_path(path: &str) -> Option<&'static str> {
    let ext = std::path::Path::new(path)
        .extension()
        .and_then(|e| e.to_str())?
        .to_lowercase();

    match ext.as_str() {
        "rs" => Some("rust"),
        "py" | "pyi" => Some("python"),
        "ts" | "mts" | "cts" => Some("typescript"),
        "tsx" => Some("tsx"),
        "js" | "jsx" | "mjs" | "cjs" => Some("javascript"),
        "go" => Some("go"),
        "java" => Some("java"),
        "cs" => Some("csharp"),
        _ => None,
    }
}

/// Kind of relationship between two entities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    Calls,
    Imports,
    Extends,
    Implements,
    References,
    Contains,
}

impl EdgeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Calls => "calls",
            Self::Imports => "imports",
            Self::Extends => "extends",
            Self::Implements => "implements",
            Self::References => "references",
            Self::Contains => "contains",
        }
    }

    /// Whether this kind constrains bottom-up processing order.
    pub fn is_ordering(&self) -> bool {
        matches!(self, Self::Calls | Self::References)
    }
}

impl std::fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A directed relation between two entities.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    /// Content address, see [`edge_hash`].
    pub id: String,
    pub from_id: String,
    pub to_id: String,
    pub kind: EdgeKind,
    /// Symbols pulled in by an import edge.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub imported_symbols: Vec<String>,
}

impl Edge {
    pub fn new(from_id: impl Into<String>, to_id: impl Into<String>, kind: EdgeKind) -> Self {
        let from_id = from_id.into();
        let to_id = to_id.into();
        let id = edge_hash(&from_id, &to_id, kind.as_str());
        Self {
            id,
            from_id,
            to_id,
            kind,
            imported_symbols: Vec::new(),
        }
    }

    pub fn with_imported_symbols(mut self, symbols: Vec<String>) -> Self {
        self.imported_symbols = symbols;
        self
    }

    /// Whether the edge touches the given entity on either end.
    pub fn touches(&self, entity_id: &str) -> bool {
        self.from_id == entity_id || self.to_id == entity_id
    }

    /// The endpoint that is not `entity_id`. Self-loops return `entity_id`.
    pub fn other_end(&self, entity_id: &str) -> &str {
        if self.from_id == entity_id {
            &self.to_id
        } else {
            &self.from_id
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_id_changes_with_signature() {
        let plain = Entity::new("org", "repo", EntityKind::Function, "login", "src/auth.ts");
        let typed = plain.clone().with_signature("login(user: User): Session");
        assert_ne!(plain.id, typed.id);
        assert_eq!(plain.id.len(), 16);
    }

    #[test]
    fn test_language_for_path() {
        assert_eq!(language_for_path("src/lib.rs"), Some("rust"));
        assert_eq!(language_for_path("app/main.PY"), Some("python"));
        assert_eq!(language_for_path("web/index.tsx"), Some("tsx"));
        assert_eq!(language_for_path("web/index.ts"), Some("typescript"));
        assert_eq!(language_for_path("README.md"), None);
        assert_eq!(language_for_path("Makefile"), None);
    }

    #[test]
    fn test_edge_other_end() {
        let edge = Edge::new("a", "b", EdgeKind::Calls);
        assert_eq!(edge.other_end("a"), "b");
        assert_eq!(edge.other_end("b"), "a");
        assert!(edge.touches("a"));
        assert!(!edge.touches("c"));
    }

    #[test]
    fn test_ordering_kinds() {
        assert!(EdgeKind::Calls.is_ordering());
        assert!(EdgeKind::References.is_ordering());
        assert!(!EdgeKind::Imports.is_ordering());
        assert!(!EdgeKind::Extends.is_ordering());
    }
}
