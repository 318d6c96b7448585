//! Tree-sitter based canonicalization shared across languages.

use tree_sitter::{Language, Node, Parser as TSParser};

use super::traits::StructuralParser;

/// Tree-sitter parser that renders a syntax tree as a canonical s-expression.
///
/// Named nodes are emitted as `(kind ...)`, leaves as their source text and
/// comment nodes are dropped. Indentation-sensitive languages keep their
/// block structure because it is encoded in the tree, not in whitespace.
pub struct TreeSitterParser {
    language: Language,
    language_name: &'static str,
    aliases: &'static [&'static str],
}

impl TreeSitterParser {
    pub fn new(
        language: Language,
        language_name: &'static str,
        aliases: &'static [&'static str],
    ) -> Self {
        Self {
            language,
            language_name,
            aliases,
        }
    }

    pub fn python() -> Self {
        Self::new(tree_sitter_python::LANGUAGE.into(), "python", &["py"])
    }

    pub fn typescript() -> Self {
        Self::new(
            tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
            "typescript",
            &["ts"],
        )
    }

    pub fn tsx() -> Self {
        Self::new(tree_sitter_typescript::LANGUAGE_TSX.into(), "tsx", &[])
    }

    pub fn javascript() -> Self {
        Self::new(tree_sitter_javascript::LANGUAGE.into(), "javascript", &["js", "jsx"])
    }

    pub fn go() -> Self {
        Self::new(tree_sitter_go::LANGUAGE.into(), "go", &["golang"])
    }

    pub fn java() -> Self {
        Self::new(tree_sitter_java::LANGUAGE.into(), "java", &[])
    }

    pub fn csharp() -> Self {
        Self::new(tree_sitter_c_sharp::LANGUAGE.into(), "csharp", &["c#", "cs"])
    }

    /// Get text for a node from source content.
    pub fn node_text<'a>(node: &Node, content: &'a str) -> &'a str {
        &content[node.byte_range()]
    }

    fn is_comment(node: &Node) -> bool {
        node.kind().contains("comment")
    }

    fn write_canonical(node: Node, content: &str, out: &mut String) {
        if Self::is_comment(&node) {
            return;
        }

        if node.child_count() == 0 {
            let text = Self::node_text(&node, content).trim();
            if !text.is_empty() {
                out.push_str(text);
                out.push(' ');
            }
            return;
        }

        let named = node.is_named();
        if named {
            out.push('(');
            out.push_str(node.kind());
            out.push(' ');
        }

        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            Self::write_canonical(child, content, out);
        }

        if named {
            out.push_str(") ");
        }
    }
}

impl StructuralParser for TreeSitterParser {
    fn parse(&self, code: &str) -> Result<String, String> {
        let mut parser = TSParser::new();
        parser
            .set_language(&self.language)
            .map_err(|e| format!("Failed to set language: {}", e))?;

        let tree = parser
            .parse(code, None)
            .ok_or_else(|| "Failed to parse content".to_string())?;

        let mut out = String::with_capacity(code.len());
        Self::write_canonical(tree.root_node(), code, &mut out);
        Ok(out.trim_end().to_string())
    }

    fn language_name(&self) -> &'static str {
        self.language_name
    }

    fn aliases(&self) -> &[&'static str] {
        self.aliases
    }
}
