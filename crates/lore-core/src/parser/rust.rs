//! Rust canonicalization using syn.
//!
//! Whole items are parsed with `syn::parse_file` and re-printed through
//! `quote`, which normalises layout. Fragments that are not valid items
//! (a bare block, an expression) fall back to `proc_macro2` lexing, which
//! still strips comments and whitespace. Doc attributes are removed in both
//! paths so documentation edits count as cosmetic.

use proc_macro2::{Delimiter, Group, TokenStream, TokenTree};
use quote::ToTokens;

use super::traits::StructuralParser;

/// Rust parser backed by syn.
pub struct RustParser;

impl RustParser {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RustParser {
    fn default() -> Self {
        Self::new()
    }
}

impl StructuralParser for RustParser {
    fn parse(&self, code: &str) -> Result<String, String> {
        let tokens = match syn::parse_file(code) {
            Ok(file) => file.into_token_stream(),
            Err(_) => code
                .parse::<TokenStream>()
                .map_err(|e| format!("Lex error: {}", e))?,
        };

        Ok(strip_doc_attributes(tokens).to_string())
    }

    fn language_name(&self) -> &'static str {
        "rust"
    }

    fn aliases(&self) -> &[&'static str] {
        &["rs"]
    }
}

/// Remove `#[doc = ...]` and `#![doc = ...]` attributes, recursing into groups.
fn strip_doc_attributes(tokens: TokenStream) -> TokenStream {
    let trees: Vec<TokenTree> = tokens.into_iter().collect();
    let mut out = Vec::with_capacity(trees.len());
    let mut i = 0;

    while i < trees.len() {
        if let TokenTree::Punct(p) = &trees[i] {
            if p.as_char() == '#' {
                let mut j = i + 1;
                if let Some(TokenTree::Punct(bang)) = trees.get(j) {
                    if bang.as_char() == '!' {
                        j += 1;
                    }
                }
                if let Some(TokenTree::Group(g)) = trees.get(j) {
                    if g.delimiter() == Delimiter::Bracket && is_doc_attribute(g) {
                        i = j + 1;
                        continue;
                    }
                }
            }
        }

        let tree = match &trees[i] {
            TokenTree::Group(g) => {
                let mut group = Group::new(g.delimiter(), strip_doc_attributes(g.stream()));
                group.set_span(g.span());
                TokenTree::Group(group)
            }
            other => other.clone(),
        };
        out.push(tree);
        i += 1;
    }

    out.into_iter().collect()
}

fn is_doc_attribute(group: &Group) -> bool {
    matches!(
        group.stream().into_iter().next(),
        Some(TokenTree::Ident(ident)) if ident == "doc"
    )
}
