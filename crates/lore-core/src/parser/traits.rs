//! Core parser trait for structural code comparison.

/// Language-specific structural parser.
///
/// Implementations reduce source code to a canonical text in which
/// whitespace, layout and comments no longer matter. Two snippets with the
/// same canonical text are considered cosmetically equivalent.
///
/// # Example Implementation
///
/// ```ignore
/// impl StructuralParser for RustParser {
///     fn parse(&self, code: &str) -> Result<String, String> {
///         let file = syn::parse_file(code).map_err(|e| e.to_string())?;
///         Ok(file.into_token_stream().to_string())
///     }
///
///     fn language_name(&self) -> &'static str { "rust" }
/// }
/// ```
pub trait StructuralParser: Send + Sync {
    /// Parse a code snippet and return its canonical text.
    ///
    /// # Returns
    /// * `Ok(String)` - Canonical, comment- and whitespace-free form
    /// * `Err(String)` - The snippet could not be parsed
    fn parse(&self, code: &str) -> Result<String, String>;

    /// Registry key, lowercase (e.g. "rust", "typescript").
    fn language_name(&self) -> &'static str;

    /// Additional registry keys for this parser.
    fn aliases(&self) -> &[&'static str] {
        &[]
    }
}
