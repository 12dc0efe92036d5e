//! Core traits for language analysis.

use std::path::{Path, PathBuf};

use crate::error::AnalyzeError;
use crate::event::TrackingEvent;
use crate::signature::CustomSignature;

use super::languages::{RubyConstantIndex, TsProject};

/// Holds a parsed tree-sitter tree and associated metadata.
pub struct ParsedFile {
    /// The tree-sitter parse tree.
    pub tree: tree_sitter::Tree,
    /// The source bytes (kept for node text extraction).
    pub source: Vec<u8>,
    /// The file path (for error reporting and event locations).
    pub path: PathBuf,
}

impl ParsedFile {
    /// Get text for a tree-sitter node.
    pub fn node_text(&self, node: tree_sitter::Node) -> &str {
        node.utf8_text(&self.source).unwrap_or("")
    }

    /// Text of a named field of `node`, if present.
    pub fn field_text(&self, node: tree_sitter::Node, field: &str) -> Option<&str> {
        node.child_by_field_name(field).map(|n| self.node_text(n))
    }
}

/// Shared read-only state handed to every per-file analysis.
#[derive(Clone, Copy)]
pub struct FileContext<'a> {
    pub signatures: &'a [CustomSignature],
    /// Ruby constants built by the pre-pass, when the scan saw Ruby files.
    pub ruby_constants: Option<&'a RubyConstantIndex>,
    /// TypeScript project owning the file, when one was resolved.
    pub ts_project: Option<&'a TsProject>,
}

impl<'a> FileContext<'a> {
    pub fn new(signatures: &'a [CustomSignature]) -> Self {
        Self {
            signatures,
            ruby_constants: None,
            ts_project: None,
        }
    }
}

/// Language-specific analyzer trait.
///
/// Each backend turns source into a tree, then walks it for tracking calls,
/// translating whatever it finds into the shared `TrackingEvent` model.
///
/// # Thread Safety
///
/// tree_sitter::Parser is not Sync, so implementations create parsers as
/// needed.
pub trait LanguageAnalyzer: Send + Sync {
    /// Returns the language identifier (e.g., "go", "ruby").
    fn language_id(&self) -> &'static str;

    /// Returns file extensions this analyzer handles (without dot).
    fn file_extensions(&self) -> &'static [&'static str];

    /// Parse a source file into a tree-sitter tree.
    ///
    /// Partial parse errors still produce a tree with ERROR nodes; only a
    /// parser that produces no tree at all is an error.
    fn parse(&self, path: &Path, source: &[u8]) -> Result<ParsedFile, AnalyzeError>;

    /// Find every tracking call in a parsed file.
    ///
    /// Results are not yet deduplicated.
    fn find_events(&self, parsed: &ParsedFile, ctx: &FileContext<'_>) -> Vec<TrackingEvent>;

    /// Check if this analyzer handles the given file extension.
    fn handles_extension(&self, ext: &str) -> bool {
        self.file_extensions().contains(&ext)
    }
}

/// Parse `source` with `language`, mapping failures to `AnalyzeError::Parse`.
pub(crate) fn parse_with(
    language: &tree_sitter::Language,
    path: &Path,
    source: &[u8],
) -> Result<ParsedFile, AnalyzeError> {
    let mut parser = tree_sitter::Parser::new();
    parser
        .set_language(language)
        .map_err(|e| AnalyzeError::parse(path, e.to_string()))?;
    let tree = parser
        .parse(source, None)
        .ok_or_else(|| AnalyzeError::parse(path, "parser returned no tree"))?;
    Ok(ParsedFile {
        tree,
        source: source.to_vec(),
        path: path.to_path_buf(),
    })
}
