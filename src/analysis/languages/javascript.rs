//! JavaScript language analyzer using tree-sitter.

use std::path::Path;

use crate::analysis::syntax::CompiledQuery;
use crate::analysis::traits::parse_with;
use crate::analysis::{FileContext, LanguageAnalyzer, ParsedFile};
use crate::error::AnalyzeError;
use crate::event::TrackingEvent;

use super::ecmascript::{self, Untyped, CALL_QUERY};

pub struct JavaScriptAnalyzer {
    calls: CompiledQuery,
}

impl JavaScriptAnalyzer {
    pub fn new() -> Self {
        Self {
            calls: CompiledQuery::new(tree_sitter_javascript::LANGUAGE.into(), CALL_QUERY),
        }
    }
}

impl Default for JavaScriptAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl LanguageAnalyzer for JavaScriptAnalyzer {
    fn language_id(&self) -> &'static str {
        "javascript"
    }

    fn file_extensions(&self) -> &'static [&'static str] {
        &["js", "jsx", "mjs", "cjs"]
    }

    fn parse(&self, path: &Path, source: &[u8]) -> Result<ParsedFile, AnalyzeError> {
        parse_with(self.calls.language(), path, source)
    }

    fn find_events(&self, parsed: &ParsedFile, ctx: &FileContext<'_>) -> Vec<TrackingEvent> {
        ecmascript::find_events(&self.calls, parsed, ctx.signatures, &Untyped)
    }
}
