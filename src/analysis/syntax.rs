//! Small tree-sitter helpers shared by the language backends.

use once_cell::sync::OnceCell;
use tracing::warn;
use tree_sitter::{Language, Node, Query};

/// A grammar plus one query against it, compiled on first use and reused for
/// every file the analyzer sees.
pub struct CompiledQuery {
    language: Language,
    source: &'static str,
    query: OnceCell<Option<Query>>,
}

impl CompiledQuery {
    pub fn new(language: Language, source: &'static str) -> Self {
        Self {
            language,
            source,
            query: OnceCell::new(),
        }
    }

    pub fn language(&self) -> &Language {
        &self.language
    }

    /// The compiled query, or `None` if it does not compile for this grammar.
    pub fn get(&self) -> Option<&Query> {
        self.query
            .get_or_init(|| match Query::new(&self.language, self.source) {
                Ok(query) => Some(query),
                Err(e) => {
                    warn!(error = %e, "failed to compile call query");
                    None
                }
            })
            .as_ref()
    }

    #[cfg(test)]
    pub(crate) fn is_compiled(&self) -> bool {
        self.query.get().is_some()
    }
}

/// Named children of `node`, without comments.
pub fn named_children<'t>(node: Node<'t>) -> Vec<Node<'t>> {
    let mut cursor = node.walk();
    node.named_children(&mut cursor)
        .filter(|n| n.kind() != "comment")
        .collect()
}

/// All children of `node`, named or not.
pub fn children<'t>(node: Node<'t>) -> Vec<Node<'t>> {
    let mut cursor = node.walk();
    node.children(&mut cursor).collect()
}

/// 1-based line of `node`.
pub fn line_of(node: Node) -> usize {
    node.start_position().row + 1
}

/// Whether `outer` fully contains `inner`.
pub fn contains(outer: Node, inner: Node) -> bool {
    outer.start_byte() <= inner.start_byte() && inner.end_byte() <= outer.end_byte()
}

/// Strip one pair of matching quotes.
pub fn unquote(text: &str) -> &str {
    for quote in ['"', '\'', '`'] {
        if text.len() >= 2 && text.starts_with(quote) && text.ends_with(quote) {
            return &text[1..text.len() - 1];
        }
    }
    text
}
