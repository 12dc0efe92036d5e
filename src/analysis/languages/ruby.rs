//! Ruby language analyzer using tree-sitter.
//!
//! The walk is bounded: structural nodes count toward a depth ceiling and a
//! set of ancestor ids stops any revisit along the current path.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use tracing::debug;
use tree_sitter::{Language, Node};

use crate::analysis::naming;
use crate::analysis::syntax::{line_of, named_children, unquote};
use crate::analysis::traits::parse_with;
use crate::analysis::{FileContext, LanguageAnalyzer, ParsedFile};
use crate::error::AnalyzeError;
use crate::event::TrackingEvent;
use crate::providers::{self, Source};
use crate::schema::{infer_array_items, Properties, PropertySchema};
use crate::signature::{find_match, CustomSignature};

use super::ruby_constants::{string_literal, RubyConstantIndex};

/// Deepest structural nesting the walk descends into.
pub const MAX_DEPTH: usize = 20;

pub(crate) fn ruby_language() -> Language {
    tree_sitter_ruby::LANGUAGE.into()
}

fn is_structural(kind: &str) -> bool {
    matches!(
        kind,
        "class"
            | "module"
            | "singleton_class"
            | "method"
            | "singleton_method"
            | "block"
            | "do_block"
            | "lambda"
            | "if"
            | "unless"
            | "elsif"
            | "case"
            | "when"
            | "while"
            | "until"
            | "for"
            | "begin"
            | "rescue"
            | "ensure"
            | "call"
    )
}

pub struct RubyAnalyzer {
    language: Language,
}

impl RubyAnalyzer {
    pub fn new() -> Self {
        Self {
            language: ruby_language(),
        }
    }
}

impl Default for RubyAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl LanguageAnalyzer for RubyAnalyzer {
    fn language_id(&self) -> &'static str {
        "ruby"
    }

    fn file_extensions(&self) -> &'static [&'static str] {
        &["rb"]
    }

    fn parse(&self, path: &Path, source: &[u8]) -> Result<ParsedFile, AnalyzeError> {
        parse_with(&self.language, path, source)
    }

    fn find_events(&self, parsed: &ParsedFile, ctx: &FileContext<'_>) -> Vec<TrackingEvent> {
        let visitor = Visitor::new(parsed, ctx);
        let mut events = Vec::new();
        let mut ancestors = HashSet::new();
        visitor.visit(parsed.tree.root_node(), 0, &mut ancestors, &mut events);
        events
    }
}

fn segments(file: &ParsedFile, node: Node) -> Option<Vec<String>> {
    match node.kind() {
        "constant" | "identifier" => Some(vec![file.node_text(node).to_string()]),
        "scope_resolution" => {
            let mut path = match node.child_by_field_name("scope") {
                Some(scope) => segments(file, scope)?,
                None => Vec::new(),
            };
            path.push(file.field_text(node, "name")?.to_string());
            Some(path)
        }
        "call" => {
            let mut path = match node.child_by_field_name("receiver") {
                Some(receiver) => segments(file, receiver)?,
                None => Vec::new(),
            };
            path.push(file.field_text(node, "method")?.to_string());
            Some(path)
        }
        _ => None,
    }
}

/// Key of a hash pair: `key:`, `:key =>` or `'key' =>`.
fn pair_key(file: &ParsedFile, pair: Node) -> Option<String> {
    let key = pair.child_by_field_name("key")?;
    let text = file.node_text(key);
    match key.kind() {
        "hash_key_symbol" | "identifier" | "constant" => Some(text.to_string()),
        "simple_symbol" => Some(text.trim_start_matches(':').to_string()),
        "string" => Some(unquote(text).to_string()),
        _ => None,
    }
}

struct Visitor<'t, 'c> {
    file: &'t ParsedFile,
    signatures: &'c [CustomSignature],
    constants: Option<&'c RubyConstantIndex>,
    local_constants: HashMap<String, String>,
    /// Local variables assigned a hash (or `hash.compact` / `hash.freeze`).
    hashes: HashMap<&'t str, Vec<Node<'t>>>,
}

impl<'t, 'c> Visitor<'t, 'c> {
    fn new(file: &'t ParsedFile, ctx: &FileContext<'c>) -> Self {
        let mut hashes: HashMap<&'t str, Vec<Node<'t>>> = HashMap::new();
        let mut stack = vec![file.tree.root_node()];
        while let Some(node) = stack.pop() {
            if node.kind() == "assignment" {
                let left = node.child_by_field_name("left");
                let right = node.child_by_field_name("right").and_then(|r| Self::hash_of(file, r));
                if let (Some(left), Some(hash)) = (left, right) {
                    if left.kind() == "identifier" {
                        hashes.entry(file.node_text(left)).or_default().push(hash);
                    }
                }
            }
            stack.extend(named_children(node));
        }

        Self {
            file,
            signatures: ctx.signatures,
            constants: ctx.ruby_constants,
            local_constants: super::ruby_constants::constants_in(file),
            hashes,
        }
    }

    /// The hash literal `node` evaluates to, seeing through `.compact` and `.freeze`.
    fn hash_of(file: &ParsedFile, node: Node<'t>) -> Option<Node<'t>> {
        match node.kind() {
            "hash" => Some(node),
            "call" => match file.field_text(node, "method")? {
                "compact" | "compact!" | "freeze" => {
                    Self::hash_of(file, node.child_by_field_name("receiver")?)
                }
                _ => None,
            },
            "parenthesized_statements" => Self::hash_of(file, node.named_child(0)?),
            _ => None,
        }
    }

    fn visit(
        &self,
        node: Node<'t>,
        depth: usize,
        ancestors: &mut HashSet<usize>,
        out: &mut Vec<TrackingEvent>,
    ) {
        if depth > MAX_DEPTH || !ancestors.insert(node.id()) {
            return;
        }
        if node.kind() == "call" {
            if let Some(event) = self.inspect_call(node) {
                out.push(event);
            }
        }
        let next = if is_structural(node.kind()) {
            depth + 1
        } else {
            depth
        };
        for child in named_children(node) {
            self.visit(child, next, ancestors, out);
        }
        ancestors.remove(&node.id());
    }

    /// Module/class names enclosing `node`, outermost first.
    fn nesting(&self, node: Node<'t>) -> Vec<String> {
        let mut names = Vec::new();
        let mut current = node.parent();
        while let Some(n) = current {
            if matches!(n.kind(), "module" | "class") {
                if let Some(name) = self.file.field_text(n, "name") {
                    names.push(name.trim_start_matches("::").to_string());
                }
            }
            current = n.parent();
        }
        names.reverse();
        names
    }

    fn constant_value(&self, node: Node<'t>) -> Option<String> {
        let name = self.file.node_text(node);
        let nesting = self.nesting(node);
        if let Some(index) = self.constants {
            let dir = self.file.path.parent().unwrap_or_else(|| Path::new(""));
            if let Some(value) = index.resolve(dir, name, &nesting) {
                return Some(value.to_string());
            }
        }
        (0..=nesting.len()).rev().find_map(|depth| {
            let mut parts = nesting[..depth].to_vec();
            parts.push(name.trim_start_matches("::").to_string());
            self.local_constants.get(&parts.join("::")).cloned()
        })
    }

    fn event_name(&self, node: Node<'t>) -> Option<String> {
        if let Some(literal) = string_literal(self.file, node) {
            return Some(literal);
        }
        let name = match node.kind() {
            "constant" | "scope_resolution" => self.constant_value(node),
            _ => None,
        };
        if name.is_none() {
            debug!(
                path = %self.file.path.display(),
                line = line_of(node),
                expr = self.file.node_text(node),
                "unresolved ruby event name"
            );
        }
        name
    }

    fn value_schema(&self, node: Node<'t>, depth: usize) -> PropertySchema {
        if depth > MAX_DEPTH {
            return PropertySchema::any();
        }
        match node.kind() {
            "string" | "simple_symbol" | "delimited_symbol" | "heredoc_beginning" => {
                PropertySchema::string()
            }
            "integer" | "float" | "rational" => PropertySchema::number(),
            "true" | "false" => PropertySchema::boolean(),
            "nil" => PropertySchema::null(),
            "hash" => PropertySchema::object(self.hash_fields(node, depth + 1)),
            "array" => {
                let items = named_children(node)
                    .into_iter()
                    .map(|c| self.value_schema(c, depth + 1))
                    .collect();
                PropertySchema::array(infer_array_items(items))
            }
            "unary" if self.file.field_text(node, "operator") == Some("!") => {
                PropertySchema::boolean()
            }
            "unary" => PropertySchema::number(),
            "constant" | "scope_resolution" => match self.constant_value(node) {
                Some(_) => PropertySchema::string(),
                None => PropertySchema::any(),
            },
            "call" => match Self::hash_of(self.file, node) {
                Some(hash) => PropertySchema::object(self.hash_fields(hash, depth + 1)),
                None => match string_literal(self.file, node) {
                    Some(_) => PropertySchema::string(),
                    None => PropertySchema::any(),
                },
            },
            _ => PropertySchema::any(),
        }
    }

    fn pairs_fields(&self, pairs: &[Node<'t>], depth: usize) -> Properties {
        let mut fields = Properties::new();
        for pair in pairs.iter().filter(|p| p.kind() == "pair") {
            let Some(key) = pair_key(self.file, *pair) else {
                continue;
            };
            let schema = pair
                .child_by_field_name("value")
                .map(|v| self.value_schema(v, depth))
                .unwrap_or_else(PropertySchema::any);
            fields.insert(key, schema);
        }
        fields
    }

    fn hash_fields(&self, hash: Node<'t>, depth: usize) -> Properties {
        self.pairs_fields(&named_children(hash), depth)
    }

    /// Hash literal behind an argument, resolving local variables.
    fn resolve_hash(&self, node: Node<'t>) -> Option<Node<'t>> {
        if let Some(hash) = Self::hash_of(self.file, node) {
            return Some(hash);
        }
        if node.kind() != "identifier" {
            return None;
        }
        self.hashes
            .get(self.file.node_text(node))?
            .iter()
            .filter(|h| h.start_byte() < node.start_byte())
            .last()
            .copied()
    }

    fn properties(&self, node: Option<Node<'t>>) -> Properties {
        let Some(node) = node else {
            return Properties::new();
        };
        match self.resolve_hash(node) {
            Some(hash) => self.hash_fields(hash, 0),
            None => {
                debug!(
                    path = %self.file.path.display(),
                    line = line_of(node),
                    "unresolved ruby properties argument"
                );
                Properties::new()
            }
        }
    }

    fn inspect_call(&self, call: Node<'t>) -> Option<TrackingEvent> {
        let callee = segments(self.file, call)?;
        let args: Vec<Node<'t>> = call
            .child_by_field_name("arguments")
            .map(named_children)
            .unwrap_or_default();
        let positional: Vec<Node<'t>> = args
            .iter()
            .copied()
            .filter(|a| a.kind() != "pair" && a.kind() != "block_argument")
            .collect();

        if let Some(signature) = find_match(self.signatures, &callee) {
            return self.custom_event(call, signature, &positional);
        }

        let source = providers::RUBY.lookup(&callee)?;
        let (name, properties) = match source {
            Source::Segment | Source::Rudderstack => {
                let keywords = self.keyword_arguments(&args)?;
                self.keyword_event(&keywords, "event", "properties", &["user_id", "anonymous_id"])?
            }
            Source::Posthog => {
                let keywords = self.keyword_arguments(&args)?;
                self.keyword_event(&keywords, "event", "properties", &["distinct_id"])?
            }
            Source::Mixpanel => {
                let name = self.event_name(*positional.get(1)?)?;
                let mut properties = self.properties(positional.get(2).copied());
                if let Some(id) = positional.first() {
                    properties.insert("distinct_id".into(), self.value_schema(*id, 0));
                }
                (name, properties)
            }
            Source::Amplitude => {
                let event = positional
                    .first()
                    .copied()
                    .filter(|p| p.kind() == "call")?;
                let constructor = segments(self.file, event)?;
                if constructor.last().map(String::as_str) != Some("new") {
                    return None;
                }
                let inner: Vec<Node<'t>> = event
                    .child_by_field_name("arguments")
                    .map(named_children)
                    .unwrap_or_default();
                let keywords = self.keyword_arguments(&inner)?;
                self.keyword_event(&keywords, "event_type", "event_properties", &["user_id"])?
            }
            Source::Snowplow => {
                let keywords = self.keyword_arguments(&args)?;
                let (_, action) = keywords.iter().find(|(k, _)| k == "action")?;
                let name = self.event_name(*action)?;
                let properties = keywords
                    .iter()
                    .filter(|(k, _)| k != "action")
                    .map(|(k, v)| (k.clone(), self.value_schema(*v, 0)))
                    .collect();
                (name, properties)
            }
            _ => return None,
        };

        Some(self.event(call, name, source, properties))
    }

    /// `key: value` pairs passed directly or as a single hash argument.
    fn keyword_arguments(&self, args: &[Node<'t>]) -> Option<Vec<(String, Node<'t>)>> {
        let pairs: Vec<Node<'t>> = match args.iter().find(|a| a.kind() == "pair") {
            Some(_) => args.to_vec(),
            None => named_children(self.resolve_hash(*args.first()?)?),
        };
        Some(
            pairs
                .into_iter()
                .filter(|p| p.kind() == "pair")
                .filter_map(|p| Some((pair_key(self.file, p)?, p.child_by_field_name("value")?)))
                .collect(),
        )
    }

    fn keyword_event(
        &self,
        keywords: &[(String, Node<'t>)],
        event_key: &str,
        properties_key: &str,
        identity_keys: &[&str],
    ) -> Option<(String, Properties)> {
        let get = |key: &str| keywords.iter().find(|(k, _)| k == key).map(|(_, v)| *v);
        let name = self.event_name(get(event_key)?)?;
        let mut properties = Properties::new();
        for key in identity_keys {
            if let Some(value) = get(key) {
                properties.insert(key.to_string(), self.value_schema(value, 0));
            }
        }
        properties.extend(self.properties(get(properties_key)));
        Some((name, properties))
    }

    fn custom_event(
        &self,
        call: Node<'t>,
        signature: &CustomSignature,
        positional: &[Node<'t>],
    ) -> Option<TrackingEvent> {
        let name = self.event_name(*positional.get(signature.event_index)?)?;
        let mut properties = Properties::new();
        for extra in &signature.extra_params {
            if let Some(arg) = positional.get(extra.index) {
                properties.insert(extra.name.clone(), self.value_schema(*arg, 0));
            }
        }
        properties.extend(self.properties(positional.get(signature.properties_index).copied()));
        Some(self.event(call, name, Source::Custom, properties))
    }

    fn event(&self, call: Node<'t>, name: String, source: Source, properties: Properties) -> TrackingEvent {
        TrackingEvent {
            event_name: name,
            source,
            properties,
            file_path: self.file.path.clone(),
            line: line_of(call),
            function_name: naming::ruby_context(self.file, call),
        }
    }
}
