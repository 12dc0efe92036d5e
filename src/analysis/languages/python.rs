//! Python language analyzer using tree-sitter.
//!
//! Extraction itself is synchronous; during a scan it runs on the single
//! `PythonRuntime` worker, which owns the parser and the compiled query.

use std::collections::HashMap;
use std::path::Path;

use streaming_iterator::StreamingIterator;
use tracing::debug;
use tree_sitter::{Language, Node, Query, QueryCursor};

use crate::analysis::naming;
use crate::analysis::syntax::{contains, line_of, named_children, CompiledQuery};
use crate::analysis::traits::parse_with;
use crate::analysis::{FileContext, LanguageAnalyzer, ParsedFile};
use crate::error::AnalyzeError;
use crate::event::TrackingEvent;
use crate::providers::{self, Source};
use crate::schema::{infer_array_items, Properties, PropertySchema};
use crate::signature::{find_match, CustomSignature};

pub(crate) const CALL_QUERY: &str = "(call) @call";

const FUNCTION_KINDS: &[&str] = &["function_definition"];

pub(crate) fn python_language() -> Language {
    tree_sitter_python::LANGUAGE.into()
}

pub struct PythonAnalyzer {
    calls: CompiledQuery,
}

impl PythonAnalyzer {
    pub fn new() -> Self {
        Self {
            calls: CompiledQuery::new(python_language(), CALL_QUERY),
        }
    }
}

impl Default for PythonAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl LanguageAnalyzer for PythonAnalyzer {
    fn language_id(&self) -> &'static str {
        "python"
    }

    fn file_extensions(&self) -> &'static [&'static str] {
        &["py"]
    }

    fn parse(&self, path: &Path, source: &[u8]) -> Result<ParsedFile, AnalyzeError> {
        parse_with(self.calls.language(), path, source)
    }

    fn find_events(&self, parsed: &ParsedFile, ctx: &FileContext<'_>) -> Vec<TrackingEvent> {
        match self.calls.get() {
            Some(query) => extract_events(query, parsed, ctx.signatures),
            None => Vec::new(),
        }
    }
}

/// Run the call query over `file` and collect tracking events.
pub(crate) fn extract_events(
    query: &Query,
    file: &ParsedFile,
    signatures: &[CustomSignature],
) -> Vec<TrackingEvent> {
    let scope = PyScope::new(file);
    let mut cursor = QueryCursor::new();
    let mut matches = cursor.matches(query, file.tree.root_node(), &file.source[..]);
    let mut events = Vec::new();
    while let Some(m) = matches.next() {
        for capture in m.captures {
            if let Some(event) = scope.inspect_call(capture.node, signatures) {
                events.push(event);
            }
        }
    }
    events
}

#[derive(Clone, Copy)]
struct Binding<'t> {
    value: Option<Node<'t>>,
    annotation: Option<Node<'t>>,
    scope: Node<'t>,
    start: usize,
}

/// Call arguments split into positional and keyword parts.
struct Arguments<'t> {
    positional: Vec<Node<'t>>,
    keywords: Vec<(&'t str, Node<'t>)>,
}

impl<'t> Arguments<'t> {
    fn of(file: &'t ParsedFile, call: Node<'t>) -> Self {
        let mut positional = Vec::new();
        let mut keywords = Vec::new();
        if let Some(list) = call.child_by_field_name("arguments") {
            for arg in named_children(list) {
                match arg.kind() {
                    "keyword_argument" => {
                        if let (Some(name), Some(value)) =
                            (file.field_text(arg, "name"), arg.child_by_field_name("value"))
                        {
                            keywords.push((name, value));
                        }
                    }
                    "list_splat" | "dictionary_splat" => {}
                    _ => positional.push(arg),
                }
            }
        }
        Self {
            positional,
            keywords,
        }
    }

    fn keyword(&self, name: &str) -> Option<Node<'t>> {
        self.keywords
            .iter()
            .find(|(k, _)| *k == name)
            .map(|(_, v)| *v)
    }

    /// Keyword `name`, else the positional argument at `index`.
    fn get(&self, index: usize, name: &str) -> Option<Node<'t>> {
        self.keyword(name)
            .or_else(|| self.positional.get(index).copied())
    }
}

/// Literal text of a plain (non-interpolated) string.
fn py_string(file: &ParsedFile, node: Node) -> Option<String> {
    if node.kind() != "string" {
        return None;
    }
    if named_children(node)
        .iter()
        .any(|c| c.kind() == "interpolation")
    {
        return None;
    }
    let text = file.node_text(node);
    let body = text.trim_start_matches(|c: char| c.is_ascii_alphabetic());
    for quote in ["\"\"\"", "'''", "\"", "'"] {
        if body.len() >= 2 * quote.len() && body.starts_with(quote) && body.ends_with(quote) {
            return Some(body[quote.len()..body.len() - quote.len()].to_string());
        }
    }
    None
}

fn segments(file: &ParsedFile, node: Node) -> Option<Vec<String>> {
    match node.kind() {
        "identifier" => Some(vec![file.node_text(node).to_string()]),
        "attribute" => {
            let mut path = segments(file, node.child_by_field_name("object")?)?;
            path.push(file.field_text(node, "attribute")?.to_string());
            Some(path)
        }
        _ => None,
    }
}

/// Schema for a type annotation written as text (`list[str]`, `Optional[int]`).
pub(crate) fn annotation_schema(annotation: &str) -> PropertySchema {
    let annotation = annotation.trim();
    let (head, inner) = match annotation.split_once('[') {
        Some((head, rest)) => (head.trim(), rest.strip_suffix(']').map(str::trim)),
        None => (annotation, None),
    };
    match head {
        "str" => PropertySchema::string(),
        "int" | "float" => PropertySchema::number(),
        "bool" => PropertySchema::boolean(),
        "None" => PropertySchema::null(),
        "list" | "List" | "set" | "Set" | "tuple" | "Tuple" | "Sequence" => PropertySchema::array(
            inner
                .map(|i| annotation_schema(i.split(',').next().unwrap_or(i)))
                .unwrap_or_else(PropertySchema::any),
        ),
        "dict" | "Dict" | "Mapping" => PropertySchema::object(Properties::new()),
        "Optional" => inner.map(annotation_schema).unwrap_or_else(PropertySchema::any),
        _ => PropertySchema::any(),
    }
}

fn is_scope(kind: &str) -> bool {
    kind == "module" || kind == "function_definition" || kind == "lambda"
}

/// Assignments, parameters and module/class constants of one file.
struct PyScope<'t> {
    file: &'t ParsedFile,
    bindings: HashMap<&'t str, Vec<Binding<'t>>>,
    /// `NAME` and `Class.NAME` at module level.
    constants: HashMap<String, Node<'t>>,
}

impl<'t> PyScope<'t> {
    fn new(file: &'t ParsedFile) -> Self {
        let mut scope = PyScope {
            file,
            bindings: HashMap::new(),
            constants: HashMap::new(),
        };
        let root = file.tree.root_node();
        let mut stack = vec![root];
        while let Some(node) = stack.pop() {
            match node.kind() {
                "assignment" => scope.index_assignment(node, root),
                "function_definition" => scope.index_parameters(node),
                _ => {}
            }
            stack.extend(named_children(node).into_iter().rev());
        }
        scope
    }

    fn enclosing_scope(node: Node<'t>, root: Node<'t>) -> Node<'t> {
        let mut current = node.parent();
        while let Some(n) = current {
            if is_scope(n.kind()) {
                return n;
            }
            current = n.parent();
        }
        root
    }

    /// Class owning an assignment written directly in its body.
    fn owning_class(&self, assignment: Node<'t>) -> Option<&'t str> {
        let statement = assignment.parent()?;
        let block = statement.parent()?;
        let class = block.parent()?;
        (statement.kind() == "expression_statement"
            && block.kind() == "block"
            && class.kind() == "class_definition")
            .then(|| self.file.field_text(class, "name"))
            .flatten()
    }

    fn index_assignment(&mut self, node: Node<'t>, root: Node<'t>) {
        let Some(left) = node.child_by_field_name("left").filter(|l| l.kind() == "identifier")
        else {
            return;
        };
        let name = self.file.node_text(left);
        let value = node.child_by_field_name("right");
        let scope = Self::enclosing_scope(node, root);

        if let Some(class) = self.owning_class(node) {
            if let Some(value) = value {
                self.constants.insert(format!("{}.{}", class, name), value);
            }
            return;
        }
        if scope.kind() == "module" {
            if let Some(value) = value {
                self.constants.insert(name.to_string(), value);
            }
        }
        self.bindings.entry(name).or_default().push(Binding {
            value,
            annotation: node.child_by_field_name("type"),
            scope,
            start: node.start_byte(),
        });
    }

    fn index_parameters(&mut self, function: Node<'t>) {
        let Some(params) = function.child_by_field_name("parameters") else {
            return;
        };
        for param in named_children(params) {
            let (name, annotation) = match param.kind() {
                "identifier" => (Some(param), None),
                "typed_parameter" => (
                    named_children(param)
                        .into_iter()
                        .find(|c| c.kind() == "identifier"),
                    param.child_by_field_name("type"),
                ),
                "default_parameter" | "typed_default_parameter" => (
                    param.child_by_field_name("name"),
                    param.child_by_field_name("type"),
                ),
                _ => continue,
            };
            let Some(name) = name else { continue };
            self.bindings
                .entry(self.file.node_text(name))
                .or_default()
                .push(Binding {
                    value: None,
                    annotation,
                    scope: function,
                    start: param.start_byte(),
                });
        }
    }

    fn lookup(&self, name: &str, at: Node<'t>) -> Option<Binding<'t>> {
        self.bindings
            .get(name)?
            .iter()
            .filter(|b| contains(b.scope, at) && b.start <= at.start_byte())
            .min_by_key(|b| (b.scope.end_byte() - b.scope.start_byte(), usize::MAX - b.start))
            .copied()
    }

    fn event_name(&self, node: Node<'t>) -> Option<String> {
        if let Some(literal) = py_string(self.file, node) {
            return Some(literal);
        }
        let value = match node.kind() {
            "identifier" => {
                let name = self.file.node_text(node);
                match self.lookup(name, node).and_then(|b| b.value) {
                    Some(value) => value,
                    None => *self.constants.get(name)?,
                }
            }
            "attribute" => {
                let path = segments(self.file, node)?.join(".");
                *self.constants.get(&path)?
            }
            _ => return None,
        };
        py_string(self.file, value)
    }

    fn value_schema(&self, node: Node<'t>, depth: usize) -> PropertySchema {
        if depth > 8 {
            return PropertySchema::any();
        }
        match node.kind() {
            "string" | "concatenated_string" => PropertySchema::string(),
            "integer" | "float" => PropertySchema::number(),
            "true" | "false" | "comparison_operator" | "not_operator" => {
                PropertySchema::boolean()
            }
            "none" => PropertySchema::null(),
            "dictionary" => PropertySchema::object(self.dict_fields(node, depth + 1)),
            "list" | "tuple" | "set" => {
                let items = named_children(node)
                    .into_iter()
                    .map(|c| self.value_schema(c, depth + 1))
                    .collect();
                PropertySchema::array(infer_array_items(items))
            }
            "unary_operator" => PropertySchema::number(),
            "parenthesized_expression" => node
                .named_child(0)
                .map(|inner| self.value_schema(inner, depth + 1))
                .unwrap_or_else(PropertySchema::any),
            "identifier" => match self.lookup(self.file.node_text(node), node) {
                Some(Binding {
                    annotation: Some(annotation),
                    ..
                }) => annotation_schema(self.file.node_text(annotation)),
                Some(Binding {
                    value: Some(value), ..
                }) => self.value_schema(value, depth + 1),
                _ => match self.event_name(node) {
                    Some(_) => PropertySchema::string(),
                    None => PropertySchema::any(),
                },
            },
            "attribute" => match self.event_name(node) {
                Some(_) => PropertySchema::string(),
                None => PropertySchema::any(),
            },
            "call" => match self.dict_call_fields(node, depth + 1) {
                Some(fields) => PropertySchema::object(fields),
                None => PropertySchema::any(),
            },
            _ => PropertySchema::any(),
        }
    }

    /// Fields of `dict(...)`: a leading mapping literal, then keyword arguments.
    fn dict_call_fields(&self, call: Node<'t>, depth: usize) -> Option<Properties> {
        let function = call.child_by_field_name("function")?;
        if function.kind() != "identifier" || self.file.node_text(function) != "dict" {
            return None;
        }
        let args = Arguments::of(self.file, call);
        let mut fields = match args.positional.first() {
            Some(first) if first.kind() == "dictionary" => self.dict_fields(*first, depth),
            _ => Properties::new(),
        };
        for (name, value) in &args.keywords {
            fields.insert(name.to_string(), self.value_schema(*value, depth));
        }
        Some(fields)
    }

    /// Fields of a dict literal or `dict(...)` call.
    fn mapping_fields(&self, node: Node<'t>) -> Option<Properties> {
        match node.kind() {
            "dictionary" => Some(self.dict_fields(node, 0)),
            "call" => self.dict_call_fields(node, 0),
            _ => None,
        }
    }

    fn dict_fields(&self, node: Node<'t>, depth: usize) -> Properties {
        let mut fields = Properties::new();
        for pair in named_children(node)
            .into_iter()
            .filter(|p| p.kind() == "pair")
        {
            let Some(key) = pair
                .child_by_field_name("key")
                .and_then(|k| py_string(self.file, k))
            else {
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

    fn properties(&self, node: Option<Node<'t>>) -> Properties {
        let Some(node) = node else {
            return Properties::new();
        };
        match node.kind() {
            "dictionary" | "call" => self.mapping_fields(node).unwrap_or_default(),
            "identifier" => {
                let bound = self
                    .lookup(self.file.node_text(node), node)
                    .and_then(|b| b.value)
                    .and_then(|v| self.mapping_fields(v));
                match bound {
                    Some(fields) => fields,
                    None => {
                        debug!(
                            path = %self.file.path.display(),
                            line = line_of(node),
                            "unresolved properties argument"
                        );
                        Properties::new()
                    }
                }
            }
            _ => Properties::new(),
        }
    }

    /// Every keyword argument except `skip`, as properties.
    fn keyword_properties(&self, args: &Arguments<'t>, skip: &str) -> Properties {
        args.keywords
            .iter()
            .filter(|(name, _)| *name != skip)
            .map(|(name, value)| (name.to_string(), self.value_schema(*value, 0)))
            .collect()
    }

    fn inspect_call(&self, call: Node<'t>, signatures: &[CustomSignature]) -> Option<TrackingEvent> {
        let callee = segments(self.file, call.child_by_field_name("function")?)?;
        let args = Arguments::of(self.file, call);

        if let Some(signature) = find_match(signatures, &callee) {
            return self.custom_event(call, signature, &args);
        }

        // `client.track(BaseEvent(...))` and `tracker.track(StructuredEvent(...))`
        // are recognized by their payload, whatever the receiver is called.
        if callee.last().map(String::as_str) == Some("track") {
            if let Some(event) = self.payload_event(call, &args) {
                return Some(event);
            }
        }

        let source = providers::PYTHON.lookup(&callee)?;
        let (name, properties) = match source {
            Source::Snowplow => (
                self.event_name(args.keyword("action")?)?,
                self.keyword_properties(&args, "action"),
            ),
            Source::Posthog => {
                let event = args.keyword("event").or_else(|| {
                    let index = if args.positional.len() >= 2 { 1 } else { 0 };
                    args.positional.get(index).copied()
                })?;
                (
                    self.event_name(event)?,
                    self.properties(args.get(2, "properties")),
                )
            }
            Source::Mixpanel => (
                self.event_name(args.get(1, "event_name")?)?,
                self.properties(args.get(2, "properties")),
            ),
            _ => (
                self.event_name(args.get(1, "event")?)?,
                self.properties(args.get(2, "properties")),
            ),
        };
        Some(self.event(call, name, source, properties))
    }

    fn payload_event(&self, call: Node<'t>, args: &Arguments<'t>) -> Option<TrackingEvent> {
        let payload = *args.positional.first()?;
        if payload.kind() != "call" {
            return None;
        }
        let constructor = segments(self.file, payload.child_by_field_name("function")?)?;
        let inner = Arguments::of(self.file, payload);
        match constructor.last()?.as_str() {
            "BaseEvent" => {
                let name = self.event_name(inner.get(0, "event_type")?)?;
                let properties = self.properties(inner.keyword("event_properties"));
                Some(self.event(call, name, Source::Amplitude, properties))
            }
            "StructuredEvent" => {
                let name = self.event_name(inner.keyword("action")?)?;
                let properties = self.keyword_properties(&inner, "action");
                Some(self.event(call, name, Source::Snowplow, properties))
            }
            _ => None,
        }
    }

    fn custom_event(
        &self,
        call: Node<'t>,
        signature: &CustomSignature,
        args: &Arguments<'t>,
    ) -> Option<TrackingEvent> {
        let name = self.event_name(*args.positional.get(signature.event_index)?)?;
        let mut properties = self.properties(args.positional.get(signature.properties_index).copied());
        for extra in &signature.extra_params {
            if let Some(arg) = args.positional.get(extra.index) {
                properties.insert(extra.name.clone(), self.value_schema(*arg, 0));
            }
        }
        Some(self.event(call, name, Source::Custom, properties))
    }

    fn event(&self, call: Node<'t>, name: String, source: Source, properties: Properties) -> TrackingEvent {
        TrackingEvent {
            event_name: name,
            source,
            properties,
            file_path: self.file.path.clone(),
            line: line_of(call),
            function_name: naming::enclosing_named(self.file, call, FUNCTION_KINDS),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn events_with(source: &str, signatures: &[CustomSignature]) -> Vec<TrackingEvent> {
        let analyzer = PythonAnalyzer::new();
        let parsed = analyzer
            .parse(Path::new("main.py"), source.as_bytes())
            .unwrap();
        analyzer.find_events(&parsed, &FileContext::new(signatures))
    }

    fn events(source: &str) -> Vec<TrackingEvent> {
        events_with(source, &[])
    }

    #[test]
    fn test_segment_and_mixpanel_with_annotations() {
        let found = events(
            r#"
def segment_track(user_id: str, plan: str) -> None:
    analytics.track(user_id, "User Signed Up", {
        "method": "email",
        "is_free_trial": True,
        "plan": plan,
    })

def mixpanel_track(distinct_id: str, price: float, items: List[str]) -> None:
    mp.track(distinct_id, 'Purchase Completed', {'price': price, 'items': items, 'n': None})
"#,
        );
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].event_name, "User Signed Up");
        assert_eq!(found[0].source, Source::Segment);
        assert_eq!(found[0].function_name, "segment_track");
        assert_eq!(found[0].line, 3);
        assert_eq!(found[0].properties["is_free_trial"], PropertySchema::boolean());
        assert_eq!(found[0].properties["plan"], PropertySchema::string());

        assert_eq!(found[1].source, Source::Mixpanel);
        assert_eq!(found[1].properties["price"], PropertySchema::number());
        assert_eq!(
            found[1].properties["items"],
            PropertySchema::array(PropertySchema::string())
        );
        assert_eq!(found[1].properties["n"], PropertySchema::null());
    }

    #[test]
    fn test_payload_constructors() {
        let found = events(
            r#"
def amplitude_track(user_id: str, size: int) -> None:
    client.track(BaseEvent(event_type="Button Clicked", user_id=user_id,
                           event_properties={"color": "red", "size": size}))

def snowplow_track(category: str, value: float) -> None:
    tracker.track(StructuredEvent(action="add-to-basket", category=category, value=value))
    tracker.track_struct_event(action="remove", label="x")
"#,
        );
        assert_eq!(found.len(), 3);
        assert_eq!(found[0].source, Source::Amplitude);
        assert_eq!(found[0].properties["size"], PropertySchema::number());
        assert_eq!(found[1].event_name, "add-to-basket");
        assert_eq!(found[1].source, Source::Snowplow);
        assert_eq!(found[1].properties["category"], PropertySchema::string());
        assert!(!found[1].properties.contains_key("action"));
        assert_eq!(found[2].event_name, "remove");
        assert_eq!(found[2].properties["label"], PropertySchema::string());
    }

    #[test]
    fn test_posthog_positional_and_keyword_forms() {
        let found = events(
            r#"
def capture(distinct_id, method):
    posthog.capture(distinct_id, "user_signed_up", {"method": method})
    posthog.capture(distinct_id, event="user_cancelled", properties={"plan": "pro"})
"#,
        );
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].event_name, "user_signed_up");
        assert!(found[0].properties["method"].is_any());
        assert_eq!(found[1].event_name, "user_cancelled");
        assert_eq!(found[1].properties["plan"], PropertySchema::string());
    }

    #[test]
    fn test_constants_and_local_dicts() {
        let found = events(
            r#"
SIGNUP = "Signed Up"

class Events:
    LOGIN = 'Logged In'

def run(user_id):
    props = {"count": 1}
    analytics.track(user_id, SIGNUP, props)
    analytics.track(user_id, Events.LOGIN)
    analytics.track(user_id, f"dynamic {user_id}")
"#,
        );
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].event_name, "Signed Up");
        assert_eq!(found[0].properties["count"], PropertySchema::number());
        assert_eq!(found[1].event_name, "Logged In");
        assert_eq!(found[1].function_name, "run");
    }

    #[test]
    fn test_custom_signatures() {
        let signatures = vec![
            "customTrackFunction4(userId, EVENT_NAME, userAddress, PROPERTIES, userEmail)"
                .parse::<CustomSignature>()
                .unwrap(),
            "CustomModule.track(userId, EVENT_NAME, PROPERTIES)"
                .parse::<CustomSignature>()
                .unwrap(),
        ];
        let found = events_with(
            r#"
customTrackFunction4("user202", "custom_event4", {"city": "SF"}, {"foo": "bar"}, "a@b.c")
CustomModule.track("user444", "custom_module_event", {"order_id": "x"})
"#,
            &signatures,
        );
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].function_name, "global");
        assert_eq!(found[0].properties["foo"], PropertySchema::string());
        assert_eq!(found[0].properties["userEmail"], PropertySchema::string());
        match &found[0].properties["userAddress"] {
            PropertySchema::Object { fields } => {
                assert_eq!(fields["city"], PropertySchema::string())
            }
            other => panic!("expected object, got {:?}", other),
        }
        assert_eq!(found[1].source, Source::Custom);
        assert_eq!(found[1].event_name, "custom_module_event");
    }

    #[test]
    fn test_dict_constructor_properties() {
        let found = events(
            r#"
SIGN = "Py Const"

def report(user_id, total: float):
    analytics.track(user_id, SIGN, dict(a=1, b="x"))
    props = dict({"source": "web"}, total=total, meta=dict(ok=True))
    analytics.track(user_id, "Reported", props)
"#,
        );
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].event_name, "Py Const");
        assert_eq!(found[0].properties["a"], PropertySchema::number());
        assert_eq!(found[0].properties["b"], PropertySchema::string());

        let props = &found[1].properties;
        assert_eq!(props["source"], PropertySchema::string());
        assert_eq!(props["total"], PropertySchema::number());
        match &props["meta"] {
            PropertySchema::Object { fields } => {
                assert_eq!(fields["ok"], PropertySchema::boolean())
            }
            other => panic!("expected object, got {:?}", other),
        }
    }

    #[test]
    fn test_annotation_schema() {
        assert_eq!(annotation_schema("Optional[int]"), PropertySchema::number());
        assert_eq!(
            annotation_schema("list[bool]"),
            PropertySchema::array(PropertySchema::boolean())
        );
        assert!(annotation_schema("Any").is_any());
    }
}
