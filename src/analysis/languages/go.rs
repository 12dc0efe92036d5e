//! Go language analyzer using tree-sitter.
//!
//! The syntax tree is first lowered into a flat list of `GoNode`
//! declarations (functions, methods, package vars and consts) together with
//! a type context per function. Call detection then runs over that shape:
//! every call belongs to exactly one declaration, which names its context.

use std::collections::HashMap;
use std::path::Path;

use streaming_iterator::StreamingIterator;
use tracing::debug;
use tree_sitter::{Node, QueryCursor};

use crate::analysis::naming::GLOBAL;
use crate::analysis::syntax::{contains, line_of, named_children, unquote, CompiledQuery};
use crate::analysis::traits::parse_with;
use crate::analysis::{FileContext, LanguageAnalyzer, ParsedFile};
use crate::error::AnalyzeError;
use crate::event::TrackingEvent;
use crate::providers::{self, Source};
use crate::schema::{infer_array_items, merge_properties, Properties, PropertySchema};
use crate::signature::{find_match, CustomSignature};

const CALL_QUERY: &str = "(call_expression) @call";

const MAX_RESOLVE_DEPTH: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GoTag {
    Func,
    Var,
    Const,
}

/// One top-level declaration.
#[derive(Debug, Clone)]
pub struct GoNode<'t> {
    pub tag: GoTag,
    pub name: String,
    pub body: Node<'t>,
}

#[derive(Clone, Copy)]
struct GoBinding<'t> {
    ty: Option<Node<'t>>,
    value: Option<Node<'t>>,
    start: usize,
}

type Bindings<'t> = HashMap<&'t str, Vec<GoBinding<'t>>>;

pub struct GoAnalyzer {
    calls: CompiledQuery,
}

impl GoAnalyzer {
    pub fn new() -> Self {
        Self {
            calls: CompiledQuery::new(tree_sitter_go::LANGUAGE.into(), CALL_QUERY),
        }
    }
}

impl Default for GoAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl LanguageAnalyzer for GoAnalyzer {
    fn language_id(&self) -> &'static str {
        "go"
    }

    fn file_extensions(&self) -> &'static [&'static str] {
        &["go"]
    }

    fn parse(&self, path: &Path, source: &[u8]) -> Result<ParsedFile, AnalyzeError> {
        parse_with(self.calls.language(), path, source)
    }

    fn find_events(&self, parsed: &ParsedFile, ctx: &FileContext<'_>) -> Vec<TrackingEvent> {
        let Some(query) = self.calls.get() else {
            return Vec::new();
        };

        let unit = GoUnit::lower(parsed);
        let mut cursor = QueryCursor::new();
        let mut matches = cursor.matches(query, parsed.tree.root_node(), &parsed.source[..]);
        let mut events = Vec::new();
        while let Some(m) = matches.next() {
            for capture in m.captures {
                events.extend(unit.inspect_call(capture.node, ctx.signatures));
            }
        }
        events
    }
}

/// Names declared by a spec or parameter node.
fn declared_names<'t>(node: Node<'t>) -> Vec<Node<'t>> {
    let mut cursor = node.walk();
    node.children_by_field_name("name", &mut cursor).collect()
}

/// Bindings from a `var_spec`/`const_spec`: names pair with values by position.
fn bind_spec<'t>(file: &'t ParsedFile, spec: Node<'t>, out: &mut Bindings<'t>) {
    let ty = spec.child_by_field_name("type");
    let values = spec
        .child_by_field_name("value")
        .map(named_children)
        .unwrap_or_default();
    for (i, name) in declared_names(spec).into_iter().enumerate() {
        out.entry(file.node_text(name)).or_default().push(GoBinding {
            ty,
            value: values.get(i).copied(),
            start: spec.start_byte(),
        });
    }
}

fn bind_parameters<'t>(file: &'t ParsedFile, list: Node<'t>, out: &mut Bindings<'t>) {
    for param in named_children(list) {
        let ty = param.child_by_field_name("type");
        for name in declared_names(param) {
            out.entry(file.node_text(name)).or_default().push(GoBinding {
                ty,
                value: None,
                start: param.start_byte(),
            });
        }
    }
}

fn bind_short_var<'t>(file: &'t ParsedFile, decl: Node<'t>, out: &mut Bindings<'t>) {
    let left = decl
        .child_by_field_name("left")
        .map(named_children)
        .unwrap_or_default();
    let right = decl
        .child_by_field_name("right")
        .map(named_children)
        .unwrap_or_default();
    for (i, name) in left.into_iter().enumerate() {
        if name.kind() != "identifier" {
            continue;
        }
        out.entry(file.node_text(name)).or_default().push(GoBinding {
            ty: None,
            value: right.get(i).copied(),
            start: decl.start_byte(),
        });
    }
}

/// Type context of one function: parameters, receiver and local declarations.
fn function_bindings<'t>(file: &'t ParsedFile, func: Node<'t>) -> Bindings<'t> {
    let mut out = Bindings::new();
    for field in ["receiver", "parameters"] {
        if let Some(list) = func.child_by_field_name(field) {
            bind_parameters(file, list, &mut out);
        }
    }
    let mut stack = func.child_by_field_name("body").into_iter().collect::<Vec<_>>();
    while let Some(node) = stack.pop() {
        match node.kind() {
            "var_spec" | "const_spec" => bind_spec(file, node, &mut out),
            "short_var_declaration" => bind_short_var(file, node, &mut out),
            _ => {}
        }
        stack.extend(named_children(node));
    }
    out
}

/// Element of a composite literal body, with `literal_element` unwrapped.
fn element(node: Node) -> Node {
    if node.kind() == "literal_element" {
        node.named_child(0).unwrap_or(node)
    } else {
        node
    }
}

/// Peel `&x` and parentheses.
fn unwrap_expr<'t>(file: &ParsedFile, node: Node<'t>) -> Node<'t> {
    match node.kind() {
        "unary_expression" if file.field_text(node, "operator") == Some("&") => node
            .child_by_field_name("operand")
            .map(|inner| unwrap_expr(file, inner))
            .unwrap_or(node),
        "parenthesized_expression" => node
            .named_child(0)
            .map(|inner| unwrap_expr(file, inner))
            .unwrap_or(node),
        _ => node,
    }
}

fn go_string(file: &ParsedFile, node: Node) -> Option<String> {
    match node.kind() {
        "interpreted_string_literal" | "raw_string_literal" => {
            Some(unquote(file.node_text(node)).to_string())
        }
        _ => None,
    }
}

fn segments(file: &ParsedFile, node: Node) -> Option<Vec<String>> {
    match node.kind() {
        "identifier" | "field_identifier" | "package_identifier" => {
            Some(vec![file.node_text(node).to_string()])
        }
        "selector_expression" => {
            let mut path = segments(file, node.child_by_field_name("operand")?)?;
            path.push(file.field_text(node, "field")?.to_string());
            Some(path)
        }
        _ => None,
    }
}

fn is_number_type(name: &str) -> bool {
    matches!(
        name,
        "int" | "int8" | "int16" | "int32" | "int64" | "uint" | "uint8" | "uint16" | "uint32"
            | "uint64" | "uintptr" | "float32" | "float64" | "complex64" | "complex128"
            | "byte" | "rune"
    )
}

/// Schema of a Go type expression.
fn type_schema(file: &ParsedFile, ty: Node) -> PropertySchema {
    match ty.kind() {
        "type_identifier" => match file.node_text(ty) {
            "string" => PropertySchema::string(),
            "bool" => PropertySchema::boolean(),
            name if is_number_type(name) => PropertySchema::number(),
            _ => PropertySchema::any(),
        },
        "slice_type" | "array_type" => PropertySchema::array(
            ty.child_by_field_name("element")
                .map(|e| type_schema(file, e))
                .unwrap_or_else(PropertySchema::any),
        ),
        "map_type" => PropertySchema::object(Properties::new()),
        "pointer_type" | "parenthesized_type" => ty
            .named_child(0)
            .map(|inner| type_schema(file, inner))
            .unwrap_or_else(PropertySchema::any),
        _ => PropertySchema::any(),
    }
}

/// A lowered Go file.
struct GoUnit<'t> {
    file: &'t ParsedFile,
    decls: Vec<GoNode<'t>>,
    package: Bindings<'t>,
    functions: HashMap<usize, Bindings<'t>>,
}

impl<'t> GoUnit<'t> {
    fn lower(file: &'t ParsedFile) -> Self {
        let mut decls = Vec::new();
        let mut package = Bindings::new();
        let mut functions = HashMap::new();

        for node in named_children(file.tree.root_node()) {
            match node.kind() {
                "function_declaration" | "method_declaration" => {
                    let name = file.field_text(node, "name").unwrap_or(GLOBAL).to_string();
                    functions.insert(node.id(), function_bindings(file, node));
                    decls.push(GoNode {
                        tag: GoTag::Func,
                        name,
                        body: node,
                    });
                }
                "var_declaration" | "const_declaration" => {
                    let tag = if node.kind() == "var_declaration" {
                        GoTag::Var
                    } else {
                        GoTag::Const
                    };
                    let mut stack = vec![node];
                    while let Some(n) = stack.pop() {
                        if matches!(n.kind(), "var_spec" | "const_spec") {
                            bind_spec(file, n, &mut package);
                            for name in declared_names(n) {
                                decls.push(GoNode {
                                    tag,
                                    name: file.node_text(name).to_string(),
                                    body: n,
                                });
                            }
                        } else {
                            stack.extend(named_children(n));
                        }
                    }
                }
                _ => {}
            }
        }

        debug!(
            path = %file.path.display(),
            decls = decls.len(),
            "lowered go declarations"
        );
        Self {
            file,
            decls,
            package,
            functions,
        }
    }

    fn owner(&self, node: Node<'t>) -> Option<&GoNode<'t>> {
        self.decls.iter().find(|d| contains(d.body, node))
    }

    fn lookup(&self, name: &str, at: Node<'t>) -> Option<GoBinding<'t>> {
        let latest = |bindings: &Bindings<'t>| {
            bindings
                .get(name)?
                .iter()
                .filter(|b| b.start <= at.start_byte())
                .max_by_key(|b| b.start)
                .copied()
        };
        let local = self
            .owner(at)
            .filter(|d| d.tag == GoTag::Func)
            .and_then(|d| self.functions.get(&d.body.id()))
            .and_then(latest);
        local.or_else(|| {
            self.package
                .get(name)?
                .first()
                .copied()
        })
    }

    fn event_name(&self, node: Node<'t>, depth: usize) -> Option<String> {
        if depth > MAX_RESOLVE_DEPTH {
            return None;
        }
        let node = element(unwrap_expr(self.file, node));
        if let Some(literal) = go_string(self.file, node) {
            return Some(literal);
        }
        match node.kind() {
            "identifier" => {
                let value = self.lookup(self.file.node_text(node), node)?.value?;
                self.event_name(value, depth + 1)
            }
            // sp.NewString("x")
            "call_expression" => {
                let callee = segments(self.file, node.child_by_field_name("function")?)?;
                if callee.last().map(String::as_str) != Some("NewString") {
                    return None;
                }
                let arg = *node
                    .child_by_field_name("arguments")
                    .map(named_children)?
                    .first()?;
                self.event_name(arg, depth + 1)
            }
            _ => None,
        }
    }

    fn value_schema(&self, node: Node<'t>, depth: usize) -> PropertySchema {
        if depth > MAX_RESOLVE_DEPTH {
            return PropertySchema::any();
        }
        let node = element(unwrap_expr(self.file, node));
        match node.kind() {
            "interpreted_string_literal" | "raw_string_literal" => PropertySchema::string(),
            "int_literal" | "float_literal" | "imaginary_literal" | "rune_literal" => {
                PropertySchema::number()
            }
            "true" | "false" => PropertySchema::boolean(),
            "nil" => PropertySchema::null(),
            "literal_value" => PropertySchema::object(self.keyed_fields(node, depth + 1)),
            "composite_literal" => self.composite_schema(node, depth + 1),
            "identifier" => match self.lookup(self.file.node_text(node), node) {
                Some(GoBinding {
                    value: Some(value), ..
                }) if value.kind() == "composite_literal" || value.kind().ends_with("_literal") => {
                    self.value_schema(value, depth + 1)
                }
                Some(GoBinding { ty: Some(ty), .. }) => type_schema(self.file, ty),
                Some(GoBinding {
                    value: Some(value), ..
                }) => self.value_schema(value, depth + 1),
                _ => PropertySchema::any(),
            },
            "call_expression" => {
                let callee = node
                    .child_by_field_name("function")
                    .and_then(|f| segments(self.file, f))
                    .unwrap_or_default();
                match callee.last().map(String::as_str) {
                    Some("NewString") => PropertySchema::string(),
                    Some("NewBool") => PropertySchema::boolean(),
                    Some(name) if name.starts_with("NewFloat") || name.starts_with("NewInt") => {
                        PropertySchema::number()
                    }
                    _ => PropertySchema::any(),
                }
            }
            "binary_expression" => match self.file.field_text(node, "operator") {
                Some("==" | "!=" | "<" | "<=" | ">" | ">=" | "&&" | "||") => {
                    PropertySchema::boolean()
                }
                _ => PropertySchema::any(),
            },
            "unary_expression" => match self.file.field_text(node, "operator") {
                Some("!") => PropertySchema::boolean(),
                Some("-" | "+" | "^") => PropertySchema::number(),
                _ => PropertySchema::any(),
            },
            _ => PropertySchema::any(),
        }
    }

    fn composite_schema(&self, node: Node<'t>, depth: usize) -> PropertySchema {
        let ty = node.child_by_field_name("type");
        let Some(body) = node.child_by_field_name("body") else {
            return PropertySchema::any();
        };
        match ty.map(|t| t.kind()) {
            Some("slice_type" | "array_type" | "implicit_length_array_type") => {
                let items: Vec<PropertySchema> = named_children(body)
                    .into_iter()
                    .map(|e| self.value_schema(e, depth + 1))
                    .collect();
                if items.is_empty() {
                    ty.map(|t| type_schema(self.file, t))
                        .unwrap_or_else(|| PropertySchema::array(PropertySchema::any()))
                } else {
                    PropertySchema::array(infer_array_items(items))
                }
            }
            _ => PropertySchema::object(self.keyed_fields(body, depth + 1)),
        }
    }

    /// `key: value` entries of a composite literal body. Map keys must be
    /// strings; struct keys are field names.
    fn keyed_entries(&self, body: Node<'t>) -> Vec<(String, Node<'t>)> {
        named_children(body)
            .into_iter()
            .filter(|e| e.kind() == "keyed_element")
            .filter_map(|entry| {
                let parts = named_children(entry);
                let key = element(*parts.first()?);
                let value = element(*parts.last()?);
                let key = match key.kind() {
                    "identifier" | "field_identifier" => self.file.node_text(key).to_string(),
                    _ => go_string(self.file, key)?,
                };
                Some((key, value))
            })
            .collect()
    }

    fn keyed_fields(&self, body: Node<'t>, depth: usize) -> Properties {
        self.keyed_entries(body)
            .into_iter()
            .map(|(key, value)| (key, self.value_schema(value, depth)))
            .collect()
    }

    /// Properties from a map literal, a `NewProperties().Set(k, v)` chain, or
    /// a variable bound to either.
    fn properties(&self, node: Node<'t>, depth: usize) -> Properties {
        if depth > MAX_RESOLVE_DEPTH {
            return Properties::new();
        }
        let node = element(unwrap_expr(self.file, node));
        match node.kind() {
            "composite_literal" => match node.child_by_field_name("body") {
                Some(body) => self.keyed_fields(body, depth + 1),
                None => Properties::new(),
            },
            "call_expression" => {
                let mut fields = Properties::new();
                self.collect_set_chain(node, &mut fields, depth + 1);
                fields
            }
            "identifier" => match self
                .lookup(self.file.node_text(node), node)
                .and_then(|b| b.value)
            {
                Some(value) => self.properties(value, depth + 1),
                None => {
                    debug!(
                        path = %self.file.path.display(),
                        line = line_of(node),
                        "unresolved go properties argument"
                    );
                    Properties::new()
                }
            },
            _ => Properties::new(),
        }
    }

    fn collect_set_chain(&self, call: Node<'t>, fields: &mut Properties, depth: usize) {
        if depth > MAX_RESOLVE_DEPTH * 8 {
            return;
        }
        let Some(function) = call.child_by_field_name("function") else {
            return;
        };
        if function.kind() != "selector_expression" || self.file.field_text(function, "field") != Some("Set") {
            return;
        }
        if let Some(inner) = function
            .child_by_field_name("operand")
            .filter(|o| o.kind() == "call_expression")
        {
            self.collect_set_chain(inner, fields, depth + 1);
        }
        let args = call
            .child_by_field_name("arguments")
            .map(named_children)
            .unwrap_or_default();
        if let (Some(key), Some(value)) = (args.first(), args.get(1)) {
            if let Some(key) = go_string(self.file, *key) {
                fields.insert(key, self.value_schema(*value, 0));
            }
        }
    }

    fn arguments(call: Node<'t>) -> Vec<Node<'t>> {
        call.child_by_field_name("arguments")
            .map(named_children)
            .unwrap_or_default()
    }

    fn inspect_call(&self, call: Node<'t>, signatures: &[CustomSignature]) -> Vec<TrackingEvent> {
        let Some(callee) = call
            .child_by_field_name("function")
            .and_then(|f| segments(self.file, f))
        else {
            return Vec::new();
        };
        let args = Self::arguments(call);

        if let Some(signature) = find_match(signatures, &callee) {
            return self.custom_event(call, signature, &args).into_iter().collect();
        }

        let method = callee.last().map(String::as_str).unwrap_or("");
        let mut events = Vec::new();
        for arg in &args {
            let arg = unwrap_expr(self.file, *arg);
            if arg.kind() != "composite_literal" {
                continue;
            }
            let Some(ty) = arg.child_by_field_name("type") else {
                continue;
            };
            match (method, ty.kind()) {
                ("Track", "slice_type") => events.extend(self.mixpanel_batch(call, arg, ty)),
                _ => {
                    if let Some(event) = self.struct_event(call, method, arg, ty) {
                        events.push(event);
                    }
                }
            }
        }
        events
    }

    /// `client.Enqueue(analytics.Track{...})` and friends.
    fn struct_event(&self, call: Node<'t>, method: &str, literal: Node<'t>, ty: Node<'t>) -> Option<TrackingEvent> {
        let source = providers::go_event_type(self.file.node_text(ty))?;
        let (name_key, properties_key, flattened) = match (source, method) {
            (Source::Segment | Source::Posthog, "Enqueue") => ("Event", "Properties", None),
            (Source::Amplitude, "Track") => ("EventType", "EventProperties", Some("EventOptions")),
            (Source::Snowplow, "TrackStructEvent") => ("Action", "", None),
            _ => return None,
        };

        let entries = self.keyed_entries(literal.child_by_field_name("body")?);
        let (_, name_node) = entries.iter().find(|(k, _)| k == name_key)?;
        let name = self.event_name(*name_node, 0)?;

        let mut properties = Properties::new();
        for (key, value) in &entries {
            if key == name_key {
                continue;
            }
            if key == properties_key {
                let nested = self.properties(*value, 0);
                merge_properties(&mut properties, nested);
            } else if Some(key.as_str()) == flattened {
                let nested = match value.kind() {
                    "composite_literal" => value
                        .child_by_field_name("body")
                        .map(|b| self.keyed_fields(b, 0))
                        .unwrap_or_default(),
                    _ => Properties::new(),
                };
                merge_properties(&mut properties, nested);
            } else {
                properties.insert(key.clone(), self.value_schema(*value, 0));
            }
        }
        Some(self.event(call, name, source, properties))
    }

    /// `mp.Track(ctx, []*mixpanel.Event{mp.NewEvent(name, distinctId, props)})`.
    fn mixpanel_batch(&self, call: Node<'t>, literal: Node<'t>, ty: Node<'t>) -> Vec<TrackingEvent> {
        let element_type = ty
            .child_by_field_name("element")
            .map(|e| self.file.node_text(e))
            .unwrap_or("");
        if providers::go_event_type(element_type) != Some(Source::Mixpanel) {
            return Vec::new();
        }
        let Some(body) = literal.child_by_field_name("body") else {
            return Vec::new();
        };

        named_children(body)
            .into_iter()
            .map(element)
            .filter(|e| e.kind() == "call_expression")
            .filter_map(|new_event| {
                let callee = segments(self.file, new_event.child_by_field_name("function")?)?;
                if callee.last().map(String::as_str) != Some("NewEvent") {
                    return None;
                }
                let args = Self::arguments(new_event);
                let name = self.event_name(*args.first()?, 0)?;
                let mut properties = Properties::new();
                if let Some(id) = args.get(1) {
                    properties.insert("DistinctId".into(), self.value_schema(*id, 0));
                }
                if let Some(props) = args.get(2) {
                    merge_properties(&mut properties, self.properties(*props, 0));
                }
                Some(self.event(call, name, Source::Mixpanel, properties))
            })
            .collect()
    }

    fn custom_event(&self, call: Node<'t>, signature: &CustomSignature, args: &[Node<'t>]) -> Option<TrackingEvent> {
        let name = self.event_name(*args.get(signature.event_index)?, 0)?;
        let mut properties = Properties::new();
        for extra in &signature.extra_params {
            if let Some(arg) = args.get(extra.index) {
                properties.insert(extra.name.clone(), self.value_schema(*arg, 0));
            }
        }
        if let Some(props) = args.get(signature.properties_index) {
            merge_properties(&mut properties, self.properties(*props, 0));
        }
        Some(self.event(call, name, Source::Custom, properties))
    }

    fn event(&self, call: Node<'t>, name: String, source: Source, properties: Properties) -> TrackingEvent {
        let function_name = match self.owner(call) {
            Some(decl) if decl.tag == GoTag::Func => decl.name.clone(),
            _ => GLOBAL.to_string(),
        };
        TrackingEvent {
            event_name: name,
            source,
            properties,
            file_path: self.file.path.clone(),
            line: line_of(call),
            function_name,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIXTURE: &str = r#"package main

func segmentTrack(userId string) {
	client := analytics.New("KEY")
	client.Enqueue(analytics.Track{
		UserId: userId,
		Event:  "Signed Up",
		Properties: analytics.NewProperties().
			Set("plan", "Enterprise").
			Set("is_free_trial", true),
	})
}

func mixpanelTrack(userId string, price float64) {
	mp := mixpanel.NewApiClient("TOKEN")
	mp.Track(ctx, []*mixpanel.Event{
		mp.NewEvent("some_event", userId, map[string]any{
			"plan":  "premium",
			"price": price,
		}),
	})
}

func amplitudeTrack(isFreeTrial bool) {
	client.Track(amplitude.Event{
		UserID:    "user-id",
		EventType: "Button Clicked",
		EventProperties: map[string]any{
			"name":          "Checkout",
			"is_free_trial": isFreeTrial,
		},
		EventOptions: amplitude.EventOptions{
			Price: 1.99,
		},
	})
}

func snowplowTrack(property string, value float64) {
	tracker.TrackStructEvent(sp.StructuredEvent{
		Action:   sp.NewString("add-to-basket"),
		Category: sp.NewString("test"),
		Property: sp.NewString(property),
		Value:    sp.NewFloat64(value),
	})
}

func posthogTrack(plan string) {
	client.Enqueue(posthog.Capture{
		DistinctId: "distinct_id_of_the_user",
		Event:      "user_signed_up",
		Properties: posthog.NewProperties().Set("plan", plan),
	})
}
"#;

    fn events_with(source: &str, signatures: &[CustomSignature]) -> Vec<TrackingEvent> {
        let analyzer = GoAnalyzer::new();
        let parsed = analyzer
            .parse(Path::new("main.go"), source.as_bytes())
            .unwrap();
        analyzer.find_events(&parsed, &FileContext::new(signatures))
    }

    fn find<'a>(events: &'a [TrackingEvent], name: &str) -> &'a TrackingEvent {
        events
            .iter()
            .find(|e| e.event_name == name)
            .unwrap_or_else(|| panic!("missing event {}", name))
    }

    #[test]
    fn test_lowering_collects_declarations() {
        let analyzer = GoAnalyzer::new();
        let source = "package main\nconst Name = \"x\"\nvar a, b = 1, 2\nfunc f() {}\nfunc (s *S) m() {}\n";
        let parsed = analyzer.parse(Path::new("a.go"), source.as_bytes()).unwrap();
        let unit = GoUnit::lower(&parsed);
        let shape: Vec<(GoTag, &str)> = unit
            .decls
            .iter()
            .map(|d| (d.tag, d.name.as_str()))
            .collect();
        assert_eq!(
            shape,
            vec![
                (GoTag::Const, "Name"),
                (GoTag::Var, "a"),
                (GoTag::Var, "b"),
                (GoTag::Func, "f"),
                (GoTag::Func, "m"),
            ]
        );
    }

    #[test]
    fn test_provider_struct_shapes() {
        let found = events_with(FIXTURE, &[]);
        assert_eq!(found.len(), 5);

        let segment = find(&found, "Signed Up");
        assert_eq!(segment.source, Source::Segment);
        assert_eq!(segment.function_name, "segmentTrack");
        assert_eq!(segment.line, 5);
        assert_eq!(segment.properties["UserId"], PropertySchema::string());
        assert_eq!(segment.properties["plan"], PropertySchema::string());
        assert_eq!(segment.properties["is_free_trial"], PropertySchema::boolean());

        let mixpanel = find(&found, "some_event");
        assert_eq!(mixpanel.source, Source::Mixpanel);
        assert_eq!(mixpanel.properties["DistinctId"], PropertySchema::string());
        assert_eq!(mixpanel.properties["price"], PropertySchema::number());

        let amplitude = find(&found, "Button Clicked");
        assert_eq!(amplitude.source, Source::Amplitude);
        assert_eq!(amplitude.properties["UserID"], PropertySchema::string());
        assert_eq!(amplitude.properties["is_free_trial"], PropertySchema::boolean());
        assert_eq!(amplitude.properties["Price"], PropertySchema::number());
        assert!(!amplitude.properties.contains_key("EventType"));

        let snowplow = find(&found, "add-to-basket");
        assert_eq!(snowplow.source, Source::Snowplow);
        assert_eq!(snowplow.properties["Category"], PropertySchema::string());
        assert_eq!(snowplow.properties["Property"], PropertySchema::string());
        assert_eq!(snowplow.properties["Value"], PropertySchema::number());
        assert!(!snowplow.properties.contains_key("Action"));

        let posthog = find(&found, "user_signed_up");
        assert_eq!(posthog.properties["DistinctId"], PropertySchema::string());
        assert_eq!(posthog.properties["plan"], PropertySchema::string());
    }

    #[test]
    fn test_custom_function_with_typed_variables() {
        let signatures = vec!["customTrackFunction(userId, EVENT_NAME, PROPERTIES)"
            .parse::<CustomSignature>()
            .unwrap()];
        let found = events_with(
            r#"package main

const EventName = "custom_event"

func main() {
	var baz int = 42
	var test string = "test"
	var list []string = []string{"a", "b", "c"}
	var obj map[string]any = map[string]any{
		"a": 1,
		"c": test,
	}
	customTrackFunction("user888", EventName, map[string]any{
		"foo":  "bar",
		"baz":  baz,
		"list": list,
		"obj":  obj,
	})
}
"#,
            &signatures,
        );
        assert_eq!(found.len(), 1);
        let event = &found[0];
        assert_eq!(event.event_name, "custom_event");
        assert_eq!(event.function_name, "main");
        assert_eq!(event.properties["userId"], PropertySchema::string());
        assert_eq!(event.properties["baz"], PropertySchema::number());
        assert_eq!(
            event.properties["list"],
            PropertySchema::array(PropertySchema::string())
        );
        match &event.properties["obj"] {
            PropertySchema::Object { fields } => {
                assert_eq!(fields["a"], PropertySchema::number());
                assert_eq!(fields["c"], PropertySchema::string());
            }
            other => panic!("expected object, got {:?}", other),
        }
    }

    #[test]
    fn test_type_schema() {
        let source = "package main\nvar a []int\nvar b map[string]bool\nvar c *float64\nvar d Custom\n";
        let analyzer = GoAnalyzer::new();
        let parsed = analyzer.parse(Path::new("t.go"), source.as_bytes()).unwrap();
        let unit = GoUnit::lower(&parsed);
        let schema = |name: &str| {
            let ty = unit.package[name][0].ty.unwrap();
            type_schema(&parsed, ty)
        };
        assert_eq!(schema("a"), PropertySchema::array(PropertySchema::number()));
        assert_eq!(schema("b"), PropertySchema::object(Properties::new()));
        assert_eq!(schema("c"), PropertySchema::number());
        assert!(schema("d").is_any());
    }
}
