//! Call-site extraction shared by the JavaScript and TypeScript analyzers.
//!
//! Both grammars use the same node kinds for everything except type syntax,
//! so one walker serves both. Declared types and import following are only
//! consulted through a `ModuleResolver` that reports itself as typed.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use streaming_iterator::StreamingIterator;
use tracing::debug;
use tree_sitter::{Node, QueryCursor};

use crate::analysis::naming;
use crate::analysis::syntax::{children, contains, line_of, named_children, unquote, CompiledQuery};
use crate::analysis::ParsedFile;
use crate::event::TrackingEvent;
use crate::providers::{self, Source};
use crate::schema::{
    infer_array_items, merge_properties, PrimitiveType, Properties, PropertySchema,
};
use crate::signature::{find_match, CustomSignature};

pub(crate) const CALL_QUERY: &str = "(call_expression) @call";

/// Hops allowed when chasing a value through bindings and modules.
const MAX_RESOLVE_DEPTH: usize = 8;

/// Access to other modules of the same project.
pub(crate) trait ModuleResolver {
    /// Whether declared types drive inference.
    fn is_typed(&self) -> bool {
        false
    }

    /// The module `from` imports as `specifier`.
    fn import(&self, _from: &Path, _specifier: &str) -> Option<Arc<ParsedFile>> {
        None
    }

    /// Any project module declaring a type called `name`.
    fn module_declaring_type(&self, _name: &str) -> Option<Arc<ParsedFile>> {
        None
    }
}

/// Plain JavaScript: one file, no types.
pub(crate) struct Untyped;

impl ModuleResolver for Untyped {}

/// TypeScript outside any project: local types only.
pub(crate) struct LocalTypes;

impl ModuleResolver for LocalTypes {
    fn is_typed(&self) -> bool {
        true
    }
}

#[derive(Clone, Copy)]
struct Binding<'t> {
    decl: Node<'t>,
    value: Option<Node<'t>>,
    type_ann: Option<Node<'t>>,
    scope: Node<'t>,
}

#[derive(Debug, Clone)]
enum Imported {
    Named(String),
    Namespace,
    Default,
}

#[derive(Debug, Clone)]
struct ImportRef {
    specifier: String,
    imported: Imported,
}

/// Re-export: `(exported, local)` for `export { local as exported } from`,
/// or `None` for `export * from`.
type ReExport = (Option<(String, String)>, String);

/// Declarations of one module, indexed by name.
struct ModuleView<'t> {
    file: &'t ParsedFile,
    bindings: HashMap<&'t str, Vec<Binding<'t>>>,
    types: HashMap<&'t str, Node<'t>>,
    imports: HashMap<&'t str, ImportRef>,
    reexports: Vec<ReExport>,
}

fn is_scope(kind: &str) -> bool {
    matches!(
        kind,
        "program"
            | "function_declaration"
            | "generator_function_declaration"
            | "function_expression"
            | "function"
            | "generator_function"
            | "arrow_function"
            | "method_definition"
    )
}

fn scope_of<'t>(node: Node<'t>, root: Node<'t>) -> Node<'t> {
    let mut current = node.parent();
    while let Some(n) = current {
        if is_scope(n.kind()) {
            return n;
        }
        current = n.parent();
    }
    root
}

impl<'t> ModuleView<'t> {
    fn new(file: &'t ParsedFile) -> Self {
        let root = file.tree.root_node();
        let mut view = ModuleView {
            file,
            bindings: HashMap::new(),
            types: HashMap::new(),
            imports: HashMap::new(),
            reexports: Vec::new(),
        };

        let mut stack = vec![root];
        while let Some(node) = stack.pop() {
            view.index_node(node, root);
            stack.extend(named_children(node).into_iter().rev());
        }
        view
    }

    fn bind(&mut self, name: Node<'t>, binding: Binding<'t>) {
        let name = self.file.node_text(name);
        self.bindings.entry(name).or_default().push(binding);
    }

    fn index_node(&mut self, node: Node<'t>, root: Node<'t>) {
        match node.kind() {
            "variable_declarator" => {
                if let Some(name) = node
                    .child_by_field_name("name")
                    .filter(|n| n.kind() == "identifier")
                {
                    self.bind(
                        name,
                        Binding {
                            decl: node,
                            value: node.child_by_field_name("value"),
                            type_ann: node.child_by_field_name("type"),
                            scope: scope_of(node, root),
                        },
                    );
                }
            }
            "required_parameter" | "optional_parameter" => {
                if let Some(name) = node
                    .child_by_field_name("pattern")
                    .filter(|n| n.kind() == "identifier")
                {
                    self.bind(
                        name,
                        Binding {
                            decl: node,
                            value: None,
                            type_ann: node.child_by_field_name("type"),
                            scope: scope_of(node, root),
                        },
                    );
                }
            }
            "formal_parameters" => {
                for param in named_children(node) {
                    let name = match param.kind() {
                        "identifier" => param,
                        "assignment_pattern" => match param.child_by_field_name("left") {
                            Some(left) if left.kind() == "identifier" => left,
                            _ => continue,
                        },
                        _ => continue,
                    };
                    self.bind(
                        name,
                        Binding {
                            decl: param,
                            value: None,
                            type_ann: None,
                            scope: scope_of(node, root),
                        },
                    );
                }
            }
            "enum_declaration" => {
                if let Some(name) = node.child_by_field_name("name") {
                    self.types.insert(self.file.node_text(name), node);
                    self.bind(
                        name,
                        Binding {
                            decl: node,
                            value: Some(node),
                            type_ann: None,
                            scope: root,
                        },
                    );
                }
            }
            "interface_declaration" | "type_alias_declaration" => {
                if let Some(name) = node.child_by_field_name("name") {
                    self.types.insert(self.file.node_text(name), node);
                }
            }
            "import_statement" => self.index_import(node),
            "export_statement" => self.index_reexport(node),
            _ => {}
        }
    }

    fn index_import(&mut self, node: Node<'t>) {
        let Some(specifier) = self.file.field_text(node, "source").map(unquote) else {
            return;
        };
        let specifier = specifier.to_string();

        for clause in named_children(node)
            .into_iter()
            .filter(|c| c.kind() == "import_clause")
        {
            for part in named_children(clause) {
                match part.kind() {
                    "identifier" => {
                        self.imports.insert(
                            self.file.node_text(part),
                            ImportRef {
                                specifier: specifier.clone(),
                                imported: Imported::Default,
                            },
                        );
                    }
                    "named_imports" => {
                        for spec in named_children(part)
                            .into_iter()
                            .filter(|s| s.kind() == "import_specifier")
                        {
                            let Some(name) = self.file.field_text(spec, "name") else {
                                continue;
                            };
                            let local = self.file.field_text(spec, "alias").unwrap_or(name);
                            self.imports.insert(
                                local,
                                ImportRef {
                                    specifier: specifier.clone(),
                                    imported: Imported::Named(name.to_string()),
                                },
                            );
                        }
                    }
                    "namespace_import" => {
                        if let Some(local) = part.named_child(0) {
                            self.imports.insert(
                                self.file.node_text(local),
                                ImportRef {
                                    specifier: specifier.clone(),
                                    imported: Imported::Namespace,
                                },
                            );
                        }
                    }
                    _ => {}
                }
            }
        }
    }

    fn index_reexport(&mut self, node: Node<'t>) {
        let Some(specifier) = self.file.field_text(node, "source").map(unquote) else {
            return;
        };
        let clause = named_children(node)
            .into_iter()
            .find(|c| c.kind() == "export_clause");
        match clause {
            Some(clause) => {
                for spec in named_children(clause) {
                    let Some(local) = self.file.field_text(spec, "name") else {
                        continue;
                    };
                    let exported = self.file.field_text(spec, "alias").unwrap_or(local);
                    self.reexports.push((
                        Some((exported.to_string(), local.to_string())),
                        specifier.to_string(),
                    ));
                }
            }
            None => self.reexports.push((None, specifier.to_string())),
        }
    }

    /// The binding of `name` visible at `at`: innermost scope first, then
    /// the latest declaration preceding `at`.
    fn lookup(&self, name: &str, at: Node<'t>) -> Option<Binding<'t>> {
        self.bindings
            .get(name)?
            .iter()
            .filter(|b| contains(b.scope, at))
            .min_by_key(|b| {
                let start = b.decl.start_byte();
                let before = start <= at.start_byte();
                (
                    b.scope.end_byte() - b.scope.start_byte(),
                    !before,
                    if before { usize::MAX - start } else { start },
                )
            })
            .copied()
    }

    fn root(&self) -> Node<'t> {
        self.file.tree.root_node()
    }
}

fn is_function_call_named(file: &ParsedFile, call: Node, name: &str) -> bool {
    call.kind() == "call_expression"
        && call
            .child_by_field_name("function")
            .map(|f| {
                let text = file.node_text(f);
                text == name || text.ends_with(&format!(".{}", name))
            })
            .unwrap_or(false)
}

fn call_arguments(call: Node) -> Vec<Node> {
    call.child_by_field_name("arguments")
        .filter(|a| a.kind() == "arguments")
        .map(named_children)
        .unwrap_or_default()
}

/// Peel parentheses, type assertions and `Object.freeze(...)`.
fn unwrap_expression<'t>(file: &ParsedFile, node: Node<'t>) -> Node<'t> {
    let mut node = node;
    loop {
        let inner = match node.kind() {
            "parenthesized_expression" | "as_expression" | "satisfies_expression"
            | "non_null_expression" => node.named_child(0),
            "call_expression" if is_function_call_named(file, node, "Object.freeze") => {
                call_arguments(node).first().copied()
            }
            _ => None,
        };
        match inner {
            Some(inner) => node = inner,
            None => return node,
        }
    }
}

fn literal_string(file: &ParsedFile, node: Node) -> Option<String> {
    match node.kind() {
        "string" => Some(unquote(file.node_text(node)).to_string()),
        "template_string" => {
            let dynamic = named_children(node)
                .iter()
                .any(|c| c.kind() == "template_substitution");
            (!dynamic).then(|| unquote(file.node_text(node)).to_string())
        }
        _ => None,
    }
}

/// Identifier path of a callee or member chain: `a.b['c'].d` → `[a, b, c, d]`.
fn segments(file: &ParsedFile, node: Node) -> Option<Vec<String>> {
    match node.kind() {
        "identifier" | "this" | "property_identifier" | "private_property_identifier" => {
            Some(vec![file.node_text(node).to_string()])
        }
        "member_expression" => {
            let mut path = segments(file, node.child_by_field_name("object")?)?;
            path.push(file.field_text(node, "property")?.to_string());
            Some(path)
        }
        "subscript_expression" => {
            let mut path = segments(file, node.child_by_field_name("object")?)?;
            path.push(literal_string(file, node.child_by_field_name("index")?)?);
            Some(path)
        }
        "parenthesized_expression" | "non_null_expression" => {
            segments(file, node.named_child(0)?)
        }
        _ => None,
    }
}

fn property_key(file: &ParsedFile, key: Node) -> Option<String> {
    match key.kind() {
        "property_identifier" | "number" | "private_property_identifier" => {
            Some(file.node_text(key).to_string())
        }
        "string" => Some(unquote(file.node_text(key)).to_string()),
        "computed_property_name" => literal_string(file, key.named_child(0)?),
        _ => None,
    }
}

/// Value node of property `key` in an object literal.
fn object_member<'t>(file: &ParsedFile, object: Node<'t>, key: &str) -> Option<Node<'t>> {
    named_children(object).into_iter().find_map(|child| match child.kind() {
        "pair" => {
            let k = child.child_by_field_name("key")?;
            (property_key(file, k).as_deref() == Some(key))
                .then(|| child.child_by_field_name("value"))
                .flatten()
        }
        "shorthand_property_identifier" => (file.node_text(child) == key).then_some(child),
        _ => None,
    })
}

fn enum_member_string(file: &ParsedFile, decl: Node, member: &str) -> Option<String> {
    let body = decl.child_by_field_name("body")?;
    named_children(body).into_iter().find_map(|entry| {
        if entry.kind() != "enum_assignment" || file.field_text(entry, "name") != Some(member) {
            return None;
        }
        literal_string(file, entry.child_by_field_name("value")?)
    })
}

fn enum_schema(file: &ParsedFile, decl: Node) -> PropertySchema {
    let Some(body) = decl.child_by_field_name("body") else {
        return PropertySchema::number();
    };
    let has_strings = named_children(body).into_iter().any(|entry| {
        entry
            .child_by_field_name("value")
            .map(|v| literal_string(file, v).is_some())
            .unwrap_or(false)
    });
    if has_strings {
        PropertySchema::string()
    } else {
        PropertySchema::number()
    }
}

fn predefined_type(name: &str) -> PropertySchema {
    match name {
        "string" => PropertySchema::string(),
        "number" | "bigint" => PropertySchema::number(),
        "boolean" => PropertySchema::boolean(),
        "null" => PropertySchema::null(),
        "any" | "unknown" => PropertySchema::any(),
        other => PropertySchema::label(other),
    }
}

fn literal_schema(node: Node) -> PropertySchema {
    match node.kind() {
        "string" | "template_string" | "template_literal_type" => PropertySchema::string(),
        "number" | "unary_expression" => PropertySchema::number(),
        "true" | "false" => PropertySchema::boolean(),
        "null" => PropertySchema::null(),
        "undefined" => PropertySchema::label("undefined"),
        _ => PropertySchema::any(),
    }
}

fn is_nullish(schema: &PropertySchema) -> bool {
    matches!(schema.type_label().as_str(), "null" | "undefined")
}

/// Optional members render as `T | undefined`.
fn optional(schema: PropertySchema) -> PropertySchema {
    match schema {
        PropertySchema::Primitive { .. } if !schema.is_any() => {
            PropertySchema::union(vec![schema, PropertySchema::label("undefined")])
        }
        other => other,
    }
}

fn flatten_union<'t>(node: Node<'t>, out: &mut Vec<Node<'t>>) {
    for member in named_children(node) {
        if member.kind() == "union_type" {
            flatten_union(member, out);
        } else {
            out.push(member);
        }
    }
}

/// Resolution and schema inference over one or more modules.
struct Resolver<'r> {
    modules: &'r dyn ModuleResolver,
    typed: bool,
}

impl<'r> Resolver<'r> {
    fn event_name<'t>(&self, view: &ModuleView<'t>, node: Node<'t>) -> Option<String> {
        let node = unwrap_expression(view.file, node);
        if let Some(literal) = literal_string(view.file, node) {
            return Some(literal);
        }
        match node.kind() {
            "identifier" => self.string_constant(view, view.file.node_text(node), &[], node, 0),
            "member_expression" | "subscript_expression" => {
                let path = segments(view.file, node)?;
                let (base, members) = path.split_first()?;
                self.string_constant(view, base, members, node, 0)
            }
            _ => None,
        }
    }

    fn string_constant<'t>(
        &self,
        view: &ModuleView<'t>,
        name: &str,
        members: &[String],
        at: Node<'t>,
        depth: usize,
    ) -> Option<String> {
        if depth > MAX_RESOLVE_DEPTH {
            return None;
        }
        if let Some(binding) = view.lookup(name, at) {
            return self.string_in_value(view, binding.value?, members, depth + 1);
        }
        let import = view.imports.get(name)?;
        self.imported_string(view, import, members, depth + 1)
    }

    fn string_in_value<'t>(
        &self,
        view: &ModuleView<'t>,
        value: Node<'t>,
        members: &[String],
        depth: usize,
    ) -> Option<String> {
        if depth > MAX_RESOLVE_DEPTH {
            return None;
        }
        let file = view.file;
        let value = unwrap_expression(file, value);
        match (value.kind(), members) {
            ("identifier" | "shorthand_property_identifier", _) => {
                self.string_constant(view, file.node_text(value), members, value, depth + 1)
            }
            ("member_expression" | "subscript_expression", _) => {
                let path = segments(file, value)?;
                let (base, rest) = path.split_first()?;
                let mut full = rest.to_vec();
                full.extend_from_slice(members);
                self.string_constant(view, base, &full, value, depth + 1)
            }
            (_, []) => literal_string(file, value),
            ("object", [first, rest @ ..]) => {
                let member = object_member(file, value, first)?;
                self.string_in_value(view, member, rest, depth + 1)
            }
            ("enum_declaration", [member]) => enum_member_string(file, value, member),
            _ => None,
        }
    }

    fn imported_string(
        &self,
        view: &ModuleView<'_>,
        import: &ImportRef,
        members: &[String],
        depth: usize,
    ) -> Option<String> {
        let module = self.modules.import(&view.file.path, &import.specifier)?;
        let target = ModuleView::new(&module);
        match &import.imported {
            Imported::Named(export) => self.exported_string(&target, export, members, depth),
            Imported::Namespace => {
                let (export, rest) = members.split_first()?;
                self.exported_string(&target, export, rest, depth)
            }
            Imported::Default => None,
        }
    }

    fn exported_string(
        &self,
        view: &ModuleView<'_>,
        export: &str,
        members: &[String],
        depth: usize,
    ) -> Option<String> {
        if depth > MAX_RESOLVE_DEPTH {
            return None;
        }
        let root = view.root();
        if view.lookup(export, root).is_some() || view.imports.contains_key(export) {
            return self.string_constant(view, export, members, root, depth + 1);
        }
        for (names, specifier) in &view.reexports {
            let forwarded = match names {
                Some((exported, local)) if exported == export => local.as_str(),
                Some(_) => continue,
                None => export,
            };
            let Some(module) = self.modules.import(&view.file.path, specifier) else {
                continue;
            };
            let target = ModuleView::new(&module);
            if let Some(found) = self.exported_string(&target, forwarded, members, depth + 1) {
                return Some(found);
            }
        }
        None
    }

    fn named_type(
        &self,
        view: &ModuleView<'_>,
        name: &str,
        seen: &mut Vec<String>,
        depth: usize,
    ) -> Option<PropertySchema> {
        if depth > MAX_RESOLVE_DEPTH {
            return None;
        }
        if let Some(decl) = view.types.get(name).copied() {
            return Some(self.declared_type(view, name, decl, seen, depth));
        }

        if let Some(import) = view.imports.get(name) {
            let Imported::Named(export) = &import.imported else {
                return None;
            };
            let module = self.modules.import(&view.file.path, &import.specifier)?;
            let target = ModuleView::new(&module);
            if let Some(found) = self.named_type(&target, export, seen, depth + 1) {
                return Some(found);
            }
            for (names, specifier) in &target.reexports {
                let forwarded = match names {
                    Some((exported, local)) if exported == export => local.as_str(),
                    Some(_) => continue,
                    None => export.as_str(),
                };
                let Some(module) = self.modules.import(&target.file.path, specifier) else {
                    continue;
                };
                let next = ModuleView::new(&module);
                if let Some(found) = self.named_type(&next, forwarded, seen, depth + 2) {
                    return Some(found);
                }
            }
            return None;
        }

        // Project-wide fallback, only from the module being analyzed.
        if depth == 0 {
            let module = self.modules.module_declaring_type(name)?;
            if module.path == view.file.path {
                return None;
            }
            let target = ModuleView::new(&module);
            let decl = target.types.get(name).copied()?;
            return Some(self.declared_type(&target, name, decl, seen, depth + 1));
        }
        None
    }

    fn declared_type<'t>(
        &self,
        view: &ModuleView<'t>,
        name: &str,
        decl: Node<'t>,
        seen: &mut Vec<String>,
        depth: usize,
    ) -> PropertySchema {
        let key = format!("{}#{}", view.file.path.display(), name);
        if seen.contains(&key) {
            return PropertySchema::any();
        }
        seen.push(key);

        let schema = match decl.kind() {
            "interface_declaration" => {
                let mut fields = Properties::new();
                for clause in named_children(decl)
                    .into_iter()
                    .filter(|c| c.kind() == "extends_type_clause")
                {
                    for base in named_children(clause) {
                        if let PropertySchema::Object { fields: inherited } =
                            self.type_schema(view, base, seen, depth)
                        {
                            merge_properties(&mut fields, inherited);
                        }
                    }
                }
                if let Some(body) = decl.child_by_field_name("body") {
                    let own = self.member_fields(view, body, seen, depth);
                    merge_properties(&mut fields, own);
                }
                PropertySchema::object(fields)
            }
            "type_alias_declaration" => decl
                .child_by_field_name("value")
                .map(|v| self.type_schema(view, v, seen, depth))
                .unwrap_or_else(PropertySchema::any),
            "enum_declaration" => enum_schema(view.file, decl),
            _ => PropertySchema::any(),
        };

        seen.pop();
        schema
    }

    fn member_fields<'t>(
        &self,
        view: &ModuleView<'t>,
        body: Node<'t>,
        seen: &mut Vec<String>,
        depth: usize,
    ) -> Properties {
        let mut fields = Properties::new();
        for member in named_children(body)
            .into_iter()
            .filter(|m| m.kind() == "property_signature")
        {
            let Some(name) = member
                .child_by_field_name("name")
                .and_then(|n| property_key(view.file, n))
            else {
                continue;
            };
            let schema = member
                .child_by_field_name("type")
                .map(|t| self.type_schema(view, t, seen, depth))
                .unwrap_or_else(PropertySchema::any);
            let is_optional = children(member).iter().any(|c| c.kind() == "?");
            fields.insert(name, if is_optional { optional(schema) } else { schema });
        }
        fields
    }

    fn type_schema<'t>(
        &self,
        view: &ModuleView<'t>,
        node: Node<'t>,
        seen: &mut Vec<String>,
        depth: usize,
    ) -> PropertySchema {
        let file = view.file;
        let first = |n: Node<'t>| n.named_child(0);

        match node.kind() {
            "type_annotation" | "parenthesized_type" | "readonly_type" => first(node)
                .map(|inner| self.type_schema(view, inner, seen, depth))
                .unwrap_or_else(PropertySchema::any),
            "predefined_type" => predefined_type(file.node_text(node)),
            "literal_type" => first(node)
                .map(literal_schema)
                .unwrap_or_else(PropertySchema::any),
            "template_literal_type" => PropertySchema::string(),
            "union_type" => {
                let mut members = Vec::new();
                flatten_union(node, &mut members);
                let schemas: Vec<PropertySchema> = members
                    .into_iter()
                    .map(|m| self.type_schema(view, m, seen, depth))
                    .collect();
                let structured: Vec<&PropertySchema> = schemas
                    .iter()
                    .filter(|s| !matches!(s, PropertySchema::Primitive { .. }))
                    .collect();
                let only_nullish_besides = schemas
                    .iter()
                    .filter(|s| matches!(s, PropertySchema::Primitive { .. }))
                    .all(is_nullish);
                if schemas.iter().any(PropertySchema::is_any) {
                    PropertySchema::any()
                } else if structured.len() == 1 && only_nullish_besides {
                    structured[0].clone()
                } else {
                    PropertySchema::union(schemas)
                }
            }
            "array_type" => PropertySchema::array(
                first(node)
                    .map(|inner| self.type_schema(view, inner, seen, depth))
                    .unwrap_or_else(PropertySchema::any),
            ),
            "tuple_type" => {
                let members = named_children(node)
                    .into_iter()
                    .map(|m| self.type_schema(view, m, seen, depth))
                    .collect();
                PropertySchema::array(PropertySchema::union(members))
            }
            "object_type" => PropertySchema::object(self.member_fields(view, node, seen, depth)),
            "intersection_type" => {
                let mut fields = Properties::new();
                for member in named_children(node) {
                    if let PropertySchema::Object { fields: f } =
                        self.type_schema(view, member, seen, depth)
                    {
                        merge_properties(&mut fields, f);
                    }
                }
                PropertySchema::object(fields)
            }
            "generic_type" => self.generic_schema(view, node, seen, depth),
            "type_identifier" => {
                let name = file.node_text(node);
                self.named_type(view, name, seen, depth)
                    .unwrap_or_else(|| PropertySchema::label(name))
            }
            "nested_type_identifier" => PropertySchema::label(file.node_text(node)),
            _ => PropertySchema::any(),
        }
    }

    fn generic_schema<'t>(
        &self,
        view: &ModuleView<'t>,
        node: Node<'t>,
        seen: &mut Vec<String>,
        depth: usize,
    ) -> PropertySchema {
        let name = view.file.field_text(node, "name").unwrap_or("");
        let first_arg = node
            .child_by_field_name("type_arguments")
            .and_then(|args| named_children(args).into_iter().next());
        let first_schema = |seen: &mut Vec<String>| {
            first_arg
                .map(|arg| self.type_schema(view, arg, seen, depth))
                .unwrap_or_else(PropertySchema::any)
        };

        match name {
            "Array" | "ReadonlyArray" | "Set" | "ReadonlySet" => {
                PropertySchema::array(first_schema(seen))
            }
            "Record" | "Map" | "ReadonlyMap" | "WeakMap" => PropertySchema::object(Properties::new()),
            "Partial" | "Required" | "Readonly" | "NonNullable" => first_schema(seen),
            _ => self
                .named_type(view, name, seen, depth)
                .unwrap_or_else(|| PropertySchema::label(view.file.node_text(node))),
        }
    }

    fn value_schema<'t>(&self, view: &ModuleView<'t>, node: Node<'t>, depth: usize) -> PropertySchema {
        if depth > MAX_RESOLVE_DEPTH {
            return PropertySchema::any();
        }
        let file = view.file;
        match node.kind() {
            "string" | "template_string" => PropertySchema::string(),
            "number" => PropertySchema::number(),
            "true" | "false" => PropertySchema::boolean(),
            "null" => PropertySchema::null(),
            "undefined" if self.typed => PropertySchema::label("undefined"),
            "object" => PropertySchema::object(self.object_fields(view, node, depth + 1)),
            "array" => {
                let items = named_children(node)
                    .into_iter()
                    .filter(|c| c.kind() != "spread_element")
                    .map(|c| self.value_schema(view, c, depth + 1))
                    .collect();
                PropertySchema::array(infer_array_items(items))
            }
            "identifier" if self.typed => {
                self.identifier_schema(view, file.node_text(node), node, depth + 1)
            }
            "member_expression" | "subscript_expression" if self.typed => {
                match self.event_name(view, node) {
                    Some(_) => PropertySchema::string(),
                    None => self.member_schema(view, node, depth),
                }
            }
            "parenthesized_expression" | "non_null_expression" | "satisfies_expression" => node
                .named_child(0)
                .map(|inner| self.value_schema(view, inner, depth + 1))
                .unwrap_or_else(PropertySchema::any),
            "as_expression" => {
                let parts = named_children(node);
                match (parts.first(), parts.get(1)) {
                    (_, Some(ty)) if self.typed => self.type_schema(view, *ty, &mut Vec::new(), 0),
                    (Some(expr), _) => self.value_schema(view, *expr, depth + 1),
                    _ => PropertySchema::any(),
                }
            }
            "unary_expression" if self.typed => match file.field_text(node, "operator") {
                Some("!") => PropertySchema::boolean(),
                Some("-" | "+" | "~") => PropertySchema::number(),
                Some("typeof") => PropertySchema::string(),
                _ => PropertySchema::any(),
            },
            "binary_expression" if self.typed => self.binary_schema(view, node, depth),
            "call_expression" if is_function_call_named(file, node, "Object.freeze") => {
                call_arguments(node)
                    .first()
                    .map(|arg| self.value_schema(view, *arg, depth + 1))
                    .unwrap_or_else(PropertySchema::any)
            }
            _ => PropertySchema::any(),
        }
    }

    /// Declared type of `object.property` or `object[index]`, read from the
    /// object's own schema.
    fn member_schema<'t>(&self, view: &ModuleView<'t>, node: Node<'t>, depth: usize) -> PropertySchema {
        let file = view.file;
        let Some(object) = node.child_by_field_name("object") else {
            return PropertySchema::any();
        };
        let object = unwrap_expression(file, object);

        if node.kind() == "subscript_expression" {
            let index = node.child_by_field_name("index");
            return match self.value_schema(view, object, depth + 1) {
                PropertySchema::Array { items } if index.map(|i| i.kind()) == Some("number") => {
                    *items
                }
                PropertySchema::Object { fields } => index
                    .and_then(|i| literal_string(file, i))
                    .and_then(|key| fields.get(&key).cloned())
                    .unwrap_or_else(PropertySchema::any),
                _ => PropertySchema::any(),
            };
        }

        let Some(property) = file.field_text(node, "property") else {
            return PropertySchema::any();
        };
        if object.kind() == "this" {
            return self.class_member_schema(view, node, property, depth);
        }

        match self.value_schema(view, object, depth + 1) {
            PropertySchema::Array { .. }
            | PropertySchema::Primitive {
                ty: PrimitiveType::String,
            } if property == "length" => PropertySchema::number(),
            PropertySchema::Object { mut fields } => {
                fields.remove(property).unwrap_or_else(PropertySchema::any)
            }
            _ => PropertySchema::any(),
        }
    }

    /// Type of `this.<property>` from the enclosing class: a field
    /// declaration, else a constructor parameter property.
    fn class_member_schema<'t>(
        &self,
        view: &ModuleView<'t>,
        at: Node<'t>,
        property: &str,
        depth: usize,
    ) -> PropertySchema {
        let file = view.file;
        let mut current = at.parent();
        let body = loop {
            match current {
                Some(n) if n.kind() == "class_body" => break n,
                Some(n) => current = n.parent(),
                None => return PropertySchema::any(),
            }
        };

        for member in named_children(body) {
            match member.kind() {
                "public_field_definition" if file.field_text(member, "name") == Some(property) => {
                    if let Some(ty) = member.child_by_field_name("type") {
                        return self.type_schema(view, ty, &mut Vec::new(), 0);
                    }
                    return member
                        .child_by_field_name("value")
                        .map(|v| self.value_schema(view, v, depth + 1))
                        .unwrap_or_else(PropertySchema::any);
                }
                "method_definition" if file.field_text(member, "name") == Some("constructor") => {
                    let params = member
                        .child_by_field_name("parameters")
                        .map(named_children)
                        .unwrap_or_default();
                    for param in params {
                        let is_property = children(param)
                            .iter()
                            .any(|c| matches!(c.kind(), "accessibility_modifier" | "readonly"));
                        if !is_property || file.field_text(param, "pattern") != Some(property) {
                            continue;
                        }
                        let schema = param
                            .child_by_field_name("type")
                            .map(|ty| self.type_schema(view, ty, &mut Vec::new(), 0))
                            .unwrap_or_else(PropertySchema::any);
                        return if param.kind() == "optional_parameter" {
                            optional(schema)
                        } else {
                            schema
                        };
                    }
                }
                _ => {}
            }
        }
        PropertySchema::any()
    }

    fn binary_schema<'t>(&self, view: &ModuleView<'t>, node: Node<'t>, depth: usize) -> PropertySchema {
        match view.file.field_text(node, "operator").unwrap_or("") {
            "==" | "===" | "!=" | "!==" | "<" | ">" | "<=" | ">=" | "instanceof" | "in" => {
                PropertySchema::boolean()
            }
            "-" | "*" | "/" | "%" | "**" | "&" | "|" | "^" | "<<" | ">>" | ">>>" => {
                PropertySchema::number()
            }
            "+" => {
                let side = |field: &str| {
                    node.child_by_field_name(field)
                        .map(|n| self.value_schema(view, n, depth + 1))
                        .unwrap_or_else(PropertySchema::any)
                };
                let (left, right) = (side("left"), side("right"));
                if left == PropertySchema::string() || right == PropertySchema::string() {
                    PropertySchema::string()
                } else if left == PropertySchema::number() && right == PropertySchema::number() {
                    PropertySchema::number()
                } else {
                    PropertySchema::any()
                }
            }
            _ => PropertySchema::any(),
        }
    }

    fn identifier_schema<'t>(
        &self,
        view: &ModuleView<'t>,
        name: &str,
        at: Node<'t>,
        depth: usize,
    ) -> PropertySchema {
        if depth > MAX_RESOLVE_DEPTH {
            return PropertySchema::any();
        }
        if let Some(binding) = view.lookup(name, at) {
            if let Some(ty) = binding.type_ann {
                return self.type_schema(view, ty, &mut Vec::new(), 0);
            }
            return match binding.value {
                Some(v) if v.kind() == "enum_declaration" => enum_schema(view.file, v),
                Some(v) => self.value_schema(view, v, depth + 1),
                None => PropertySchema::any(),
            };
        }
        match self.string_constant(view, name, &[], at, depth) {
            Some(_) => PropertySchema::string(),
            None => PropertySchema::any(),
        }
    }

    fn object_fields<'t>(&self, view: &ModuleView<'t>, node: Node<'t>, depth: usize) -> Properties {
        let file = view.file;
        let mut fields = Properties::new();
        for child in named_children(node) {
            match child.kind() {
                "pair" => {
                    let Some(key) = child
                        .child_by_field_name("key")
                        .and_then(|k| property_key(file, k))
                    else {
                        continue;
                    };
                    let schema = child
                        .child_by_field_name("value")
                        .map(|v| self.value_schema(view, v, depth))
                        .unwrap_or_else(PropertySchema::any);
                    fields.insert(key, schema);
                }
                "shorthand_property_identifier" => {
                    let name = file.node_text(child);
                    let schema = if self.typed {
                        self.identifier_schema(view, name, child, depth)
                    } else {
                        PropertySchema::any()
                    };
                    fields.insert(name.to_string(), schema);
                }
                "spread_element" => {
                    if let Some(inner) = child.named_child(0) {
                        let spread = self.properties_argument(view, inner, depth + 1);
                        merge_properties(&mut fields, spread);
                    }
                }
                _ => {}
            }
        }
        fields
    }

    /// Object literal behind `node`, directly or through a local binding.
    fn resolve_object<'t>(&self, view: &ModuleView<'t>, node: Node<'t>) -> Option<Node<'t>> {
        let node = unwrap_expression(view.file, node);
        match node.kind() {
            "object" => Some(node),
            "identifier" => {
                let value = view.lookup(view.file.node_text(node), node)?.value?;
                let value = unwrap_expression(view.file, value);
                (value.kind() == "object").then_some(value)
            }
            _ => None,
        }
    }

    fn properties_argument<'t>(&self, view: &ModuleView<'t>, node: Node<'t>, depth: usize) -> Properties {
        if depth > MAX_RESOLVE_DEPTH {
            return Properties::new();
        }
        if let Some(object) = self.resolve_object(view, node) {
            return self.object_fields(view, object, depth + 1);
        }

        let node = unwrap_expression(view.file, node);
        if node.kind() == "identifier" {
            let name = view.file.node_text(node);
            if let Some(binding) = view.lookup(name, node) {
                if let Some(value) = binding.value {
                    let value = unwrap_expression(view.file, value);
                    if value.kind() == "identifier" {
                        return self.properties_argument(view, value, depth + 1);
                    }
                }
                if let Some(ty) = binding.type_ann.filter(|_| self.typed) {
                    if let PropertySchema::Object { fields } =
                        self.type_schema(view, ty, &mut Vec::new(), 0)
                    {
                        return fields;
                    }
                }
            }
            debug!(
                path = %view.file.path.display(),
                line = line_of(node),
                ident = name,
                "unresolved properties argument"
            );
        }
        Properties::new()
    }

    /// Event name stored under `key` of an object payload, plus the
    /// remaining keys as properties.
    fn keyed_event<'t>(
        &self,
        view: &ModuleView<'t>,
        payload: Node<'t>,
        key: &str,
    ) -> Option<(String, Properties)> {
        let object = self.resolve_object(view, payload)?;
        let name = self.event_name(view, object_member(view.file, object, key)?)?;
        let mut properties = self.object_fields(view, object, 0);
        properties.remove(key);
        Some((name, properties))
    }
}

struct Extractor<'t, 'r> {
    view: ModuleView<'t>,
    resolver: Resolver<'r>,
    signatures: &'r [CustomSignature],
}

impl<'t, 'r> Extractor<'t, 'r> {
    fn inspect_call(&self, call: Node<'t>) -> Option<TrackingEvent> {
        let file = self.view.file;
        let callee = segments(file, call.child_by_field_name("function")?)?;
        let args = call_arguments(call);

        if let Some(signature) = find_match(self.signatures, &callee) {
            return self.custom_event(call, signature, &args);
        }

        let source = providers::JAVASCRIPT.lookup(&callee)?;
        let (name, properties) = match source {
            Source::GoogleAnalytics => {
                if literal_string(file, *args.first()?)?.as_str() != "event" {
                    return None;
                }
                self.positional(call, &args, 1, 2)?
            }
            Source::Snowplow => {
                let payload = self.struct_event_payload(*args.first()?)?;
                let object = *call_arguments(payload).first()?;
                self.resolver.keyed_event(&self.view, object, "action")?
            }
            Source::Gtm => self.resolver.keyed_event(&self.view, *args.first()?, "event")?,
            Source::Mparticle => self.positional(call, &args, 0, 2)?,
            _ => self.positional(call, &args, 0, 1)?,
        };

        Some(self.event(call, name, source, properties))
    }

    /// The `buildStructEvent(...)` call passed directly or through a local.
    fn struct_event_payload(&self, arg: Node<'t>) -> Option<Node<'t>> {
        let file = self.view.file;
        let mut payload = unwrap_expression(file, arg);
        if payload.kind() == "identifier" {
            let value = self.view.lookup(file.node_text(payload), payload)?.value?;
            payload = unwrap_expression(file, value);
        }
        is_function_call_named(file, payload, "buildStructEvent").then_some(payload)
    }

    fn positional(
        &self,
        call: Node<'t>,
        args: &[Node<'t>],
        event_index: usize,
        properties_index: usize,
    ) -> Option<(String, Properties)> {
        let name = self.event_name(call, *args.get(event_index)?)?;
        let properties = args
            .get(properties_index)
            .map(|a| self.resolver.properties_argument(&self.view, *a, 0))
            .unwrap_or_default();
        Some((name, properties))
    }

    fn event_name(&self, call: Node<'t>, arg: Node<'t>) -> Option<String> {
        let name = self.resolver.event_name(&self.view, arg);
        if name.is_none() {
            debug!(
                path = %self.view.file.path.display(),
                line = line_of(call),
                expr = self.view.file.node_text(arg),
                "skipping call with unresolved event name"
            );
        }
        name
    }

    fn custom_event(
        &self,
        call: Node<'t>,
        signature: &CustomSignature,
        args: &[Node<'t>],
    ) -> Option<TrackingEvent> {
        let (name, mut properties) =
            self.positional(call, args, signature.event_index, signature.properties_index)?;
        for extra in &signature.extra_params {
            if let Some(arg) = args.get(extra.index) {
                let schema = self.resolver.value_schema(&self.view, *arg, 0);
                properties.insert(extra.name.clone(), schema);
            }
        }
        Some(self.event(call, name, Source::Custom, properties))
    }

    fn event(&self, call: Node<'t>, name: String, source: Source, properties: Properties) -> TrackingEvent {
        TrackingEvent {
            event_name: name,
            source,
            properties,
            file_path: self.view.file.path.clone(),
            line: line_of(call),
            function_name: naming::ecmascript_context(self.view.file, call),
        }
    }
}

/// Find tracking calls in a JavaScript or TypeScript file.
pub(crate) fn find_events(
    calls: &CompiledQuery,
    file: &ParsedFile,
    signatures: &[CustomSignature],
    modules: &dyn ModuleResolver,
) -> Vec<TrackingEvent> {
    let Some(query) = calls.get() else {
        return Vec::new();
    };

    let extractor = Extractor {
        view: ModuleView::new(file),
        resolver: Resolver {
            modules,
            typed: modules.is_typed(),
        },
        signatures,
    };

    let mut cursor = QueryCursor::new();
    let mut matches = cursor.matches(query, file.tree.root_node(), &file.source[..]);
    let mut events = Vec::new();
    while let Some(m) = matches.next() {
        for capture in m.captures {
            if let Some(event) = extractor.inspect_call(capture.node) {
                events.push(event);
            }
        }
    }
    events
}
