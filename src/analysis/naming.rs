//! Context naming: which function a tracking call belongs to.

use tree_sitter::Node;

use super::ParsedFile;

/// Name reported for calls outside any function.
pub const GLOBAL: &str = "global";

/// Name reported for Ruby calls inside a block or lambda but no method.
pub const BLOCK: &str = "block";

/// React hooks whose callbacks get composite names (`Component.useEffect`).
pub const REACT_HOOKS: &[&str] = &[
    "useEffect",
    "useLayoutEffect",
    "useInsertionEffect",
    "useCallback",
    "useMemo",
    "useReducer",
    "useState",
    "useImperativeHandle",
    "useDeferredValue",
    "useTransition",
];

fn is_es_function(kind: &str) -> bool {
    matches!(
        kind,
        "arrow_function" | "function_expression" | "function" | "generator_function"
    )
}

/// Name of the binding an ES function node is attached to, if any.
fn es_scope_name(file: &ParsedFile, node: Node) -> Option<String> {
    let value_is_function = |field: &str| {
        node.child_by_field_name(field)
            .map(|v| is_es_function(v.kind()))
            .unwrap_or(false)
    };

    match node.kind() {
        "function_declaration" | "generator_function_declaration" => Some(
            file.field_text(node, "name")
                .unwrap_or("anonymous")
                .to_string(),
        ),
        "method_definition" => file.field_text(node, "name").map(str::to_string),
        "variable_declarator" if value_is_function("value") => {
            let name = node.child_by_field_name("name")?;
            (name.kind() == "identifier").then(|| file.node_text(name).to_string())
        }
        "pair" if value_is_function("value") => file
            .field_text(node, "key")
            .map(|k| k.trim_matches(|c| c == '"' || c == '\'').to_string()),
        "public_field_definition" if value_is_function("value") => {
            file.field_text(node, "name").map(str::to_string)
        }
        "field_definition" if value_is_function("value") => {
            file.field_text(node, "property").map(str::to_string)
        }
        "assignment_expression" if value_is_function("right") => {
            let left = file.field_text(node, "left")?;
            left.rsplit('.').next().map(str::to_string)
        }
        _ => None,
    }
}

/// Hook name if `node` is a call to one of `REACT_HOOKS`.
fn es_hook_name(file: &ParsedFile, node: Node) -> Option<&'static str> {
    if node.kind() != "call_expression" {
        return None;
    }
    let callee = node.child_by_field_name("function")?;
    let name = match callee.kind() {
        "identifier" => file.node_text(callee),
        "member_expression" => file.field_text(callee, "property")?,
        _ => return None,
    };
    REACT_HOOKS.iter().copied().find(|hook| *hook == name)
}

/// JavaScript/TypeScript context for a call site.
///
/// The nearest named function wins; a hook call between the site and that
/// function is appended as `Name.hook`.
pub fn ecmascript_context(file: &ParsedFile, call: Node) -> String {
    let mut hook: Option<&'static str> = None;
    let mut current = call.parent();

    while let Some(node) = current {
        if hook.is_none() {
            hook = es_hook_name(file, node);
        }
        if let Some(name) = es_scope_name(file, node) {
            return match hook {
                Some(hook) => format!("{}.{}", name, hook),
                None => name,
            };
        }
        current = node.parent();
    }

    hook.map(str::to_string)
        .unwrap_or_else(|| GLOBAL.to_string())
}

/// Ruby context: nearest method, else `block`, else `global`.
pub fn ruby_context(file: &ParsedFile, call: Node) -> String {
    let mut in_block = false;
    let mut current = call.parent();

    while let Some(node) = current {
        match node.kind() {
            "method" | "singleton_method" => {
                if let Some(name) = file.field_text(node, "name") {
                    return name.to_string();
                }
            }
            "block" | "do_block" | "lambda" => in_block = true,
            _ => {}
        }
        current = node.parent();
    }

    let name = if in_block { BLOCK } else { GLOBAL };
    name.to_string()
}

/// Nearest ancestor of one of `kinds`, named by its `name` field.
pub fn enclosing_named(file: &ParsedFile, call: Node, kinds: &[&str]) -> String {
    let mut current = call.parent();
    while let Some(node) = current {
        if kinds.contains(&node.kind()) {
            if let Some(name) = file.field_text(node, "name") {
                return name.to_string();
            }
        }
        current = node.parent();
    }
    GLOBAL.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::traits::parse_with;
    use std::path::Path;

    fn js(source: &str) -> ParsedFile {
        let language: tree_sitter::Language = tree_sitter_javascript::LANGUAGE.into();
        parse_with(&language, Path::new("t.js"), source.as_bytes()).unwrap()
    }

    /// Context of the first call to `track`.
    fn context_of_track(file: &ParsedFile) -> String {
        fn find<'t>(file: &ParsedFile, node: Node<'t>) -> Option<Node<'t>> {
            if node.kind() == "call_expression"
                && file.field_text(node, "function") == Some("track")
            {
                return Some(node);
            }
            let mut cursor = node.walk();
            let children: Vec<_> = node.children(&mut cursor).collect();
            children.into_iter().find_map(|c| find(file, c))
        }
        let call = find(file, file.tree.root_node()).expect("track call");
        ecmascript_context(file, call)
    }

    #[test]
    fn test_global_scope() {
        assert_eq!(context_of_track(&js("track('a');")), "global");
    }

    #[test]
    fn test_nearest_named_function_wins() {
        let file = js("export const checkout = () => { const inner = () => { track('a'); }; };");
        assert_eq!(context_of_track(&file), "inner");

        let file = js("function doSignup() { [1].forEach(() => track('a')); }");
        assert_eq!(context_of_track(&file), "doSignup");
    }

    #[test]
    fn test_component_and_hook_compose() {
        let file = js(
            "function Dashboard() { useEffect(() => { track('viewed'); }, []); return null; }",
        );
        assert_eq!(context_of_track(&file), "Dashboard.useEffect");

        let file = js("const Page = () => { const cb = React.useCallback(() => track('x'), []); };");
        assert_eq!(context_of_track(&file), "Page.useCallback");
    }

    #[test]
    fn test_hook_only() {
        let file = js("useEffect(() => { track('x'); });");
        assert_eq!(context_of_track(&file), "useEffect");
    }

    #[test]
    fn test_methods_and_object_properties() {
        let file = js("class A { send() { track('x'); } }");
        assert_eq!(context_of_track(&file), "send");

        let file = js("const handlers = { onClick: function () { track('x'); } };");
        assert_eq!(context_of_track(&file), "onClick");
    }
}
