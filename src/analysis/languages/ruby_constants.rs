//! Ruby string constants, indexed by directory.
//!
//! Built once per scan before any Ruby file is analyzed, so that
//! `TelemetryHelper::FINISHED_SECTION` resolves the same way from every file
//! that references it.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;
use tree_sitter::Node;

use crate::analysis::syntax::{named_children, unquote};
use crate::analysis::traits::parse_with;
use crate::analysis::ParsedFile;
use crate::orchestrator::par_map_bounded;

use super::ruby::ruby_language;

/// Fully-qualified constant name → string value.
pub type ConstantMap = HashMap<String, String>;

#[derive(Debug, Default)]
pub struct RubyConstantIndex {
    by_dir: BTreeMap<PathBuf, ConstantMap>,
}

/// Literal value of a plain string, or of `'x'.freeze`.
pub(crate) fn string_literal(file: &ParsedFile, node: Node) -> Option<String> {
    match node.kind() {
        "string" => {
            let interpolated = named_children(node)
                .iter()
                .any(|c| c.kind() == "interpolation");
            (!interpolated).then(|| unquote(file.node_text(node)).to_string())
        }
        "call" if file.field_text(node, "method") == Some("freeze") => {
            string_literal(file, node.child_by_field_name("receiver")?)
        }
        _ => None,
    }
}

fn collect(file: &ParsedFile, node: Node, namespace: &mut Vec<String>, out: &mut ConstantMap) {
    match node.kind() {
        "module" | "class" => {
            let name = file
                .field_text(node, "name")
                .map(|n| n.trim_start_matches("::").to_string());
            let pushed = name.is_some();
            if let Some(name) = name {
                namespace.push(name);
            }
            for child in named_children(node) {
                collect(file, child, namespace, out);
            }
            if pushed {
                namespace.pop();
            }
            return;
        }
        "assignment" => {
            let value = node
                .child_by_field_name("right")
                .and_then(|v| string_literal(file, v));
            if let (Some(left), Some(value)) = (node.child_by_field_name("left"), value) {
                let key = match left.kind() {
                    "constant" => {
                        let mut parts = namespace.clone();
                        parts.push(file.node_text(left).to_string());
                        Some(parts.join("::"))
                    }
                    "scope_resolution" => {
                        Some(file.node_text(left).trim_start_matches("::").to_string())
                    }
                    _ => None,
                };
                if let Some(key) = key {
                    out.insert(key, value);
                }
            }
        }
        _ => {}
    }
    for child in named_children(node) {
        collect(file, child, namespace, out);
    }
}

/// Constants declared in one parsed file.
pub fn constants_in(file: &ParsedFile) -> ConstantMap {
    let mut out = ConstantMap::new();
    collect(file, file.tree.root_node(), &mut Vec::new(), &mut out);
    out
}

fn constants_in_dir(dir: &Path) -> ConstantMap {
    let mut map = ConstantMap::new();
    let Ok(entries) = fs::read_dir(dir) else {
        return map;
    };
    let mut paths: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file() && p.extension().and_then(|e| e.to_str()) == Some("rb"))
        .collect();
    paths.sort();

    let language = ruby_language();
    for path in paths {
        let parsed = fs::read(&path)
            .ok()
            .and_then(|source| parse_with(&language, &path, &source).ok());
        match parsed {
            Some(parsed) => map.extend(constants_in(&parsed)),
            None => debug!(path = %path.display(), "skipping unreadable ruby file"),
        }
    }
    map
}

impl RubyConstantIndex {
    /// Index every directory containing one of `files`. Each directory
    /// contributes all of its `.rb` files, scanned or not. At most `limit`
    /// directories are read at once.
    pub fn build(files: &[PathBuf], limit: usize) -> Self {
        let mut dirs: Vec<PathBuf> = files
            .iter()
            .filter_map(|f| f.parent().map(Path::to_path_buf))
            .collect();
        dirs.sort();
        dirs.dedup();

        let by_dir = par_map_bounded(dirs, limit, |dir| {
            let map = constants_in_dir(&dir);
            (dir, map)
        })
        .into_iter()
        .collect();

        let index = Self { by_dir };
        debug!(
            dirs = index.by_dir.len(),
            constants = index.len(),
            "built ruby constant index"
        );
        index
    }

    pub fn len(&self) -> usize {
        self.by_dir.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Resolve `name` referenced from a file in `dir` inside `nesting`
    /// (outermost first).
    ///
    /// Lexical candidates are tried innermost first, the file's own directory
    /// before all others. Failing that, a suffix match is accepted when every
    /// match agrees on the value.
    pub fn resolve(&self, dir: &Path, name: &str, nesting: &[String]) -> Option<&str> {
        let name = name.trim_start_matches("::");
        let candidates: Vec<String> = (0..=nesting.len())
            .rev()
            .map(|depth| {
                let mut parts = nesting[..depth].to_vec();
                parts.push(name.to_string());
                parts.join("::")
            })
            .collect();

        let own = self.by_dir.get(dir);
        let others = self
            .by_dir
            .iter()
            .filter(|(d, _)| d.as_path() != dir)
            .map(|(_, m)| m);
        let maps: Vec<&ConstantMap> = own.into_iter().chain(others).collect();

        for map in &maps {
            for candidate in &candidates {
                if let Some(value) = map.get(candidate) {
                    return Some(value);
                }
            }
        }

        let suffix = format!("::{}", name);
        let mut matches = maps.iter().flat_map(|map| {
            map.iter()
                .filter(|(k, _)| k.ends_with(&suffix))
                .map(|(_, v)| v.as_str())
        });
        let first = matches.next()?;
        matches.all(|v| v == first).then_some(first)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn ruby(source: &str) -> ParsedFile {
        parse_with(&ruby_language(), Path::new("t.rb"), source.as_bytes()).unwrap()
    }

    #[test]
    fn test_collects_namespaced_constants() {
        let file = ruby(
            r#"
module A
  class B
    C = 'x'.freeze
    D = "y"
    NOT_STRING = 3
  end
  TOP = 'top'
end
Outer::Inner::E = 'e'
"#,
        );
        let map = constants_in(&file);
        assert_eq!(map.get("A::B::C").map(String::as_str), Some("x"));
        assert_eq!(map.get("A::B::D").map(String::as_str), Some("y"));
        assert_eq!(map.get("A::TOP").map(String::as_str), Some("top"));
        assert_eq!(map.get("Outer::Inner::E").map(String::as_str), Some("e"));
        assert!(!map.contains_key("A::B::NOT_STRING"));
    }

    #[test]
    fn test_resolves_across_directories() {
        let tmp = TempDir::new().unwrap();
        let helpers = tmp.path().join("helpers");
        let app = tmp.path().join("app");
        fs::create_dir_all(&helpers).unwrap();
        fs::create_dir_all(&app).unwrap();
        fs::write(
            helpers.join("telemetry.rb"),
            "module TelemetryHelper\n  FINISHED = '_Finished'.freeze\nend\n",
        )
        .unwrap();
        fs::write(app.join("local.rb"), "module Local\n  NAME = 'local'\nend\n").unwrap();
        let user = app.join("user.rb");
        fs::write(&user, "").unwrap();

        let index = RubyConstantIndex::build(&[helpers.join("telemetry.rb"), user], 1);
        assert_eq!(
            index.resolve(&app, "TelemetryHelper::FINISHED", &[]),
            Some("_Finished")
        );
        assert_eq!(
            index.resolve(&app, "NAME", &["Local".to_string()]),
            Some("local")
        );
        assert_eq!(index.resolve(&app, "FINISHED", &[]), Some("_Finished"));
        assert_eq!(index.resolve(&app, "MISSING", &[]), None);
    }
}
