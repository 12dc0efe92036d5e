//! TypeScript project model.
//!
//! A project is rooted at the nearest `tsconfig.json` above a file. It knows
//! how to resolve import specifiers (relative paths, `paths` aliases and
//! `baseUrl`), caches every module it parses, and keeps an index of the
//! top-level type names declared anywhere in the project.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex};

use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::analysis::traits::parse_with;
use crate::analysis::ParsedFile;
use crate::walker::SKIPPED_DIRS;

use super::ecmascript::ModuleResolver;
use super::typescript::ts_language;

/// Projects larger than this are analyzed file by file, without the type index.
pub const MAX_PROJECT_FILES: usize = 10_000;

pub const TSCONFIG: &str = "tsconfig.json";

const MODULE_SUFFIXES: &[&str] = &[".ts", ".tsx", ".d.ts", "/index.ts", "/index.tsx"];

lazy_static! {
    static ref TYPE_DECL_RE: Regex = Regex::new(
        r"(?m)^\s*(?:export\s+)?(?:default\s+)?(?:declare\s+)?(?:const\s+)?(?:interface|type|enum)\s+([A-Za-z_$][A-Za-z0-9_$]*)"
    )
    .unwrap();
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TsConfig {
    #[serde(default)]
    compiler_options: CompilerOptions,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CompilerOptions {
    base_url: Option<String>,
    #[serde(default)]
    paths: BTreeMap<String, Vec<String>>,
}

pub struct TsProject {
    root: PathBuf,
    base_url: Option<PathBuf>,
    /// `paths` entries, resolved against `baseUrl` (or the project root).
    aliases: Vec<(String, Vec<PathBuf>)>,
    type_index: HashMap<String, Vec<PathBuf>>,
    modules: Mutex<HashMap<PathBuf, Option<Arc<ParsedFile>>>>,
}

fn is_ts_file(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("ts" | "tsx" | "mts" | "cts")
    )
}

/// Lexically resolve `.` and `..` components without touching the filesystem.
pub(crate) fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                let popped = matches!(out.components().next_back(), Some(Component::Normal(_)))
                    && out.pop();
                if !popped && !out.has_root() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

fn is_skipped(entry: &walkdir::DirEntry) -> bool {
    let name = entry.file_name().to_string_lossy();
    entry.depth() > 0 && (name.starts_with('.') || SKIPPED_DIRS.contains(&name.as_ref()))
}

impl TsProject {
    /// Nearest `tsconfig.json` at or above `file`'s directory, not climbing past `stop_at`.
    pub fn find_manifest(file: &Path, stop_at: &Path) -> Option<PathBuf> {
        let mut dir = file.parent();
        while let Some(current) = dir {
            let candidate = current.join(TSCONFIG);
            if candidate.is_file() {
                return Some(candidate);
            }
            if current == stop_at {
                break;
            }
            dir = current.parent();
        }
        None
    }

    /// Project described by a `tsconfig.json`. An unreadable config still
    /// yields a project rooted at its directory.
    pub fn load(manifest: &Path) -> Self {
        let root = manifest
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();

        let config = match fs::read_to_string(manifest) {
            Ok(text) => json5::from_str::<TsConfig>(&text).unwrap_or_else(|e| {
                warn!(path = %manifest.display(), error = %e, "invalid tsconfig, using defaults");
                TsConfig::default()
            }),
            Err(e) => {
                warn!(path = %manifest.display(), error = %e, "unreadable tsconfig");
                TsConfig::default()
            }
        };

        let mut project = Self::with_options(root, config.compiler_options);
        project.build_type_index();
        project
    }

    /// Project for TypeScript files that have no `tsconfig.json`.
    pub fn standalone(root: &Path) -> Self {
        let mut project = Self::with_options(root.to_path_buf(), CompilerOptions::default());
        project.build_type_index();
        project
    }

    fn with_options(root: PathBuf, options: CompilerOptions) -> Self {
        let base_url = options.base_url.map(|b| root.join(b));
        let alias_base = base_url.clone().unwrap_or_else(|| root.clone());
        let aliases = options
            .paths
            .into_iter()
            .map(|(pattern, targets)| {
                let targets = targets.iter().map(|t| alias_base.join(t)).collect();
                (pattern, targets)
            })
            .collect();

        Self {
            root,
            base_url,
            aliases,
            type_index: HashMap::new(),
            modules: Mutex::new(HashMap::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn build_type_index(&mut self) {
        let files: Vec<PathBuf> = WalkDir::new(&self.root)
            .into_iter()
            .filter_entry(|e| !is_skipped(e))
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file() && is_ts_file(e.path()))
            .map(|e| e.into_path())
            .take(MAX_PROJECT_FILES + 1)
            .collect();

        if files.len() > MAX_PROJECT_FILES {
            warn!(
                root = %self.root.display(),
                limit = MAX_PROJECT_FILES,
                "project too large, cross-file types disabled"
            );
            return;
        }

        for path in files {
            let Ok(text) = fs::read_to_string(&path) else {
                continue;
            };
            for caps in TYPE_DECL_RE.captures_iter(&text) {
                self.type_index
                    .entry(caps[1].to_string())
                    .or_default()
                    .push(path.clone());
            }
        }
        for paths in self.type_index.values_mut() {
            paths.sort();
            paths.dedup();
        }
        debug!(
            root = %self.root.display(),
            types = self.type_index.len(),
            "indexed project types"
        );
    }

    /// Parsed module at `path`, cached for the life of the project.
    pub fn module(&self, path: &Path) -> Option<Arc<ParsedFile>> {
        let path = normalize(path);
        let path = path.as_path();
        if let Ok(cache) = self.modules.lock() {
            if let Some(cached) = cache.get(path) {
                return cached.clone();
            }
        }

        let parsed = fs::read(path)
            .map_err(|e| debug!(path = %path.display(), error = %e, "cannot read module"))
            .ok()
            .and_then(|source| {
                parse_with(&ts_language(path), path, &source)
                    .map_err(|e| debug!(error = %e, "cannot parse module"))
                    .ok()
            })
            .map(Arc::new);

        if let Ok(mut cache) = self.modules.lock() {
            cache.insert(path.to_path_buf(), parsed.clone());
        }
        parsed
    }

    fn existing_module(base: &Path) -> Option<PathBuf> {
        let base = normalize(base);
        let base = base.as_path();
        if base.is_file() && is_ts_file(base) {
            return Some(base.to_path_buf());
        }
        let raw = base.to_string_lossy();
        if let Some(stem) = raw.strip_suffix(".js") {
            for ext in [".ts", ".tsx"] {
                let candidate = PathBuf::from(format!("{}{}", stem, ext));
                if candidate.is_file() {
                    return Some(candidate);
                }
            }
        }
        MODULE_SUFFIXES
            .iter()
            .map(|suffix| PathBuf::from(format!("{}{}", raw, suffix)))
            .find(|candidate| candidate.is_file())
    }

    /// File a specifier imported from `from` refers to.
    pub fn resolve_specifier(&self, from: &Path, specifier: &str) -> Option<PathBuf> {
        if specifier.starts_with("./") || specifier.starts_with("../") {
            let dir = from.parent()?;
            return Self::existing_module(&dir.join(specifier));
        }

        for (pattern, targets) in &self.aliases {
            let rest = match pattern.strip_suffix('*') {
                Some(prefix) => match specifier.strip_prefix(prefix) {
                    Some(rest) => rest,
                    None => continue,
                },
                None if pattern == specifier => "",
                None => continue,
            };
            for target in targets {
                let raw = target.to_string_lossy();
                let candidate = PathBuf::from(raw.replacen('*', rest, 1));
                if let Some(found) = Self::existing_module(&candidate) {
                    return Some(found);
                }
            }
        }

        let base = self.base_url.as_ref()?;
        Self::existing_module(&base.join(specifier))
    }
}

impl ModuleResolver for TsProject {
    fn is_typed(&self) -> bool {
        true
    }

    fn import(&self, from: &Path, specifier: &str) -> Option<Arc<ParsedFile>> {
        let path = self.resolve_specifier(from, specifier)?;
        self.module(&path)
    }

    fn module_declaring_type(&self, name: &str) -> Option<Arc<ParsedFile>> {
        let path = self.type_index.get(name)?.first()?;
        self.module(path)
    }
}
