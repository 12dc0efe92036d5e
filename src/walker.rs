//! File discovery and language classification.

use std::fmt;
use std::path::{Path, PathBuf};

use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

use crate::error::ConfigError;

/// Directory names that are never scanned.
pub(crate) const SKIPPED_DIRS: &[&str] = &["node_modules", "coverage", "temp", "tmp", "log"];

/// Languages with a tracking analyzer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    JavaScript,
    TypeScript,
    Python,
    Ruby,
    Go,
}

impl Language {
    /// Classify a file by extension. TypeScript declaration files are skipped.
    pub fn from_path(path: &Path) -> Option<Language> {
        let name = path.file_name()?.to_str()?;
        if name.ends_with(".d.ts") {
            return None;
        }
        match path.extension()?.to_str()? {
            "js" | "jsx" | "mjs" | "cjs" => Some(Language::JavaScript),
            "ts" | "tsx" | "mts" | "cts" => Some(Language::TypeScript),
            "py" => Some(Language::Python),
            "rb" => Some(Language::Ruby),
            "go" => Some(Language::Go),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Language::JavaScript => "javascript",
            Language::TypeScript => "typescript",
            Language::Python => "python",
            Language::Ruby => "ruby",
            Language::Go => "go",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Compiled ignore globs.
///
/// A pattern is tested against the absolute path and the root-relative path.
/// Patterns without a `/` also match a bare file or directory name.
#[derive(Debug, Clone)]
pub struct IgnoreRules {
    full: GlobSet,
    basename: GlobSet,
}

impl IgnoreRules {
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self, ConfigError> {
        let mut full = GlobSetBuilder::new();
        let mut basename = GlobSetBuilder::new();
        for pattern in patterns {
            let pattern = pattern.as_ref();
            let glob = Glob::new(pattern).map_err(|e| ConfigError::IgnorePattern {
                pattern: pattern.to_string(),
                message: e.to_string(),
            })?;
            if !pattern.contains('/') {
                basename.add(glob.clone());
            }
            full.add(glob);
        }
        let build = |builder: GlobSetBuilder| {
            builder.build().map_err(|e| ConfigError::IgnorePattern {
                pattern: patterns
                    .iter()
                    .map(|p| p.as_ref())
                    .collect::<Vec<_>>()
                    .join(", "),
                message: e.to_string(),
            })
        };
        Ok(Self {
            full: build(full)?,
            basename: build(basename)?,
        })
    }

    /// Like `new`, but drops invalid patterns with a warning.
    pub fn lenient<S: AsRef<str>>(patterns: &[S]) -> Self {
        let valid: Vec<&str> = patterns
            .iter()
            .map(|p| p.as_ref())
            .filter(|p| match Glob::new(p) {
                Ok(_) => true,
                Err(e) => {
                    warn!(pattern = %p, error = %e, "ignoring invalid ignore pattern");
                    false
                }
            })
            .collect();
        Self::new(&valid).unwrap_or_else(|_| Self::empty())
    }

    pub fn empty() -> Self {
        Self {
            full: GlobSet::empty(),
            basename: GlobSet::empty(),
        }
    }

    pub fn is_ignored(&self, root: &Path, path: &Path) -> bool {
        if self.full.is_match(path) {
            return true;
        }
        if let Ok(rel) = path.strip_prefix(root) {
            if !rel.as_os_str().is_empty() && self.full.is_match(rel) {
                return true;
            }
        }
        path.file_name()
            .map(|name| self.basename.is_match(name))
            .unwrap_or(false)
    }
}

fn is_skipped_entry(entry: &DirEntry) -> bool {
    if entry.depth() == 0 {
        return false;
    }
    let name = entry.file_name().to_string_lossy();
    if name.starts_with('.') {
        return true;
    }
    entry.file_type().is_dir() && SKIPPED_DIRS.contains(&name.as_ref())
}

/// Collect every analyzable file under `root`, sorted.
///
/// Unreadable entries are logged and skipped. A file root yields itself when
/// it has a supported extension.
pub fn collect_files(root: &Path, ignore: &IgnoreRules) -> Vec<PathBuf> {
    let mut files = Vec::new();

    let walker = WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| !is_skipped_entry(e) && !ignore.is_ignored(root, e.path()));

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(error = %e, "skipping unreadable entry");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        if Language::from_path(entry.path()).is_some() {
            files.push(entry.into_path());
        }
    }

    files.sort();
    debug!(root = %root.display(), count = files.len(), "collected files");
    files
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn touch(dir: &Path, rel: &str) {
        let path = dir.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "").unwrap();
    }

    #[test]
    fn test_language_from_path() {
        assert_eq!(Language::from_path(Path::new("a/b.tsx")), Some(Language::TypeScript));
        assert_eq!(Language::from_path(Path::new("a/b.mjs")), Some(Language::JavaScript));
        assert_eq!(Language::from_path(Path::new("types.d.ts")), None);
        assert_eq!(Language::from_path(Path::new("main.go")), Some(Language::Go));
        assert_eq!(Language::from_path(Path::new("README.md")), None);
    }

    #[test]
    fn test_collect_skips_conventional_dirs() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        touch(root, "src/app.js");
        touch(root, "src/lib/util.py");
        touch(root, "node_modules/pkg/index.js");
        touch(root, ".git/hooks/pre-commit.rb");
        touch(root, "coverage/report.js");
        touch(root, "tmp/scratch.go");
        touch(root, "src/.hidden.js");
        touch(root, "docs/readme.md");

        let files = collect_files(root, &IgnoreRules::empty());
        let rel: Vec<String> = files
            .iter()
            .map(|p| p.strip_prefix(root).unwrap().to_string_lossy().replace('\\', "/"))
            .collect();
        assert_eq!(rel, vec!["src/app.js", "src/lib/util.py"]);
    }

    #[test]
    fn test_ignore_patterns_match_relative_and_basename() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        touch(root, "src/app.js");
        touch(root, "src/app.test.js");
        touch(root, "generated/schema.ts");
        touch(root, "lib/keep.rb");

        let ignore = IgnoreRules::new(&["*.test.js", "generated/**"]).unwrap();
        let files = collect_files(root, &ignore);
        assert_eq!(files.len(), 2);
        assert!(files.iter().any(|p| p.ends_with("src/app.js")));
        assert!(files.iter().any(|p| p.ends_with("lib/keep.rb")));
    }

    #[test]
    fn test_invalid_pattern() {
        assert!(IgnoreRules::new(&["src/[unclosed"]).is_err());
        let lenient = IgnoreRules::lenient(&["src/[unclosed", "*.rb"]);
        assert!(lenient.is_ignored(Path::new("/r"), Path::new("/r/a.rb")));
    }

    #[test]
    fn test_single_file_root() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "one.go");
        let file = tmp.path().join("one.go");
        assert_eq!(collect_files(&file, &IgnoreRules::empty()), vec![file]);
    }
}
