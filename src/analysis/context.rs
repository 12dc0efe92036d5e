//! Per-scan analysis state.
//!
//! A `ScanContext` lives for exactly one `analyze_directory` call. It owns
//! the caches that cross file boundaries: the Ruby constant index built by
//! the pre-pass and the TypeScript projects keyed by manifest path.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use tracing::debug;

use crate::signature::CustomSignature;

use super::languages::{RubyConstantIndex, TsProject};
use super::FileContext;

pub struct ScanContext {
    /// Directory the scan is rooted at (the parent, for a single-file scan).
    root: PathBuf,
    signatures: Arc<Vec<CustomSignature>>,
    ruby_constants: Option<RubyConstantIndex>,
    /// Loaded projects, keyed by `tsconfig.json` path or by the root for
    /// files outside any project.
    ts_projects: RwLock<HashMap<PathBuf, Arc<TsProject>>>,
}

impl ScanContext {
    pub fn new<P: AsRef<Path>>(root: P, signatures: Vec<CustomSignature>) -> Self {
        let root = root.as_ref();
        let root = if root.is_file() {
            root.parent().unwrap_or(root)
        } else {
            root
        };
        Self {
            root: root.to_path_buf(),
            signatures: Arc::new(signatures),
            ruby_constants: None,
            ts_projects: RwLock::new(HashMap::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn signatures(&self) -> &Arc<Vec<CustomSignature>> {
        &self.signatures
    }

    /// Install the Ruby constant index. Must happen before any Ruby file is
    /// analyzed.
    pub fn set_ruby_constants(&mut self, index: RubyConstantIndex) {
        self.ruby_constants = Some(index);
    }

    /// Context handed to one file's analyzer.
    pub fn file_context<'a>(&'a self, ts_project: Option<&'a TsProject>) -> FileContext<'a> {
        FileContext {
            signatures: &self.signatures,
            ruby_constants: self.ruby_constants.as_ref(),
            ts_project,
        }
    }

    /// Project owning a TypeScript file, loading it on first use.
    pub fn ts_project_for(&self, file: &Path) -> Arc<TsProject> {
        let manifest = TsProject::find_manifest(file, &self.root);
        let key = manifest.clone().unwrap_or_else(|| self.root.clone());

        if let Ok(projects) = self.ts_projects.read() {
            if let Some(project) = projects.get(&key) {
                return Arc::clone(project);
            }
        }

        let project = Arc::new(match &manifest {
            Some(manifest) => TsProject::load(manifest),
            None => TsProject::standalone(&self.root),
        });
        debug!(key = %key.display(), "loaded typescript project");

        match self.ts_projects.write() {
            Ok(mut projects) => Arc::clone(projects.entry(key).or_insert(project)),
            Err(_) => project,
        }
    }

    pub fn ts_project_count(&self) -> usize {
        self.ts_projects.read().map(|p| p.len()).unwrap_or(0)
    }
}
