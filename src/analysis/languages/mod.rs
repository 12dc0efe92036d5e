//! Language-specific analyzer implementations.

mod ecmascript;
mod go;
mod javascript;
mod python;
mod python_runtime;
mod ruby;
mod ruby_constants;
mod tsproject;
mod typescript;

pub use go::GoAnalyzer;
pub use javascript::JavaScriptAnalyzer;
pub use python::PythonAnalyzer;
pub use python_runtime::PythonRuntime;
pub use ruby::RubyAnalyzer;
pub use ruby_constants::{ConstantMap, RubyConstantIndex};
pub use tsproject::{TsProject, MAX_PROJECT_FILES, TSCONFIG};
pub use typescript::TypeScriptAnalyzer;

use super::LanguageAnalyzer;
use crate::walker::Language;
use once_cell::sync::OnceCell;
use std::sync::atomic::{AtomicBool, Ordering};

/// Static storage for Go analyzer.
static GO_ANALYZER: OnceCell<GoAnalyzer> = OnceCell::new();

/// Static storage for JavaScript analyzer.
static JAVASCRIPT_ANALYZER: OnceCell<JavaScriptAnalyzer> = OnceCell::new();

/// Static storage for Python analyzer.
static PYTHON_ANALYZER: OnceCell<PythonAnalyzer> = OnceCell::new();

/// Static storage for Ruby analyzer.
static RUBY_ANALYZER: OnceCell<RubyAnalyzer> = OnceCell::new();

/// Static storage for TypeScript analyzer.
static TYPESCRIPT_ANALYZER: OnceCell<TypeScriptAnalyzer> = OnceCell::new();

/// Whether analyzers have been registered.
static REGISTERED: AtomicBool = AtomicBool::new(false);

/// Register all available language analyzers.
///
/// This is idempotent - calling it multiple times is safe.
pub fn register_analyzers() {
    if REGISTERED.swap(true, Ordering::SeqCst) {
        return;
    }

    GO_ANALYZER.get_or_init(GoAnalyzer::new);
    JAVASCRIPT_ANALYZER.get_or_init(JavaScriptAnalyzer::new);
    PYTHON_ANALYZER.get_or_init(PythonAnalyzer::new);
    RUBY_ANALYZER.get_or_init(RubyAnalyzer::new);
    TYPESCRIPT_ANALYZER.get_or_init(TypeScriptAnalyzer::new);
}

/// Get an analyzer for the given file extension.
pub fn get_analyzer(ext: &str) -> Option<&'static dyn LanguageAnalyzer> {
    register_analyzers();

    match ext {
        "go" => Some(GO_ANALYZER.get_or_init(GoAnalyzer::new) as &'static dyn LanguageAnalyzer),
        "js" | "jsx" | "mjs" | "cjs" => {
            Some(JAVASCRIPT_ANALYZER.get_or_init(JavaScriptAnalyzer::new) as &'static dyn LanguageAnalyzer)
        }
        "py" => Some(PYTHON_ANALYZER.get_or_init(PythonAnalyzer::new) as &'static dyn LanguageAnalyzer),
        "rb" => Some(RUBY_ANALYZER.get_or_init(RubyAnalyzer::new) as &'static dyn LanguageAnalyzer),
        "ts" | "tsx" | "mts" | "cts" => {
            Some(TYPESCRIPT_ANALYZER.get_or_init(TypeScriptAnalyzer::new) as &'static dyn LanguageAnalyzer)
        }
        _ => None,
    }
}

/// Get the analyzer for a classified language.
pub fn analyzer_for(language: Language) -> Option<&'static dyn LanguageAnalyzer> {
    register_analyzers();

    match language {
        Language::Go => Some(GO_ANALYZER.get_or_init(GoAnalyzer::new) as &'static dyn LanguageAnalyzer),
        Language::JavaScript => {
            Some(JAVASCRIPT_ANALYZER.get_or_init(JavaScriptAnalyzer::new) as &'static dyn LanguageAnalyzer)
        }
        Language::Python => Some(PYTHON_ANALYZER.get_or_init(PythonAnalyzer::new) as &'static dyn LanguageAnalyzer),
        Language::Ruby => Some(RUBY_ANALYZER.get_or_init(RubyAnalyzer::new) as &'static dyn LanguageAnalyzer),
        Language::TypeScript => {
            Some(TYPESCRIPT_ANALYZER.get_or_init(TypeScriptAnalyzer::new) as &'static dyn LanguageAnalyzer)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_dispatch() {
        for (ext, id) in [
            ("js", "javascript"),
            ("cjs", "javascript"),
            ("tsx", "typescript"),
            ("py", "python"),
            ("rb", "ruby"),
            ("go", "go"),
        ] {
            let analyzer = get_analyzer(ext).unwrap();
            assert_eq!(analyzer.language_id(), id);
            assert!(analyzer.handles_extension(ext));
        }
        assert!(get_analyzer("rs").is_none());
    }

    #[test]
    fn test_language_dispatch_matches_ids() {
        for language in [
            Language::JavaScript,
            Language::TypeScript,
            Language::Python,
            Language::Ruby,
            Language::Go,
        ] {
            assert_eq!(
                analyzer_for(language).unwrap().language_id(),
                language.as_str()
            );
        }
    }
}
