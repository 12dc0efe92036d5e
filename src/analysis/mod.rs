//! AST-backed tracking call analysis.
//!
//! Every supported language is parsed with tree-sitter and walked for calls
//! that fire analytics events. Each backend resolves what it can (constants,
//! local variables, declared types) and reduces argument expressions to the
//! shared `PropertySchema` model.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌──────────────┐     ┌───────────────┐
//! │ Source Files    │────▶│ Analyzers    │────▶│ TrackingEvent │
//! └─────────────────┘     │ (JS, TS, Py, │     │ (name, source,│
//!                         │  Ruby, Go)   │     │  properties)  │
//!                         └──────────────┘     └───────────────┘
//!                                ▲
//!                                │
//!                         ┌──────────────┐
//!                         │ ScanContext  │
//!                         │ (constants,  │
//!                         │  ts projects)│
//!                         └──────────────┘
//! ```
//!
//! # Adding a New Language
//!
//! 1. Create a new module in `src/analysis/languages/`
//! 2. Implement the `LanguageAnalyzer` trait
//! 3. Register the analyzer in `languages/mod.rs`
//! 4. Classify its extensions in `walker::Language`

mod context;
mod languages;
pub(crate) mod naming;
pub(crate) mod syntax;
mod traits;

pub use context::ScanContext;
pub use languages::{
    analyzer_for, get_analyzer, register_analyzers, ConstantMap, GoAnalyzer, JavaScriptAnalyzer,
    PythonAnalyzer, PythonRuntime, RubyAnalyzer, RubyConstantIndex, TsProject,
    TypeScriptAnalyzer, MAX_PROJECT_FILES, TSCONFIG,
};
pub use traits::{FileContext, LanguageAnalyzer, ParsedFile};
