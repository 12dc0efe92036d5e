//! trackscan - analytics tracking call catalogue.
//!
//! trackscan statically scans JavaScript, TypeScript, Python, Ruby and Go
//! sources for calls that fire analytics events, and reports every event
//! name together with its call sites and an inferred schema of the
//! properties sent with it.
//!
//! # Architecture
//!
//! - `walker`: file discovery, ignore globs and language classification
//! - `analysis`: tree-sitter backends, one per language, plus per-scan state
//! - `providers` / `signature`: built-in SDK call shapes and custom wrappers
//! - `schema`: the normalized property schema model
//! - `event`: per-file dedup and directory-level aggregation
//! - `orchestrator`: the bounded concurrent scan
//! - `config` / `report` / `cli`: the command-line surface
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//!
//! let events = trackscan::analyze_directory_blocking(
//!     Path::new("./web"),
//!     &["trackEvent(EVENT_NAME, PROPERTIES)"],
//!     &["**/dist/**"],
//! )?;
//! for (name, entry) in &events {
//!     println!("{}: {} call sites", name, entry.implementations.len());
//! }
//! # Ok::<(), trackscan::ScanError>(())
//! ```

pub mod analysis;
pub mod cli;
pub mod config;
pub mod error;
pub mod event;
pub mod orchestrator;
pub mod providers;
pub mod report;
pub mod schema;
pub mod signature;
pub mod walker;

pub use analysis::{register_analyzers, FileContext, LanguageAnalyzer, ParsedFile, ScanContext};
pub use config::Config;
pub use error::{AnalyzeError, ConfigError, ScanError, SignatureParseError};
pub use event::{EventEntry, EventImplementation, EventMap, TrackingEvent};
pub use orchestrator::{
    analyze_directory, analyze_directory_blocking, scan, scan_blocking, ScanOptions, ScanOutcome,
};
pub use providers::Source;
pub use schema::{PrimitiveType, Properties, PropertySchema};
pub use signature::CustomSignature;
pub use walker::Language;
