//! Error types for trackscan.
//!
//! Per-file failures (`AnalyzeError`) are recovered by the orchestrator and
//! logged; `SignatureParseError` and runtime start-up failures abort a scan.

use std::path::PathBuf;

use thiserror::Error;

/// Failure analyzing a single file. Never aborts a directory scan.
#[derive(Error, Debug)]
pub enum AnalyzeError {
    #[error("failed to read {path}: {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("no analyzer registered for {0}")]
    UnsupportedLanguage(PathBuf),

    #[error("python runtime unavailable: {0}")]
    RuntimeGone(String),

    #[error("analysis task for {path} did not complete: {message}")]
    Task { path: PathBuf, message: String },
}

impl AnalyzeError {
    pub fn parse(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        AnalyzeError::Parse {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// A malformed custom tracking function signature.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SignatureParseError {
    #[error("custom function signature is empty")]
    Empty,

    #[error("invalid custom function signature {0:?}")]
    Malformed(String),

    #[error("custom function signature {0:?} has no EVENT_NAME parameter")]
    MissingEventName(String),

    #[error("custom function signature {0:?} declares {1} more than once")]
    DuplicateToken(String, &'static str),
}

/// Scan-level failure surfaced to the caller.
#[derive(Error, Debug)]
pub enum ScanError {
    #[error(transparent)]
    Signature(#[from] SignatureParseError),

    #[error("failed to start the python analysis runtime: {0}")]
    RuntimeInit(String),

    #[error("scan root {path} is not accessible: {source}")]
    Root {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to start async runtime: {0}")]
    Executor(#[from] std::io::Error),
}

/// Configuration file problems.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid ignore pattern {pattern:?}: {message}")]
    IgnorePattern { pattern: String, message: String },

    #[error(transparent)]
    Signature(#[from] SignatureParseError),

    #[error("concurrency must be at least 1")]
    ZeroConcurrency,
}
