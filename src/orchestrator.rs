//! Directory-level scan orchestration.
//!
//! A scan runs in phases:
//!
//! 1. walk the root and classify files,
//! 2. build the Ruby constant index (a barrier: every Ruby file sees the
//!    complete index),
//! 3. analyze non-TypeScript files on a bounded pool, Python files through
//!    the shared Python worker,
//! 4. analyze TypeScript files in one batch grouped by project,
//! 5. fold per-file results, deduplicated, into an `EventMap` in walker order.
//!
//! A file that fails to read or parse is logged and skipped.

use std::fs;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use indicatif::ProgressBar;
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::analysis::{analyzer_for, PythonRuntime, RubyConstantIndex, ScanContext, TsProject};
use crate::error::{AnalyzeError, ScanError};
use crate::event::{dedupe_events, EventCatalog, EventMap, TrackingEvent};
use crate::signature::parse_signatures;
use crate::walker::{collect_files, IgnoreRules, Language};

/// Pool size when the descriptor limit is unknown or unlimited.
pub const DEFAULT_CONCURRENCY: usize = 64;

/// Smallest pool derived from a descriptor limit.
pub const MIN_CONCURRENCY: usize = 4;

type FileResult = (usize, PathBuf, Result<Vec<TrackingEvent>, AnalyzeError>);

/// Options for one scan.
#[derive(Debug, Clone, Default)]
pub struct ScanOptions {
    /// Custom tracking signatures in their textual form.
    pub custom_functions: Vec<String>,
    /// Ignore globs. Invalid patterns are dropped with a warning.
    pub ignore: Vec<String>,
    /// Overrides the pool size derived from the descriptor limit.
    pub concurrency: Option<usize>,
    /// Advanced once per analyzed file.
    pub progress: Option<ProgressBar>,
}

/// Result of a scan.
#[derive(Debug, Clone, Default)]
pub struct ScanOutcome {
    pub events: EventMap,
    pub files_scanned: usize,
    pub files_failed: usize,
}

/// Pool size for a soft descriptor limit as printed by `ulimit -n`.
pub fn limit_from_soft_limit(raw: Option<&str>) -> usize {
    match raw.map(str::trim).and_then(|s| s.parse::<u64>().ok()) {
        Some(soft) => ((soft.saturating_mul(4) / 5) as usize).max(MIN_CONCURRENCY),
        None => DEFAULT_CONCURRENCY,
    }
}

/// Pool size for this process: 80% of the soft descriptor limit.
pub fn concurrency_limit() -> usize {
    let soft = Command::new("sh")
        .args(["-c", "ulimit -n"])
        .output()
        .ok()
        .filter(|o| o.status.success())
        .and_then(|o| String::from_utf8(o.stdout).ok());
    let limit = limit_from_soft_limit(soft.as_deref());
    debug!(soft = ?soft.as_deref().map(str::trim), limit, "derived concurrency limit");
    limit
}

/// Run `task` over `items` with at most `limit` futures in flight.
///
/// Results come back in completion order.
pub(crate) async fn run_bounded<I, F, Fut, T>(items: I, limit: usize, task: F) -> Vec<T>
where
    I: IntoIterator,
    F: FnMut(I::Item) -> Fut,
    Fut: Future<Output = T>,
{
    stream::iter(items)
        .map(task)
        .buffer_unordered(limit.max(1))
        .collect()
        .await
}

/// Map `task` over `items` on a dedicated rayon pool of `limit` threads, so
/// blocking batch work opens no more files at once than the async pool does.
///
/// Results keep the order of `items`.
pub(crate) fn par_map_bounded<T, R, F>(items: Vec<T>, limit: usize, task: F) -> Vec<R>
where
    T: Send,
    R: Send,
    F: Fn(T) -> R + Send + Sync,
{
    match rayon::ThreadPoolBuilder::new()
        .num_threads(limit.max(1))
        .thread_name(|i| format!("trackscan-batch-{}", i))
        .build()
    {
        Ok(pool) => pool.install(|| items.into_par_iter().map(&task).collect()),
        Err(e) => {
            warn!(error = %e, "cannot start batch pool, running serially");
            items.into_iter().map(task).collect()
        }
    }
}

/// Read, parse and analyze one file.
fn analyze_file(
    ctx: &ScanContext,
    path: &Path,
    project: Option<&TsProject>,
) -> Result<Vec<TrackingEvent>, AnalyzeError> {
    let analyzer = Language::from_path(path)
        .and_then(analyzer_for)
        .ok_or_else(|| AnalyzeError::UnsupportedLanguage(path.to_path_buf()))?;
    let source = fs::read(path).map_err(|source| AnalyzeError::FileRead {
        path: path.to_path_buf(),
        source,
    })?;
    let parsed = analyzer.parse(path, &source)?;
    let events = analyzer.find_events(&parsed, &ctx.file_context(project));
    debug!(path = %path.display(), events = events.len(), "analyzed file");
    Ok(events)
}

/// Analyze TypeScript files grouped by the project that owns them, at most
/// `limit` at a time.
fn analyze_typescript(
    ctx: &ScanContext,
    files: Vec<(usize, PathBuf)>,
    limit: usize,
    progress: Option<&ProgressBar>,
) -> Vec<FileResult> {
    let mut groups: Vec<(Arc<TsProject>, Vec<(usize, PathBuf)>)> = Vec::new();
    for (index, path) in files {
        let project = ctx.ts_project_for(&path);
        match groups.iter_mut().find(|(p, _)| Arc::ptr_eq(p, &project)) {
            Some((_, members)) => members.push((index, path)),
            None => groups.push((project, vec![(index, path)])),
        }
    }
    debug!(projects = groups.len(), "grouped typescript files");

    let jobs: Vec<(Arc<TsProject>, usize, PathBuf)> = groups
        .into_iter()
        .flat_map(|(project, members)| {
            members
                .into_iter()
                .map(move |(index, path)| (Arc::clone(&project), index, path))
        })
        .collect();

    par_map_bounded(jobs, limit, |(project, index, path)| {
        let result = analyze_file(ctx, &path, Some(project.as_ref()));
        if let Some(bar) = progress {
            bar.inc(1);
        }
        (index, path, result)
    })
}

/// Scan `root` and aggregate every tracking call found.
pub async fn scan(root: &Path, options: &ScanOptions) -> Result<ScanOutcome, ScanError> {
    let signatures = parse_signatures(&options.custom_functions)?;
    fs::metadata(root).map_err(|source| ScanError::Root {
        path: root.to_path_buf(),
        source,
    })?;

    let ignore = IgnoreRules::lenient(&options.ignore);
    let files = collect_files(root, &ignore);
    if let Some(bar) = &options.progress {
        bar.set_length(files.len() as u64);
    }

    let limit = options.concurrency.unwrap_or_else(concurrency_limit);
    let mut ctx = ScanContext::new(root, signatures);

    let ruby_files: Vec<PathBuf> = files
        .iter()
        .filter(|f| Language::from_path(f) == Some(Language::Ruby))
        .cloned()
        .collect();
    if !ruby_files.is_empty() {
        let index =
            tokio::task::spawn_blocking(move || RubyConstantIndex::build(&ruby_files, limit))
                .await
                .unwrap_or_else(|e| {
                    warn!(error = %e, "ruby constant pre-pass failed, continuing without it");
                    RubyConstantIndex::default()
                });
        ctx.set_ruby_constants(index);
    }
    let ctx = Arc::new(ctx);

    let (typescript, pooled): (Vec<_>, Vec<_>) = files
        .iter()
        .cloned()
        .enumerate()
        .partition(|(_, path)| Language::from_path(path) == Some(Language::TypeScript));

    let python = if pooled
        .iter()
        .any(|(_, p)| Language::from_path(p) == Some(Language::Python))
    {
        Some(PythonRuntime::global()?)
    } else {
        None
    };

    debug!(
        files = files.len(),
        typescript = typescript.len(),
        limit,
        "starting scan"
    );

    let mut results: Vec<FileResult> = run_bounded(pooled, limit, |(index, path)| {
        let ctx = Arc::clone(&ctx);
        let progress = options.progress.clone();
        async move {
            let result = match (python, Language::from_path(&path)) {
                (Some(runtime), Some(Language::Python)) => {
                    runtime
                        .analyze(path.clone(), Arc::clone(ctx.signatures()))
                        .await
                }
                _ => {
                    let task_path = path.clone();
                    tokio::task::spawn_blocking(move || analyze_file(&ctx, &task_path, None))
                        .await
                        .unwrap_or_else(|e| {
                            Err(AnalyzeError::Task {
                                path: path.clone(),
                                message: e.to_string(),
                            })
                        })
                }
            };
            if let Some(bar) = progress {
                bar.inc(1);
            }
            (index, path, result)
        }
    })
    .await;

    if !typescript.is_empty() {
        let ts_ctx = Arc::clone(&ctx);
        let progress = options.progress.clone();
        let fallback = typescript.clone();
        match tokio::task::spawn_blocking(move || {
            analyze_typescript(&ts_ctx, typescript, limit, progress.as_ref())
        })
        .await
        {
            Ok(ts_results) => results.extend(ts_results),
            Err(e) => {
                warn!(error = %e, "typescript batch did not complete");
                let message = e.to_string();
                results.extend(fallback.into_iter().map(|(index, path)| {
                    let error = AnalyzeError::Task {
                        path: path.clone(),
                        message: message.clone(),
                    };
                    (index, path, Err(error))
                }));
            }
        }
    }

    results.sort_by_key(|(index, _, _)| *index);

    let mut catalog = EventCatalog::new(root);
    let mut outcome = ScanOutcome::default();
    for (_, path, result) in results {
        match result {
            Ok(events) => {
                outcome.files_scanned += 1;
                catalog.extend(dedupe_events(events));
            }
            Err(e) => {
                outcome.files_failed += 1;
                warn!(path = %path.display(), error = %e, "skipping file");
            }
        }
    }

    outcome.events = catalog.into_map();
    info!(
        root = %root.display(),
        files = outcome.files_scanned,
        failed = outcome.files_failed,
        events = outcome.events.len(),
        ts_projects = ctx.ts_project_count(),
        "scan complete"
    );
    Ok(outcome)
}

/// Scan `root` with the given custom signatures and ignore globs.
pub async fn analyze_directory<S: AsRef<str>>(
    root: &Path,
    custom_functions: &[S],
    ignore: &[S],
) -> Result<EventMap, ScanError> {
    let options = ScanOptions {
        custom_functions: custom_functions.iter().map(|s| s.as_ref().to_string()).collect(),
        ignore: ignore.iter().map(|s| s.as_ref().to_string()).collect(),
        ..Default::default()
    };
    Ok(scan(root, &options).await?.events)
}

/// `scan` on a fresh multi-threaded runtime.
pub fn scan_blocking(root: &Path, options: &ScanOptions) -> Result<ScanOutcome, ScanError> {
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(scan(root, options))
}

/// `analyze_directory` on a fresh multi-threaded runtime.
pub fn analyze_directory_blocking<S: AsRef<str>>(
    root: &Path,
    custom_functions: &[S],
    ignore: &[S],
) -> Result<EventMap, ScanError> {
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(analyze_directory(root, custom_functions, ignore))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    #[test]
    fn test_limit_from_soft_limit() {
        assert_eq!(limit_from_soft_limit(Some("1024\n")), 819);
        assert_eq!(limit_from_soft_limit(Some("3")), MIN_CONCURRENCY);
        assert_eq!(limit_from_soft_limit(Some("unlimited")), DEFAULT_CONCURRENCY);
        assert_eq!(limit_from_soft_limit(None), DEFAULT_CONCURRENCY);
    }

    #[tokio::test]
    async fn test_pool_never_exceeds_limit() {
        let in_flight = AtomicUsize::new(0);
        let peak = AtomicUsize::new(0);
        let results = run_bounded(0..40, 3, |i| {
            let in_flight = &in_flight;
            let peak = &peak;
            async move {
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                for _ in 0..3 {
                    tokio::task::yield_now().await;
                }
                in_flight.fetch_sub(1, Ordering::SeqCst);
                i
            }
        })
        .await;
        assert_eq!(results.len(), 40);
        assert!(peak.load(Ordering::SeqCst) <= 3);
        assert!(peak.load(Ordering::SeqCst) >= 1);
    }

    #[test]
    fn test_batch_pool_never_exceeds_limit() {
        let in_flight = AtomicUsize::new(0);
        let peak = AtomicUsize::new(0);
        let results = par_map_bounded((0..32).collect(), 2, |i: usize| {
            let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(std::time::Duration::from_millis(2));
            in_flight.fetch_sub(1, Ordering::SeqCst);
            i * 10
        });
        assert_eq!(results, (0..32).map(|i| i * 10).collect::<Vec<_>>());
        assert!(peak.load(Ordering::SeqCst) <= 2);
        assert!(peak.load(Ordering::SeqCst) >= 1);
    }

    #[test]
    fn test_typescript_batch_respects_limit() {
        let tmp = TempDir::new().unwrap();
        for i in 0..12 {
            fs::write(
                tmp.path().join(format!("f{}.ts", i)),
                format!("analytics.track('Event {}');\n", i),
            )
            .unwrap();
        }
        let files: Vec<(usize, PathBuf)> = (0..12)
            .map(|i| (i, tmp.path().join(format!("f{}.ts", i))))
            .collect();
        let ctx = ScanContext::new(tmp.path(), Vec::new());

        let results = analyze_typescript(&ctx, files, 1, None);
        assert_eq!(results.len(), 12);
        for (i, (index, _, result)) in results.into_iter().enumerate() {
            assert_eq!(index, i);
            assert_eq!(result.unwrap()[0].event_name, format!("Event {}", i));
        }
        assert_eq!(ctx.ts_project_count(), 1);
    }

    #[tokio::test]
    async fn test_bad_signature_is_fatal() {
        let tmp = TempDir::new().unwrap();
        let options = ScanOptions {
            custom_functions: vec!["track(PROPERTIES)".into()],
            ..Default::default()
        };
        let err = scan(tmp.path(), &options).await.unwrap_err();
        assert!(matches!(err, ScanError::Signature(_)));
    }

    #[tokio::test]
    async fn test_unreadable_file_is_skipped() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("ok.js"), "analytics.track('Opened', {});\n").unwrap();
        // Not valid UTF-8 but still parseable bytes; must not abort the scan.
        fs::write(tmp.path().join("odd.js"), [0xff, 0xfe, 0x00]).unwrap();

        let outcome = scan(tmp.path(), &ScanOptions::default()).await.unwrap();
        assert_eq!(outcome.files_scanned + outcome.files_failed, 2);
        assert!(outcome.events.contains_key("Opened"));
    }

    #[tokio::test]
    async fn test_missing_root() {
        let err = scan(Path::new("/nonexistent/trackscan"), &ScanOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ScanError::Root { .. }));
    }
}
