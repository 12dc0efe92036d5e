//! Process-wide Python analysis worker.
//!
//! One dedicated thread owns the Python parser and the compiled call query.
//! Files are submitted over a channel and answered through one-shot replies,
//! so Python analysis is serialized in submission order while other languages
//! keep running on the pool.

use std::path::PathBuf;
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;

use once_cell::sync::OnceCell;
use tokio::sync::oneshot;
use tracing::debug;
use tree_sitter::{Parser, Query};

use crate::analysis::ParsedFile;
use crate::error::{AnalyzeError, ScanError};
use crate::event::TrackingEvent;
use crate::signature::CustomSignature;

use super::python::{extract_events, python_language, CALL_QUERY};

static RUNTIME: OnceCell<PythonRuntime> = OnceCell::new();

struct Job {
    path: PathBuf,
    signatures: Arc<Vec<CustomSignature>>,
    reply: oneshot::Sender<Result<Vec<TrackingEvent>, AnalyzeError>>,
}

pub struct PythonRuntime {
    jobs: Mutex<mpsc::Sender<Job>>,
}

struct Worker {
    parser: Parser,
    query: Query,
}

impl Worker {
    fn start() -> Result<Self, String> {
        let language = python_language();
        let mut parser = Parser::new();
        parser.set_language(&language).map_err(|e| e.to_string())?;
        let query = Query::new(&language, CALL_QUERY).map_err(|e| e.to_string())?;
        Ok(Self { parser, query })
    }

    fn analyze(
        &mut self,
        path: PathBuf,
        signatures: &[CustomSignature],
    ) -> Result<Vec<TrackingEvent>, AnalyzeError> {
        let source = std::fs::read(&path).map_err(|source| AnalyzeError::FileRead {
            path: path.clone(),
            source,
        })?;
        let tree = self
            .parser
            .parse(&source, None)
            .ok_or_else(|| AnalyzeError::parse(&path, "parser returned no tree"))?;
        let file = ParsedFile { tree, source, path };
        Ok(extract_events(&self.query, &file, signatures))
    }

    fn run(mut self, jobs: mpsc::Receiver<Job>) {
        for job in jobs {
            debug!(path = %job.path.display(), "python worker analyzing");
            let result = self.analyze(job.path, &job.signatures);
            // The requester may have gone away; nothing to do then.
            let _ = job.reply.send(result);
        }
    }
}

impl PythonRuntime {
    /// The shared runtime, started on first use.
    pub fn global() -> Result<&'static PythonRuntime, ScanError> {
        RUNTIME.get_or_try_init(Self::start)
    }

    fn start() -> Result<Self, ScanError> {
        let (jobs, receiver) = mpsc::channel::<Job>();
        let (ready_tx, ready_rx) = mpsc::channel::<Result<(), String>>();

        thread::Builder::new()
            .name("python-analyzer".into())
            .spawn(move || match Worker::start() {
                Ok(worker) => {
                    let _ = ready_tx.send(Ok(()));
                    worker.run(receiver);
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                }
            })
            .map_err(|e| ScanError::RuntimeInit(e.to_string()))?;

        match ready_rx.recv() {
            Ok(Ok(())) => {
                debug!("python runtime started");
                Ok(Self {
                    jobs: Mutex::new(jobs),
                })
            }
            Ok(Err(e)) => Err(ScanError::RuntimeInit(e)),
            Err(_) => Err(ScanError::RuntimeInit(
                "python worker exited during startup".into(),
            )),
        }
    }

    /// Analyze one file on the worker.
    pub async fn analyze(
        &self,
        path: PathBuf,
        signatures: Arc<Vec<CustomSignature>>,
    ) -> Result<Vec<TrackingEvent>, AnalyzeError> {
        let (reply, response) = oneshot::channel();
        let job = Job {
            path,
            signatures,
            reply,
        };
        {
            let jobs = self
                .jobs
                .lock()
                .map_err(|_| AnalyzeError::RuntimeGone("job queue poisoned".into()))?;
            jobs.send(job)
                .map_err(|_| AnalyzeError::RuntimeGone("python worker stopped".into()))?;
        }
        response
            .await
            .map_err(|_| AnalyzeError::RuntimeGone("python worker dropped the job".into()))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_runtime_answers_in_submission_order() {
        let tmp = TempDir::new().unwrap();
        let first = tmp.path().join("a.py");
        let second = tmp.path().join("b.py");
        fs::write(&first, "analytics.track('u', 'First')\n").unwrap();
        fs::write(&second, "analytics.track('u', 'Second')\n").unwrap();

        let runtime = PythonRuntime::global().unwrap();
        let signatures = Arc::new(Vec::new());
        let (a, b) = tokio::join!(
            runtime.analyze(first, signatures.clone()),
            runtime.analyze(second, signatures.clone()),
        );
        assert_eq!(a.unwrap()[0].event_name, "First");
        assert_eq!(b.unwrap()[0].event_name, "Second");
    }

    #[tokio::test]
    async fn test_missing_file_is_a_read_error() {
        let runtime = PythonRuntime::global().unwrap();
        let result = runtime
            .analyze(PathBuf::from("/nonexistent/x.py"), Arc::new(Vec::new()))
            .await;
        assert!(matches!(result, Err(AnalyzeError::FileRead { .. })));
    }
}
