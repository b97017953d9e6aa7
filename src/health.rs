//! Health checker host (C17): runs health checkers against each batch's
//! added/changed files without blocking the reload path.
//!
//! Worker-based checkers get a real OS thread (`std::thread::spawn`) per
//! §5's explicit distinction between the event loop and "explicit worker
//! threads for health checkers"; inline checkers run as plain trait-object
//! calls on the main loop.

use std::{
    collections::BTreeMap,
    sync::mpsc::{self, Receiver, RecvTimeoutError, Sender},
    thread::JoinHandle,
    time::Duration,
};

use tracing::{instrument, warn};

/// One file submitted to a checker for this batch.
#[derive(Debug, Clone)]
pub struct CheckInput {
    pub path: String,
    pub relative_path: String,
    pub content: String,
}

/// One file's result from a checker.
#[derive(Debug, Clone)]
pub struct FileCheckResult {
    pub path: String,
    pub healthy: bool,
    pub errors: Vec<Diagnostic>,
    pub warnings: Vec<Diagnostic>,
}

#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub line: u32,
    pub column: u32,
    pub length: u32,
    pub message: String,
}

#[derive(Debug, Clone, Default)]
pub struct CheckerStats {
    pub healthy: usize,
    pub defective: usize,
    pub total_errors: usize,
    pub total_warnings: usize,
    pub files_with_errors: usize,
    pub files_with_warnings: usize,
}

impl CheckerStats {
    fn record(&mut self, results: &[FileCheckResult]) {
        for result in results {
            if result.healthy {
                self.healthy += 1;
            } else {
                self.defective += 1;
            }
            self.total_errors += result.errors.len();
            self.total_warnings += result.warnings.len();
            if !result.errors.is_empty() {
                self.files_with_errors += 1;
            }
            if !result.warnings.is_empty() {
                self.files_with_warnings += 1;
            }
        }
    }
}

/// An in-process checker with no worker thread overhead, for cheap checks.
pub trait InlineHealthChecker: Send {
    fn name(&self) -> &str;
    fn initialize(&mut self);
    fn check(&mut self, files: &[CheckInput]) -> Vec<FileCheckResult>;
    fn file_changes(&mut self, _files: &[CheckInput]) {}
    fn files_deleted(&mut self, _paths: &[String]) {}
}

/// Messages sent to a worker-backed checker thread.
pub enum WorkerMessage {
    Init,
    Check(Vec<CheckInput>),
    FileChanges(Vec<CheckInput>),
    FilesDeleted(Vec<String>),
    Shutdown,
}

/// Messages received back from a worker-backed checker thread.
pub enum WorkerResponse {
    Initialized,
    Results(Vec<FileCheckResult>),
    Error(String),
}

struct WorkerHandle {
    name: String,
    tx: Sender<WorkerMessage>,
    rx: Receiver<WorkerResponse>,
    join: Option<JoinHandle<()>>,
}

/// Implemented by a worker-checker's body, running entirely on its own
/// thread; `run` owns the message loop and must reply on `respond` for
/// every message it consumes.
pub trait WorkerCheckerBody: Send + 'static {
    fn run(self: Box<Self>, inbox: Receiver<WorkerMessage>, respond: Sender<WorkerResponse>);
}

const WORKER_REPLY_TIMEOUT: Duration = Duration::from_millis(500);

/// Aggregates per-checker statistics across inline and worker checkers.
pub struct HealthCheckerHost {
    inline: Vec<Box<dyn InlineHealthChecker>>,
    workers: Vec<WorkerHandle>,
    stats: BTreeMap<String, CheckerStats>,
}

impl Default for HealthCheckerHost {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthCheckerHost {
    pub fn new() -> Self {
        Self { inline: Vec::new(), workers: Vec::new(), stats: BTreeMap::new() }
    }

    pub fn register_inline(&mut self, mut checker: Box<dyn InlineHealthChecker>) {
        checker.initialize();
        self.stats.insert(checker.name().to_string(), CheckerStats::default());
        self.inline.push(checker);
    }

    /// Spawns a worker thread for `body` and sends it `Init`, per §4.12
    /// "on init, the host starts a worker thread per worker-based checker".
    pub fn register_worker(&mut self, name: impl Into<String>, body: Box<dyn WorkerCheckerBody>) {
        let name = name.into();
        let (to_worker_tx, to_worker_rx) = mpsc::channel();
        let (from_worker_tx, from_worker_rx) = mpsc::channel();
        let join = std::thread::spawn(move || body.run(to_worker_rx, from_worker_tx));

        let _ = to_worker_tx.send(WorkerMessage::Init);
        match from_worker_rx.recv_timeout(WORKER_REPLY_TIMEOUT) {
            Ok(WorkerResponse::Initialized) => {}
            _ => warn!(name = %name, "worker checker did not confirm initialization"),
        }

        self.stats.insert(name.clone(), CheckerStats::default());
        self.workers.push(WorkerHandle { name, tx: to_worker_tx, rx: from_worker_rx, join: Some(join) });
    }

    /// Runs every checker against this batch's added+changed files.
    #[instrument(skip(self, files))]
    pub fn check_batch(&mut self, files: &[CheckInput]) {
        for checker in &mut self.inline {
            let results = checker.check(files);
            self.stats.entry(checker.name().to_string()).or_default().record(&results);
        }

        for worker in &self.workers {
            let _ = worker.tx.send(WorkerMessage::Check(files.to_vec()));
            match worker.rx.recv_timeout(WORKER_REPLY_TIMEOUT) {
                Ok(WorkerResponse::Results(results)) => {
                    self.stats.entry(worker.name.clone()).or_default().record(&results);
                }
                Ok(WorkerResponse::Error(message)) => {
                    warn!(name = %worker.name, %message, "worker checker reported an error");
                }
                Err(RecvTimeoutError::Timeout) => {
                    warn!(name = %worker.name, "worker checker did not reply in time");
                }
                Err(RecvTimeoutError::Disconnected) | Ok(WorkerResponse::Initialized) => {
                    warn!(name = %worker.name, "worker checker channel closed unexpectedly");
                }
            }
        }
    }

    pub fn stats(&self) -> &BTreeMap<String, CheckerStats> {
        &self.stats
    }

    pub fn shutdown(&mut self) {
        for worker in &mut self.workers {
            let _ = worker.tx.send(WorkerMessage::Shutdown);
            if let Some(join) = worker.join.take() {
                let _ = join.join();
            }
        }
    }
}

impl Drop for HealthCheckerHost {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct AlwaysHealthy;
    impl InlineHealthChecker for AlwaysHealthy {
        fn name(&self) -> &str {
            "always-healthy"
        }
        fn initialize(&mut self) {}
        fn check(&mut self, files: &[CheckInput]) -> Vec<FileCheckResult> {
            files
                .iter()
                .map(|f| FileCheckResult { path: f.path.clone(), healthy: true, errors: vec![], warnings: vec![] })
                .collect()
        }
    }

    #[test]
    fn inline_checker_records_stats() {
        let mut host = HealthCheckerHost::new();
        host.register_inline(Box::new(AlwaysHealthy));
        host.check_batch(&[CheckInput {
            path: "/p/src/app/main.ts".into(),
            relative_path: "src/app/main.ts".into(),
            content: "const x = 1;".into(),
        }]);
        let stats = host.stats().get("always-healthy").unwrap();
        assert_eq!(stats.healthy, 1);
        assert_eq!(stats.defective, 0);
    }
}
