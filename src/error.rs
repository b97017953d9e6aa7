//! Crate-wide error taxonomy.
//!
//! Every subsystem boundary owns its own error enum; [`CoreError`] aggregates
//! them behind `#[error(transparent)]` variants so callers that only care
//! about "did this batch succeed" can match on one type, while callers
//! that need to distinguish failure modes can downcast via the inner enums.

use std::path::PathBuf;

use thiserror::Error;

/// Crate-wide result alias.
pub type CoreResult<T> = Result<T, CoreError>;

/// Aggregate error type returned from the public orchestrator API.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Transpile(#[from] TranspileError),

    #[error(transparent)]
    Rewrite(#[from] RewriteError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Watch(#[from] WatchError),

    #[error(transparent)]
    Connector(#[from] ConnectorError),

    #[error(transparent)]
    HealthCheck(#[from] HealthCheckError),

    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl CoreError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io { path: path.into(), source }
    }
}

/// Errors raised while extracting import/export specifiers from a source file (C3).
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("{path}: primary parser failed: {message}")]
    SyntaxError { path: PathBuf, message: String },

    #[error("{importer}: import specifier {specifier:?} is project-internal but does not resolve to an existing file")]
    UnresolvedSpecifier { importer: PathBuf, specifier: String },
}

/// Errors raised while transpiling a source file to ECMAScript (C4).
#[derive(Debug, Error)]
pub enum TranspileError {
    #[error("{path}: parse error at {line}:{column}: {message}")]
    Diagnostic { path: PathBuf, line: usize, column: usize, message: String },

    #[error("{path}: codegen failed: {message}")]
    Codegen { path: PathBuf, message: String },
}

/// Errors raised while rewriting transpiled code to route through the dynamic-import helper (C5).
#[derive(Debug, Error)]
pub enum RewriteError {
    #[error("{importer}: unresolved imports: {}", specifiers.join(", "))]
    UnresolvedImports { importer: PathBuf, specifiers: Vec<String> },

    #[error("{path}: export analysis failed, falling back to static re-export: {message}")]
    ExportAnalysisFailed { path: PathBuf, message: String },
}

/// Errors raised by the cache store / manifest (C6).
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("failed to read manifest at {path}: {source}")]
    ReadManifest { path: PathBuf, #[source] source: std::io::Error },

    #[error("failed to parse manifest at {path}: {source}")]
    ParseManifest { path: PathBuf, #[source] source: serde_json::Error },

    #[error("failed to write manifest at {path}: {source}")]
    WriteManifest { path: PathBuf, #[source] source: std::io::Error },

    #[error("failed to write artifact {path}: {source}")]
    WriteArtifact { path: PathBuf, #[source] source: std::io::Error },
}

/// Errors raised by dependency-graph invariant checks (C8). These are only
/// produced by debug-path assertions; normal graph operations are infallible.
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("dependency graph invariant violated: {0} is in deps[{1}] but {1} is not in dependents[{0}]")]
    AsymmetricEdge(PathBuf, PathBuf),
}

/// Errors raised by the filesystem watcher (C10).
#[derive(Debug, Error)]
pub enum WatchError {
    #[error("failed to start watcher on {path}: {source}")]
    Start { path: PathBuf, #[source] source: notify::Error },
}

/// Errors raised by connector start/restart/shutdown (C16).
#[derive(Debug, Error)]
pub enum ConnectorError {
    #[error("connector {name} failed to start: {message}")]
    StartFailed { name: String, message: String },

    #[error("connector {name} failed to shut down: {message}")]
    ShutdownFailed { name: String, message: String },
}

/// Errors raised by the health-checker host (C17).
#[derive(Debug, Error)]
pub enum HealthCheckError {
    #[error("health checker {name} worker errored: {message}")]
    WorkerError { name: String, message: String },

    #[error("health checker {name} worker channel disconnected")]
    WorkerDisconnected { name: String },
}

/// Per-item error wrapper used by parallel batch steps (file processing,
/// rewriting) so a single bad file cannot poison the whole `rayon` batch:
/// the batch collects `MaybeTranspileError` values and folds them into
/// successes plus logged failures afterward, rather than short-circuiting
/// on the first `?`.
#[derive(Debug, Error)]
#[error("{path}: {error}")]
pub struct MaybeTranspileError<E: std::error::Error> {
    pub path: PathBuf,
    #[source]
    pub error: E,
}

impl<E: std::error::Error> MaybeTranspileError<E> {
    pub fn new(path: PathBuf, error: E) -> Self {
        Self { path, error }
    }
}
