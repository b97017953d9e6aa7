//! File record (C7): per-source state machine carrying the source text,
//! content hash, transpiled artifact, import map, dependency set, version,
//! and classification for one tracked file.

use std::{
    collections::{BTreeMap, BTreeSet},
    fs,
    path::{Path, PathBuf},
    time::{SystemTime, UNIX_EPOCH},
};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, instrument};

use crate::{
    cache::{CacheStore, ManifestFileEntry},
    error::{CoreError, CoreResult, ParseError},
    exports::ExportCache,
    import_parser::{ExistenceCache, ImportParser},
    paths,
    rewriter::{self, RewriteTarget},
    source_config::SourceConfig,
    transpiler::Transpiler,
};

/// Classification of a file's role, used to pick its reload layer and to
/// populate the special-files index (C9).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    Main,
    Config,
    Route,
    Event,
    Controller,
    Service,
    Model,
    Other,
}

impl FileType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Main => "main",
            Self::Config => "config",
            Self::Route => "route",
            Self::Event => "event",
            Self::Controller => "controller",
            Self::Service => "service",
            Self::Model => "model",
            Self::Other => "other",
        }
    }

    /// Classifies a project-relative path, first match wins, per §4.6.
    pub fn classify(relative: &str) -> Self {
        let file_name = relative.rsplit('/').next().unwrap_or(relative);
        if file_name == "main.ts" || file_name == "main.tsx" {
            Self::Main
        } else if relative.starts_with("src/config/") {
            Self::Config
        } else if file_name.ends_with("routes.ts") || file_name.ends_with("routes.tsx") {
            Self::Route
        } else if relative.contains("/events/") {
            Self::Event
        } else if relative.contains("controller") {
            Self::Controller
        } else if relative.contains("service") {
            Self::Service
        } else if relative.contains("model") {
            Self::Model
        } else {
            Self::Other
        }
    }

    /// Policy layer consulted by the reload executor (C15): configs and
    /// routes force a full-subsystem restart, everything else hot-reloads.
    pub fn layer(&self) -> Layer {
        match self {
            Self::Config | Self::Route => Layer::Fsr,
            _ => Layer::Hmr,
        }
    }
}

/// Reload policy: Hot Module Replacement or Full Subsystem Restart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Layer {
    Hmr,
    Fsr,
}

/// Lifecycle state of a [`FileRecord`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileState {
    Idle,
    Loading,
    Parsed,
    Transpiled,
    Ready,
    Updating,
    Deleted,
}

/// A cleanup capability exposed by a loaded module, recorded after a
/// successful dynamic import so the reload executor can invoke it before
/// invalidating the module (§4.5 step 6, §4.10 step 1/3).
pub type CleanupHandle = std::sync::Arc<dyn Fn() + Send + Sync>;

/// Per-source-file state. Mutated only by the file-operations layer (C11)
/// under the watcher-batch lock, per §3.
pub struct FileRecord {
    pub absolute_path: PathBuf,
    pub relative_path: String,
    pub source: String,
    pub hash: String,
    pub last_modified: u64,
    pub transpiled: Option<String>,
    pub source_map: Option<String>,
    pub imports_rewritten: bool,
    pub version: u64,
    pub file_type: FileType,
    pub layer: Layer,
    pub cache_name: String,
    pub import_map: BTreeMap<String, PathBuf>,
    pub dependencies: BTreeSet<String>,
    pub dependents: BTreeSet<String>,
    pub cleanup: Option<CleanupHandle>,
    pub state: FileState,
}

/// Options for [`FileRecord::process`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessOptions {
    pub force: bool,
    pub rewrite: bool,
    pub save_to_cache: bool,
}

impl ProcessOptions {
    pub fn full() -> Self {
        Self { force: false, rewrite: true, save_to_cache: true }
    }

    pub fn forced() -> Self {
        Self { force: true, rewrite: true, save_to_cache: true }
    }
}

/// Everything a [`FileRecord`] needs to process itself, bundled so the
/// pipeline methods take one argument instead of five. Borrowed, not
/// owned: these collaborators are shared across every record in a batch.
pub struct ProcessContext<'a> {
    pub project_root: &'a Path,
    pub source_config: &'a SourceConfig,
    pub existence_cache: &'a ExistenceCache,
    pub cache_store: &'a CacheStore,
    pub export_cache: &'a mut ExportCache,
}

impl FileRecord {
    /// Constructs a fresh, unprocessed record for `absolute_path`.
    pub fn new(project_root: &Path, absolute_path: PathBuf) -> Self {
        let relative_path = paths::project_relative(project_root, &absolute_path)
            .map(|p| paths::to_slash(&p))
            .unwrap_or_else(|| absolute_path.display().to_string());
        let file_type = FileType::classify(&relative_path);
        Self {
            cache_name: paths::cache_name(&relative_path),
            layer: file_type.layer(),
            file_type,
            absolute_path,
            relative_path,
            source: String::new(),
            hash: String::new(),
            last_modified: 0,
            transpiled: None,
            source_map: None,
            imports_rewritten: false,
            version: 0,
            import_map: BTreeMap::new(),
            dependencies: BTreeSet::new(),
            dependents: BTreeSet::new(),
            cleanup: None,
            state: FileState::Idle,
        }
    }

    /// Restores a record from a manifest entry without touching the
    /// filesystem beyond reading the artifact, for the warm-start path
    /// (§4.9 step 4, `init(manifestEntry)` when the hash is unchanged).
    pub fn restore_from_manifest(_project_root: &Path, entry: &ManifestFileEntry, artifact: Option<String>) -> Self {
        let file_type = match entry.file_type.as_str() {
            "main" => FileType::Main,
            "config" => FileType::Config,
            "route" => FileType::Route,
            "event" => FileType::Event,
            "controller" => FileType::Controller,
            "service" => FileType::Service,
            "model" => FileType::Model,
            _ => FileType::Other,
        };
        Self {
            absolute_path: entry.absolute_path.clone(),
            relative_path: entry.relative_path.clone(),
            source: String::new(),
            hash: entry.hash.clone(),
            last_modified: entry.last_modified,
            transpiled: artifact.clone(),
            source_map: None,
            imports_rewritten: artifact.is_some(),
            version: entry.version,
            file_type,
            layer: entry.layer,
            cache_name: entry.cache_path.trim_end_matches(".map").to_string(),
            import_map: BTreeMap::new(),
            dependencies: entry.dependencies.iter().cloned().collect(),
            dependents: entry.dependents.iter().cloned().collect(),
            cleanup: None,
            state: if artifact.is_some() { FileState::Ready } else { FileState::Idle },
        }
    }

    /// Steps 1-4 of `process`: read, hash, parse imports. Batch phase 1.
    #[instrument(skip(self, ctx), fields(path = %self.relative_path))]
    pub fn parse(&mut self, ctx: &mut ProcessContext<'_>) -> CoreResult<bool> {
        let source = match fs::read_to_string(&self.absolute_path) {
            Ok(source) => source,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                self.state = FileState::Deleted;
                return Ok(false);
            }
            Err(err) => return Err(CoreError::io(self.absolute_path.clone(), err)),
        };

        let new_hash = hash_source(&source);
        if new_hash == self.hash && self.transpiled.is_some() && self.imports_rewritten {
            self.state = FileState::Ready;
            return Ok(false);
        }

        self.source = source;
        self.hash = new_hash;
        self.last_modified = now_unix_ms();
        self.version += 1;

        let parser = ImportParser::new(ctx.source_config, ctx.project_root, ctx.existence_cache);
        let import_map = parser.parse(&self.source, &self.absolute_path).map_err(ParseError::from).map_err(CoreError::from)?;
        self.dependencies = import_map
            .values()
            .filter_map(|p| paths::project_relative(ctx.project_root, p))
            .map(|p| paths::to_slash(&p))
            .collect();
        self.import_map = import_map;
        self.state = FileState::Parsed;
        debug!(deps = self.dependencies.len(), "parsed imports");
        Ok(true)
    }

    /// Steps 5-7 of `process`: transpile, rewrite, persist. Batch phase 2.
    ///
    /// Valid from `Parsed` (the normal post-`parse()` entry) or from `Ready`
    /// (a settled record whose `parse()` call short-circuited on an
    /// unchanged hash but which still needs its transpile/rewrite/persist
    /// phase re-run, e.g. forced reprocessing of an unchanged dependent
    /// during invalidation, or the deferred rewrite pass at startup). Either
    /// state carries a populated `import_map`/`dependencies`, which is all
    /// this phase needs. Any other state means `parse()` was never run.
    #[instrument(skip(self, ctx, target), fields(path = %self.relative_path))]
    pub fn complete(&mut self, ctx: &mut ProcessContext<'_>, target: &dyn RewriteTarget, opts: ProcessOptions) -> CoreResult<()> {
        if !matches!(self.state, FileState::Parsed | FileState::Ready) {
            return Err(CoreError::Parse(ParseError::SyntaxError {
                path: self.absolute_path.clone(),
                message: format!("complete() called from state {:?}, expected Parsed or Ready", self.state),
            }));
        }

        let transpiler = Transpiler::new();
        let output = transpiler.transpile(&self.source, &self.absolute_path, &self.cache_name)?;
        self.state = FileState::Transpiled;

        let mut code = output.code;
        if opts.rewrite && !self.dependencies.is_empty() {
            code = rewriter::rewrite(&code, &self.absolute_path, target)?;
            // The rewriter re-parses and re-emits with `comments: None`,
            // which drops the sourceMappingURL pointer appended above;
            // restore it so the artifact's map comment survives rewriting.
            code = format!("{code}\n//# sourceMappingURL={}.map\n", self.cache_name);
            self.imports_rewritten = true;
        }

        if opts.save_to_cache {
            ctx.cache_store.write_artifact(&self.cache_name, &code, output.source_map.as_deref())?;
        }

        ctx.export_cache.invalidate(&self.absolute_path);
        self.transpiled = Some(code);
        self.source_map = output.source_map;
        self.state = FileState::Ready;
        debug!("file ready");
        Ok(())
    }

    /// Runs the full pipeline: `parse` then, if needed, `complete`.
    pub fn process(&mut self, ctx: &mut ProcessContext<'_>, target: &dyn RewriteTarget, opts: ProcessOptions) -> CoreResult<bool> {
        let changed = self.parse(ctx)?;
        if self.state == FileState::Deleted {
            return Ok(false);
        }
        if !changed && !opts.force {
            return Ok(false);
        }
        self.complete(ctx, target, opts)?;
        Ok(true)
    }
}

fn hash_source(source: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source.as_bytes());
    hex_encode(&hasher.finalize())
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn now_unix_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as u64).unwrap_or(0)
}

/// Exposed for the orchestrator's warm-start hash comparison (§4.9 step 4),
/// which needs the same hash function without going through a full record.
pub fn hash_source_pub(source: &str) -> String {
    hash_source(source)
}

pub fn now_unix_ms_pub() -> u64 {
    now_unix_ms()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_main_file() {
        assert_eq!(FileType::classify("src/app/users/main.ts"), FileType::Main);
    }

    #[test]
    fn classifies_config_file() {
        assert_eq!(FileType::classify("src/config/database.ts"), FileType::Config);
    }

    #[test]
    fn classifies_routes_file() {
        assert_eq!(FileType::classify("src/app/users/routes.ts"), FileType::Route);
    }

    #[test]
    fn classifies_event_file() {
        assert_eq!(FileType::classify("src/app/events/onCreate.ts"), FileType::Event);
    }

    #[test]
    fn classifies_fallback_other() {
        assert_eq!(FileType::classify("src/app/users/dto.ts"), FileType::Other);
    }

    #[test]
    fn config_and_route_use_fsr_layer() {
        assert_eq!(FileType::Config.layer(), Layer::Fsr);
        assert_eq!(FileType::Route.layer(), Layer::Fsr);
        assert_eq!(FileType::Main.layer(), Layer::Hmr);
    }

    #[test]
    fn cache_name_is_derived_from_relative_path() {
        let record = FileRecord::new(Path::new("/project"), PathBuf::from("/project/src/app/main.ts"));
        assert_eq!(record.cache_name, "src-app-main.js");
        assert_eq!(record.relative_path, "src/app/main.ts");
    }

    #[test]
    fn hash_is_stable_for_same_bytes() {
        assert_eq!(hash_source("const x = 1;"), hash_source("const x = 1;"));
        assert_ne!(hash_source("const x = 1;"), hash_source("const x = 2;"));
    }
}
