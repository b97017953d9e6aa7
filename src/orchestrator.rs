//! Orchestrator (C12): startup reconciliation (§4.9) and the main batch
//! loop that drives the watcher (C10) into the reload executor (C15).

use std::path::{Path, PathBuf};

use rayon::prelude::*;
use tracing::{info, instrument, warn};
use walkdir::WalkDir;

use crate::{
    cache::{self, CacheStore, Manifest},
    config::OrchestratorConfig,
    connectors::ConnectorRegistry,
    error::{CoreError, CoreResult},
    exports::ExportCache,
    file_ops::{self, FileTable, OpsContext},
    file_record::{FileRecord, ProcessContext, ProcessOptions},
    import_parser::ExistenceCache,
    reload::{self, ReloadOutcome},
    source_config::SourceConfig,
    watcher::{self, WatchBatch, Watcher},
};

/// Below this many jobs, a dedicated `rayon` pool is not worth the setup
/// cost; mirrors the ancestor's parallel/sequential compile split.
const PARALLEL_THRESHOLD: usize = 8;

pub struct Orchestrator {
    pub project_root: PathBuf,
    pub config: OrchestratorConfig,
    pub table: FileTable,
    pub cache_store: CacheStore,
    pub source_config: SourceConfig,
    pub existence_cache: ExistenceCache,
    pub export_cache: ExportCache,
    pub connectors: ConnectorRegistry,
    watcher: Option<Watcher>,
}

impl Orchestrator {
    /// §4.9 steps 1-9: full startup reconciliation.
    #[instrument(skip(config), fields(root = %project_root.display()))]
    pub fn start(project_root: &Path, config: OrchestratorConfig) -> CoreResult<Self> {
        let source_config = SourceConfig::load(&project_root.join("tsconfig.json"), project_root);
        let cache_store = CacheStore::new(project_root);
        let existence_cache = ExistenceCache::new();
        let mut export_cache = ExportCache::new();

        let fs_files = discover_files(project_root, &config);
        let manifest = Manifest::read(&cache_store.manifest_path());

        let mut table = FileTable::new();

        match manifest {
            None => {
                info!("no manifest found, cold start");
                cache_store.recreate()?;
                process_fresh(&mut table, &cache_store, &source_config, &existence_cache, &mut export_cache, project_root, &fs_files, config.batch_size)?;
            }
            Some(manifest) => {
                let (new_files, deleted, existing) = cache::reconcile(&fs_files, &manifest);
                info!(new = new_files.len(), deleted = deleted.len(), existing = existing.len(), "warm start");

                for relative in &deleted {
                    if let Some(entry) = manifest.files.get(relative) {
                        cache_store.remove_artifact(&entry.cache_path);
                    }
                }

                process_fresh(&mut table, &cache_store, &source_config, &existence_cache, &mut export_cache, project_root, &new_files, config.batch_size)?;

                for relative in &existing {
                    let entry = manifest.files.get(relative).expect("existing path is in the manifest");
                    restore_or_reprocess(&mut table, &cache_store, &source_config, &existence_cache, &mut export_cache, project_root, entry)?;
                }
            }
        }

        // Step 5: build the dependency graph from every record's deps.
        for record in table.records.values() {
            table.graph.update_file(&record.relative_path, record.dependencies.clone());
        }
        for cycle in table.graph.detect_cycles() {
            warn!(?cycle, "dependency cycle detected");
        }

        // Step 6: populate dependents.
        file_ops::recompute_dependents(&mut table);
        for relative in table.records.keys().cloned().collect::<Vec<_>>() {
            table.special.update(&relative);
        }

        // Step 7: rewrite any record not yet importsRewritten with deps.
        let pending: Vec<String> = table
            .records
            .iter()
            .filter(|(_, r)| !r.imports_rewritten && !r.dependencies.is_empty())
            .map(|(k, _)| k.clone())
            .collect();
        for relative in pending {
            let mut ctx = OpsContext {
                project_root,
                source_config: &source_config,
                existence_cache: &existence_cache,
                cache_store: &cache_store,
                export_cache: &mut export_cache,
            };
            file_ops::complete(&mut table, &mut ctx, &relative, ProcessOptions::full())?;
        }

        // Step 8: persist the manifest.
        persist_manifest(&table, &cache_store, project_root)?;

        // Step 9: start the watcher.
        let watcher = watcher::start(project_root, config.watch.clone())?;

        Ok(Self {
            project_root: project_root.to_path_buf(),
            config,
            table,
            cache_store,
            source_config,
            existence_cache,
            export_cache,
            connectors: ConnectorRegistry::new(),
            watcher: Some(watcher),
        })
    }

    /// Drains the next watch batch, if one is pending, and runs it through
    /// the reload executor. Returns `None` once the watcher channel closes.
    pub async fn next_batch(&mut self) -> Option<CoreResult<ReloadOutcome>> {
        let batch = self.watcher.as_mut()?.batches.recv().await?;
        Some(self.apply_batch(batch).await)
    }

    #[instrument(skip(self, batch))]
    async fn apply_batch(&mut self, batch: WatchBatch) -> CoreResult<ReloadOutcome> {
        // Ordering within a batch: adds, then changes, then deletes (§4.8).
        for relative in &batch.added {
            let mut ctx = OpsContext {
                project_root: &self.project_root,
                source_config: &self.source_config,
                existence_cache: &self.existence_cache,
                cache_store: &self.cache_store,
                export_cache: &mut self.export_cache,
            };
            file_ops::add(&mut self.table, &mut ctx, relative)?;
            if self.table.records.contains_key(relative) {
                file_ops::complete(&mut self.table, &mut ctx, relative, ProcessOptions::full())?;
            }
        }

        let mut ctx = OpsContext {
            project_root: &self.project_root,
            source_config: &self.source_config,
            existence_cache: &self.existence_cache,
            cache_store: &self.cache_store,
            export_cache: &mut self.export_cache,
        };
        let outcome = reload::execute_batch(&mut self.table, &mut ctx, &mut self.connectors, &batch.changed, &batch.removed).await?;

        persist_manifest(&self.table, &self.cache_store, &self.project_root)?;
        Ok(outcome)
    }
}

fn discover_files(project_root: &Path, config: &OrchestratorConfig) -> Vec<String> {
    let include = crate::watcher::WatchConfig { include: config.watch.include.clone(), exclude: config.watch.exclude.clone(), debounce: config.watch.debounce };
    let mut files = Vec::new();
    for entry in WalkDir::new(project_root).into_iter().filter_map(Result::ok) {
        if !entry.file_type().is_file() {
            continue;
        }
        let Some(relative) = crate::paths::project_relative(project_root, entry.path()) else { continue };
        let relative = crate::paths::to_slash(&relative);
        let include_set = build_globset(&include.include);
        let exclude_set = build_globset(&include.exclude);
        if include_set.is_match(&relative) && !exclude_set.is_match(&relative) {
            files.push(relative);
        }
    }
    files.sort();
    files
}

fn build_globset(patterns: &[String]) -> globset::GlobSet {
    let mut builder = globset::GlobSetBuilder::new();
    for pattern in patterns {
        if let Ok(glob) = globset::Glob::new(pattern) {
            builder.add(glob);
        }
    }
    builder.build().unwrap_or_else(|_| globset::GlobSetBuilder::new().build().expect("empty globset always builds"))
}

/// Processes a batch of brand-new files. Parallel via `rayon` above
/// [`PARALLEL_THRESHOLD`] jobs, sequential below it, mirroring the
/// ancestor's own parallel/sequential compile split (§4.9 implementation
/// note).
fn process_fresh(
    table: &mut FileTable,
    cache_store: &CacheStore,
    source_config: &SourceConfig,
    existence_cache: &ExistenceCache,
    export_cache: &mut ExportCache,
    project_root: &Path,
    relative_paths: &[String],
    batch_size: usize,
) -> CoreResult<()> {
    // A short-lived pool, sized to the host's logical cores, kept separate
    // from the async runtime's own worker threads (§5 implementation note).
    let pool = rayon::ThreadPoolBuilder::new().num_threads(num_cpus::get()).build().ok();

    for chunk in relative_paths.chunks(batch_size.max(1)) {
        let parsed: Vec<CoreResult<FileRecord>> = if chunk.len() >= PARALLEL_THRESHOLD {
            let run = || chunk.par_iter().map(|relative| parse_one(project_root, source_config, existence_cache, relative)).collect();
            match &pool {
                Some(pool) => pool.install(run),
                None => run(),
            }
        } else {
            chunk.iter().map(|relative| parse_one(project_root, source_config, existence_cache, relative)).collect()
        };

        for result in parsed {
            let mut record = result?;
            table.graph.update_file(&record.relative_path, record.dependencies.clone());
            let relative = record.relative_path.clone();
            let mut ctx = ProcessContext {
                project_root,
                source_config,
                existence_cache,
                cache_store,
                export_cache,
            };
            let target = file_ops::TableRewriteTarget::for_record(table, project_root, &record);
            // Deps within this fresh batch may not exist in `table` yet; a
            // record with unresolved deps is completed without rewriting
            // and picked up again in the §4.9 step 7 pass.
            if record.dependencies.is_empty() {
                record.complete(&mut ctx, &target, ProcessOptions::full())?;
            } else {
                let opts = ProcessOptions { force: false, rewrite: false, save_to_cache: true };
                record.complete(&mut ctx, &target, opts)?;
            }
            table.records.insert(relative, record);
        }
    }
    Ok(())
}

fn parse_one(
    project_root: &Path,
    source_config: &SourceConfig,
    existence_cache: &ExistenceCache,
    relative_path: &str,
) -> CoreResult<FileRecord> {
    let absolute = crate::paths::to_absolute(project_root, Path::new(relative_path));
    let mut record = FileRecord::new(project_root, absolute);
    let mut ctx = ProcessContext {
        project_root,
        source_config,
        existence_cache,
        cache_store: &CacheStore::new(project_root),
        export_cache: &mut ExportCache::new(),
    };
    record.parse(&mut ctx)?;
    Ok(record)
}

fn restore_or_reprocess(
    table: &mut FileTable,
    cache_store: &CacheStore,
    source_config: &SourceConfig,
    existence_cache: &ExistenceCache,
    export_cache: &mut ExportCache,
    project_root: &Path,
    entry: &crate::cache::ManifestFileEntry,
) -> CoreResult<()> {
    let current_source = std::fs::read_to_string(&entry.absolute_path).map_err(|e| CoreError::io(entry.absolute_path.clone(), e))?;
    let current_hash = crate::file_record::hash_source_pub(&current_source);

    if current_hash == entry.hash {
        let artifact = cache_store.read_artifact(&entry.cache_path);
        let record = FileRecord::restore_from_manifest(project_root, entry, artifact);
        table.records.insert(record.relative_path.clone(), record);
        return Ok(());
    }

    let mut record = FileRecord::new(project_root, entry.absolute_path.clone());
    let mut ctx = ProcessContext { project_root, source_config, existence_cache, cache_store, export_cache };
    record.parse(&mut ctx)?;
    let relative = record.relative_path.clone();
    table.graph.update_file(&relative, record.dependencies.clone());
    let target = file_ops::TableRewriteTarget::for_record(table, project_root, &record);
    record.complete(&mut ctx, &target, ProcessOptions::forced())?;
    table.records.insert(relative, record);
    Ok(())
}

fn persist_manifest(table: &FileTable, cache_store: &CacheStore, project_root: &Path) -> CoreResult<()> {
    let mut manifest = Manifest::default();
    for record in table.records.values() {
        let entry = cache::entry_for(record, project_root);
        manifest.files.insert(record.relative_path.clone(), entry);
    }
    manifest.recompute_stats();
    manifest.last_build_time = crate::file_record::now_unix_ms_pub();
    manifest.write(&cache_store.manifest_path())?;
    Ok(())
}
