//! File operations (C11): add/update/delete, keeping the cache (C6), the
//! dependency graph (C8), and the special-files index (C9) consistent with
//! the live set of [`FileRecord`]s (C7). Per §4.8, additions are always
//! applied before changes, changes before deletes, within one batch.

use std::{collections::BTreeMap, path::Path};

use tracing::{debug, instrument};

use crate::{
    cache::CacheStore,
    error::CoreResult,
    exports::ExportCache,
    file_record::{FileRecord, ProcessContext, ProcessOptions},
    graph::DependencyGraph,
    import_parser::ExistenceCache,
    rewriter::RewriteTarget,
    source_config::SourceConfig,
    special_files::SpecialFilesIndex,
};

/// The live, in-memory project state: every tracked file plus its indices.
/// Owned by the orchestrator (C12); mutated only through this module's
/// functions so the graph and special-files index never drift from the
/// record set.
pub struct FileTable {
    pub records: BTreeMap<String, FileRecord>,
    pub graph: DependencyGraph,
    pub special: SpecialFilesIndex,
}

impl Default for FileTable {
    fn default() -> Self {
        Self::new()
    }
}

impl FileTable {
    pub fn new() -> Self {
        Self { records: BTreeMap::new(), graph: DependencyGraph::new(), special: SpecialFilesIndex::new() }
    }

    pub fn get(&self, relative_path: &str) -> Option<&FileRecord> {
        self.records.get(relative_path)
    }
}

/// Adapts a [`FileTable`] so the rewriter (C5) can resolve project-internal
/// specifiers against it, by absolute-path import target.
///
/// Holds the importer's import map by value rather than a live reference
/// to its [`FileRecord`]: the record being rewritten is borrowed mutably
/// by `FileRecord::complete` at the same time this target is in use, so a
/// reference back into that same record would conflict with the borrow
/// checker. The import map is a cheap clone taken just before the call.
pub struct TableRewriteTarget<'a> {
    pub table: &'a FileTable,
    pub project_root: &'a Path,
    pub import_map: BTreeMap<String, std::path::PathBuf>,
}

impl<'a> TableRewriteTarget<'a> {
    pub fn for_record(table: &'a FileTable, project_root: &'a Path, importer: &FileRecord) -> Self {
        Self { table, project_root, import_map: importer.import_map.clone() }
    }
}

impl<'a> RewriteTarget for TableRewriteTarget<'a> {
    fn cache_name_for(&self, specifier: &str) -> Option<String> {
        let absolute = self.import_map.get(specifier)?;
        let relative = crate::paths::to_slash(&crate::paths::project_relative(self.project_root, absolute)?);
        self.table.records.get(&relative).map(|r| r.cache_name.clone())
    }

    fn target_source(&self, specifier: &str) -> Option<(std::path::PathBuf, String)> {
        let absolute = self.import_map.get(specifier)?;
        let relative = crate::paths::to_slash(&crate::paths::project_relative(self.project_root, absolute)?);
        let record = self.table.records.get(&relative)?;
        Some((record.absolute_path.clone(), record.source.clone()))
    }
}

/// Everything [`add`]/[`update`]/[`delete`] need, bundled per the same
/// rationale as [`crate::file_record::ProcessContext`].
pub struct OpsContext<'a> {
    pub project_root: &'a Path,
    pub source_config: &'a SourceConfig,
    pub existence_cache: &'a ExistenceCache,
    pub cache_store: &'a CacheStore,
    pub export_cache: &'a mut ExportCache,
}

/// Adds a newly-discovered file: constructs its record, runs the full
/// pipeline, and registers it with the graph and special-files index.
/// Per §4.8, dependents are not yet wired here — that happens once the
/// whole add/change/delete batch has settled, since a later file in the
/// same batch may be the one that depends on this one.
#[instrument(skip(table, ctx), fields(path = relative_path))]
pub fn add(table: &mut FileTable, ctx: &mut OpsContext<'_>, relative_path: &str) -> CoreResult<()> {
    let absolute_path = crate::paths::to_absolute(ctx.project_root, Path::new(relative_path));
    let mut record = FileRecord::new(ctx.project_root, absolute_path);

    let mut process_ctx = ProcessContext {
        project_root: ctx.project_root,
        source_config: ctx.source_config,
        existence_cache: ctx.existence_cache,
        cache_store: ctx.cache_store,
        export_cache: ctx.export_cache,
    };
    record.parse(&mut process_ctx)?;

    table.graph.update_file(relative_path, record.dependencies.clone());
    table.special.update(relative_path);
    table.records.insert(relative_path.to_string(), record);
    debug!("file added");
    Ok(())
}

/// Re-processes an existing file after a change event. Leaves the record
/// untouched (beyond `parse`'s own no-op-on-unchanged-hash short circuit)
/// if the content hash did not actually change, matching §4.6's
/// idempotence requirement.
#[instrument(skip(table, ctx), fields(path = relative_path))]
pub fn update(table: &mut FileTable, ctx: &mut OpsContext<'_>, relative_path: &str) -> CoreResult<bool> {
    let Some(mut record) = table.records.remove(relative_path) else {
        return add(table, ctx, relative_path).map(|_| true);
    };

    let mut process_ctx = ProcessContext {
        project_root: ctx.project_root,
        source_config: ctx.source_config,
        existence_cache: ctx.existence_cache,
        cache_store: ctx.cache_store,
        export_cache: ctx.export_cache,
    };
    let changed = record.parse(&mut process_ctx)?;
    if changed {
        table.graph.update_file(relative_path, record.dependencies.clone());
        table.special.update(relative_path);
    }
    table.records.insert(relative_path.to_string(), record);
    Ok(changed)
}

/// Removes a file from every index. Per §4.8, the record's cleanup hook
/// (if a module was loaded for it) must be invoked by the caller before
/// this is called, since this function only touches bookkeeping state.
#[instrument(skip(table, cache_store), fields(path = relative_path))]
pub fn delete(table: &mut FileTable, cache_store: &CacheStore, relative_path: &str) {
    if let Some(record) = table.records.remove(relative_path) {
        cache_store.remove_artifact(&record.cache_name);
    }
    table.graph.remove_node(relative_path);
    table.special.remove(relative_path);
    debug!("file deleted");
}

/// Runs the transpile/rewrite/persist phase for one already-parsed record,
/// resolving its target via the current table state.
pub fn complete(
    table: &mut FileTable,
    ctx: &mut OpsContext<'_>,
    relative_path: &str,
    opts: ProcessOptions,
) -> CoreResult<()> {
    let mut record = table.records.remove(relative_path).expect("complete called on a tracked path");
    let target = TableRewriteTarget::for_record(table, ctx.project_root, &record);

    let mut process_ctx = ProcessContext {
        project_root: ctx.project_root,
        source_config: ctx.source_config,
        existence_cache: ctx.existence_cache,
        cache_store: ctx.cache_store,
        export_cache: ctx.export_cache,
    };
    let result = record.complete(&mut process_ctx, &target, opts);
    table.records.insert(relative_path.to_string(), record);
    result
}

/// Recomputes every record's `dependents` set from the graph, once a batch
/// of adds/changes/deletes has settled. Called after `add`/`update`/
/// `delete` in bulk rather than per-file, since dependents are a pure
/// function of the graph's current edges (§9: "recomputed per batch").
pub fn recompute_dependents(table: &mut FileTable) {
    let dependents: BTreeMap<String, std::collections::BTreeSet<String>> =
        table.records.keys().map(|f| (f.clone(), table.graph.get_dependents(f))).collect();
    for (path, deps) in dependents {
        if let Some(record) = table.records.get_mut(&path) {
            record.dependents = deps;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_table_starts_empty() {
        let table = FileTable::new();
        assert!(table.records.is_empty());
        assert!(table.get("src/app/main.ts").is_none());
    }
}
