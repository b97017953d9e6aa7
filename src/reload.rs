//! Reload executor (C15): turns one watch batch into invalidation,
//! reprocessing, connector restarts, and ordered special-file reloads.

use std::collections::BTreeSet;

use tracing::{debug, instrument};

use crate::{
    connectors::ConnectorRegistry,
    error::CoreResult,
    file_ops::{self, FileTable, OpsContext},
    file_record::{Layer, ProcessOptions},
    special_files::SpecialFilesIndex,
};

/// Which reload policy a batch's changes settled on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadKind {
    Hmr,
    Fsr,
}

/// The result of running [`execute_batch`]: what was invalidated and how,
/// for logging and for a caller that wants to notify connected clients.
#[derive(Debug, Default)]
pub struct ReloadOutcome {
    pub invalidated: Vec<String>,
    pub kind: Option<ReloadKind>,
    pub reloaded_specials: Vec<String>,
}

/// §4.10 `executeBatch(changedPaths, files, deletedPaths)`.
#[instrument(skip(table, ctx, connectors), fields(changed = changed_paths.len(), deleted = deleted_paths.len()))]
pub async fn execute_batch(
    table: &mut FileTable,
    ctx: &mut OpsContext<'_>,
    connectors: &mut ConnectorRegistry,
    changed_paths: &[String],
    deleted_paths: &[String],
) -> CoreResult<ReloadOutcome> {
    // Step 1: deleted cleanup is the caller's responsibility via the module
    // loader (C14); here we only drop bookkeeping for deleted files.
    for path in deleted_paths {
        file_ops::delete(table, ctx.cache_store, path);
    }

    // Step 2: accumulate invalidation chains, classify HMR vs FSR.
    let mut all_invalidated: BTreeSet<String> = BTreeSet::new();
    let mut kind = None;
    for path in changed_paths {
        let chain = table.graph.invalidation_chain(path);
        let chain_is_fsr = chain.iter().any(|p| table.get(p).map(|r| r.layer == Layer::Fsr).unwrap_or(false));
        if chain_is_fsr {
            kind = Some(ReloadKind::Fsr);
        } else if kind.is_none() {
            kind = Some(ReloadKind::Hmr);
        }
        all_invalidated.extend(chain);
    }

    // Step 3 (HMR cache clearing / module-version clearing) is driven by
    // the caller through the module loader once it has each invalidated
    // path's cache name; this executor only hands back the invalidated set.

    // Step 4: reprocess every invalidated file, forced, so re-exports pick
    // up export changes.
    let mut sorted: Vec<String> = all_invalidated.iter().cloned().collect();
    sorted.sort();
    for path in &sorted {
        if !table.records.contains_key(path) {
            continue;
        }
        file_ops::update(table, ctx, path)?;
        if table.records.contains_key(path) {
            file_ops::complete(table, ctx, path, ProcessOptions::forced())?;
        }
    }
    file_ops::recompute_dependents(table);

    // Step 5: restart affected connectors.
    connectors.restart_affected(changed_paths).await;

    // Step 6/7: determine affected special files and their reload order.
    let reloaded_specials = affected_specials_in_order(&table.special, &all_invalidated);

    debug!(invalidated = sorted.len(), specials = reloaded_specials.len(), "batch executed");
    Ok(ReloadOutcome { invalidated: sorted, kind, reloaded_specials })
}

/// §4.10 steps 6-8: configs → locales → mains → events → routes, falling
/// back to the last node in the invalidation chain if nothing special was
/// touched.
fn affected_specials_in_order(special: &SpecialFilesIndex, invalidated: &BTreeSet<String>) -> Vec<String> {
    let mut out = Vec::new();
    for set in [&special.config, &special.locale, &special.main, &special.event, &special.route] {
        for path in set {
            if invalidated.contains(path) {
                out.push(path.clone());
            }
        }
    }
    if out.is_empty() {
        if let Some(last) = invalidated.iter().next_back() {
            out.push(last.clone());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn affected_specials_orders_configs_before_routes() {
        let mut special = SpecialFilesIndex::new();
        special.update("src/config/database.ts");
        special.update("src/app/routes.ts");
        let mut invalidated = BTreeSet::new();
        invalidated.insert("src/app/routes.ts".to_string());
        invalidated.insert("src/config/database.ts".to_string());
        let order = affected_specials_in_order(&special, &invalidated);
        assert_eq!(order, vec!["src/config/database.ts".to_string(), "src/app/routes.ts".to_string()]);
    }

    #[test]
    fn falls_back_to_last_invalidated_when_no_specials_touched() {
        let special = SpecialFilesIndex::new();
        let mut invalidated = BTreeSet::new();
        invalidated.insert("src/app/dto.ts".to_string());
        let order = affected_specials_in_order(&special, &invalidated);
        assert_eq!(order, vec!["src/app/dto.ts".to_string()]);
    }
}
