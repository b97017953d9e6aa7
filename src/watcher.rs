//! File watcher (C10): debounced filesystem watch that batches adds,
//! changes, and deletes for the reload executor (C15).
//!
//! Built on `notify` + `notify-debouncer-mini`, mirroring the ancestor
//! project's own `watch.rs` debounced-watch setup rather than driving
//! `notify::RecommendedWatcher` directly: both the coalescing window and
//! the event-kind classification are handled by the debouncer, so this
//! module only has to turn its `DebouncedEvent`s into project-relative
//! path buckets.

use std::{path::Path, time::Duration};

use globset::{Glob, GlobSet, GlobSetBuilder};
use notify::RecursiveMode;
use notify_debouncer_mini::{new_debouncer, DebounceEventResult, DebouncedEventKind, Debouncer};
use tokio::sync::mpsc;
use tracing::{instrument, trace, warn};

use crate::{error::WatchError, paths};

/// Include/exclude glob configuration plus debounce timing (§3 ambient
/// config). Defaults mirror the otterjs watcher: a fairly tight debounce
/// since a dev server favors responsiveness over coalescing efficiency.
#[derive(Debug, Clone)]
pub struct WatchConfig {
    pub include: Vec<String>,
    pub exclude: Vec<String>,
    pub debounce: Duration,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            include: vec!["**/*.ts".to_string(), "**/*.tsx".to_string()],
            exclude: vec![
                "**/node_modules/**".to_string(),
                "**/.warlock/**".to_string(),
                "**/dist/**".to_string(),
                "**/.git/**".to_string(),
            ],
            debounce: Duration::from_millis(150),
        }
    }
}

impl WatchConfig {
    fn build_globset(patterns: &[String]) -> GlobSet {
        let mut builder = GlobSetBuilder::new();
        for pattern in patterns {
            if let Ok(glob) = Glob::new(pattern) {
                builder.add(glob);
            } else {
                warn!(%pattern, "ignoring invalid watch glob");
            }
        }
        builder.build().unwrap_or_else(|_| GlobSetBuilder::new().build().expect("empty globset always builds"))
    }

    fn is_watched(&self, include: &GlobSet, exclude: &GlobSet, relative: &str) -> bool {
        include.is_match(relative) && !exclude.is_match(relative)
    }
}

/// One coalesced batch of filesystem changes, project-relative paths only.
#[derive(Debug, Clone, Default)]
pub struct WatchBatch {
    pub added: Vec<String>,
    pub changed: Vec<String>,
    pub removed: Vec<String>,
}

impl WatchBatch {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.changed.is_empty() && self.removed.is_empty()
    }
}

/// Owns the live debouncer; dropping this stops the watch.
pub struct Watcher {
    _debouncer: Debouncer<notify::RecommendedWatcher>,
    pub batches: mpsc::UnboundedReceiver<WatchBatch>,
}

#[instrument(skip(config), fields(root = %project_root.display()))]
pub fn start(project_root: &Path, config: WatchConfig) -> Result<Watcher, WatchError> {
    let (batch_tx, batch_rx) = mpsc::unbounded_channel();
    let include = WatchConfig::build_globset(&config.include);
    let exclude = WatchConfig::build_globset(&config.exclude);
    let root = project_root.to_path_buf();
    let debounce = config.debounce;

    let mut debouncer = new_debouncer(debounce, move |result: DebounceEventResult| {
        let events = match result {
            Ok(events) => events,
            Err(err) => {
                warn!(%err, "watch error");
                return;
            }
        };

        let mut batch = WatchBatch::default();
        for event in events {
            let Some(relative) = paths::project_relative(&root, &event.path) else { continue };
            let relative = paths::to_slash(&relative);
            if !config.is_watched(&include, &exclude, &relative) {
                continue;
            }
            match classify(&event.path, event.kind) {
                ChangeKind::Removed => batch.removed.push(relative),
                ChangeKind::Added => batch.added.push(relative),
                ChangeKind::Changed => batch.changed.push(relative),
            }
        }

        if !batch.is_empty() {
            trace!(added = batch.added.len(), changed = batch.changed.len(), removed = batch.removed.len(), "watch batch");
            let _ = batch_tx.send(batch);
        }
    })
    .map_err(|source| WatchError::Start { path: project_root.to_path_buf(), source })?;

    debouncer
        .watcher()
        .watch(project_root, RecursiveMode::Recursive)
        .map_err(|source| WatchError::Start { path: project_root.to_path_buf(), source })?;

    Ok(Watcher { _debouncer: debouncer, batches: batch_rx })
}

enum ChangeKind {
    Added,
    Changed,
    Removed,
}

fn classify(path: &Path, kind: DebouncedEventKind) -> ChangeKind {
    match kind {
        DebouncedEventKind::Any if !path.exists() => ChangeKind::Removed,
        DebouncedEventKind::AnyContinuous if !path.exists() => ChangeKind::Removed,
        _ => {
            if path.exists() && path.metadata().map(|m| m.len() == 0).unwrap_or(false) {
                ChangeKind::Added
            } else {
                ChangeKind::Changed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_excludes_node_modules() {
        let config = WatchConfig::default();
        let include = WatchConfig::build_globset(&config.include);
        let exclude = WatchConfig::build_globset(&config.exclude);
        assert!(config.is_watched(&include, &exclude, "src/app/main.ts"));
        assert!(!config.is_watched(&include, &exclude, "node_modules/pkg/index.ts"));
        assert!(!config.is_watched(&include, &exclude, "dist/main.ts"));
        assert!(!config.is_watched(&include, &exclude, ".git/hooks/main.ts"));
    }

    #[test]
    fn non_matching_extension_is_not_watched() {
        let config = WatchConfig::default();
        let include = WatchConfig::build_globset(&config.include);
        let exclude = WatchConfig::build_globset(&config.exclude);
        assert!(!config.is_watched(&include, &exclude, "README.md"));
    }

    #[test]
    fn watch_batch_reports_empty_correctly() {
        let batch = WatchBatch::default();
        assert!(batch.is_empty());
    }
}
