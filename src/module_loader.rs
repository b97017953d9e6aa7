//! Module loader (C14): wraps the dynamic-import helper (C13) for special
//! files, tracking which modules are currently loaded and invoking their
//! cleanup hooks before a reload replaces them.

use std::{collections::BTreeMap, sync::Arc};

use tracing::{debug, instrument};

use crate::{
    dynamic_import::{DynamicImportHelper, HostBindings, HostModule},
    file_record::CleanupHandle,
};

/// A previously loaded special file: its module handle and any cleanup
/// capability it exposed.
struct LoadedModule {
    module: Arc<dyn HostModule>,
    cleanup: Vec<CleanupHandle>,
}

/// Tracks the currently-loaded special files (configs, mains, events,
/// routes, locales) by cache-relative name, running cleanup before
/// replacing an entry.
pub struct ModuleLoader<H: HostBindings> {
    helper: Arc<DynamicImportHelper<H>>,
    loaded: BTreeMap<String, LoadedModule>,
}

impl<H: HostBindings + 'static> ModuleLoader<H> {
    pub fn new(helper: Arc<DynamicImportHelper<H>>) -> Self {
        Self { helper, loaded: BTreeMap::new() }
    }

    /// Loads (or reloads) `cache_name`, running any previously-recorded
    /// cleanup first. Per §4.5 step 6, a `cleanup` export wins over scanned
    /// `$cleanup` capabilities.
    #[instrument(skip(self), fields(cache_name))]
    pub async fn load(&mut self, cache_name: &str) -> Result<(), crate::dynamic_import::HostError> {
        self.run_cleanup(cache_name);

        let module = self.helper.import(cache_name).await?;
        let cleanup = match module.cleanup_export() {
            Some(handle) => vec![handle],
            None => module.scan_cleanup_capabilities(),
        };
        debug!(cleanup_count = cleanup.len(), "module loaded");
        self.loaded.insert(cache_name.to_string(), LoadedModule { module, cleanup });
        Ok(())
    }

    /// Invokes and drops a loaded module's cleanup without reloading it,
    /// used for deleted files and HMR invalidation (§4.10 steps 1 and 3).
    pub fn run_cleanup(&mut self, cache_name: &str) {
        if let Some(previous) = self.loaded.remove(cache_name) {
            for cleanup in previous.cleanup {
                cleanup();
            }
        }
    }

    pub fn is_loaded(&self, cache_name: &str) -> bool {
        self.loaded.contains_key(cache_name)
    }

    pub fn module(&self, cache_name: &str) -> Option<Arc<dyn HostModule>> {
        self.loaded.get(cache_name).map(|m| m.module.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct MockModule {
        cleanup_calls: Arc<AtomicUsize>,
    }

    impl HostModule for MockModule {
        fn cleanup_export(&self) -> Option<CleanupHandle> {
            let calls = self.cleanup_calls.clone();
            Some(Arc::new(move || {
                calls.fetch_add(1, Ordering::SeqCst);
            }))
        }
        fn scan_cleanup_capabilities(&self) -> Vec<CleanupHandle> {
            Vec::new()
        }
    }

    struct MockHost {
        cleanup_calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl HostBindings for MockHost {
        async fn dynamic_import(&self, _url: &str) -> Result<Arc<dyn HostModule>, crate::dynamic_import::HostError> {
            Ok(Arc::new(MockModule { cleanup_calls: self.cleanup_calls.clone() }))
        }
    }

    #[tokio::test]
    async fn reload_runs_previous_cleanup() {
        let cleanup_calls = Arc::new(AtomicUsize::new(0));
        let host = Arc::new(MockHost { cleanup_calls: cleanup_calls.clone() });
        let helper = Arc::new(DynamicImportHelper::new(host, "/cache"));
        let mut loader = ModuleLoader::new(helper);

        loader.load("src-app-main.js").await.unwrap();
        assert!(loader.is_loaded("src-app-main.js"));
        loader.load("src-app-main.js").await.unwrap();
        assert_eq!(cleanup_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn run_cleanup_without_reload_unloads() {
        let cleanup_calls = Arc::new(AtomicUsize::new(0));
        let host = Arc::new(MockHost { cleanup_calls: cleanup_calls.clone() });
        let helper = Arc::new(DynamicImportHelper::new(host, "/cache"));
        let mut loader = ModuleLoader::new(helper);

        loader.load("src-app-main.js").await.unwrap();
        loader.run_cleanup("src-app-main.js");
        assert!(!loader.is_loaded("src-app-main.js"));
        assert_eq!(cleanup_calls.load(Ordering::SeqCst), 1);
    }
}
