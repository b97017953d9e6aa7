//! Dynamic-import helper (C13): process-global cache-busting `__import`
//! bookkeeping. Does not embed an ECMAScript engine — "call the host's
//! native dynamic import" is delegated to a [`HostBindings`] implementation
//! supplied by the runtime integration, the same separation the ancestor
//! draws between `Project` (orchestration) and `Compiler` (injected trait).

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use futures::future::{FutureExt, Shared};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{instrument, trace};

use crate::file_record::CleanupHandle;

/// The runtime-shim text a host exposes to loaded modules so they can use
/// `import.meta.hot`-style ergonomics. Content is this crate's own
/// `__import`/`__clearModuleVersion` naming, not borrowed from any specific
/// host runtime's shim.
pub const HMR_RUNTIME_SHIM: &str = r#"
export function createHotContext(cacheName) {
  return {
    accept(_cb) {},
    dispose(_cb) {},
    invalidate() { globalThis.__clearModuleVersion(cacheName); },
  };
}
"#;

#[derive(Debug, Error, Clone)]
#[error("host failed to import {url}: {message}")]
pub struct HostError {
    pub url: String,
    pub message: String,
}

/// A module successfully returned by the host's native dynamic import.
pub trait HostModule: Send + Sync {
    /// A `cleanup` named export, if the module declares one.
    fn cleanup_export(&self) -> Option<CleanupHandle>;
    /// Every `$cleanup`-suffixed export value, aggregated.
    fn scan_cleanup_capabilities(&self) -> Vec<CleanupHandle>;
}

/// The host integration's native dynamic-import capability.
#[async_trait]
pub trait HostBindings: Send + Sync {
    async fn dynamic_import(&self, url: &str) -> Result<Arc<dyn HostModule>, HostError>;
}

type ModuleFuture = Shared<std::pin::Pin<Box<dyn std::future::Future<Output = Result<Arc<dyn HostModule>, HostError>> + Send>>>;

/// Owns the version registry and in-flight promise map described in §4.5
/// steps 1-3 and 5-8. Generic over `HostBindings` so the bookkeeping is
/// fully testable with a mock host.
pub struct DynamicImportHelper<H: HostBindings> {
    host: Arc<H>,
    cache_root: String,
    versions: Mutex<HashMap<String, u64>>,
    in_flight: Mutex<HashMap<String, ModuleFuture>>,
}

impl<H: HostBindings + 'static> DynamicImportHelper<H> {
    pub fn new(host: Arc<H>, cache_root: impl Into<String>) -> Self {
        Self { host, cache_root: cache_root.into(), versions: Mutex::new(HashMap::new()), in_flight: Mutex::new(HashMap::new()) }
    }

    fn normalize(cache_relative: &str) -> &str {
        cache_relative.strip_prefix("./").unwrap_or(cache_relative)
    }

    /// `__import(cacheRelative)`: steps 1-8 of §4.5.
    #[instrument(skip(self), fields(cache_relative))]
    pub async fn import(&self, cache_relative: &str) -> Result<Arc<dyn HostModule>, HostError> {
        let name = Self::normalize(cache_relative).to_string();

        let version = {
            let mut versions = self.versions.lock().await;
            *versions.entry(name.clone()).or_insert_with(now_ms)
        };

        if let Some(existing) = self.in_flight.lock().await.get(&name).cloned() {
            trace!(%name, "reusing in-flight import (cycle-safe)");
            return existing.await;
        }

        let url = format!("{}/{name}?t={version}", self.cache_root);
        let host = self.host.clone();
        let fut: std::pin::Pin<Box<dyn std::future::Future<Output = Result<Arc<dyn HostModule>, HostError>> + Send>> =
            Box::pin(async move { host.dynamic_import(&url).await });
        let shared = fut.shared();

        self.in_flight.lock().await.insert(name.clone(), shared.clone());
        let result = shared.await;

        self.in_flight.lock().await.remove(&name);
        if result.is_err() {
            trace!(%name, "import failed, in-flight entry removed");
        }
        result
    }

    /// `__clearModuleVersion(name)`: removes the version if not in-flight.
    pub async fn clear_module_version(&self, name: &str) {
        let name = Self::normalize(name);
        if self.in_flight.lock().await.contains_key(name) {
            return;
        }
        self.versions.lock().await.remove(name);
    }

    /// `__clearAllModuleVersions()`.
    pub async fn clear_all_module_versions(&self) {
        let in_flight_names: Vec<String> = self.in_flight.lock().await.keys().cloned().collect();
        let mut versions = self.versions.lock().await;
        versions.retain(|name, _| in_flight_names.contains(name));
    }
}

fn now_ms() -> u64 {
    std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).map(|d| d.as_millis() as u64).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct MockModule;
    impl HostModule for MockModule {
        fn cleanup_export(&self) -> Option<CleanupHandle> {
            None
        }
        fn scan_cleanup_capabilities(&self) -> Vec<CleanupHandle> {
            Vec::new()
        }
    }

    struct MockHost {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl HostBindings for MockHost {
        async fn dynamic_import(&self, _url: &str) -> Result<Arc<dyn HostModule>, HostError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(MockModule))
        }
    }

    #[tokio::test]
    async fn import_assigns_a_version_on_first_call() {
        let host = Arc::new(MockHost { calls: AtomicUsize::new(0) });
        let helper = DynamicImportHelper::new(host, "/cache");
        helper.import("./src-app-main.js").await.unwrap();
        assert!(helper.versions.lock().await.contains_key("src-app-main.js"));
    }

    #[tokio::test]
    async fn clear_module_version_removes_entry() {
        let host = Arc::new(MockHost { calls: AtomicUsize::new(0) });
        let helper = DynamicImportHelper::new(host, "/cache");
        helper.import("./src-app-main.js").await.unwrap();
        helper.clear_module_version("src-app-main.js").await;
        assert!(!helper.versions.lock().await.contains_key("src-app-main.js"));
    }

    #[tokio::test]
    async fn normalize_strips_leading_dot_slash() {
        assert_eq!(DynamicImportHelper::<MockHost>::normalize("./a.js"), "a.js");
        assert_eq!(DynamicImportHelper::<MockHost>::normalize("a.js"), "a.js");
    }
}
