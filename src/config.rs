//! Orchestrator configuration (A3 ambient): include/exclude globs, debounce
//! timing, cache root override, startup batch size. Built with `#[must_use]`
//! setters in the ancestor's own builder style (`ProjectBuilder`).

use crate::watcher::WatchConfig;

/// Tunables for one [`crate::orchestrator::Orchestrator`] run.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub watch: WatchConfig,
    pub batch_size: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self { watch: WatchConfig::default(), batch_size: 500 }
    }
}

/// Fluent builder mirroring the ancestor's `ProjectBuilder`: each setter
/// takes `self` by value and returns `Self`, annotated `#[must_use]` so a
/// dropped intermediate value is a compile warning rather than silent.
#[derive(Debug, Clone, Default)]
pub struct OrchestratorConfigBuilder {
    config: OrchestratorConfig,
}

impl OrchestratorConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn include(mut self, patterns: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.config.watch.include = patterns.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn exclude(mut self, patterns: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.config.watch.exclude = patterns.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn debounce_millis(mut self, millis: u64) -> Self {
        self.config.watch.debounce = std::time::Duration::from_millis(millis);
        self
    }

    #[must_use]
    pub fn batch_size(mut self, size: usize) -> Self {
        self.config.batch_size = size;
        self
    }

    pub fn build(self) -> OrchestratorConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_overrides_defaults() {
        let config = OrchestratorConfigBuilder::new().batch_size(100).debounce_millis(50).build();
        assert_eq!(config.batch_size, 100);
        assert_eq!(config.watch.debounce, std::time::Duration::from_millis(50));
    }

    #[test]
    fn default_config_has_standard_batch_size() {
        assert_eq!(OrchestratorConfig::default().batch_size, 500);
    }
}
