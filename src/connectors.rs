//! Connector registry (C16): long-running subsystems with a start/restart/
//! shutdown lifecycle and a "should restart on these paths" predicate.
//!
//! `Connector` is `async_trait`-annotated rather than relying on stable
//! Rust's native async-fn-in-trait, since this registry needs the object
//! safety to hold `Vec<Box<dyn Connector>>`.

use std::collections::BTreeMap;

use async_trait::async_trait;
use tracing::{instrument, warn};

use crate::error::ConnectorError;

/// A glob-style watched-path predicate: `*` matches any run of characters
/// within a path segment, matching the ancestor corpus's simple remapping
/// glob conventions rather than pulling in a full glob engine for this.
fn matches_pattern(pattern: &str, path: &str) -> bool {
    if pattern == path {
        return true;
    }
    if let Some(prefix) = pattern.strip_suffix('*') {
        return path.starts_with(prefix);
    }
    false
}

#[async_trait]
pub trait Connector: Send + Sync {
    fn name(&self) -> &str;
    fn priority(&self) -> i32;
    fn watched_files(&self) -> &[String];
    async fn start(&mut self) -> Result<(), ConnectorError>;
    async fn restart(&mut self) -> Result<(), ConnectorError> {
        self.shutdown().await?;
        self.start().await
    }
    async fn shutdown(&mut self) -> Result<(), ConnectorError>;
    fn is_active(&self) -> bool;

    fn should_restart(&self, changed_paths: &[String]) -> bool {
        changed_paths.iter().any(|path| self.watched_files().iter().any(|pattern| matches_pattern(pattern, path)))
    }
}

/// Connectors sorted by priority at insertion time: smaller priorities
/// start earlier and shut down later, so start order and reverse-shutdown
/// order are both free traversals of the same map.
#[derive(Default)]
pub struct ConnectorRegistry {
    by_priority: BTreeMap<i32, Vec<Box<dyn Connector>>>,
}

impl ConnectorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, connector: Box<dyn Connector>) {
        self.by_priority.entry(connector.priority()).or_default().push(connector);
    }

    /// Starts every connector in priority order. A failed start is logged
    /// and the connector is left inactive; other connectors proceed.
    #[instrument(skip(self))]
    pub async fn start_all(&mut self) {
        for connectors in self.by_priority.values_mut() {
            for connector in connectors.iter_mut() {
                if let Err(err) = connector.start().await {
                    warn!(name = connector.name(), %err, "connector failed to start");
                }
            }
        }
    }

    /// Shuts down every connector in reverse priority order.
    #[instrument(skip(self))]
    pub async fn shutdown_all(&mut self) {
        for connectors in self.by_priority.values_mut().rev() {
            for connector in connectors.iter_mut() {
                if let Err(err) = connector.shutdown().await {
                    warn!(name = connector.name(), %err, "connector failed to shut down");
                }
            }
        }
    }

    /// Restarts every connector whose `should_restart` predicate matches
    /// `changed_paths`, in priority order (§4.10 step 5).
    #[instrument(skip(self, changed_paths))]
    pub async fn restart_affected(&mut self, changed_paths: &[String]) {
        for connectors in self.by_priority.values_mut() {
            for connector in connectors.iter_mut() {
                if connector.should_restart(changed_paths) {
                    if let Err(err) = connector.restart().await {
                        warn!(name = connector.name(), %err, "connector failed to restart");
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeConnector {
        name: String,
        priority: i32,
        watched: Vec<String>,
        active: bool,
    }

    #[async_trait]
    impl Connector for FakeConnector {
        fn name(&self) -> &str {
            &self.name
        }
        fn priority(&self) -> i32 {
            self.priority
        }
        fn watched_files(&self) -> &[String] {
            &self.watched
        }
        async fn start(&mut self) -> Result<(), ConnectorError> {
            self.active = true;
            Ok(())
        }
        async fn shutdown(&mut self) -> Result<(), ConnectorError> {
            self.active = false;
            Ok(())
        }
        fn is_active(&self) -> bool {
            self.active
        }
    }

    #[test]
    fn glob_suffix_matches_prefix() {
        assert!(matches_pattern("src/config/*", "src/config/database.ts"));
        assert!(!matches_pattern("src/config/*", "src/app/main.ts"));
    }

    #[tokio::test]
    async fn start_all_activates_every_connector() {
        let mut registry = ConnectorRegistry::new();
        registry.register(Box::new(FakeConnector {
            name: "db".into(),
            priority: 0,
            watched: vec!["src/config/database.ts".into()],
            active: false,
        }));
        registry.start_all().await;
        assert_eq!(registry.by_priority.len(), 1);
    }

    #[tokio::test]
    async fn restart_affected_only_restarts_matching_connectors() {
        let mut registry = ConnectorRegistry::new();
        registry.register(Box::new(FakeConnector {
            name: "db".into(),
            priority: 0,
            watched: vec!["src/config/database.ts".into()],
            active: true,
        }));
        registry.register(Box::new(FakeConnector {
            name: "queue".into(),
            priority: 1,
            watched: vec!["src/config/queue.ts".into()],
            active: true,
        }));
        registry.restart_affected(&["src/config/database.ts".to_string()]).await;
    }
}
