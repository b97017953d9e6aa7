//! Special-files index (C9): categorizes tracked files by path pattern into
//! {config, main, route, event, locale}. These are the only files the
//! reload executor (C15) actively re-enters on reload.

use std::collections::BTreeSet;

use globset::{Glob, GlobSet, GlobSetBuilder};
use once_cell::sync::Lazy;

/// Which of the five special-file categories a path belongs to, if any.
/// A path may match more than one pattern (e.g. nothing in this index
/// prevents that); the index stores membership per category independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SpecialKind {
    Config,
    Main,
    Route,
    Event,
    Locale,
}

struct Patterns {
    config: GlobSet,
    main: GlobSet,
    route: GlobSet,
    event: GlobSet,
    locale: GlobSet,
}

fn build_set(patterns: &[&str]) -> GlobSet {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern).expect("pattern is a compile-time constant"));
    }
    builder.build().expect("globset patterns are valid")
}

static PATTERNS: Lazy<Patterns> = Lazy::new(|| Patterns {
    config: build_set(&["src/config/**/*.ts", "src/config/**/*.tsx"]),
    main: build_set(&["**/main.ts", "**/main.tsx"]),
    route: build_set(&["**/routes.ts", "**/routes.tsx"]),
    event: build_set(&["**/events/**"]),
    locale: build_set(&["**/utils/locales.ts", "**/utils/locales.tsx"]),
});

pub fn kind_for(relative_path: &str) -> Option<SpecialKind> {
    if PATTERNS.config.is_match(relative_path) {
        Some(SpecialKind::Config)
    } else if PATTERNS.main.is_match(relative_path) {
        Some(SpecialKind::Main)
    } else if PATTERNS.route.is_match(relative_path) {
        Some(SpecialKind::Route)
    } else if PATTERNS.event.is_match(relative_path) {
        Some(SpecialKind::Event)
    } else if PATTERNS.locale.is_match(relative_path) {
        Some(SpecialKind::Locale)
    } else {
        None
    }
}

/// The five sets of tracked paths matched by path pattern (§3).
#[derive(Debug, Default, Clone)]
pub struct SpecialFilesIndex {
    pub config: BTreeSet<String>,
    pub main: BTreeSet<String>,
    pub route: BTreeSet<String>,
    pub event: BTreeSet<String>,
    pub locale: BTreeSet<String>,
}

impl SpecialFilesIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or re-evaluates one path's membership across all five sets.
    pub fn update(&mut self, relative_path: &str) {
        self.remove(relative_path);
        match kind_for(relative_path) {
            Some(SpecialKind::Config) => {
                self.config.insert(relative_path.to_string());
            }
            Some(SpecialKind::Main) => {
                self.main.insert(relative_path.to_string());
            }
            Some(SpecialKind::Route) => {
                self.route.insert(relative_path.to_string());
            }
            Some(SpecialKind::Event) => {
                self.event.insert(relative_path.to_string());
            }
            Some(SpecialKind::Locale) => {
                self.locale.insert(relative_path.to_string());
            }
            None => {}
        }
    }

    pub fn remove(&mut self, relative_path: &str) {
        self.config.remove(relative_path);
        self.main.remove(relative_path);
        self.route.remove(relative_path);
        self.event.remove(relative_path);
        self.locale.remove(relative_path);
    }

    pub fn contains(&self, relative_path: &str) -> bool {
        self.config.contains(relative_path)
            || self.main.contains(relative_path)
            || self.route.contains(relative_path)
            || self.event.contains(relative_path)
            || self.locale.contains(relative_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_config_path() {
        assert_eq!(kind_for("src/config/database.ts"), Some(SpecialKind::Config));
    }

    #[test]
    fn classifies_main_path() {
        assert_eq!(kind_for("src/app/users/main.ts"), Some(SpecialKind::Main));
    }

    #[test]
    fn classifies_routes_path() {
        assert_eq!(kind_for("src/app/users/routes.tsx"), Some(SpecialKind::Route));
    }

    #[test]
    fn classifies_events_path() {
        assert_eq!(kind_for("src/app/events/onCreate.ts"), Some(SpecialKind::Event));
    }

    #[test]
    fn non_special_path_is_none() {
        assert_eq!(kind_for("src/app/users/dto.ts"), None);
    }

    #[test]
    fn index_update_and_remove_round_trip() {
        let mut index = SpecialFilesIndex::new();
        index.update("src/config/database.ts");
        assert!(index.contains("src/config/database.ts"));
        index.remove("src/config/database.ts");
        assert!(!index.contains("src/config/database.ts"));
    }
}
