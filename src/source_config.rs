//! Source-config resolver (C2): loads the language compiler config
//! (`tsconfig.json`-shaped) and answers alias queries for the import parser.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

/// Parsed `compilerOptions` subset this crate cares about.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct CompilerOptions {
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub paths: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct RawSourceConfig {
    #[serde(default)]
    compiler_options: CompilerOptions,
}

/// Resolved path alias: a pattern (may contain a single trailing `*`) and
/// its target prefixes, relative to `base_url`.
#[derive(Debug, Clone)]
struct Alias {
    /// Pattern with the trailing `*` (if any) stripped.
    prefix: String,
    has_wildcard: bool,
    targets: Vec<String>,
}

/// Loaded, query-ready source configuration.
#[derive(Debug, Clone, Default)]
pub struct SourceConfig {
    pub target: String,
    base_url: PathBuf,
    aliases: Vec<Alias>,
}

impl SourceConfig {
    /// Loads a `tsconfig.json`-shaped file from `path`. A missing or
    /// unparsable file yields a default, alias-free config (mirrors the
    /// "manifest corruption treated as no manifest" fallback policy from
    /// §7, applied to the smaller config-loading surface as well).
    pub fn load(path: &Path, project_root: &Path) -> Self {
        let raw = std::fs::read_to_string(path)
            .ok()
            .and_then(|text| serde_json::from_str::<RawSourceConfig>(&text).ok())
            .unwrap_or_default();

        Self::from_raw(raw, project_root)
    }

    fn from_raw(raw: RawSourceConfig, project_root: &Path) -> Self {
        let base_url = match &raw.compiler_options.base_url {
            Some(base) => project_root.join(base),
            None => project_root.to_path_buf(),
        };

        let aliases = raw
            .compiler_options
            .paths
            .iter()
            .filter_map(|(pattern, targets)| {
                let (prefix, has_wildcard) = match pattern.strip_suffix('*') {
                    Some(p) => (p.to_string(), true),
                    None => (pattern.clone(), false),
                };
                // An alias whose target is identical to its pattern is not a
                // "real" alias per §4.1 ("alias target differs from alias
                // pattern") and is skipped.
                if targets.iter().all(|t| t == pattern) {
                    return None;
                }
                Some(Alias {
                    prefix,
                    has_wildcard,
                    targets: targets
                        .iter()
                        .map(|t| t.strip_suffix('*').unwrap_or(t).to_string())
                        .collect(),
                })
            })
            .collect();

        Self { target: raw.compiler_options.target.unwrap_or_else(|| "es2022".to_string()), base_url, aliases }
    }

    /// `true` if `specifier` matches a configured, real path alias.
    pub fn is_alias(&self, specifier: &str) -> bool {
        self.aliases.iter().any(|a| Self::matches(a, specifier))
    }

    /// Resolves `specifier` against every candidate target the alias
    /// provides, in declared order. Existence probing (trying extensions,
    /// `index.*`) is the caller's (C3's) responsibility; this only expands
    /// the alias prefix to candidate absolute path stems.
    pub fn resolve_alias(&self, specifier: &str) -> Vec<PathBuf> {
        self.aliases
            .iter()
            .filter(|a| Self::matches(a, specifier))
            .flat_map(|a| {
                let rest = if a.has_wildcard { &specifier[a.prefix.len()..] } else { "" };
                a.targets.iter().map(move |t| self.base_url.join(format!("{t}{rest}")))
            })
            .collect()
    }

    fn matches(alias: &Alias, specifier: &str) -> bool {
        if alias.has_wildcard {
            specifier.starts_with(&alias.prefix)
        } else {
            specifier == alias.prefix
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with_paths(paths: &[(&str, &[&str])]) -> SourceConfig {
        let raw = RawSourceConfig {
            compiler_options: CompilerOptions {
                target: Some("es2022".into()),
                base_url: Some(".".into()),
                paths: paths.iter().map(|(k, v)| (k.to_string(), v.iter().map(|s| s.to_string()).collect())).collect(),
            },
        };
        SourceConfig::from_raw(raw, Path::new("/project"))
    }

    #[test]
    fn wildcard_alias_resolves() {
        let cfg = config_with_paths(&[("@app/*", &["src/app/*"])]);
        assert!(cfg.is_alias("@app/users/main"));
        assert_eq!(cfg.resolve_alias("@app/users/main"), vec![PathBuf::from("/project/src/app/users/main")]);
    }

    #[test]
    fn exact_alias_resolves() {
        let cfg = config_with_paths(&[("@config", &["src/config/index"])]);
        assert!(cfg.is_alias("@config"));
        assert!(!cfg.is_alias("@config/nested"));
    }

    #[test]
    fn identity_alias_is_not_real() {
        let cfg = config_with_paths(&[("same/*", &["same/*"])]);
        assert!(!cfg.is_alias("same/thing"));
    }

    #[test]
    fn missing_file_yields_default_config() {
        let cfg = SourceConfig::load(Path::new("/does/not/exist.json"), Path::new("/project"));
        assert_eq!(cfg.target, "es2022");
        assert!(!cfg.is_alias("@app/anything"));
    }
}
