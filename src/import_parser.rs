//! Import parser (C3): extracts runtime (non-type-only) import/export
//! specifiers from a source file and resolves each to an absolute project
//! path, skipping host built-ins, declared externals, and type-only imports.

use std::{
    cell::RefCell,
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use once_cell::sync::Lazy;
use regex::Regex;
use swc_common::{sync::Lrc, FileName, SourceMap};
use swc_ecma_ast::{EsVersion, Module};
use swc_ecma_parser::{lexer::Lexer, Parser, StringInput, Syntax, TsConfig};
use swc_ecma_visit::{Visit, VisitWith};

use crate::{error::ParseError, paths, source_config::SourceConfig};

/// A raw specifier extracted from a source file, before resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
struct RawSpecifier {
    text: String,
    type_only: bool,
}

/// Per-process cache of filesystem existence probes, memoizing the
/// extension/index-file resolution walk. Keyed by the exact candidate path
/// probed, not the original specifier, since many specifiers probe the same
/// candidates.
#[derive(Default)]
pub struct ExistenceCache {
    inner: RefCell<BTreeMap<PathBuf, bool>>,
}

impl ExistenceCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn exists(&self, path: &Path) -> bool {
        if let Some(hit) = self.inner.borrow().get(path) {
            return *hit;
        }
        let exists = path.is_file();
        self.inner.borrow_mut().insert(path.to_path_buf(), exists);
        exists
    }
}

/// Extracts and resolves import/export specifiers for one source file.
pub struct ImportParser<'a> {
    pub source_config: &'a SourceConfig,
    pub project_root: &'a Path,
    pub existence_cache: &'a ExistenceCache,
}

impl<'a> ImportParser<'a> {
    pub fn new(source_config: &'a SourceConfig, project_root: &'a Path, existence_cache: &'a ExistenceCache) -> Self {
        Self { source_config, project_root, existence_cache }
    }

    /// Parses `source` (the contents of `absolute_path`) and returns the
    /// import map: every non-type-only specifier that resolves inside the
    /// project, mapped to its resolved absolute path. External and
    /// unresolvable specifiers are simply absent from the map.
    pub fn parse(&self, source: &str, absolute_path: &Path) -> Result<BTreeMap<String, PathBuf>, ParseError> {
        if paths::is_declaration_file(absolute_path) {
            return Ok(BTreeMap::new());
        }

        let raw_specifiers = match self.parse_with_swc(source, absolute_path) {
            Ok(specifiers) => specifiers,
            Err(_) => self.parse_with_regex(source),
        };

        let importer_dir = absolute_path.parent().unwrap_or(self.project_root);
        let mut map = BTreeMap::new();
        for spec in raw_specifiers {
            if spec.type_only {
                continue;
            }
            if let Some(resolved) = self.resolve(&spec.text, importer_dir) {
                map.insert(spec.text, resolved);
            }
        }
        Ok(map)
    }

    fn parse_with_swc(&self, source: &str, absolute_path: &Path) -> Result<Vec<RawSpecifier>, ParseError> {
        let cm: Lrc<SourceMap> = Default::default();
        let is_tsx = absolute_path.extension().and_then(|e| e.to_str()) == Some("tsx");
        let fm = cm.new_source_file(FileName::Real(absolute_path.to_path_buf()), source.to_string());

        let syntax = Syntax::Typescript(TsConfig { tsx: is_tsx, ..Default::default() });
        let lexer = Lexer::new(syntax, EsVersion::Es2022, StringInput::from(&*fm), None);
        let mut parser = Parser::new_from(lexer);

        let module: Module = parser.parse_module().map_err(|e| ParseError::SyntaxError {
            path: absolute_path.to_path_buf(),
            message: format!("{e:?}"),
        })?;

        let mut collector = SpecifierCollector::default();
        module.visit_with(&mut collector);
        Ok(collector.specifiers)
    }

    /// Regex fallback, used when the primary parser rejects syntax the host
    /// would still accept (e.g. a grammar extension the pinned parser
    /// version does not yet understand). Recognizes the four shapes named
    /// in §4.1: `import ... from "x"`, bare `import "x"`, dynamic
    /// `import("x")`, and `export ... from "x"`.
    fn parse_with_regex(&self, source: &str) -> Vec<RawSpecifier> {
        static IMPORT_FROM_RE: Lazy<Regex> =
            Lazy::new(|| Regex::new(r#"(?m)^\s*import\s+(type\s+)?[^;'"]*?\s+from\s+['"]([^'"]+)['"]"#).unwrap());
        static BARE_IMPORT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r#"(?m)^\s*import\s+['"]([^'"]+)['"]"#).unwrap());
        static DYNAMIC_IMPORT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r#"\bimport\(\s*['"]([^'"]+)['"]\s*\)"#).unwrap());
        static EXPORT_FROM_RE: Lazy<Regex> =
            Lazy::new(|| Regex::new(r#"(?m)^\s*export\s+(type\s+)?[^;'"]*?\s+from\s+['"]([^'"]+)['"]"#).unwrap());

        let mut out = Vec::new();
        for cap in IMPORT_FROM_RE.captures_iter(source) {
            out.push(RawSpecifier { text: cap[2].to_string(), type_only: cap.get(1).is_some() });
        }
        for cap in BARE_IMPORT_RE.captures_iter(source) {
            out.push(RawSpecifier { text: cap[1].to_string(), type_only: false });
        }
        for cap in DYNAMIC_IMPORT_RE.captures_iter(source) {
            out.push(RawSpecifier { text: cap[1].to_string(), type_only: false });
        }
        for cap in EXPORT_FROM_RE.captures_iter(source) {
            out.push(RawSpecifier { text: cap[2].to_string(), type_only: cap.get(1).is_some() });
        }
        out
    }

    /// Resolves one specifier to an absolute path, or `None` if it is
    /// external (a bare package specifier with no matching alias).
    fn resolve(&self, specifier: &str, importer_dir: &Path) -> Option<PathBuf> {
        let candidates_base: Vec<PathBuf> = if specifier.starts_with('.') {
            vec![importer_dir.join(specifier)]
        } else if let Some(stripped) = specifier.strip_prefix('/') {
            vec![self.project_root.join(stripped)]
        } else if self.source_config.is_alias(specifier) {
            self.source_config.resolve_alias(specifier)
        } else {
            return None;
        };

        for base in candidates_base {
            let base = paths::normalize_lexically(&base);
            if let Some(found) = self.probe(&base) {
                return Some(found);
            }
        }
        None
    }

    /// Tries `base` as-is, then each extension in [`paths::RESOLVE_EXTENSIONS`],
    /// then `base/index.<ext>` for each extension, in that order.
    fn probe(&self, base: &Path) -> Option<PathBuf> {
        if self.existence_cache.exists(base) {
            return Some(base.to_path_buf());
        }
        for ext in paths::RESOLVE_EXTENSIONS {
            let candidate = base.with_extension(ext);
            if self.existence_cache.exists(&candidate) {
                return Some(candidate);
            }
        }
        for ext in paths::RESOLVE_EXTENSIONS {
            let candidate = base.join(format!("index.{ext}"));
            if self.existence_cache.exists(&candidate) {
                return Some(candidate);
            }
        }
        None
    }
}

/// Walks a parsed [`Module`] collecting import/export specifiers along with
/// their type-only status. Mixed specifier lists (`{ type A, b }`) are kept
/// (not type-only) since at least one binding is a runtime value.
#[derive(Default)]
struct SpecifierCollector {
    specifiers: Vec<RawSpecifier>,
}

impl Visit for SpecifierCollector {
    fn visit_import_decl(&mut self, node: &swc_ecma_ast::ImportDecl) {
        let all_type_only = node.type_only
            || (!node.specifiers.is_empty()
                && node.specifiers.iter().all(|s| matches!(s, swc_ecma_ast::ImportSpecifier::Named(n) if n.is_type_only)));
        self.specifiers.push(RawSpecifier { text: node.src.value.to_string(), type_only: all_type_only });
    }

    fn visit_named_export(&mut self, node: &swc_ecma_ast::NamedExport) {
        if let Some(src) = &node.src {
            self.specifiers.push(RawSpecifier { text: src.value.to_string(), type_only: node.type_only });
        }
    }

    fn visit_export_all(&mut self, node: &swc_ecma_ast::ExportAll) {
        self.specifiers.push(RawSpecifier { text: node.src.value.to_string(), type_only: node.type_only });
    }

    fn visit_call_expr(&mut self, node: &swc_ecma_ast::CallExpr) {
        use swc_ecma_ast::{Callee, Expr, Lit};
        if let Callee::Import(_) = &node.callee {
            if let Some(arg) = node.args.first() {
                if let Expr::Lit(Lit::Str(s)) = &*arg.expr {
                    self.specifiers.push(RawSpecifier { text: s.value.to_string(), type_only: false });
                }
            }
        }
        node.visit_children_with(self);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn setup() -> (tempfile::TempDir, SourceConfig) {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("src/app")).unwrap();
        fs::write(dir.path().join("src/app/utils.ts"), "export const x = 1;").unwrap();
        fs::write(dir.path().join("src/app/types.d.ts"), "export type X = number;").unwrap();
        let cfg = SourceConfig::load(&dir.path().join("tsconfig.json"), dir.path());
        (dir, cfg)
    }

    #[test]
    fn resolves_relative_import() {
        let (dir, cfg) = setup();
        let cache = ExistenceCache::new();
        let parser = ImportParser::new(&cfg, dir.path(), &cache);
        let source = r#"import { x } from "./utils";"#;
        let main = dir.path().join("src/app/main.ts");
        let map = parser.parse(source, &main).unwrap();
        assert_eq!(map.get("./utils"), Some(&dir.path().join("src/app/utils.ts")));
    }

    #[test]
    fn skips_type_only_import() {
        let (dir, cfg) = setup();
        let cache = ExistenceCache::new();
        let parser = ImportParser::new(&cfg, dir.path(), &cache);
        let source = r#"import type { X } from "./types";"#;
        let main = dir.path().join("src/app/main.ts");
        let map = parser.parse(source, &main).unwrap();
        assert!(map.is_empty());
    }

    #[test]
    fn retains_mixed_specifier_import() {
        let (dir, cfg) = setup();
        let cache = ExistenceCache::new();
        let parser = ImportParser::new(&cfg, dir.path(), &cache);
        let source = r#"import { type X, x } from "./utils";"#;
        let main = dir.path().join("src/app/main.ts");
        let map = parser.parse(source, &main).unwrap();
        assert!(map.contains_key("./utils"));
    }

    #[test]
    fn external_package_is_absent_from_map() {
        let (dir, cfg) = setup();
        let cache = ExistenceCache::new();
        let parser = ImportParser::new(&cfg, dir.path(), &cache);
        let source = r#"import { z } from "some-external-package";"#;
        let main = dir.path().join("src/app/main.ts");
        let map = parser.parse(source, &main).unwrap();
        assert!(map.is_empty());
    }

    #[test]
    fn declaration_file_yields_empty_map() {
        let (dir, cfg) = setup();
        let cache = ExistenceCache::new();
        let parser = ImportParser::new(&cfg, dir.path(), &cache);
        let path = dir.path().join("src/app/types.d.ts");
        let map = parser.parse("import { x } from \"./utils\";", &path).unwrap();
        assert!(map.is_empty());
    }

    #[test]
    fn dynamic_import_is_resolved_via_regex_fallback() {
        let (dir, cfg) = setup();
        let cache = ExistenceCache::new();
        let parser = ImportParser::new(&cfg, dir.path(), &cache);
        let specifiers = parser.parse_with_regex(r#"const m = await import("./utils");"#);
        assert_eq!(specifiers.len(), 1);
        assert_eq!(specifiers[0].text, "./utils");
    }
}
