//! Export analyzer (§4.4): determines a source file's named exports,
//! default export, and re-exports from its syntax tree. Used by the import
//! rewriter to expand `export * from "x"` into concrete bindings.

use std::{
    collections::{BTreeMap, BTreeSet},
    path::{Path, PathBuf},
};

use swc_common::{sync::Lrc, FileName, SourceMap};
use swc_ecma_ast::{Decl, EsVersion, ExportSpecifier, ModuleDecl, ModuleItem};
use swc_ecma_parser::{lexer::Lexer, Parser, StringInput, Syntax, TsConfig};

use crate::error::RewriteError;

/// Exports discovered for one file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportInfo {
    pub named_exports: BTreeSet<String>,
    pub has_default_export: bool,
    /// Re-exported names and the specifier they came from (`export { a } from "x"`).
    pub re_exports: BTreeMap<String, String>,
}

/// Caches [`ExportInfo`] per absolute path. Invalidated by simple removal
/// whenever the owning file record is reprocessed (§4.4), not by a
/// generation counter, so invalidation can never drift out of sync with
/// the event that causes it.
#[derive(Default)]
pub struct ExportCache {
    entries: BTreeMap<PathBuf, ExportInfo>,
}

impl ExportCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn invalidate(&mut self, path: &Path) {
        self.entries.remove(path);
    }

    pub fn get_or_analyze(&mut self, path: &Path, source: &str) -> Result<&ExportInfo, RewriteError> {
        if !self.entries.contains_key(path) {
            let info = analyze(source, path)?;
            self.entries.insert(path.to_path_buf(), info);
        }
        Ok(self.entries.get(path).expect("just inserted"))
    }
}

/// Parses `source` and extracts its export surface. `interface`/`type`
/// declarations are never named exports (§4.4).
pub fn analyze(source: &str, path: &Path) -> Result<ExportInfo, RewriteError> {
    let cm: Lrc<SourceMap> = Default::default();
    let is_tsx = path.extension().and_then(|e| e.to_str()) == Some("tsx");
    let fm = cm.new_source_file(FileName::Real(path.to_path_buf()), source.to_string());
    let syntax = Syntax::Typescript(TsConfig { tsx: is_tsx, ..Default::default() });
    let lexer = Lexer::new(syntax, EsVersion::Es2022, StringInput::from(&*fm), None);
    let mut parser = Parser::new_from(lexer);

    let module = parser.parse_module().map_err(|e| RewriteError::ExportAnalysisFailed {
        path: path.to_path_buf(),
        message: format!("{e:?}"),
    })?;

    let mut info = ExportInfo::default();
    for item in &module.body {
        let ModuleItem::ModuleDecl(decl) = item else { continue };
        match decl {
            ModuleDecl::ExportDecl(export) => collect_decl(&export.decl, &mut info),
            ModuleDecl::ExportDefaultDecl(_) | ModuleDecl::ExportDefaultExpr(_) => {
                info.has_default_export = true;
            }
            ModuleDecl::ExportNamed(named) => {
                for spec in &named.specifiers {
                    match spec {
                        ExportSpecifier::Named(n) => {
                            let exported = n
                                .exported
                                .as_ref()
                                .map(module_export_name_to_string)
                                .unwrap_or_else(|| module_export_name_to_string(&n.orig));
                            if exported == "default" {
                                info.has_default_export = true;
                                continue;
                            }
                            if let Some(src) = &named.src {
                                info.re_exports.insert(exported.clone(), src.value.to_string());
                            }
                            info.named_exports.insert(exported);
                        }
                        ExportSpecifier::Default(_) => info.has_default_export = true,
                        ExportSpecifier::Namespace(n) => {
                            info.named_exports.insert(module_export_name_to_string(&n.name));
                        }
                    }
                }
            }
            _ => {}
        }
    }

    Ok(info)
}

fn module_export_name_to_string(name: &swc_ecma_ast::ModuleExportName) -> String {
    match name {
        swc_ecma_ast::ModuleExportName::Ident(i) => i.sym.to_string(),
        swc_ecma_ast::ModuleExportName::Str(s) => s.value.to_string(),
    }
}

fn collect_decl(decl: &Decl, info: &mut ExportInfo) {
    match decl {
        Decl::Class(c) => {
            info.named_exports.insert(c.ident.sym.to_string());
        }
        Decl::Fn(f) => {
            info.named_exports.insert(f.ident.sym.to_string());
        }
        Decl::Var(v) => {
            for declarator in &v.decls {
                if let swc_ecma_ast::Pat::Ident(ident) = &declarator.name {
                    info.named_exports.insert(ident.id.sym.to_string());
                }
            }
        }
        Decl::TsEnum(e) => {
            info.named_exports.insert(e.id.sym.to_string());
        }
        // interfaces and type aliases are never runtime exports.
        Decl::TsInterface(_) | Decl::TsTypeAlias(_) | Decl::TsModule(_) => {}
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn collects_named_and_default_exports() {
        let source = "export const a = 1; export function b() {} export default class C {}";
        let info = analyze(source, &PathBuf::from("src/app/module.ts")).unwrap();
        assert!(info.named_exports.contains("a"));
        assert!(info.named_exports.contains("b"));
        assert!(info.has_default_export);
    }

    #[test]
    fn excludes_interfaces_and_type_aliases() {
        let source = "export interface Foo {} export type Bar = number; export const real = 1;";
        let info = analyze(source, &PathBuf::from("src/app/types.ts")).unwrap();
        assert_eq!(info.named_exports.len(), 1);
        assert!(info.named_exports.contains("real"));
    }

    #[test]
    fn collects_named_re_export() {
        let source = r#"export { a } from "./other";"#;
        let info = analyze(source, &PathBuf::from("src/app/index.ts")).unwrap();
        assert_eq!(info.re_exports.get("a"), Some(&"./other".to_string()));
    }

    #[test]
    fn cache_invalidation_forces_reanalysis() {
        let mut cache = ExportCache::new();
        let path = PathBuf::from("src/app/module.ts");
        let first = cache.get_or_analyze(&path, "export const a = 1;").unwrap().clone();
        assert!(first.named_exports.contains("a"));
        cache.invalidate(&path);
        assert!(!cache.entries.contains_key(&path));
    }
}
