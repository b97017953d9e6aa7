//! Import rewriter (C5): rewrites transpiled ECMAScript so every
//! project-internal static import/export-from becomes an awaited call into
//! the dynamic-import helper, per the rewrite-rule table in §4.3.
//!
//! Operates on the parsed `Module` AST (re-parsed from the transpiled text,
//! since transpile output differs from the original source tree) via a
//! `VisitMut` pass, rather than line-template text substitution, so
//! untouched statements — comments, whitespace, nested destructuring in
//! code the rewriter does not touch — survive unchanged.

use std::{collections::BTreeMap, path::Path};

use swc_common::{sync::Lrc, FileName, SourceMap, SyntaxContext, DUMMY_SP};
use swc_ecma_ast::*;
use swc_ecma_codegen::{text_writer::JsWriter, Config as CodegenConfig, Emitter};
use swc_ecma_parser::{lexer::Lexer, Parser, StringInput, Syntax, TsConfig};
use swc_ecma_visit::{VisitMut, VisitMutWith};

use crate::{
    error::RewriteError,
    exports::{analyze, ExportInfo},
};

/// Resolves a specifier to the information the rewriter needs about its
/// target: whether it is project-internal, and if so its cache name.
pub trait RewriteTarget {
    /// `None` if `specifier` is external (left verbatim).
    fn cache_name_for(&self, specifier: &str) -> Option<String>;
    /// Absolute path and source text of the target, for export analysis
    /// (only needed for `export * from`).
    fn target_source(&self, specifier: &str) -> Option<(std::path::PathBuf, String)>;
}

/// A [`RewriteTarget`] backed by a plain import-map, for callers (and
/// tests) that already have resolved specifiers in hand.
pub struct StaticRewriteTarget {
    pub cache_names: BTreeMap<String, String>,
    pub sources: BTreeMap<String, (std::path::PathBuf, String)>,
}

impl RewriteTarget for StaticRewriteTarget {
    fn cache_name_for(&self, specifier: &str) -> Option<String> {
        self.cache_names.get(specifier).cloned()
    }

    fn target_source(&self, specifier: &str) -> Option<(std::path::PathBuf, String)> {
        self.sources.get(specifier).cloned()
    }
}

/// Rewrites `code` (transpiled output of `path`) per the rules in §4.3.
/// `export_cache` is consulted (and populated) for `export * from` analysis.
pub fn rewrite(
    code: &str,
    path: &Path,
    target: &dyn RewriteTarget,
) -> Result<String, RewriteError> {
    let cm: Lrc<SourceMap> = Default::default();
    let fm = cm.new_source_file(FileName::Real(path.to_path_buf()), code.to_string());
    let syntax = Syntax::Typescript(TsConfig { tsx: false, ..Default::default() });
    let lexer = Lexer::new(syntax, EsVersion::Es2022, StringInput::from(&*fm), None);
    let mut parser = Parser::new_from(lexer);

    let mut module = parser
        .parse_module()
        .map_err(|e| RewriteError::ExportAnalysisFailed { path: path.to_path_buf(), message: format!("{e:?}") })?;

    let mut pass = RewritePass { path: path.to_path_buf(), target, unresolved: Vec::new() };
    module.visit_mut_with(&mut pass);

    if !pass.unresolved.is_empty() {
        return Err(RewriteError::UnresolvedImports { importer: path.to_path_buf(), specifiers: pass.unresolved });
    }

    let mut buf = Vec::new();
    {
        let writer = JsWriter::new(cm.clone(), "\n", &mut buf, None);
        let mut emitter =
            Emitter { cfg: CodegenConfig::default(), cm: cm.clone(), comments: None, wr: writer };
        emitter
            .emit_module(&module)
            .map_err(|e| RewriteError::ExportAnalysisFailed { path: path.to_path_buf(), message: e.to_string() })?;
    }

    Ok(String::from_utf8_lossy(&buf).into_owned())
}

struct RewritePass<'a> {
    path: std::path::PathBuf,
    target: &'a dyn RewriteTarget,
    unresolved: Vec<String>,
}

impl<'a> RewritePass<'a> {
    fn cache_relative(&mut self, specifier: &str) -> Option<String> {
        match self.target.cache_name_for(specifier) {
            Some(name) => Some(format!("./{name}")),
            None => {
                // Project-internal specifiers always start with `.` or `/`;
                // anything else is external and left verbatim.
                if specifier.starts_with('.') || specifier.starts_with('/') {
                    self.unresolved.push(specifier.to_string());
                }
                None
            }
        }
    }

    fn import_call(&self, cache_relative: &str) -> Expr {
        Expr::Await(AwaitExpr {
            span: DUMMY_SP,
            arg: Box::new(Expr::Call(CallExpr {
                span: DUMMY_SP,
                callee: Callee::Expr(Box::new(Expr::Ident(ident("__import")))),
                args: vec![ExprOrSpread { spread: None, expr: Box::new(str_lit(cache_relative)) }],
                type_args: None,
            })),
        })
    }
}

fn ident(name: &str) -> Ident {
    Ident::new(name.into(), DUMMY_SP)
}

fn binding_ident(name: &str) -> BindingIdent {
    BindingIdent { id: ident(name), type_ann: None }
}

fn str_lit(value: &str) -> Expr {
    Expr::Lit(Lit::Str(Str { span: DUMMY_SP, value: value.into(), raw: None }))
}

fn const_decl(name: &str, init: Expr) -> Stmt {
    Stmt::Decl(Decl::Var(Box::new(VarDecl {
        span: DUMMY_SP,
        ctxt: SyntaxContext::empty(),
        kind: VarDeclKind::Const,
        declare: false,
        decls: vec![VarDeclarator {
            span: DUMMY_SP,
            name: Pat::Ident(binding_ident(name)),
            init: Some(Box::new(init)),
            definite: false,
        }],
    })))
}

fn const_destructure_object(props: Vec<(String, String)>, init: Expr) -> Stmt {
    let props = props
        .into_iter()
        .map(|(key, value)| {
            ObjectPatProp::KeyValue(KeyValuePatProp {
                key: PropName::Ident(IdentName::new(key.into(), DUMMY_SP)),
                value: Box::new(Pat::Ident(binding_ident(&value))),
            })
        })
        .collect();
    Stmt::Decl(Decl::Var(Box::new(VarDecl {
        span: DUMMY_SP,
        ctxt: SyntaxContext::empty(),
        kind: VarDeclKind::Const,
        declare: false,
        decls: vec![VarDeclarator {
            span: DUMMY_SP,
            name: Pat::Object(ObjectPat { span: DUMMY_SP, props, optional: false, type_ann: None }),
            init: Some(Box::new(init)),
            definite: false,
        }],
    })))
}

impl<'a> VisitMut for RewritePass<'a> {
    fn visit_mut_module(&mut self, module: &mut Module) {
        let mut new_items = Vec::with_capacity(module.body.len());
        for item in std::mem::take(&mut module.body) {
            match item {
                ModuleItem::ModuleDecl(ModuleDecl::Import(import)) => {
                    new_items.extend(self.rewrite_import(import));
                }
                ModuleItem::ModuleDecl(ModuleDecl::ExportAll(export_all)) => {
                    new_items.extend(self.rewrite_export_all(export_all));
                }
                ModuleItem::ModuleDecl(ModuleDecl::ExportNamed(named)) if named.src.is_some() => {
                    new_items.extend(self.rewrite_export_named(named));
                }
                other => new_items.push(other),
            }
        }
        module.body = new_items;
    }
}

impl<'a> RewritePass<'a> {
    fn rewrite_import(&mut self, import: ImportDecl) -> Vec<ModuleItem> {
        let specifier = import.src.value.to_string();
        let Some(cache_relative) = self.cache_relative(&specifier) else {
            return vec![ModuleItem::ModuleDecl(ModuleDecl::Import(import))];
        };

        if import.specifiers.is_empty() {
            // Bare side-effect import: `await __import("./<cache>")`.
            return vec![ModuleItem::Stmt(Stmt::Expr(ExprStmt {
                span: DUMMY_SP,
                expr: Box::new(self.import_call(&cache_relative)),
            }))];
        }

        let mut default_binding = None;
        let mut namespace_binding = None;
        let mut named: Vec<(String, String)> = Vec::new();

        for spec in &import.specifiers {
            match spec {
                ImportSpecifier::Default(d) => default_binding = Some(d.local.sym.to_string()),
                ImportSpecifier::Namespace(n) => namespace_binding = Some(n.local.sym.to_string()),
                ImportSpecifier::Named(n) => {
                    let imported = n
                        .imported
                        .as_ref()
                        .map(|m| match m {
                            ModuleExportName::Ident(i) => i.sym.to_string(),
                            ModuleExportName::Str(s) => s.value.to_string(),
                        })
                        .unwrap_or_else(|| n.local.sym.to_string());
                    named.push((imported, n.local.sym.to_string()));
                }
            }
        }

        let mut out = Vec::new();
        if let Some(ns) = namespace_binding {
            // `import * as N from "x"` → `const N = await __import("./<cache>")`.
            out.push(ModuleItem::Stmt(const_decl(&ns, self.import_call(&cache_relative))));
        } else if let Some(default_name) = default_binding {
            // `import D [, { a }] from "x"`.
            out.push(ModuleItem::Stmt(const_decl("__m", self.import_call(&cache_relative))));
            let fallback = Expr::Bin(BinExpr {
                span: DUMMY_SP,
                op: BinaryOp::NullishCoalescing,
                left: Box::new(Expr::Member(MemberExpr {
                    span: DUMMY_SP,
                    obj: Box::new(Expr::Ident(ident("__m"))),
                    prop: MemberProp::Ident(IdentName::new("default".into(), DUMMY_SP)),
                })),
                right: Box::new(Expr::Ident(ident("__m"))),
            });
            out.push(ModuleItem::Stmt(const_decl(&default_name, fallback)));
            if !named.is_empty() {
                out.push(ModuleItem::Stmt(const_destructure_object(named, Expr::Ident(ident("__m")))));
            }
        } else if named.len() == 1 && named[0].0 == "default" {
            // `import { default as A } from "x"`.
            out.push(ModuleItem::Stmt(const_destructure_object(
                vec![("default".to_string(), named[0].1.clone())],
                self.import_call(&cache_relative),
            )));
        } else {
            // `import { a, b } from "x"`.
            out.push(ModuleItem::Stmt(const_destructure_object(named, self.import_call(&cache_relative))));
        }
        out
    }

    fn rewrite_export_named(&mut self, named: NamedExport) -> Vec<ModuleItem> {
        let specifier = named.src.as_ref().expect("checked by caller").value.to_string();
        let Some(cache_relative) = self.cache_relative(&specifier) else {
            return vec![ModuleItem::ModuleDecl(ModuleDecl::ExportNamed(named))];
        };

        // `export { a } from "x"` → `const __m=await __import(...); export const a=__m.a;`
        let mut out = vec![ModuleItem::Stmt(const_decl("__m", self.import_call(&cache_relative)))];
        for spec in &named.specifiers {
            if let ExportSpecifier::Named(n) = spec {
                let local = match &n.orig {
                    ModuleExportName::Ident(i) => i.sym.to_string(),
                    ModuleExportName::Str(s) => s.value.to_string(),
                };
                let exported = n
                    .exported
                    .as_ref()
                    .map(|m| match m {
                        ModuleExportName::Ident(i) => i.sym.to_string(),
                        ModuleExportName::Str(s) => s.value.to_string(),
                    })
                    .unwrap_or_else(|| local.clone());
                let member = Expr::Member(MemberExpr {
                    span: DUMMY_SP,
                    obj: Box::new(Expr::Ident(ident("__m"))),
                    prop: MemberProp::Ident(IdentName::new(local.into(), DUMMY_SP)),
                });
                out.push(ModuleItem::ModuleDecl(ModuleDecl::ExportDecl(ExportDecl {
                    span: DUMMY_SP,
                    decl: export_const(&exported, member),
                })));
            }
        }
        out
    }

    fn rewrite_export_all(&mut self, export_all: ExportAll) -> Vec<ModuleItem> {
        let specifier = export_all.src.value.to_string();
        let Some(cache_relative) = self.cache_relative(&specifier) else {
            return vec![ModuleItem::ModuleDecl(ModuleDecl::ExportAll(export_all))];
        };
        let Some((target_path, target_source)) = self.target.target_source(&specifier) else {
            // No source available to analyze (e.g. an already-rewritten
            // artifact read back without its original text) — fall back
            // to the static form, per §4.3/§9(b).
            return vec![ModuleItem::ModuleDecl(ModuleDecl::ExportAll(ExportAll {
                src: Box::new(Str { span: DUMMY_SP, value: cache_relative.into(), raw: None }),
                ..export_all
            }))];
        };

        match analyze(&target_source, &target_path) {
            Ok(info) => self.expand_export_all(&cache_relative, &info),
            Err(_) => vec![ModuleItem::ModuleDecl(ModuleDecl::ExportAll(ExportAll {
                src: Box::new(Str { span: DUMMY_SP, value: cache_relative.into(), raw: None }),
                ..export_all
            }))],
        }
    }

    fn expand_export_all(&self, cache_relative: &str, info: &ExportInfo) -> Vec<ModuleItem> {
        let mut out = vec![ModuleItem::Stmt(const_decl("__r", self.import_call(cache_relative)))];
        for name in &info.named_exports {
            let member = Expr::Member(MemberExpr {
                span: DUMMY_SP,
                obj: Box::new(Expr::Ident(ident("__r"))),
                prop: MemberProp::Ident(IdentName::new(name.clone().into(), DUMMY_SP)),
            });
            out.push(ModuleItem::ModuleDecl(ModuleDecl::ExportDecl(ExportDecl {
                span: DUMMY_SP,
                decl: export_const(name, member),
            })));
        }
        if info.has_default_export {
            let member = Expr::Member(MemberExpr {
                span: DUMMY_SP,
                obj: Box::new(Expr::Ident(ident("__r"))),
                prop: MemberProp::Ident(IdentName::new("default".into(), DUMMY_SP)),
            });
            out.push(ModuleItem::ModuleDecl(ModuleDecl::ExportDefaultExpr(ExportDefaultExpr {
                span: DUMMY_SP,
                expr: Box::new(member),
            })));
        }
        out
    }
}

fn export_const(name: &str, init: Expr) -> Decl {
    Decl::Var(Box::new(VarDecl {
        span: DUMMY_SP,
        ctxt: SyntaxContext::empty(),
        kind: VarDeclKind::Const,
        declare: false,
        decls: vec![VarDeclarator {
            span: DUMMY_SP,
            name: Pat::Ident(binding_ident(name)),
            init: Some(Box::new(init)),
            definite: false,
        }],
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn target() -> StaticRewriteTarget {
        let mut cache_names = BTreeMap::new();
        cache_names.insert("./utils".to_string(), "src-app-utils.js".to_string());
        StaticRewriteTarget { cache_names, sources: BTreeMap::new() }
    }

    #[test]
    fn rewrites_named_import() {
        let target = target();
        let code = r#"import { a, b } from "./utils"; console.log(a, b);"#;
        let out = rewrite(code, &PathBuf::from("src/app/main.js"), &target).unwrap();
        assert!(out.contains("__import(\"./src-app-utils.js\")"));
        assert!(!out.contains("import {"));
    }

    #[test]
    fn rewrites_default_import() {
        let target = target();
        let code = r#"import D from "./utils"; D();"#;
        let out = rewrite(code, &PathBuf::from("src/app/main.js"), &target).unwrap();
        assert!(out.contains("__import(\"./src-app-utils.js\")"));
        assert!(out.contains("__m"));
    }

    #[test]
    fn leaves_external_import_verbatim() {
        let target = target();
        let code = r#"import fs from "node:fs";"#;
        let out = rewrite(code, &PathBuf::from("src/app/main.js"), &target).unwrap();
        assert!(out.contains("node:fs"));
        assert!(!out.contains("__import"));
    }

    #[test]
    fn unresolved_internal_import_is_an_error() {
        let target = StaticRewriteTarget { cache_names: BTreeMap::new(), sources: BTreeMap::new() };
        let code = r#"import { a } from "./missing";"#;
        let err = rewrite(code, &PathBuf::from("src/app/main.js"), &target).unwrap_err();
        assert!(matches!(err, RewriteError::UnresolvedImports { .. }));
    }

    #[test]
    fn bare_side_effect_import_becomes_awaited_call() {
        let target = target();
        let code = r#"import "./utils";"#;
        let out = rewrite(code, &PathBuf::from("src/app/main.js"), &target).unwrap();
        assert!(out.trim_start().starts_with("await __import"));
    }
}
