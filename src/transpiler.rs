//! Transpiler (C4): converts source text to plain ECMAScript targeting
//! ES2022/ESM, with a sidecar source map.

use std::path::Path;

use swc_common::{
    errors::{ColorConfig, Handler},
    sync::Lrc,
    FileName, SourceMap,
};
use swc_ecma_ast::{EsVersion, Module, Program};
use swc_ecma_codegen::{text_writer::JsWriter, Config as CodegenConfig, Emitter};
use swc_ecma_parser::{lexer::Lexer, Parser, StringInput, Syntax, TsConfig};
use swc_ecma_transforms_base::resolver;
use swc_ecma_transforms_typescript::strip;
use swc_ecma_visit::FoldWith;

use crate::error::TranspileError;

/// Output of a single transpile call.
pub struct TranspileOutput {
    pub code: String,
    pub source_map: Option<String>,
}

/// Stateless transpiler: every call gets its own `SourceMap`/`Handler` pair,
/// matching the ancestor compiler's per-invocation diagnostic collection
/// rather than a shared mutable handler (file processing happens
/// concurrently across a `rayon` batch, so shared mutable diagnostic state
/// would need its own synchronization for no benefit).
#[derive(Default)]
pub struct Transpiler;

impl Transpiler {
    pub fn new() -> Self {
        Self
    }

    /// Transpiles `source` (the contents of `path`) to ES2022 ESM. The
    /// loader (TS vs TSX) is selected by `path`'s extension, per §4.2.
    /// `cache_name` is the artifact's own cache-relative name (e.g.
    /// `src-app-main.js`), used to point the trailing `sourceMappingURL`
    /// comment at the sidecar this crate actually writes
    /// (`cache/<cacheName>.map`), not at the original source file.
    pub fn transpile(&self, source: &str, path: &Path, cache_name: &str) -> Result<TranspileOutput, TranspileError> {
        let cm: Lrc<SourceMap> = Default::default();
        let handler = Handler::with_tty_emitter(ColorConfig::Never, true, false, Some(cm.clone()));

        let is_tsx = path.extension().and_then(|e| e.to_str()) == Some("tsx");
        let fm = cm.new_source_file(FileName::Real(path.to_path_buf()), source.to_string());

        let syntax = Syntax::Typescript(TsConfig { tsx: is_tsx, ..Default::default() });
        let lexer = Lexer::new(syntax, EsVersion::Es2022, StringInput::from(&*fm), None);
        let mut parser = Parser::new_from(lexer);

        for err in parser.take_errors() {
            err.into_diagnostic(&handler).emit();
        }

        let module: Module = parser.parse_module().map_err(|e| {
            e.into_diagnostic(&handler).emit();
            TranspileError::Diagnostic {
                path: path.to_path_buf(),
                line: 0,
                column: 0,
                message: "module failed to parse".to_string(),
            }
        })?;

        let top_level_mark = swc_common::Mark::new();
        let module = module.fold_with(&mut resolver(swc_common::Mark::new(), top_level_mark, true));
        let module = module.fold_with(&mut strip(top_level_mark));

        let mut buf = Vec::new();
        let mut srcmap_buf = Vec::new();
        {
            let writer = JsWriter::new(cm.clone(), "\n", &mut buf, Some(&mut srcmap_buf));
            let mut emitter = Emitter {
                cfg: CodegenConfig::default().with_target(EsVersion::Es2022),
                cm: cm.clone(),
                comments: None,
                wr: writer,
            };
            emitter.emit_program(&Program::Module(module)).map_err(|e| TranspileError::Codegen {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;
        }

        let code = String::from_utf8_lossy(&buf).into_owned();
        let built_map = cm.build_source_map(&srcmap_buf);
        let mut map_json = Vec::new();
        let source_map = built_map.to_writer(&mut map_json).ok().map(|_| String::from_utf8_lossy(&map_json).into_owned());

        let code_with_pointer = format!("{code}\n//# sourceMappingURL={cache_name}.map\n");

        Ok(TranspileOutput { code: code_with_pointer, source_map })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn transpiles_typescript_to_plain_js() {
        let transpiler = Transpiler::new();
        let source = "const x: number = 1; export { x };";
        let out = transpiler.transpile(source, &PathBuf::from("src/app/main.ts"), "src-app-main.js").unwrap();
        assert!(!out.code.contains(": number"));
        assert!(out.code.contains("sourceMappingURL=src-app-main.js.map"));
    }

    #[test]
    fn transpiles_tsx() {
        let transpiler = Transpiler::new();
        let source = "export const el = 1;";
        let out = transpiler.transpile(source, &PathBuf::from("src/app/widget.tsx"), "src-app-widget.js").unwrap();
        assert!(out.code.contains("el"));
    }
}
