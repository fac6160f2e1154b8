pub mod ast;
pub mod compiler;
pub mod engine;
pub mod error;
pub mod eval;
pub mod functions;
pub mod lexer;
pub mod parser;
pub mod scanner;
pub mod server;
pub mod token;
pub mod value;

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

pub use compiler::{compile, compile_source, CompileOutput, CompiledArtifact, DeferredExpr};
pub use engine::{enable_hot_reload, Engine, StylesheetSink};
pub use error::{CssxError, EvalError, Result};
pub use eval::{CallContext, ExpressionEvaluator, Scope, ScriptEvaluator};
pub use functions::{Callable, FunctionRegistry};
pub use value::Value;

/// Read and compile a `.cssx` source file.
pub fn compile_file(
    path: &Path,
    functions: &FunctionRegistry,
    static_state: &HashMap<String, Value>,
) -> Result<CompileOutput> {
    let source = fs::read_to_string(path).map_err(|e| CssxError::read(path, e))?;
    Ok(compile(path, &source, functions, static_state))
}

/// Collect every `.cssx` source under a directory, recursively, in sorted
/// order.
pub fn find_sources(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut sources = Vec::new();
    collect_sources(dir, &mut sources)?;
    sources.sort();
    Ok(sources)
}

fn collect_sources(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    for entry in fs::read_dir(dir).map_err(|e| CssxError::read(dir, e))? {
        let entry = entry.map_err(|e| CssxError::read(dir, e))?;
        let path = entry.path();
        if path.is_dir() {
            collect_sources(&path, out)?;
        } else if path.extension().map(|ext| ext == "cssx").unwrap_or(false) {
            out.push(path);
        }
    }
    Ok(())
}

#[cfg(test)]
mod integration_tests {
    use super::*;
    use crate::eval::CallContext;

    #[test]
    fn end_to_end_compile_then_recompose() {
        // Compile: the static scope knows `love`, not `count`.
        let mut functions = FunctionRegistry::empty();
        functions.register("love", |_: &CallContext<'_>, _: &[Value]| {
            Ok(Value::Str("#e84393".into()))
        });
        let state = HashMap::new();
        let source = "h1 { color: ${love()}; width: ${count}px; }";
        let artifact = compile_source(source, &state, &functions);

        assert_eq!(
            artifact.css,
            "h1 { color: #e84393; width: __CSSX_EXPR_0__px; }"
        );
        assert_eq!(artifact.exprs.len(), 1);
        assert_eq!(artifact.exprs[0].expr, "count");

        // Runtime: load the artifact and drive it with state.
        let mut engine = Engine::new();
        engine.install_artifact("h1.cssx", artifact);
        engine.set_state([("count".to_string(), Value::Num(42.0))]);
        assert_eq!(
            engine.stylesheet(),
            "h1 { color: #e84393; width: 42px; }\n"
        );
    }

    #[test]
    fn end_to_end_theme_switch() {
        let source = "body { background: ${theme('#111', '#fff')}; }";
        // `theme` reads runtime state, so it defers at compile time.
        let artifact = compile_source(source, &HashMap::new(), &FunctionRegistry::with_stdlib());
        assert_eq!(artifact.exprs.len(), 1);

        let mut engine = Engine::new();
        engine.install_artifact("body.cssx", artifact);
        engine.set_state([("theme".to_string(), Value::Str("dark".into()))]);
        assert_eq!(engine.stylesheet(), "body { background: #111; }\n");

        engine.set_state([("theme".to_string(), Value::Str("light".into()))]);
        assert_eq!(engine.stylesheet(), "body { background: #fff; }\n");
    }

    #[test]
    fn find_sources_walks_recursively() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("nested")).unwrap();
        fs::write(dir.path().join("a.cssx"), "a {}").unwrap();
        fs::write(dir.path().join("nested/b.cssx"), "b {}").unwrap();
        fs::write(dir.path().join("ignored.css"), "c {}").unwrap();

        let sources = find_sources(dir.path()).unwrap();
        assert_eq!(sources.len(), 2);
        assert!(sources[0].ends_with("a.cssx"));
        assert!(sources[1].ends_with("nested/b.cssx"));
    }
}
