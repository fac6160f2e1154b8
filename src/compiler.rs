//! Compile-time half of cssx: fold what the build knows, defer the rest.
//!
//! The builder walks every `${expr}` span in scan order, asks the static
//! evaluator to resolve it against the build-time scope, and replaces it
//! with either the literal result or a generated placeholder recorded in
//! the artifact's expression list. Evaluation failures are never compile
//! failures — they defer.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{CssxError, Result};
use crate::eval::{ExpressionEvaluator, Scope, ScriptEvaluator};
use crate::functions::FunctionRegistry;
use crate::scanner::scan;
use crate::value::Value;

/// A deferred expression: the placeholder standing in for it in the
/// compiled CSS, and the raw expression text to re-evaluate at runtime.
/// One entry of the `.cssx.map.json` array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeferredExpr {
    pub placeholder: String,
    pub expr: String,
}

/// The compile-time output for one source: CSS with deferred spans replaced
/// by placeholders, plus the placeholder→expression list in scan order.
///
/// Invariant: `css` contains exactly one occurrence of each placeholder in
/// `exprs` and no unresolved `${...}` spans.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompiledArtifact {
    pub css: String,
    pub exprs: Vec<DeferredExpr>,
}

/// Everything the `compile` entry point hands to its caller: the artifact
/// contents plus the derived output paths.
#[derive(Debug, Clone)]
pub struct CompileOutput {
    pub css: String,
    pub map: Vec<DeferredExpr>,
    pub css_output_path: PathBuf,
    pub map_output_path: PathBuf,
}

/// Compile a source text against a build-time scope with the default
/// evaluator.
pub fn compile_source(
    source: &str,
    static_state: &HashMap<String, Value>,
    functions: &FunctionRegistry,
) -> CompiledArtifact {
    compile_source_with(source, static_state, functions, &ScriptEvaluator::new())
}

/// Compile a source text with an explicit evaluator.
///
/// Deterministic: the same `(source, state, functions)` always yields a
/// byte-identical artifact — placeholder numbering is purely positional.
pub fn compile_source_with(
    source: &str,
    static_state: &HashMap<String, Value>,
    functions: &FunctionRegistry,
    evaluator: &dyn ExpressionEvaluator,
) -> CompiledArtifact {
    let scope = Scope {
        state: static_state,
        functions,
    };

    let mut css = String::with_capacity(source.len());
    let mut exprs: Vec<DeferredExpr> = Vec::new();
    let mut cursor = 0;

    for span in scan(source) {
        css.push_str(&source[cursor..span.range.start]);
        cursor = span.range.end;

        let resolved = evaluator
            .evaluate(span.expr, &scope)
            .ok()
            .and_then(|v| v.render());

        match resolved {
            Some(literal) => css.push_str(&literal),
            None => {
                let placeholder = format!("__CSSX_EXPR_{}__", exprs.len());
                debug!(expr = span.expr, %placeholder, "deferring expression to runtime");
                css.push_str(&placeholder);
                exprs.push(DeferredExpr {
                    placeholder,
                    expr: span.expr.to_string(),
                });
            }
        }
    }
    css.push_str(&source[cursor..]);

    CompiledArtifact { css, exprs }
}

/// Compiler entry point: compile one source and derive its output paths.
pub fn compile(
    path: &Path,
    source: &str,
    functions: &FunctionRegistry,
    static_state: &HashMap<String, Value>,
) -> CompileOutput {
    let artifact = compile_source(source, static_state, functions);
    CompileOutput {
        css: artifact.css,
        map: artifact.exprs,
        css_output_path: css_output_path(path),
        map_output_path: map_output_path(path),
    }
}

/// Derive the compiled CSS path: the source's extension replaced with `css`.
pub fn css_output_path(path: &Path) -> PathBuf {
    path.with_extension("css")
}

/// Derive the expression map path: the source's file name plus `.map.json`
/// (`app.cssx` → `app.cssx.map.json`).
pub fn map_output_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".map.json");
    path.with_file_name(name)
}

/// Write a compile's outputs to disk: the CSS always, the map only when it
/// has entries. A stale map file from a previous compile is removed so the
/// runtime never picks up expressions the CSS no longer contains.
pub fn write_outputs(output: &CompileOutput) -> Result<()> {
    fs::write(&output.css_output_path, &output.css)
        .map_err(|e| CssxError::write(&output.css_output_path, e))?;

    if output.map.is_empty() {
        if output.map_output_path.exists() {
            fs::remove_file(&output.map_output_path)
                .map_err(|e| CssxError::write(&output.map_output_path, e))?;
        }
    } else {
        let json = serde_json::to_string_pretty(&output.map)
            .expect("expression map serializes to JSON");
        fs::write(&output.map_output_path, json)
            .map_err(|e| CssxError::write(&output.map_output_path, e))?;
    }

    Ok(())
}
