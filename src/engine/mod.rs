//! Runtime half of cssx: the state store and stylesheet compositor.
//!
//! An [`Engine`] is an explicit context object the host application
//! constructs once and keeps for the process lifetime. It owns the mutable
//! state, the function registry, and the loaded-file table; every public
//! mutation synchronously rebuilds the composed stylesheet before
//! returning.

mod hot_reload;

pub use hot_reload::enable_hot_reload;

use std::collections::HashMap;
use std::path::Path;

use tracing::{debug, warn};

use crate::compiler::{css_output_path, map_output_path, CompiledArtifact};
use crate::error::{CssxError, Result};
use crate::eval::{ExpressionEvaluator, Scope, ScriptEvaluator};
use crate::functions::{Callable, FunctionRegistry};
use crate::value::Value;

/// One loaded source and its compiled artifact. Position in the engine's
/// file table is load order, which is stylesheet concatenation order.
#[derive(Debug, Clone)]
pub struct LoadedFile {
    pub path: String,
    pub artifact: CompiledArtifact,
}

/// Receiver for the composed stylesheet — the analog of the original's
/// `<style>` element. Applied output replaces, never appends.
pub trait StylesheetSink: Send {
    fn apply(&mut self, css: &str);
}

/// The runtime engine: state store + compositor.
pub struct Engine {
    state: HashMap<String, Value>,
    functions: FunctionRegistry,
    files: Vec<LoadedFile>,
    /// Most recently issued load sequence number per path.
    issued: HashMap<String, u64>,
    /// Last successfully rendered text per (path, placeholder) — the
    /// fail-open substitution source when re-evaluation fails.
    last_good: HashMap<(String, String), String>,
    stylesheet: String,
    evaluator: Box<dyn ExpressionEvaluator>,
    sink: Option<Box<dyn StylesheetSink>>,
}

impl Engine {
    /// An engine with the stdlib registry and the default evaluator.
    pub fn new() -> Self {
        Self::with_evaluator(Box::new(ScriptEvaluator::new()))
    }

    /// An engine with a custom expression evaluator.
    pub fn with_evaluator(evaluator: Box<dyn ExpressionEvaluator>) -> Self {
        Self {
            state: HashMap::new(),
            functions: FunctionRegistry::with_stdlib(),
            files: Vec::new(),
            issued: HashMap::new(),
            last_good: HashMap::new(),
            stylesheet: String::new(),
            evaluator,
            sink: None,
        }
    }

    /// Attach a sink that receives every recomposed stylesheet.
    pub fn set_sink(&mut self, sink: Box<dyn StylesheetSink>) {
        self.sink = Some(sink);
        let css = self.stylesheet.clone();
        if let Some(sink) = &mut self.sink {
            sink.apply(&css);
        }
    }

    /// The current composed stylesheet text.
    pub fn stylesheet(&self) -> &str {
        &self.stylesheet
    }

    /// The current state.
    pub fn state(&self) -> &HashMap<String, Value> {
        &self.state
    }

    /// Loaded files in load order.
    pub fn files(&self) -> &[LoadedFile] {
        &self.files
    }

    /// Paths currently tracked, in load order.
    pub fn tracked_paths(&self) -> Vec<String> {
        self.files.iter().map(|f| f.path.clone()).collect()
    }

    // ── Mutations (each recomposes before returning) ───────────────────

    /// Shallow-merge new entries into the state and recompose.
    pub fn set_state(&mut self, partial: impl IntoIterator<Item = (String, Value)>) {
        self.state.extend(partial);
        self.recompose();
    }

    /// Register one function (shadowing any same-named entry) and
    /// recompose.
    pub fn register_function(&mut self, name: impl Into<String>, f: impl Callable + 'static) {
        self.functions.register(name, f);
        self.recompose();
    }

    /// Merge a batch of functions and recompose once.
    pub fn register_functions(
        &mut self,
        funcs: impl IntoIterator<Item = (String, Box<dyn Callable>)>,
    ) {
        for (name, f) in funcs {
            self.functions.register_boxed(name, f);
        }
        self.recompose();
    }

    // ── Loading ────────────────────────────────────────────────────────

    /// Load (or reload) a source path: read its compiled CSS and map from
    /// disk, install the artifact, recompose.
    ///
    /// A failing CSS read is fatal for this load and propagates; a missing
    /// or unreadable map degrades to "no deferred expressions".
    pub async fn load_file(&mut self, path: &str) -> Result<()> {
        let seq = self.begin_load(path);
        let artifact = fetch_artifact(path).await?;
        self.complete_load(path, seq, artifact);
        Ok(())
    }

    /// Install an already-compiled artifact for a path (used by the dev
    /// server, which compiles in memory). Replaces in place, recomposes.
    pub fn install_artifact(&mut self, path: &str, artifact: CompiledArtifact) {
        let seq = self.begin_load(path);
        self.complete_load(path, seq, artifact);
    }

    /// Issue a new load for a path, returning its sequence number.
    ///
    /// Sequence numbers are per-path and monotonically increasing; a
    /// completion is applied only while its number is still the most
    /// recently issued one, so a stale fetch can never overwrite a fresher
    /// result.
    pub fn begin_load(&mut self, path: &str) -> u64 {
        let seq = self.issued.entry(path.to_string()).or_insert(0);
        *seq += 1;
        *seq
    }

    /// Complete a load issued by [`Engine::begin_load`]. Returns whether
    /// the artifact was applied; a stale completion is discarded.
    pub fn complete_load(&mut self, path: &str, seq: u64, artifact: CompiledArtifact) -> bool {
        let current = self.issued.get(path).copied().unwrap_or(0);
        if seq != current {
            debug!(path, seq, current, "discarding stale load");
            return false;
        }

        match self.files.iter_mut().find(|f| f.path == path) {
            // Reload replaces in place, keeping the original load-order slot.
            Some(existing) => existing.artifact = artifact,
            None => self.files.push(LoadedFile {
                path: path.to_string(),
                artifact,
            }),
        }
        self.recompose();
        true
    }

    // ── Recomposition ──────────────────────────────────────────────────

    /// Rebuild the composed stylesheet from every loaded file and the
    /// current state. Runs synchronously on every mutation.
    fn recompose(&mut self) {
        let mut out = String::new();

        for file in &self.files {
            let mut current = file.artifact.css.clone();

            for deferred in &file.artifact.exprs {
                let scope = Scope {
                    state: &self.state,
                    functions: &self.functions,
                };
                let key = (file.path.clone(), deferred.placeholder.clone());

                let rendered = match self.evaluator.evaluate(&deferred.expr, &scope) {
                    Ok(value) => match value.render() {
                        Some(text) => {
                            self.last_good.insert(key, text.clone());
                            text
                        }
                        None => {
                            warn!(
                                path = %file.path,
                                expr = %deferred.expr,
                                kind = value.type_name(),
                                "expression produced a non-renderable value"
                            );
                            self.last_good.get(&key).cloned().unwrap_or_default()
                        }
                    },
                    Err(e) => {
                        warn!(
                            path = %file.path,
                            expr = %deferred.expr,
                            error = %e,
                            "runtime expression error"
                        );
                        self.last_good.get(&key).cloned().unwrap_or_default()
                    }
                };

                current = current.replace(&deferred.placeholder, &rendered);
            }

            out.push_str(&current);
            out.push('\n');
        }

        self.stylesheet = out;
        if let Some(sink) = &mut self.sink {
            sink.apply(&self.stylesheet);
        }
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

/// Read a path's compiled artifact from disk: the derived `.css` file
/// (required) and `.cssx.map.json` (optional).
pub async fn fetch_artifact(path: &str) -> Result<CompiledArtifact> {
    let source = Path::new(path);
    let css_path = css_output_path(source);
    let css = tokio::fs::read_to_string(&css_path)
        .await
        .map_err(|e| CssxError::read(&css_path, e))?;

    let map_path = map_output_path(source);
    let exprs = match tokio::fs::read_to_string(&map_path).await {
        Ok(text) => serde_json::from_str(&text).unwrap_or_else(|e| {
            debug!(path = %map_path.display(), error = %e, "unreadable expression map, treating as empty");
            Vec::new()
        }),
        Err(_) => Vec::new(),
    };

    Ok(CompiledArtifact { css, exprs })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::DeferredExpr;
    use crate::eval::CallContext;
    use crate::error::EvalError;

    fn artifact(css: &str, exprs: &[(&str, &str)]) -> CompiledArtifact {
        CompiledArtifact {
            css: css.to_string(),
            exprs: exprs
                .iter()
                .map(|(placeholder, expr)| DeferredExpr {
                    placeholder: placeholder.to_string(),
                    expr: expr.to_string(),
                })
                .collect(),
        }
    }

    #[test]
    fn set_state_recomposes_with_latest_value() {
        let mut engine = Engine::new();
        engine.install_artifact(
            "app.cssx",
            artifact("width: __CSSX_EXPR_0__px;", &[("__CSSX_EXPR_0__", "count")]),
        );

        engine.set_state([("count".to_string(), Value::Num(41.0))]);
        assert_eq!(engine.stylesheet(), "width: 41px;\n");

        engine.set_state([("count".to_string(), Value::Num(42.0))]);
        assert_eq!(engine.stylesheet(), "width: 42px;\n");
        assert!(!engine.stylesheet().contains("41"));
    }

    #[test]
    fn every_placeholder_occurrence_is_substituted() {
        let mut engine = Engine::new();
        engine.install_artifact(
            "app.cssx",
            artifact(
                "a: __CSSX_EXPR_0__; b: __CSSX_EXPR_0__;",
                &[("__CSSX_EXPR_0__", "hue")],
            ),
        );
        engine.set_state([("hue".to_string(), Value::Str("red".into()))]);
        assert_eq!(engine.stylesheet(), "a: red; b: red;\n");
    }

    #[test]
    fn load_order_is_stable_across_reload() {
        let mut engine = Engine::new();
        engine.install_artifact("a.cssx", artifact("a-old {}", &[]));
        engine.install_artifact("b.cssx", artifact("b {}", &[]));
        engine.install_artifact("a.cssx", artifact("a-new {}", &[]));

        assert_eq!(engine.stylesheet(), "a-new {}\nb {}\n");
        assert_eq!(engine.tracked_paths(), vec!["a.cssx", "b.cssx"]);
    }

    #[test]
    fn stale_load_is_discarded() {
        let mut engine = Engine::new();
        let seq1 = engine.begin_load("p.cssx");
        let seq2 = engine.begin_load("p.cssx");

        // The newer load completes first...
        assert!(engine.complete_load("p.cssx", seq2, artifact("fresh {}", &[])));
        // ...then the older fetch finally lands and must be ignored.
        assert!(!engine.complete_load("p.cssx", seq1, artifact("stale {}", &[])));

        assert_eq!(engine.stylesheet(), "fresh {}\n");
    }

    #[test]
    fn completion_while_newer_load_outstanding_is_discarded() {
        let mut engine = Engine::new();
        let seq1 = engine.begin_load("p.cssx");
        let _seq2 = engine.begin_load("p.cssx");

        assert!(!engine.complete_load("p.cssx", seq1, artifact("stale {}", &[])));
        assert_eq!(engine.stylesheet(), "");
    }

    #[test]
    fn failed_expression_falls_back_to_last_good_value() {
        let mut engine = Engine::new();
        engine.install_artifact(
            "app.cssx",
            artifact("width: __CSSX_EXPR_0__px;", &[("__CSSX_EXPR_0__", "count")]),
        );

        engine.set_state([("count".to_string(), Value::Num(7.0))]);
        assert_eq!(engine.stylesheet(), "width: 7px;\n");

        // Make evaluation fail by replacing the value with a non-primitive.
        engine.set_state([("count".to_string(), Value::List(vec![]))]);
        assert_eq!(engine.stylesheet(), "width: 7px;\n");
    }

    #[test]
    fn failed_expression_with_no_history_renders_empty() {
        let mut engine = Engine::new();
        engine.install_artifact(
            "app.cssx",
            artifact("width: __CSSX_EXPR_0__px;", &[("__CSSX_EXPR_0__", "missing")]),
        );
        assert_eq!(engine.stylesheet(), "width: px;\n");
        assert!(!engine.stylesheet().contains("__CSSX_EXPR_0__"));
    }

    #[test]
    fn register_function_triggers_recompose() {
        let mut engine = Engine::new();
        engine.install_artifact(
            "app.cssx",
            artifact("color: __CSSX_EXPR_0__;", &[("__CSSX_EXPR_0__", "love()")]),
        );
        assert_eq!(engine.stylesheet(), "color: ;\n");

        engine.register_function("love", |_: &CallContext<'_>, _: &[Value]| {
            Ok(Value::Str("#e84393".into()))
        });
        assert_eq!(engine.stylesheet(), "color: #e84393;\n");
    }

    #[test]
    fn files_concatenate_in_load_order_with_newline() {
        let mut engine = Engine::new();
        engine.install_artifact("a.cssx", artifact("a {}", &[]));
        engine.install_artifact("b.cssx", artifact("b {}", &[]));
        assert_eq!(engine.stylesheet(), "a {}\nb {}\n");
    }

    #[test]
    fn sink_receives_recomposed_output() {
        struct Capture(std::sync::Arc<std::sync::Mutex<String>>);
        impl StylesheetSink for Capture {
            fn apply(&mut self, css: &str) {
                *self.0.lock().unwrap() = css.to_string();
            }
        }

        let captured = std::sync::Arc::new(std::sync::Mutex::new(String::new()));
        let mut engine = Engine::new();
        engine.set_sink(Box::new(Capture(captured.clone())));
        engine.install_artifact("a.cssx", artifact("a {}", &[]));
        assert_eq!(&*captured.lock().unwrap(), "a {}\n");
    }

    #[test]
    fn quoted_runtime_strings_unwrap_for_presentation() {
        let mut engine = Engine::new();
        engine.install_artifact(
            "app.cssx",
            artifact("color: __CSSX_EXPR_0__;", &[("__CSSX_EXPR_0__", "accent")]),
        );
        engine.set_state([("accent".to_string(), Value::Str("'#abc'".into()))]);
        assert_eq!(engine.stylesheet(), "color: #abc;\n");
    }

    #[test]
    fn eval_error_reports_but_does_not_crash() {
        let mut engine = Engine::new();
        engine.register_function("boom", |_: &CallContext<'_>, _: &[Value]| {
            Err(EvalError::type_error("boom"))
        });
        engine.install_artifact(
            "app.cssx",
            artifact("a: __CSSX_EXPR_0__; b: solid;", &[("__CSSX_EXPR_0__", "boom()")]),
        );
        assert_eq!(engine.stylesheet(), "a: ; b: solid;\n");
    }
}
