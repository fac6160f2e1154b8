//! Dev server: compile-on-change with a live-reloading preview.
//!
//! Watches a directory of `.cssx` sources, recompiles changed files (writing
//! the `.css` + `.cssx.map.json` outputs beside them, as a bundler plugin
//! would), hot-swaps the artifacts into a shared [`Engine`], and serves the
//! composed stylesheet.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use axum::extract::State;
use axum::response::Html;
use axum::routing::{get, post};
use axum::{Json, Router};
use notify::{Event, RecursiveMode, Watcher};
use serde::Serialize;
use tower_livereload::LiveReloadLayer;
use tracing::warn;

use crate::compiler::{compile, write_outputs, CompiledArtifact};
use crate::engine::Engine;
use crate::functions::FunctionRegistry;
use crate::value::Value;

/// Start the dev server over a directory of `.cssx` sources.
pub async fn run_dev_server(
    dir: PathBuf,
    port: u16,
    static_state: HashMap<String, Value>,
) -> Result<(), Box<dyn std::error::Error>> {
    let engine = Arc::new(Mutex::new(Engine::new()));
    if let Ok(mut e) = engine.lock() {
        e.set_state(static_state.clone());
    }

    // Initial compile pass over every tracked source.
    let sources = crate::find_sources(&dir)?;
    for path in &sources {
        if let Err(e) = compile_into_engine(path, &static_state, &engine) {
            warn!(path = %path.display(), error = %e, "initial compile failed");
        }
    }

    let livereload = LiveReloadLayer::new();
    let reloader = livereload.reloader();

    // File watcher: recompile changed .cssx sources and push a reload.
    let watch_engine = engine.clone();
    let watch_state = static_state.clone();
    let mut watcher = notify::recommended_watcher(move |res: Result<Event, _>| {
        if let Ok(event) = res {
            if !(event.kind.is_modify() || event.kind.is_create()) {
                return;
            }
            let mut recompiled = false;
            for path in &event.paths {
                if path.extension().map(|ext| ext == "cssx").unwrap_or(false) {
                    match compile_into_engine(path, &watch_state, &watch_engine) {
                        Ok(()) => recompiled = true,
                        Err(e) => warn!(path = %path.display(), error = %e, "recompile failed"),
                    }
                }
            }
            if recompiled {
                reloader.reload();
            }
        }
    })?;
    watcher.watch(&dir, RecursiveMode::Recursive)?;

    let app = Router::new()
        .route("/", get(serve_preview))
        .route("/stylesheet.css", get(serve_stylesheet))
        .route("/files.json", get(serve_files))
        .route("/state", post(serve_state))
        .layer(livereload)
        .with_state(engine);

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    eprintln!("cssx dev server");
    eprintln!("  sources:    {}", dir.display());
    eprintln!("  preview:    http://localhost:{port}/");
    eprintln!("  stylesheet: http://localhost:{port}/stylesheet.css");
    eprintln!("  state:      POST http://localhost:{port}/state");
    eprintln!("  watching for changes...");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    drop(watcher);
    Ok(())
}

/// Compile one source, write its outputs beside it, and install the
/// artifact into the shared engine.
///
/// The engine key is the canonical path, so watcher events (absolute) and
/// the initial scan (possibly relative) update the same entry.
fn compile_into_engine(
    path: &Path,
    static_state: &HashMap<String, Value>,
    engine: &Arc<Mutex<Engine>>,
) -> crate::error::Result<()> {
    let source = std::fs::read_to_string(path)
        .map_err(|e| crate::error::CssxError::read(path, e))?;
    let output = compile(path, &source, &FunctionRegistry::with_stdlib(), static_state);
    write_outputs(&output)?;

    let artifact = CompiledArtifact {
        css: output.css,
        exprs: output.map,
    };
    let key = path
        .canonicalize()
        .unwrap_or_else(|_| path.to_path_buf())
        .to_string_lossy()
        .into_owned();
    if let Ok(mut e) = engine.lock() {
        e.install_artifact(&key, artifact);
    }
    Ok(())
}

// ── Route handlers ─────────────────────────────────────────────────────

/// Serve a minimal preview page that links the composed stylesheet.
async fn serve_preview(State(engine): State<Arc<Mutex<Engine>>>) -> Html<String> {
    let files = match engine.lock() {
        Ok(e) => e.tracked_paths(),
        Err(_) => Vec::new(),
    };
    let list = files
        .iter()
        .map(|p| format!("<li><code>{p}</code></li>"))
        .collect::<Vec<_>>()
        .join("\n      ");

    Html(format!(
        r#"<!doctype html>
<html>
  <head>
    <meta charset="utf-8">
    <title>cssx preview</title>
    <link rel="stylesheet" href="/stylesheet.css">
  </head>
  <body>
    <h1>cssx preview</h1>
    <p>Composed stylesheet from {count} file(s):</p>
    <ul>
      {list}
    </ul>
    <p>Mutate state with <code>POST /state</code> and reload.</p>
  </body>
</html>
"#,
        count = files.len(),
    ))
}

/// Serve the engine's current composed stylesheet.
async fn serve_stylesheet(
    State(engine): State<Arc<Mutex<Engine>>>,
) -> ([(axum::http::header::HeaderName, &'static str); 1], String) {
    let css = match engine.lock() {
        Ok(e) => e.stylesheet().to_string(),
        Err(_) => String::new(),
    };
    ([(axum::http::header::CONTENT_TYPE, "text/css")], css)
}

#[derive(Serialize)]
struct FileInfo {
    path: String,
    deferred: usize,
}

/// Serve the loaded-file table as JSON.
async fn serve_files(State(engine): State<Arc<Mutex<Engine>>>) -> Json<Vec<FileInfo>> {
    let infos = match engine.lock() {
        Ok(e) => e
            .files()
            .iter()
            .map(|f| FileInfo {
                path: f.path.clone(),
                deferred: f.artifact.exprs.len(),
            })
            .collect(),
        Err(_) => Vec::new(),
    };
    Json(infos)
}

#[derive(Serialize)]
struct StateResponse {
    keys: usize,
}

/// Shallow-merge the posted JSON object into engine state and recompose.
async fn serve_state(
    State(engine): State<Arc<Mutex<Engine>>>,
    Json(partial): Json<HashMap<String, Value>>,
) -> Json<StateResponse> {
    let keys = match engine.lock() {
        Ok(mut e) => {
            e.set_state(partial);
            e.state().len()
        }
        Err(_) => 0,
    };
    Json(StateResponse { keys })
}
