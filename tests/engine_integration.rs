use std::collections::HashMap;
use std::fs;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use cssx::compiler::{compile, write_outputs};
use cssx::{enable_hot_reload, Engine, FunctionRegistry, Value};

fn state(pairs: &[(&str, Value)]) -> Vec<(String, Value)> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

#[tokio::test]
async fn compile_write_load_set_state() {
    let dir = tempfile::tempdir().unwrap();
    let source_path = dir.path().join("app.cssx");
    fs::write(&source_path, "width: ${count}px;").unwrap();

    let output = compile(
        &source_path,
        "width: ${count}px;",
        &FunctionRegistry::with_stdlib(),
        &HashMap::new(),
    );
    assert_eq!(output.css, "width: __CSSX_EXPR_0__px;");
    write_outputs(&output).unwrap();

    let mut engine = Engine::new();
    engine
        .load_file(source_path.to_str().unwrap())
        .await
        .unwrap();

    engine.set_state(state(&[("count", Value::Num(42.0))]));
    assert_eq!(engine.stylesheet(), "width: 42px;\n");
}

#[tokio::test]
async fn missing_map_means_no_deferred_expressions() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("plain.css"), "body { margin: 0; }").unwrap();

    let mut engine = Engine::new();
    let path = dir.path().join("plain.cssx");
    engine.load_file(path.to_str().unwrap()).await.unwrap();

    assert_eq!(engine.stylesheet(), "body { margin: 0; }\n");
    assert!(engine.files()[0].artifact.exprs.is_empty());
}

#[tokio::test]
async fn unreadable_map_degrades_to_empty() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("app.css"), "a {}").unwrap();
    fs::write(dir.path().join("app.cssx.map.json"), "not json at all").unwrap();

    let mut engine = Engine::new();
    let path = dir.path().join("app.cssx");
    engine.load_file(path.to_str().unwrap()).await.unwrap();
    assert!(engine.files()[0].artifact.exprs.is_empty());
}

#[tokio::test]
async fn missing_css_fails_the_load() {
    let dir = tempfile::tempdir().unwrap();
    let mut engine = Engine::new();
    let path = dir.path().join("absent.cssx");
    let result = engine.load_file(path.to_str().unwrap()).await;
    assert!(result.is_err());
    assert!(engine.files().is_empty());
}

#[tokio::test]
async fn reload_keeps_load_order_position() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("a.css"), "a-v1 {}").unwrap();
    fs::write(dir.path().join("b.css"), "b {}").unwrap();

    let mut engine = Engine::new();
    let a = dir.path().join("a.cssx");
    let b = dir.path().join("b.cssx");
    engine.load_file(a.to_str().unwrap()).await.unwrap();
    engine.load_file(b.to_str().unwrap()).await.unwrap();

    fs::write(dir.path().join("a.css"), "a-v2 {}").unwrap();
    engine.load_file(a.to_str().unwrap()).await.unwrap();

    assert_eq!(engine.stylesheet(), "a-v2 {}\nb {}\n");
}

#[tokio::test]
async fn hot_reload_picks_up_changed_files() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("live.css"), "before {}").unwrap();

    let engine = Arc::new(Mutex::new(Engine::new()));
    let path = dir.path().join("live.cssx");
    {
        let mut guard = engine.lock().unwrap();
        let seq = guard.begin_load(path.to_str().unwrap());
        guard.complete_load(
            path.to_str().unwrap(),
            seq,
            cssx::CompiledArtifact {
                css: "before {}".to_string(),
                exprs: Vec::new(),
            },
        );
    }

    let poller = enable_hot_reload(engine.clone(), Duration::from_millis(25));
    fs::write(dir.path().join("live.css"), "after {}").unwrap();

    let mut updated = false;
    for _ in 0..100 {
        tokio::time::sleep(Duration::from_millis(50)).await;
        if engine.lock().unwrap().stylesheet().contains("after") {
            updated = true;
            break;
        }
    }
    poller.abort();
    assert!(updated, "poller never picked up the rewritten CSS");
}

#[tokio::test]
async fn end_to_end_runtime_only_width() {
    // `width: ${count}px;` with count known only at runtime
    let dir = tempfile::tempdir().unwrap();
    let source_path = dir.path().join("w.cssx");
    let output = compile(
        &source_path,
        "width: ${count}px;",
        &FunctionRegistry::with_stdlib(),
        &HashMap::new(),
    );
    assert_eq!(output.map.len(), 1);
    assert_eq!(output.map[0].placeholder, "__CSSX_EXPR_0__");
    assert_eq!(output.map[0].expr, "count");
    write_outputs(&output).unwrap();

    let map_text = fs::read_to_string(&output.map_output_path).unwrap();
    let parsed: Vec<cssx::DeferredExpr> = serde_json::from_str(&map_text).unwrap();
    assert_eq!(parsed, output.map);

    let mut engine = Engine::new();
    engine
        .load_file(source_path.to_str().unwrap())
        .await
        .unwrap();
    engine.set_state(state(&[("count", Value::Num(41.0))]));
    engine.set_state(state(&[("count", Value::Num(42.0))]));
    assert!(engine.stylesheet().contains("width: 42px;"));
    assert!(!engine.stylesheet().contains("41"));
}
