mod common;
use common::{tmp_dir, ENV_LOCK};

use cloudharvest::managers::output::{OutputManager, SinkContext};
use cloudharvest::managers::postgres::PostgresManager;
use cloudharvest::services::logger::Logger;
use cloudharvest::services::outputs::OutputRegistry;
use serde_json::{json, Map, Value};
use std::sync::Arc;

fn manager_with_registry(dir: &std::path::Path, handlers_json: &str) -> OutputManager {
    let path = dir.join("output_config.json");
    std::fs::write(&path, handlers_json).expect("write registry");
    let registry = Arc::new(OutputRegistry::load(&path).expect("load registry"));
    let logger = Logger::new("test");
    OutputManager::new(logger.clone(), registry, PostgresManager::new(logger))
}

fn args(pairs: &[(&str, &str)]) -> Map<String, Value> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), Value::String(v.to_string())))
        .collect()
}

#[tokio::test]
async fn writes_the_full_response_under_a_rendered_name() {
    let _guard = ENV_LOCK.lock().await;
    let dir = tmp_dir("sink-write");
    let base = dir.join("exports");
    let manager = manager_with_registry(
        &dir,
        &format!(
            r#"{{"handlers": {{"default": {{"type": "file", "base_path": "{}", "filename": "{{endpoint}}_{{tenant_id}}.json"}}}}}}"#,
            base.display()
        ),
    );

    let sink = manager.resolve_sink("get_sites").expect("sink");
    let response = json!({"errcode": "0", "data": [{"id": "s1"}]});
    let records = vec![json!({"id": "s1"})];
    let ctx = SinkContext {
        endpoint: "get_sites",
        args: &args(&[("tenant_id", "t-9")]),
        response: &response,
        records: &records,
    };

    let report = manager.persist(&sink, &ctx).await.expect("persist");
    assert_eq!(report.get("type"), Some(&Value::String("file".to_string())));

    let written = base.join("get_sites_t-9.json");
    let raw = std::fs::read_to_string(&written).expect("file written");
    let parsed: Value = serde_json::from_str(&raw).expect("valid json");
    assert_eq!(parsed, response, "file sink keeps the whole response");
}

#[tokio::test]
async fn missing_filename_values_collapse_and_trim() {
    let _guard = ENV_LOCK.lock().await;
    let dir = tmp_dir("sink-collapse");
    let base = dir.join("exports");
    let manager = manager_with_registry(
        &dir,
        &format!(
            r#"{{"handlers": {{"default": {{"type": "file", "base_path": "{}", "filename": "{{endpoint}}_{{tenant_id}}_{{site}}"}}}}}}"#,
            base.display()
        ),
    );

    let sink = manager.resolve_sink("get_tenants").expect("sink");
    let response = json!({"data": []});
    let ctx = SinkContext {
        endpoint: "get_tenants",
        args: &Map::new(),
        records: &[],
        response: &response,
    };

    manager.persist(&sink, &ctx).await.expect("persist");
    assert!(
        base.join("get_tenants").exists(),
        "empty substitutions collapse and the edges are trimmed"
    );
}

#[tokio::test]
async fn unrenderable_names_fall_back_to_the_endpoint() {
    let _guard = ENV_LOCK.lock().await;
    let dir = tmp_dir("sink-fallback");
    let base = dir.join("exports");
    let manager = manager_with_registry(
        &dir,
        &format!(
            r#"{{"handlers": {{"default": {{"type": "file", "base_path": "{}", "filename": "{{site}}"}}}}}}"#,
            base.display()
        ),
    );

    let sink = manager.resolve_sink("get_tenants").expect("sink");
    let response = json!({"data": []});
    let ctx = SinkContext {
        endpoint: "get_tenants",
        args: &Map::new(),
        records: &[],
        response: &response,
    };

    manager.persist(&sink, &ctx).await.expect("persist");
    assert!(
        base.join("get_tenants.json").exists(),
        "a name that renders to nothing falls back to endpoint.json"
    );
}

#[tokio::test]
async fn sink_resolution_rejects_broken_database_config() {
    let _guard = ENV_LOCK.lock().await;
    let dir = tmp_dir("sink-reject");
    let manager = manager_with_registry(
        &dir,
        r#"{
            "handlers": {
                "deep_keys": {
                    "type": "database",
                    "database": "main",
                    "table": "things",
                    "on_conflict": ["a.b.c"]
                },
                "no_such_db": {
                    "type": "database",
                    "database": "ghost",
                    "table": "things"
                }
            },
            "databases": { "main": "postgresql://u:p@h/d" }
        }"#,
    );

    assert!(
        manager.resolve_sink("deep_keys").is_err(),
        "natural keys deeper than parent.child are rejected before any call"
    );
    assert!(
        manager.resolve_sink("no_such_db").is_err(),
        "dangling database references are rejected before any call"
    );
}

#[tokio::test]
async fn empty_record_sets_skip_the_database() {
    let _guard = ENV_LOCK.lock().await;
    let dir = tmp_dir("sink-empty");
    let manager = manager_with_registry(
        &dir,
        r#"{
            "handlers": {
                "get_devices": {
                    "type": "database",
                    "database": "main",
                    "table": "devices",
                    "on_conflict": ["id"]
                }
            },
            "databases": { "main": "postgresql://u:p@unreachable.invalid:5432/d" }
        }"#,
    );

    let sink = manager.resolve_sink("get_devices").expect("sink");
    let response = json!({"data": []});
    let ctx = SinkContext {
        endpoint: "get_devices",
        args: &Map::new(),
        records: &[],
        response: &response,
    };

    // Must not try to reach the (unreachable) server when there is nothing
    // to write.
    let report = manager.persist(&sink, &ctx).await.expect("persist");
    assert_eq!(report.get("written"), Some(&json!(0)));
}
