mod common;

use serde_json::json;

use common::test_registry;
use steward::plan::{load_plans_from_file, validate_plan};

fn write_plans(dir: &tempfile::TempDir, name: &str, doc: serde_json::Value) -> std::path::PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, serde_json::to_string_pretty(&doc).unwrap()).unwrap();
    path
}

fn stage(actions: serde_json::Value) -> serde_json::Value {
    json!({"stage": 1, "actions": actions})
}

fn sleep_action(id: &str) -> serde_json::Value {
    json!({"id": id, "action": "test.sleep", "payload": {"duration_ms": 1}})
}

#[tokio::test]
async fn test_load_wrapped_plans_object() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_plans(
        &dir,
        "wrapped.json",
        json!({
            "plans": [
                {"name": "alpha", "plan": [stage(json!([sleep_action("a")]))]},
                {"plan": [stage(json!([sleep_action("b")]))]},
                [stage(json!([sleep_action("c")]))]
            ]
        }),
    );

    let plans = load_plans_from_file(&path).await.unwrap();
    assert_eq!(plans.len(), 3);
    assert_eq!(plans[0].name, "alpha");
    // Unnamed entries are auto-named from the file basename and index
    assert_eq!(plans[1].name, "manual:wrapped.json#2");
    assert_eq!(plans[2].name, "manual:wrapped.json#3");
    assert_eq!(plans[2].plan.plan[0].actions[0].id, "c");
}

#[tokio::test]
async fn test_load_bare_array_of_plans() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_plans(
        &dir,
        "list.json",
        json!([
            {"name": "first", "plan": [stage(json!([sleep_action("a")]))]},
            {"plan": [stage(json!([sleep_action("b")]))]}
        ]),
    );

    let plans = load_plans_from_file(&path).await.unwrap();
    assert_eq!(plans.len(), 2);
    assert_eq!(plans[0].name, "first");
    assert_eq!(plans[1].name, "manual:list.json#2");
}

#[tokio::test]
async fn test_load_single_plan_object() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_plans(
        &dir,
        "single.json",
        json!({
            "meta": {"plan_type": "exploration", "replan": true, "handoff_path": "tmp/e.json"},
            "plan": [stage(json!([sleep_action("solo")]))]
        }),
    );

    let plans = load_plans_from_file(&path).await.unwrap();
    assert_eq!(plans.len(), 1);
    assert_eq!(plans[0].name, "manual:single.json");
    assert!(plans[0].plan.meta.replan);
    assert_eq!(plans[0].plan.meta.handoff_path, "tmp/e.json");
}

#[tokio::test]
async fn test_load_bare_stage_array_is_one_plan() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_plans(
        &dir,
        "stages.json",
        json!([
            stage(json!([sleep_action("a")])),
            {"stage": 2, "actions": [sleep_action("b")]}
        ]),
    );

    let plans = load_plans_from_file(&path).await.unwrap();
    assert_eq!(plans.len(), 1);
    assert_eq!(plans[0].plan.plan.len(), 2);
}

#[tokio::test]
async fn test_loaded_plans_pass_validation() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_plans(
        &dir,
        "valid.json",
        json!({"plans": [{"name": "ok", "plan": [stage(json!([sleep_action("a")]))]}]}),
    );

    let registry = test_registry();
    let plans = load_plans_from_file(&path).await.unwrap();
    for named in &plans {
        validate_plan(&registry, &named.plan).unwrap();
    }
}

#[tokio::test]
async fn test_round_trip_preserves_logical_content() {
    let dir = tempfile::tempdir().unwrap();
    let doc = json!({
        "plans": [{
            "name": "rt",
            "plan": [
                stage(json!([{
                    "id": "fetch",
                    "action": "test.sleep_with_return",
                    "payload": {"duration_ms": 1, "tag": true}
                }])),
                {"stage": 2, "actions": [{
                    "id": "save",
                    "action": "system.write_file",
                    "payload": {"path": "out.txt", "content": "@results.fetch.status"}
                }]}
            ]
        }]
    });
    let path = write_plans(&dir, "rt.json", doc);

    let loaded = load_plans_from_file(&path).await.unwrap();
    let reserialized = serde_json::to_string(&loaded[0].plan).unwrap();
    let reloaded: steward::ExecutionPlan = serde_json::from_str(&reserialized).unwrap();

    assert_eq!(reloaded.plan.len(), loaded[0].plan.plan.len());
    for (a, b) in loaded[0].plan.plan.iter().zip(reloaded.plan.iter()) {
        assert_eq!(a.stage, b.stage);
        let ids_a: Vec<_> = a.actions.iter().map(|x| &x.id).collect();
        let ids_b: Vec<_> = b.actions.iter().map(|x| &x.id).collect();
        assert_eq!(ids_a, ids_b);
        for (x, y) in a.actions.iter().zip(b.actions.iter()) {
            assert_eq!(x.payload, y.payload);
        }
    }
}

#[tokio::test]
async fn test_unrecognized_format_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_plans(&dir, "bad.json", json!({"not_plans": 1}));
    assert!(load_plans_from_file(&path).await.is_err());

    let missing = dir.path().join("absent.json");
    let err = load_plans_from_file(&missing).await.unwrap_err();
    assert!(err.to_string().contains("plans file not found"));
}
