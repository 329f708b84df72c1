use std::path::Path;

use serde_json::json;

use steward::plan::{ActionRegistry, validate_plan};
use steward::ExecutionPlan;

/// The catalog shipped at the repository root must load and describe the
/// actions the planner prompt advertises.
#[tokio::test]
async fn test_shipped_catalog_loads() {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("actions.json");
    let registry = ActionRegistry::load(&path).await.unwrap();

    for name in [
        "system.write_file_atomic",
        "web.request",
        "html.links",
        "list.pluck",
        "url.normalize",
        "llm.generate_content",
        "flow.foreach",
        "test.sleep",
        "intent.unknown",
    ] {
        assert!(registry.get_definition(name).is_some(), "missing {name}");
    }

    let prompt = registry.prompt_section();
    assert!(prompt.contains("`flow.foreach`"));
    assert!(prompt.contains("`[items_json, template]`"));
}

#[tokio::test]
async fn test_shipped_catalog_validates_a_realistic_plan() {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("actions.json");
    let registry = ActionRegistry::load(&path).await.unwrap();

    let plan: ExecutionPlan = serde_json::from_value(json!({
        "meta": {"plan_type": "extraction", "replan": false, "handoff_path": ""},
        "plan": [
            {"stage": 1, "actions": [
                {"id": "fetch", "action": "web.request", "payload": {"url": "https://example.com"}}
            ]},
            {"stage": 2, "actions": [
                {"id": "links", "action": "html.links", "payload": {
                    "html": "@results.fetch.content",
                    "base_url": "https://example.com"
                }}
            ]},
            {"stage": 3, "actions": [
                {"id": "urls", "action": "list.pluck", "payload": {
                    "list_json": "@results.links.links_json",
                    "field": "url"
                }}
            ]},
            {"stage": 4, "actions": [
                {"id": "pages", "action": "flow.foreach", "payload": {
                    "items_json": "@results.urls.values_json",
                    "template": {
                        "action": "web.request",
                        "payload": {"url": "{{item}}"}
                    }
                }}
            ]}
        ]
    }))
    .unwrap();

    validate_plan(&registry, &plan).unwrap();
}
