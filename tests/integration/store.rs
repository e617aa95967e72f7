use serde_json::json;
use sqlweave_cli::templating::{ExecutionContext, ExecutionEngine, TemplateCompiler, TemplateStore};
use sqlweave_cli::test_utils::RecordingDataSource;
use std::sync::Arc;

use crate::common::USER_GROUPS_TEMPLATE;

#[tokio::test]
async fn test_concurrent_executions_share_one_template() {
    let source = Arc::new(RecordingDataSource::new().respond("user", vec![json!({ "id": "u-1" })]));
    let store = TemplateStore::new(TemplateCompiler::default(), ExecutionEngine::new(source.clone()));
    store.compile_and_insert("user_groups", USER_GROUPS_TEMPLATE).unwrap();

    let tasks: Vec<_> = (0..8)
        .map(|n| {
            let store = store.clone();
            tokio::spawn(async move {
                store
                    .execute("user_groups", ExecutionContext::new().with_parameter("userId", n))
                    .await
            })
        })
        .collect();
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    // Each execution has its own handles: one `user` and one `groups` query apiece.
    assert_eq!(source.calls_for("user").len(), 8);
    assert_eq!(source.calls_for("groups").len(), 8);
    let mut bound: Vec<i64> = source
        .calls_for("user")
        .iter()
        .filter_map(|call| call.parameters.get("$1").and_then(serde_json::Value::as_i64))
        .collect();
    bound.sort_unstable();
    assert_eq!(bound, (0..8).collect::<Vec<i64>>());
}

#[tokio::test]
async fn test_replacing_a_template_keeps_running_copy_alive() {
    let store = TemplateStore::new(
        TemplateCompiler::default(),
        ExecutionEngine::new(Arc::new(RecordingDataSource::new())),
    );
    let first = store.compile_and_insert("q", "select 1").unwrap();
    let replaced = store.insert("q", Arc::new(TemplateCompiler::default().compile("select 2").unwrap()));

    assert!(replaced.is_some_and(|old| Arc::ptr_eq(&old, &first)));
    assert_eq!(first.source(), "select 1");

    let result = store.execute("q", ExecutionContext::new()).await.unwrap();
    assert_eq!(result.text(), Some("select 2"));
    assert_eq!(store.names(), vec!["q".to_string()]);
}
