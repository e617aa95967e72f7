use serde_json::{Value, json};
use sqlweave_cli::datasource::{DryRunDataSource, FixtureDataSource};
use sqlweave_cli::templating::{
    EngineOptions, ExecutionContext, ExecutionEngine, ExecutionError, RenderedResult,
    TemplateCompiler, UserInfo,
};
use sqlweave_cli::test_utils::{RecordingDataSource, init_test_logging};
use std::sync::Arc;

use crate::common::USER_GROUPS_TEMPLATE;

fn context(params: Value) -> ExecutionContext {
    init_test_logging(None);
    let Value::Object(map) = params else {
        panic!("parameters must be an object");
    };
    ExecutionContext::new().with_parameters(map)
}

#[tokio::test]
async fn test_user_groups_against_fixtures() {
    let source = FixtureDataSource::default()
        .with_query("select * from users where id = $1;", vec![json!({ "id": "u-1" })])
        .with_query("select * from groups where owner = 'u-1';", vec![json!({ "name": "admins" })]);
    let template = TemplateCompiler::default().compile(USER_GROUPS_TEMPLATE).unwrap();
    let engine = ExecutionEngine::new(Arc::new(source));

    let result = engine.execute(&template, context(json!({ "userId": 42 }))).await.unwrap();
    assert_eq!(result, RenderedResult::Rows {
        rows: vec![json!({ "name": "admins" })]
    });
}

#[tokio::test]
async fn test_user_groups_call_order_and_binding() {
    let source = Arc::new(RecordingDataSource::new().respond("user", vec![json!({ "id": "u-1" })]));
    let template = TemplateCompiler::default().compile(USER_GROUPS_TEMPLATE).unwrap();

    ExecutionEngine::new(source.clone())
        .execute(&template, context(json!({ "userId": "'; drop table users; --" })))
        .await
        .unwrap();

    let calls = source.calls();
    let order: Vec<&str> = calls.iter().filter_map(|c| c.builder.as_deref()).collect();
    assert_eq!(order, vec!["user", "groups"]);

    assert_eq!(calls[0].text, "select * from users where id = $1;");
    assert_eq!(calls[0].parameters.get("$1"), Some(&json!("'; drop table users; --")));
    assert!(!calls[0].text.contains("drop table"));

    assert_eq!(calls[1].text, "select * from groups where owner = 'u-1';");
    assert!(calls[1].parameters.is_empty());
}

#[tokio::test]
async fn test_dry_run_echoes_query_and_parameters() {
    let template = TemplateCompiler::default()
        .compile(
            "{% req users main %}select * from users where org = {{ context.user.org }} \
             and id in ({% for id in params.ids %}{{ id }}{% if not loop.last %}, {% endif %}{% endfor %})\
             {% endreq %}",
        )
        .unwrap();
    let ctx = context(json!({ "ids": [3, 5] }))
        .with_user(UserInfo::new("alice").with_attribute("org", "acme"));

    let result =
        ExecutionEngine::new(Arc::new(DryRunDataSource)).execute(&template, ctx).await.unwrap();

    assert_eq!(
        result.rows(),
        Some(&vec![json!({
            "query": "select * from users where org = $1 and id in ($2, $3)",
            "parameters": { "$1": "acme", "$2": 3, "$3": 5 },
        })])
    );
}

#[tokio::test]
async fn test_limit_and_offset_reach_fixture_source() {
    let source = FixtureDataSource::default()
        .with_query("select * from users", (1..=5).map(|id| json!({ "id": id })).collect());
    let template = TemplateCompiler::default()
        .compile(
            "{% req users %}select * from users{% endreq %}\
             {% for row in users.offset(1).limit(2).value() %}{{ row.id }};{% endfor %}",
        )
        .unwrap();

    let result = ExecutionEngine::new(Arc::new(source))
        .execute(&template, ExecutionContext::new())
        .await
        .unwrap();

    assert_eq!(result.text(), Some("2;3;"));
}

#[tokio::test]
async fn test_adapter_rejection_is_forwarded() {
    let template = TemplateCompiler::default()
        .compile("{% req missing main %}select * from nowhere{% endreq %}")
        .unwrap();

    let err = ExecutionEngine::new(Arc::new(FixtureDataSource::default()))
        .execute(&template, ExecutionContext::new())
        .await
        .unwrap_err();

    assert!(matches!(err, ExecutionError::DataSource(_)));
    assert_eq!(err.to_string(), "no fixture for query: select * from nowhere");
}

#[tokio::test]
async fn test_top_level_text_is_submitted_when_enabled() {
    let source = Arc::new(RecordingDataSource::new().respond_top_level(vec![json!({ "n": 1 })]));
    let template = TemplateCompiler::default()
        .compile("select count(*) as n from t where kind = {{ params.kind }}")
        .unwrap();
    let engine = ExecutionEngine::with_options(
        source.clone(),
        EngineOptions {
            execute_top_level: true,
            ..EngineOptions::default()
        },
    );

    let result = engine.execute(&template, context(json!({ "kind": "a" }))).await.unwrap();

    assert_eq!(result.rows(), Some(&vec![json!({ "n": 1 })]));
    let calls = source.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].builder, None);
    assert_eq!(calls[0].text, "select count(*) as n from t where kind = $1");
}

#[tokio::test]
async fn test_cycle_is_reported_with_chain() {
    let template = TemplateCompiler::default()
        .compile(
            "{% req a %}select {{ b.value() }}{% endreq %}\
             {% req b main %}select {{ a.value() }}{% endreq %}",
        )
        .unwrap();
    let source = Arc::new(RecordingDataSource::new());

    let err = ExecutionEngine::new(source.clone())
        .execute(&template, ExecutionContext::new())
        .await
        .unwrap_err();

    assert_eq!(err.to_string(), "Circular builder reference detected: a -> b -> a");
    assert_eq!(source.call_count(), 0);
}

#[tokio::test]
async fn test_profile_is_visible_to_template_and_adapter() {
    let source = Arc::new(RecordingDataSource::new());
    let template = TemplateCompiler::default()
        .compile("{% req q main %}select * from t where env = {{ context.profile }}{% endreq %}")
        .unwrap();

    ExecutionEngine::new(source.clone())
        .execute(&template, ExecutionContext::new().with_profile("staging"))
        .await
        .unwrap();

    let call = &source.calls()[0];
    assert_eq!(call.profile, "staging");
    assert_eq!(call.text, "select * from t where env = $1");
    assert_eq!(call.parameters.get("$1"), Some(&json!("staging")));
}

#[tokio::test]
async fn test_dry_run_accepts_dollar_signs_in_literals() {
    let template = TemplateCompiler::default()
        .compile(
            "{% req q main %}select * from promos where label = '$5 off' and id = {{ params.id }}{% endreq %}",
        )
        .unwrap();

    let result = ExecutionEngine::new(Arc::new(DryRunDataSource))
        .execute(&template, context(json!({ "id": 1 })))
        .await
        .unwrap();

    assert_eq!(
        result.rows(),
        Some(&vec![json!({
            "query": "select * from promos where label = '$5 off' and id = $1",
            "parameters": { "$1": 1 },
        })])
    );
}

#[tokio::test]
async fn test_main_builder_does_not_hide_top_level_errors() {
    let source = Arc::new(RecordingDataSource::new());
    let template = TemplateCompiler::default()
        .compile("{% req q main %}select 1{% endreq %}\nselect {{ nope.value() }}")
        .unwrap();

    let err = ExecutionEngine::new(source.clone())
        .execute(&template, ExecutionContext::new())
        .await
        .unwrap_err();

    assert_eq!(err.to_string(), "Builder \"nope\" is not declared");
    assert_eq!(source.call_count(), 0);
}
