use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::{Value, json};

use crate::common::{TestProject, USER_GROUPS_TEMPLATE};

fn parse_stdout(stdout: &str) -> Value {
    serde_json::from_str(stdout).unwrap_or_else(|e| panic!("stdout is not JSON ({e}): {stdout}"))
}

#[tokio::test]
async fn test_check_lists_builders_and_parameters() {
    let project = TestProject::new().unwrap();
    project.write_file("queries/user_groups.sql", USER_GROUPS_TEMPLATE).await.unwrap();

    let output = project.run_sqlweave(&["check", "queries/user_groups.sql"]).unwrap();
    assert!(output.success, "stderr: {}", output.stderr);
    assert!(output.stdout.contains("compiles"));
    assert!(output.stdout.contains("  user (0:7)"));
    assert!(output.stdout.contains("  groups main (4:7)"));
    assert!(output.stdout.contains("  userId at 1:34"));
}

#[tokio::test]
async fn test_check_json_output() {
    let project = TestProject::new().unwrap();
    project.write_file("q.sql", USER_GROUPS_TEMPLATE).await.unwrap();

    let output = project.run_sqlweave(&["check", "q.sql", "--format", "json"]).unwrap();
    assert!(output.success, "stderr: {}", output.stderr);

    let report = parse_stdout(&output.stdout);
    assert_eq!(report["builders"][1], json!({ "name": "groups", "main": true, "location": { "line": 4, "column": 7 } }));
    assert_eq!(report["request_fields"], json!(["userId"]));
}

#[tokio::test]
async fn test_check_reports_compile_error() {
    let project = TestProject::new().unwrap();
    project
        .write_file("bad.sql", "{% req a main %}{% endreq %}\n{% req b main %}{% endreq %}")
        .await
        .unwrap();

    let output = project.run_sqlweave(&["check", "bad.sql"]).unwrap();
    assert!(!output.success);
    assert_eq!(output.code, Some(1));
    assert!(
        output.stderr.contains("Template compilation failed: Only one main builder is allowed. (at 1:"),
        "stderr: {}",
        output.stderr
    );
}

#[tokio::test]
async fn test_check_missing_template() {
    let project = TestProject::new().unwrap();

    let output = project.run_sqlweave(&["check", "nope.sql"]).unwrap();
    assert!(!output.success);
    assert!(output.stderr.contains("Check that the file exists"), "stderr: {}", output.stderr);
}

#[tokio::test]
async fn test_render_without_config_is_a_dry_run() {
    let project = TestProject::new().unwrap();
    project
        .write_file(
            "users.sql",
            "{% req users main %}select * from users where id = {{ params.id }}{% endreq %}",
        )
        .await
        .unwrap();

    let output = project.run_sqlweave(&["render", "users.sql", "--param", "id=42"]).unwrap();
    assert!(output.success, "stderr: {}", output.stderr);
    assert_eq!(
        parse_stdout(&output.stdout),
        json!({
            "kind": "rows",
            "rows": [{ "query": "select * from users where id = $1", "parameters": { "$1": 42 } }],
        })
    );
}

#[tokio::test]
async fn test_render_with_fixture_profile() {
    let project = TestProject::new().unwrap();
    project.write_file("q.sql", USER_GROUPS_TEMPLATE).await.unwrap();
    project
        .write_file(
            "fixtures/local.json",
            r#"{
  "select * from users where id = $1;": [{ "id": "u-1" }],
  "select * from groups where owner = 'u-1';": [{ "name": "admins" }, { "name": "ops" }]
}"#,
        )
        .await
        .unwrap();
    project
        .write_config(
            r#"
default_profile = "local"

[profiles.local]
kind = "fixture"
path = "fixtures/local.json"
"#,
        )
        .await
        .unwrap();

    let output = project.run_sqlweave(&["render", "q.sql", "--params-json", r#"{"userId": 7}"#]).unwrap();
    assert!(output.success, "stderr: {}", output.stderr);
    assert_eq!(
        parse_stdout(&output.stdout)["rows"],
        json!([{ "name": "admins" }, { "name": "ops" }])
    );
}

#[tokio::test]
async fn test_render_top_level_text_with_user() {
    let project = TestProject::new().unwrap();
    project
        .write_file("q.sql", "select * from audit where actor = {{ context.user.name }}\n")
        .await
        .unwrap();

    let output = project.run_sqlweave(&["render", "q.sql", "--user", "alice"]).unwrap();
    assert!(output.success, "stderr: {}", output.stderr);
    assert_eq!(
        parse_stdout(&output.stdout),
        json!({
            "kind": "text",
            "text": "select * from audit where actor = $1",
            "parameters": { "$1": "alice" },
        })
    );
}

#[tokio::test]
async fn test_render_unknown_profile() {
    let project = TestProject::new().unwrap();
    project.write_file("q.sql", "select 1").await.unwrap();

    let output = project.run_sqlweave(&["render", "q.sql", "--profile", "warehouse"]).unwrap();
    assert!(!output.success);
    assert!(output.stderr.contains("Profile 'warehouse' is not configured"), "stderr: {}", output.stderr);
    assert!(output.stderr.contains("[profiles.warehouse]"));
}

#[tokio::test]
async fn test_render_rejects_malformed_param() {
    let project = TestProject::new().unwrap();
    project.write_file("q.sql", "select 1").await.unwrap();

    let output = project.run_sqlweave(&["render", "q.sql", "--param", "oops"]).unwrap();
    assert!(!output.success);
    assert!(
        output.stderr.contains("Invalid parameter 'oops': expected name=value"),
        "stderr: {}",
        output.stderr
    );
}

#[tokio::test]
async fn test_render_reports_data_source_rejection() {
    let project = TestProject::new().unwrap();
    project.write_file("q.sql", "{% req q main %}select 2{% endreq %}").await.unwrap();
    project.write_file("fixtures.json", r#"{ "select 1": [] }"#).await.unwrap();
    project
        .write_config("[profiles.default]\nkind = \"fixture\"\npath = \"fixtures.json\"\n")
        .await
        .unwrap();

    let output = project.run_sqlweave(&["render", "q.sql"]).unwrap();
    assert!(!output.success);
    assert!(
        output.stderr.contains("Data source rejected the query: no fixture for query: select 2"),
        "stderr: {}",
        output.stderr
    );
}

#[tokio::test]
async fn test_explicit_config_flag() {
    let project = TestProject::new().unwrap();
    project.write_file("q.sql", "select {{ params.a }}").await.unwrap();
    project.write_file("ci.toml", "execute_top_level = true\n").await.unwrap();

    let output =
        project.run_sqlweave(&["--config", "ci.toml", "render", "q.sql", "-p", "a=1"]).unwrap();
    assert!(output.success, "stderr: {}", output.stderr);
    assert_eq!(
        parse_stdout(&output.stdout),
        json!({ "kind": "rows", "rows": [{ "query": "select $1", "parameters": { "$1": 1 } }] })
    );
}

#[test]
fn test_help_lists_commands() {
    Command::cargo_bin("sqlweave")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("check").and(predicate::str::contains("render")));
}

#[tokio::test]
async fn test_circular_builders_exit_with_suggestion() {
    let project = TestProject::new().unwrap();
    project
        .write_file(
            "cycle.sql",
            "{% req a main %}select {{ b.value() }}{% endreq %}{% req b %}select {{ a.value() }}{% endreq %}",
        )
        .await
        .unwrap();

    Command::cargo_bin("sqlweave")
        .unwrap()
        .current_dir(project.path())
        .env_remove("SQLWEAVE_CONFIG")
        .args(["render", "cycle.sql"])
        .assert()
        .failure()
        .code(1)
        .stderr(
            predicate::str::contains("Circular builder reference detected: b -> a -> b")
                .and(predicate::str::contains("value() in a loop")),
        );
}
