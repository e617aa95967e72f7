use serde_json::json;
use sqlweave_cli::templating::{
    Ast, AstVisitor, CompileError, CompileOptions, ExtensionRegistry, Location, NodeId, NodeKind,
    TemplateCompiler,
};

use crate::common::USER_GROUPS_TEMPLATE;

fn at(line: usize, column: usize) -> Location {
    Location {
        line,
        column,
    }
}

#[test]
fn test_builders_and_parameters_are_reported() {
    let template = TemplateCompiler::default().compile(USER_GROUPS_TEMPLATE).unwrap();

    let names: Vec<(&str, bool)> =
        template.builders().iter().map(|b| (b.name.as_str(), b.main)).collect();
    assert_eq!(names, vec![("user", false), ("groups", true)]);
    assert_eq!(template.builders()[0].location, at(0, 7));
    assert_eq!(template.builders()[1].location, at(4, 7));
    assert_eq!(template.main_builder().map(|b| b.name.as_str()), Some("groups"));

    assert_eq!(template.parameters().len(), 1);
    assert_eq!(template.parameters()[0].name, "userId");
    assert_eq!(template.parameters()[0].locations, vec![at(1, 34)]);
    assert_eq!(template.request_fields(), vec!["userId".to_string()]);
}

#[test]
fn test_metadata_is_plain_json() {
    let template = TemplateCompiler::default()
        .compile("{% req q main %}select {{ params.a }}, {{ params.a }}{% endreq %}")
        .unwrap();
    assert_eq!(
        template.metadata()["parameters"],
        json!([{ "name": "a", "locations": [{ "line": 0, "column": 26 }, { "line": 0, "column": 42 }] }])
    );
    assert_eq!(template.metadata()["builders"][0]["main"], json!(true));
}

#[test]
fn test_structural_errors_keep_exact_messages() {
    let cases = [
        ("{% req %}{% endreq %}", "Expected a variable"),
        ("{% req \"q\" %}{% endreq %}", "Expected a symbol, but got string"),
        ("{% req q main extra %}{% endreq %}", "Expected a block end, but got symbol"),
        (
            "{% req a main %}{% endreq %}{% req b main %}{% endreq %}",
            "Only one main builder is allowed.",
        ),
    ];
    for (source, message) in cases {
        let err = TemplateCompiler::default().compile(source).unwrap_err();
        assert_eq!(err.message, message, "for {source}");
        assert!(err.location.is_some(), "for {source}");
    }
}

#[test]
fn test_reserved_names_cannot_be_builders() {
    for name in ["params", "context", "main"] {
        let source = format!("{{% req {name} %}}select 1{{% endreq %}}");
        let err = TemplateCompiler::default().compile(&source).unwrap_err();
        assert!(err.message.contains("reserved identifier"), "{name}: {}", err.message);
    }
}

#[test]
fn test_depth_limit_is_configurable() {
    let compiler = TemplateCompiler::new(CompileOptions {
        max_reference_depth: 2,
        ..CompileOptions::default()
    });
    assert!(compiler.compile("{{ params.a.b }}").is_ok());

    let err = compiler.compile("{{ params.a.b.c.d }}").unwrap_err();
    assert_eq!(err.message, "Max depth reached");
}

#[test]
fn test_pathological_nesting_is_a_compile_error() {
    let source = format!(
        "{{% req q main %}}select {{{{ {}1{} }}}}{{% endreq %}}",
        "(".repeat(20_000),
        ")".repeat(20_000)
    );
    let err = TemplateCompiler::default().compile(&source).unwrap_err();
    assert_eq!(err.message, "Max depth reached");
    assert_eq!(err.location.map(|location| location.line), Some(0));

    let shallow = TemplateCompiler::new(CompileOptions {
        max_nesting_depth: 4,
        ..CompileOptions::default()
    });
    assert!(shallow.compile("{% req q main %}select {{ (params.a) }}{% endreq %}").is_ok());
    let err = shallow.compile("{% req q main %}select {{ ((params.a)) }}{% endreq %}").unwrap_err();
    assert_eq!(err.message, "Max depth reached");
}

/// Counts output expressions so the test can read them back as metadata.
#[derive(Default)]
struct OutputCounter {
    count: usize,
}

impl AstVisitor for OutputCounter {
    fn on_visit(&mut self, ast: &Ast, node: NodeId) -> Result<(), CompileError> {
        if matches!(ast.kind(node), NodeKind::Output { .. }) {
            self.count += 1;
        }
        Ok(())
    }

    fn metadata_name(&self) -> Option<&'static str> {
        Some("outputs")
    }

    fn metadata(&self) -> Option<serde_json::Value> {
        Some(json!(self.count))
    }
}

#[test]
fn test_custom_visitor_contributes_metadata() {
    let mut registry = ExtensionRegistry::builtin();
    registry.register_visitor("outputs", |_| Box::new(OutputCounter::default())).unwrap();
    let compiler = TemplateCompiler::with_registry(registry, CompileOptions::default());

    let template = compiler.compile(USER_GROUPS_TEMPLATE).unwrap();
    assert_eq!(template.metadata()["outputs"], json!(2));
    assert_eq!(template.builders().len(), 2);
}
