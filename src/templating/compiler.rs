//! Template compilation: lex, parse, run visitors, attach metadata.

use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

use super::ast::{Ast, NodeId, NodeKind};
use super::builder::BuilderDeclaration;
use super::error::CompileError;
use super::extension::{CompileOptions, ExtensionRegistry};
use super::lexer::Lexer;
use super::parameters::ParameterReference;
use super::parser::Parser;
use crate::constants::{BUILDER_METADATA_NAME, PARAMETER_METADATA_NAME};

/// Compiles template source into [`CompiledTemplate`]s.
///
/// A compiler is cheap to clone and can be shared; each call to
/// [`compile`](Self::compile) builds its own visitor instances.
#[derive(Debug, Clone)]
pub struct TemplateCompiler {
    registry: ExtensionRegistry,
    options: CompileOptions,
}

impl Default for TemplateCompiler {
    fn default() -> Self {
        Self::new(CompileOptions::default())
    }
}

impl TemplateCompiler {
    /// Compiler with the built-in extensions.
    #[must_use]
    pub fn new(options: CompileOptions) -> Self {
        Self::with_registry(ExtensionRegistry::builtin(), options)
    }

    #[must_use]
    pub const fn with_registry(registry: ExtensionRegistry, options: CompileOptions) -> Self {
        Self {
            registry,
            options,
        }
    }

    #[must_use]
    pub const fn registry(&self) -> &ExtensionRegistry {
        &self.registry
    }

    /// Compile `source` into an immutable template.
    ///
    /// # Errors
    ///
    /// Returns the first structural problem found: a lexing or parsing error,
    /// a malformed builder block, a duplicate builder name, a second `main`
    /// builder, or an access chain longer than the configured depth.
    pub fn compile(&self, source: &str) -> Result<CompiledTemplate, CompileError> {
        let tokens = Lexer::new(source).tokenize()?;
        let ast = Parser::new(source, tokens, &self.registry)
            .with_max_depth(self.options.max_nesting_depth)
            .parse()?;

        let mut visitors = self.registry.instantiate_visitors(&self.options);
        for node in ast.walk() {
            for visitor in &mut visitors {
                visitor.on_visit(&ast, node)?;
            }
        }

        let mut metadata = BTreeMap::new();
        for visitor in &visitors {
            if let (Some(name), Some(value)) = (visitor.metadata_name(), visitor.metadata()) {
                tracing::debug!(metadata = name, "Attached visitor metadata");
                metadata.insert(name.to_string(), value);
            }
        }

        CompiledTemplate::new(source, ast, metadata)
    }
}

/// A parsed template with its visitor metadata.
///
/// Immutable after construction; share it behind an `Arc` to execute it
/// concurrently.
#[derive(Debug, Clone)]
pub struct CompiledTemplate {
    source: String,
    ast: Ast,
    metadata: BTreeMap<String, Value>,
    builders: Vec<BuilderDeclaration>,
    parameters: Vec<ParameterReference>,
    builder_nodes: HashMap<String, NodeId>,
}

impl CompiledTemplate {
    fn new(source: &str, ast: Ast, metadata: BTreeMap<String, Value>) -> Result<Self, CompileError> {
        let builders: Vec<BuilderDeclaration> = typed_metadata(&metadata, BUILDER_METADATA_NAME)?;
        let parameters: Vec<ParameterReference> = typed_metadata(&metadata, PARAMETER_METADATA_NAME)?;
        let builder_nodes = ast
            .walk()
            .filter_map(|id| match ast.kind(id) {
                NodeKind::Builder {
                    name,
                    ..
                } => Some((name.clone(), id)),
                _ => None,
            })
            .collect();

        tracing::debug!(
            builders = builders.len(),
            parameters = parameters.len(),
            nodes = ast.len(),
            "Compiled template"
        );

        Ok(Self {
            source: source.to_string(),
            ast,
            metadata,
            builders,
            parameters,
            builder_nodes,
        })
    }

    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    #[must_use]
    pub const fn ast(&self) -> &Ast {
        &self.ast
    }

    /// Visitor contributions keyed by metadata name.
    #[must_use]
    pub const fn metadata(&self) -> &BTreeMap<String, Value> {
        &self.metadata
    }

    /// Declared builders in source order.
    #[must_use]
    pub fn builders(&self) -> &[BuilderDeclaration] {
        &self.builders
    }

    /// The builder marked `main`, if any.
    #[must_use]
    pub fn main_builder(&self) -> Option<&BuilderDeclaration> {
        self.builders.iter().find(|builder| builder.main)
    }

    /// Caller-parameter references grouped by dotted path.
    #[must_use]
    pub fn parameters(&self) -> &[ParameterReference] {
        &self.parameters
    }

    /// Distinct request fields read by the template. Nested paths collapse to
    /// their first segment: `params.user.id` reads the `user` field.
    #[must_use]
    pub fn request_fields(&self) -> Vec<String> {
        let mut fields: Vec<String> = Vec::new();
        for parameter in &self.parameters {
            let root = parameter.root_name();
            if !fields.iter().any(|field| field == root) {
                fields.push(root.to_string());
            }
        }
        fields
    }

    pub(crate) fn builder_node(&self, name: &str) -> Option<NodeId> {
        self.builder_nodes.get(name).copied()
    }
}

fn typed_metadata<T: serde::de::DeserializeOwned + Default>(
    metadata: &BTreeMap<String, Value>,
    name: &str,
) -> Result<T, CompileError> {
    match metadata.get(name) {
        Some(value) => serde_json::from_value(value.clone()).map_err(|e| {
            CompileError::without_location(format!("Invalid \"{name}\" metadata: {e}"))
        }),
        None => Ok(T::default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::templating::extension::AstVisitor;
    use serde_json::json;

    #[test]
    fn test_metadata_is_attached_by_name() {
        let template = TemplateCompiler::default()
            .compile("{% req users main %}select * from users where id = {{ params.id }}{% endreq %}")
            .unwrap();

        assert_eq!(
            template.metadata()["parameters"],
            json!([{ "name": "id", "locations": [{ "line": 0, "column": 53 }] }])
        );
        assert_eq!(template.metadata()["builders"][0]["name"], json!("users"));
        assert_eq!(template.main_builder().map(|b| b.name.as_str()), Some("users"));
    }

    #[test]
    fn test_request_fields_collapse_nested_paths() {
        let template = TemplateCompiler::default()
            .compile("{{ params.user.id }} {{ params.user.name }} {{ params.limit }}")
            .unwrap();
        assert_eq!(template.parameters().len(), 3);
        assert_eq!(template.request_fields(), vec!["user".to_string(), "limit".to_string()]);
    }

    struct Failing;

    impl AstVisitor for Failing {
        fn on_visit(&mut self, ast: &Ast, node: NodeId) -> Result<(), CompileError> {
            if matches!(ast.kind(node), NodeKind::Text(_)) {
                return Err(CompileError::new("text is not allowed", ast.location(node)));
            }
            Ok(())
        }
    }

    #[test]
    fn test_visitor_error_aborts_compilation_verbatim() {
        let mut registry = ExtensionRegistry::builtin();
        registry.register_visitor("no-text", |_| Box::new(Failing)).unwrap();
        let compiler = TemplateCompiler::with_registry(registry, CompileOptions::default());

        assert!(compiler.compile("{{ params.id }}").is_ok());
        let err = compiler.compile("{{ params.id }} trailing").unwrap_err();
        assert_eq!(err.to_string(), "text is not allowed");
    }

    #[test]
    fn test_template_without_visitors_has_no_metadata() {
        let compiler =
            TemplateCompiler::with_registry(ExtensionRegistry::new(), CompileOptions::default());
        let template = compiler.compile("select 1").unwrap();
        assert!(template.metadata().is_empty());
        assert!(template.builders().is_empty());
        assert!(template.parameters().is_empty());
    }
}
