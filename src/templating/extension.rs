//! Compile-time extension points: AST visitors and custom block tags.
//!
//! Extensions are wired through an explicit [`ExtensionRegistry`] that maps a
//! capability tag to a constructor. Visitors are constructed fresh for every
//! compilation because they accumulate state while observing nodes; tag
//! extensions are stateless and shared.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

use super::ast::{Ast, NodeId};
use super::builder::{BuilderDeclarations, BuilderTag};
use super::error::CompileError;
use super::lexer::Token;
use super::parameters::ParametersChecker;
use super::parser::Parser;
use crate::constants::{
    BUILDER_METADATA_NAME, MAX_NESTING_DEPTH, PARAMETER_METADATA_NAME, REFERENCE_SEARCH_MAX_DEPTH,
};

/// Options handed to visitor constructors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompileOptions {
    /// Longest access chain the parameter resolver will walk
    pub max_reference_depth: usize,
    /// Deepest nesting of blocks and expressions the parser accepts
    pub max_nesting_depth: usize,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            max_reference_depth: REFERENCE_SEARCH_MAX_DEPTH,
            max_nesting_depth: MAX_NESTING_DEPTH,
        }
    }
}

/// A pass that observes every node of a parsed template.
///
/// `on_visit` is called once per node in lexical pre-order. After the walk the
/// compiler asks for [`AstVisitor::metadata`] and stores it under
/// [`AstVisitor::metadata_name`]. Returning an error aborts the compilation
/// with that error unchanged.
pub trait AstVisitor: Send {
    fn on_visit(&mut self, ast: &Ast, node: NodeId) -> Result<(), CompileError>;

    fn metadata_name(&self) -> Option<&'static str> {
        None
    }

    fn metadata(&self) -> Option<Value> {
        None
    }
}

/// A custom block tag such as `{% req name %}...{% endreq %}`.
///
/// The parser calls [`TagExtension::parse`] right after consuming the tag
/// name; the extension consumes its arguments, the closing `%}` and its body,
/// and returns the node it built.
pub trait TagExtension: Send + Sync {
    fn tag(&self) -> &'static str;

    fn parse(&self, parser: &mut Parser<'_>, tag: &Token) -> Result<NodeId, CompileError>;
}

pub type VisitorFactory = fn(&CompileOptions) -> Box<dyn AstVisitor>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExtensionError {
    #[error("Extension \"{0}\" is already registered")]
    Duplicate(String),
}

#[derive(Clone, Default)]
pub struct ExtensionRegistry {
    visitors: Vec<(&'static str, VisitorFactory)>,
    tags: HashMap<&'static str, Arc<dyn TagExtension>>,
}

impl ExtensionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in builder block and parameter resolver.
    #[must_use]
    pub fn builtin() -> Self {
        let visitors: [(&'static str, VisitorFactory); 2] = [
            (PARAMETER_METADATA_NAME, |options| {
                Box::new(ParametersChecker::new(options.max_reference_depth))
            }),
            (BUILDER_METADATA_NAME, |_| Box::new(BuilderDeclarations::default())),
        ];
        let builder_tag: Arc<dyn TagExtension> = Arc::new(BuilderTag);
        Self {
            visitors: visitors.to_vec(),
            tags: HashMap::from([(builder_tag.tag(), builder_tag)]),
        }
    }

    pub fn register_visitor(
        &mut self,
        tag: &'static str,
        factory: VisitorFactory,
    ) -> Result<(), ExtensionError> {
        if self.visitors.iter().any(|(existing, _)| *existing == tag) {
            return Err(ExtensionError::Duplicate(tag.to_string()));
        }
        self.visitors.push((tag, factory));
        Ok(())
    }

    pub fn register_tag(&mut self, extension: Arc<dyn TagExtension>) -> Result<(), ExtensionError> {
        let tag = extension.tag();
        if self.tags.contains_key(tag) {
            return Err(ExtensionError::Duplicate(tag.to_string()));
        }
        self.tags.insert(tag, extension);
        Ok(())
    }

    #[must_use]
    pub fn tag(&self, name: &str) -> Option<Arc<dyn TagExtension>> {
        self.tags.get(name).cloned()
    }

    /// Build one visitor per registered factory, in registration order.
    #[must_use]
    pub fn instantiate_visitors(&self, options: &CompileOptions) -> Vec<Box<dyn AstVisitor>> {
        self.visitors.iter().map(|(_, factory)| factory(options)).collect()
    }

    #[must_use]
    pub fn visitor_tags(&self) -> Vec<&'static str> {
        self.visitors.iter().map(|(tag, _)| *tag).collect()
    }
}

impl std::fmt::Debug for ExtensionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut tags: Vec<_> = self.tags.keys().collect();
        tags.sort();
        f.debug_struct("ExtensionRegistry")
            .field("visitors", &self.visitor_tags())
            .field("tags", &tags)
            .finish()
    }
}
