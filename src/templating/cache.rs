//! Named store of compiled templates.
//!
//! Templates are compiled once and executed many times. The store keeps them
//! behind `Arc`s in a `DashMap`, so lookups from concurrent executions never
//! contend on a global lock and an executing template stays alive even if it
//! is replaced or removed meanwhile.

use dashmap::DashMap;
use std::sync::Arc;

use super::compiler::{CompiledTemplate, TemplateCompiler};
use super::context::ExecutionContext;
use super::error::{CompileError, ExecutionError};
use super::renderer::{ExecutionEngine, RenderedResult};

#[derive(Debug, Clone)]
pub struct TemplateStore {
    compiler: TemplateCompiler,
    engine: ExecutionEngine,
    templates: Arc<DashMap<String, Arc<CompiledTemplate>>>,
}

impl TemplateStore {
    #[must_use]
    pub fn new(compiler: TemplateCompiler, engine: ExecutionEngine) -> Self {
        Self {
            compiler,
            engine,
            templates: Arc::new(DashMap::new()),
        }
    }

    /// Compile `source` and store it under `name`, replacing any previous
    /// template with that name.
    ///
    /// # Errors
    ///
    /// Returns the compile error; the store is left unchanged.
    pub fn compile_and_insert(
        &self,
        name: impl Into<String>,
        source: &str,
    ) -> Result<Arc<CompiledTemplate>, CompileError> {
        let name = name.into();
        let template = Arc::new(self.compiler.compile(source)?);
        tracing::debug!(template = %name, builders = template.builders().len(), "Stored template");
        self.templates.insert(name, Arc::clone(&template));
        Ok(template)
    }

    /// Store an already compiled template. Returns the template it replaced.
    pub fn insert(
        &self,
        name: impl Into<String>,
        template: Arc<CompiledTemplate>,
    ) -> Option<Arc<CompiledTemplate>> {
        self.templates.insert(name.into(), template)
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<CompiledTemplate>> {
        self.templates.get(name).map(|entry| Arc::clone(entry.value()))
    }

    pub fn remove(&self, name: &str) -> Option<Arc<CompiledTemplate>> {
        self.templates.remove(name).map(|(_, template)| template)
    }

    /// Stored template names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.templates.iter().map(|entry| entry.key().clone()).collect();
        names.sort();
        names
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.templates.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    /// Execute the template stored under `name`.
    ///
    /// # Errors
    ///
    /// [`ExecutionError::TemplateNotFound`] for an unknown name, otherwise
    /// whatever the execution itself returns.
    pub async fn execute(
        &self,
        name: &str,
        context: ExecutionContext,
    ) -> Result<RenderedResult, ExecutionError> {
        let template = self.get(name).ok_or_else(|| ExecutionError::TemplateNotFound {
            name: name.to_string(),
        })?;
        self.engine.execute(&template, context).await
    }
}
