//! Template execution.
//!
//! [`ExecutionEngine::execute`] renders a [`CompiledTemplate`] against an
//! [`ExecutionContext`]. Every declared builder gets a lazy
//! [`BuilderHandle`]; a builder only runs when something calls `value()` on
//! it: the engine itself for the `main` builder, another builder's text, or
//! the top-level text, which is always rendered. Builders read by a builder therefore always run first, and each
//! builder runs at most once per execution.
//!
//! Values that come from `params` or `context` never reach query text. Writing
//! one allocates the next positional token in the current builder's
//! [`ParameterTable`] and writes the token instead. Literals and builder
//! results are inlined as text.

use futures::FutureExt;
use futures::future::BoxFuture;
use serde::Serialize;
use serde_json::{Map, Value, json};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use strsim::levenshtein;

use super::ast::{Ast, Location, NodeId, NodeKind};
use super::compiler::CompiledTemplate;
use super::context::{ExecutionContext, ParameterTable};
use super::error::ExecutionError;
use super::graph::ReferenceGraph;
use super::handle::{BuilderHandle, Materialize};
use super::value::{RuntimeValue, compare, lookup, render_literal};
use crate::constants::{CONTEXT_BINDING, DEFAULT_PROFILE, PARAMS_BINDING};
use crate::datasource::{BuilderOptions, DataSource, QueryRequest, Rows};

/// Maximum allowed Levenshtein distance as a percentage of the name length
/// for "did you mean" suggestions.
const SIMILARITY_THRESHOLD_PERCENT: usize = 50;

const VALUE_METHOD: &str = "value";
const LIMIT_METHOD: &str = "limit";
const OFFSET_METHOD: &str = "offset";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineOptions {
    /// Submit the top-level text as a query when no builder is `main`
    pub execute_top_level: bool,
    /// Profile used when the context does not name one
    pub default_profile: String,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            execute_top_level: false,
            default_profile: DEFAULT_PROFILE.to_string(),
        }
    }
}

/// Outcome of one execution.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum RenderedResult {
    /// Rows of the main builder, or of the top-level query
    Rows {
        rows: Rows,
    },
    /// Top-level text of a template without a main builder
    Text {
        text: String,
        parameters: ParameterTable,
    },
}

impl RenderedResult {
    #[must_use]
    pub fn rows(&self) -> Option<&Rows> {
        match self {
            Self::Rows {
                rows,
            } => Some(rows),
            Self::Text {
                ..
            } => None,
        }
    }

    #[must_use]
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Text {
                text,
                ..
            } => Some(text),
            Self::Rows {
                ..
            } => None,
        }
    }
}

/// Runs compiled templates against a data source.
///
/// The engine holds no per-execution state; one engine can serve any number
/// of concurrent executions.
#[derive(Clone)]
pub struct ExecutionEngine {
    data_source: Arc<dyn DataSource>,
    options: EngineOptions,
}

impl std::fmt::Debug for ExecutionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionEngine").field("options", &self.options).finish_non_exhaustive()
    }
}

impl ExecutionEngine {
    pub fn new(data_source: Arc<dyn DataSource>) -> Self {
        Self::with_options(data_source, EngineOptions::default())
    }

    pub fn with_options(data_source: Arc<dyn DataSource>, options: EngineOptions) -> Self {
        Self {
            data_source,
            options,
        }
    }

    #[must_use]
    pub const fn options(&self) -> &EngineOptions {
        &self.options
    }

    /// Execute `template` once.
    ///
    /// The top-level text is rendered first in every case. With a `main`
    /// builder the result is that builder's rows. Without one
    /// the top-level text is returned with its parameter table, or submitted
    /// as a query when [`EngineOptions::execute_top_level`] is set.
    ///
    /// # Errors
    ///
    /// Data source failures from any builder are returned unchanged. Calling
    /// `value()` on an undeclared builder, reference cycles between builders,
    /// and configuring a builder after it ran are reported as their own
    /// [`ExecutionError`] variants.
    pub async fn execute(
        &self,
        template: &CompiledTemplate,
        context: ExecutionContext,
    ) -> Result<RenderedResult, ExecutionError> {
        let execution = Execution::new(template, self.data_source.as_ref(), &self.options, context);
        let result = execution.run(self.options.execute_top_level).await;
        tracing::debug!(
            profile = %execution.profile,
            order = ?execution.dependency_order(),
            success = result.is_ok(),
            "Execution finished"
        );
        result
    }
}

/// Output buffer and scope of one builder (or of the top-level text).
#[derive(Debug, Default)]
struct Frame {
    out: String,
    table: ParameterTable,
    /// Byte offset in `out` of each allocated token, in allocation order
    token_offsets: Vec<usize>,
    locals: Vec<(String, RuntimeValue)>,
    builder: Option<String>,
}

impl Frame {
    fn for_builder(name: &str) -> Self {
        Self {
            builder: Some(name.to_string()),
            ..Self::default()
        }
    }

    /// Trimmed text, its parameter table and the token offsets into that text.
    fn finish(self) -> (String, ParameterTable, Vec<usize>) {
        let leading = self.out.len() - self.out.trim_start().len();
        let text = self.out.trim().to_string();
        let offsets = self.token_offsets.into_iter().map(|offset| offset - leading).collect();
        (text, self.table, offsets)
    }

    fn local(&self, name: &str) -> Option<&RuntimeValue> {
        self.locals.iter().rev().find(|(local, _)| local == name).map(|(_, value)| value)
    }
}

/// State scoped to a single `execute` call.
struct Execution<'a> {
    template: &'a CompiledTemplate,
    data_source: &'a dyn DataSource,
    profile: String,
    params: Value,
    /// `{ "user": .., "profile": .. }`
    context: Value,
    handles: HashMap<String, Arc<BuilderHandle>>,
    graph: Mutex<ReferenceGraph>,
}

impl<'a> Execution<'a> {
    fn new(
        template: &'a CompiledTemplate,
        data_source: &'a dyn DataSource,
        options: &EngineOptions,
        context: ExecutionContext,
    ) -> Self {
        let handles = template
            .builders()
            .iter()
            .map(|builder| (builder.name.clone(), Arc::new(BuilderHandle::new(&builder.name))))
            .collect();
        let user = context.user.map_or(Value::Null, |user| {
            let mut object = user.attributes;
            object.insert("name".to_string(), Value::String(user.name));
            Value::Object(object)
        });

        let profile = context.profile.unwrap_or_else(|| options.default_profile.clone());

        Self {
            template,
            data_source,
            context: Value::Object(Map::from_iter([
                ("user".to_string(), user),
                ("profile".to_string(), Value::String(profile.clone())),
            ])),
            profile,
            params: Value::Object(context.parameters),
            handles,
            graph: Mutex::new(ReferenceGraph::new()),
        }
    }

    fn ast(&self) -> &'a Ast {
        self.template.ast()
    }

    fn dependency_order(&self) -> Vec<String> {
        self.graph.lock().unwrap_or_else(PoisonError::into_inner).dependency_order()
    }

    async fn run(&self, execute_top_level: bool) -> Result<RenderedResult, ExecutionError> {
        let mut frame = Frame::default();
        let root = [self.ast().root()];
        self.render_nodes(&root, &mut frame).await?;

        if let Some(main) = self.template.main_builder() {
            let handle = self.handle(&main.name)?;
            let value = self.materialize(handle, None).await?;
            let rows = match value {
                Value::Array(rows) => rows,
                other => vec![other],
            };
            return Ok(RenderedResult::Rows {
                rows,
            });
        }

        let (text, parameters, token_offsets) = frame.finish();
        if execute_top_level {
            tracing::debug!("Submitting top-level text as the primary query");
            let rows = self
                .data_source
                .execute(QueryRequest {
                    builder: None,
                    text,
                    parameters,
                    token_offsets,
                    options: BuilderOptions::default(),
                    profile: self.profile.clone(),
                })
                .await?;
            return Ok(RenderedResult::Rows {
                rows,
            });
        }

        Ok(RenderedResult::Text {
            text,
            parameters,
        })
    }

    fn handle(&self, name: &str) -> Result<Arc<BuilderHandle>, ExecutionError> {
        self.handles.get(name).cloned().ok_or_else(|| self.undeclared(name))
    }

    fn undeclared(&self, name: &str) -> ExecutionError {
        let mut scored: Vec<(&String, usize)> =
            self.handles.keys().map(|declared| (declared, levenshtein(name, declared))).collect();
        scored.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(b.0)));
        let suggestions = scored
            .into_iter()
            .filter(|(_, distance)| *distance <= name.len() * SIMILARITY_THRESHOLD_PERCENT / 100)
            .take(3)
            .map(|(declared, _)| declared.clone())
            .collect();
        ExecutionError::UndeclaredBuilder {
            name: name.to_string(),
            suggestions,
        }
    }

    fn record_reference(&self, from: &str, to: &str) -> Result<(), ExecutionError> {
        self.graph.lock().unwrap_or_else(PoisonError::into_inner).add_reference(from, to)
    }

    /// Run the builder behind `handle` unless it already reached a terminal
    /// state. `from` is the builder whose text is asking.
    fn materialize(
        &self,
        handle: Arc<BuilderHandle>,
        from: Option<String>,
    ) -> BoxFuture<'_, Result<Value, ExecutionError>> {
        async move {
            if let Some(from) = &from {
                self.record_reference(from, handle.name())?;
            }
            match handle.begin() {
                Materialize::Done(result) => result,
                Materialize::InProgress => Err(ExecutionError::CircularReference {
                    chain: format!("{} -> {}", from.as_deref().unwrap_or("<top-level>"), handle.name()),
                }),
                Materialize::Start(options) => {
                    let result = self.resolve_builder(handle.name(), options).await;
                    handle.finish(&result);
                    result
                }
            }
        }
        .boxed()
    }

    async fn resolve_builder(&self, name: &str, options: BuilderOptions) -> Result<Value, ExecutionError> {
        let node = self.template.builder_node(name).ok_or_else(|| self.undeclared(name))?;
        let NodeKind::Builder {
            body,
            ..
        } = self.ast().kind(node)
        else {
            return Err(self.undeclared(name));
        };

        let mut frame = Frame::for_builder(name);
        self.render_nodes(body, &mut frame).await?;
        let (text, parameters, token_offsets) = frame.finish();
        tracing::debug!(builder = name, parameters = parameters.len(), %text, "Resolving builder");

        let rows = self
            .data_source
            .execute(QueryRequest {
                builder: Some(name.to_string()),
                text,
                parameters,
                token_offsets,
                options,
                profile: self.profile.clone(),
            })
            .await?;
        tracing::debug!(builder = name, rows = rows.len(), "Builder resolved");
        Ok(Value::Array(rows))
    }

    fn render_nodes<'s>(
        &'s self,
        nodes: &'s [NodeId],
        frame: &'s mut Frame,
    ) -> BoxFuture<'s, Result<(), ExecutionError>> {
        async move {
            for &node in nodes {
                self.render_node(node, frame).await?;
            }
            Ok(())
        }
        .boxed()
    }

    fn render_node<'s>(
        &'s self,
        node: NodeId,
        frame: &'s mut Frame,
    ) -> BoxFuture<'s, Result<(), ExecutionError>> {
        async move {
            let location = self.ast().location(node);
            match self.ast().kind(node) {
                NodeKind::Root {
                    children,
                } => self.render_nodes(children, frame).await?,
                NodeKind::Text(text) => frame.out.push_str(text),
                NodeKind::Output {
                    expr,
                } => {
                    let value = self.eval(*expr, frame).await?;
                    write_value(value, location, frame)?;
                }
                NodeKind::If {
                    branches,
                    otherwise,
                } => {
                    let mut taken = None;
                    for branch in branches {
                        if self.eval(branch.condition, frame).await?.is_truthy() {
                            taken = Some(&branch.body);
                            break;
                        }
                    }
                    if let Some(body) = taken.or(otherwise.as_ref()) {
                        self.render_nodes(body, frame).await?;
                    }
                }
                NodeKind::For {
                    binding,
                    iterable,
                    body,
                } => {
                    let items = iteration_items(self.eval(*iterable, frame).await?, location)?;
                    let count = items.len();
                    let mark = frame.locals.len();
                    for (index, item) in items.into_iter().enumerate() {
                        frame.locals.push((binding.clone(), item));
                        frame.locals.push((
                            "loop".to_string(),
                            RuntimeValue::literal(json!({
                                "index": index + 1,
                                "index0": index,
                                "first": index == 0,
                                "last": index + 1 == count,
                            })),
                        ));
                        let rendered = self.render_nodes(body, frame).await;
                        frame.locals.truncate(mark);
                        rendered?;
                    }
                }
                // Declarations only; bodies run when the handle is materialized.
                NodeKind::Builder {
                    ..
                } => {}
                _ => {
                    return Err(ExecutionError::render("Unexpected expression in template body", location));
                }
            }
            Ok(())
        }
        .boxed()
    }

    fn resolve_symbol(&self, name: &str, frame: &Frame) -> Option<RuntimeValue> {
        if let Some(local) = frame.local(name) {
            return Some(local.clone());
        }
        match name {
            PARAMS_BINDING => Some(RuntimeValue::bound(self.params.clone())),
            CONTEXT_BINDING => Some(RuntimeValue::bound(self.context.clone())),
            _ => self.handles.get(name).map(|handle| RuntimeValue::Builder(Arc::clone(handle))),
        }
    }

    fn eval<'s>(
        &'s self,
        expr: NodeId,
        frame: &'s Frame,
    ) -> BoxFuture<'s, Result<RuntimeValue, ExecutionError>> {
        async move {
            let location = self.ast().location(expr);
            let value = match self.ast().kind(expr) {
                NodeKind::Literal(value) => RuntimeValue::literal(value.clone()),
                NodeKind::Symbol(name) => {
                    self.resolve_symbol(name, frame).unwrap_or_else(RuntimeValue::undefined)
                }
                NodeKind::List(items) => {
                    let mut values = Vec::with_capacity(items.len());
                    let mut any_bound = false;
                    for &item in items {
                        let (value, bound) = into_data(self.eval(item, frame).await?, location)?;
                        any_bound |= bound;
                        values.push(value);
                    }
                    RuntimeValue::Data {
                        value: Value::Array(values),
                        bound: any_bound,
                    }
                }
                NodeKind::Lookup {
                    target,
                    key,
                } => {
                    let (target, bound) = into_data(self.eval(*target, frame).await?, location)?;
                    let (key, _) = into_data(self.eval(*key, frame).await?, location)?;
                    RuntimeValue::Data {
                        value: lookup(&target, &key),
                        bound,
                    }
                }
                NodeKind::Call {
                    callee,
                    args,
                } => self.call(*callee, args, frame, location).await?,
                NodeKind::Compare {
                    op,
                    lhs,
                    rhs,
                } => {
                    let (lhs, _) = into_data(self.eval(*lhs, frame).await?, location)?;
                    let (rhs, _) = into_data(self.eval(*rhs, frame).await?, location)?;
                    RuntimeValue::literal(Value::Bool(compare(*op, &lhs, &rhs)))
                }
                NodeKind::And(lhs, rhs) => {
                    let result = self.eval(*lhs, frame).await?.is_truthy()
                        && self.eval(*rhs, frame).await?.is_truthy();
                    RuntimeValue::literal(Value::Bool(result))
                }
                NodeKind::Or(lhs, rhs) => {
                    let result = self.eval(*lhs, frame).await?.is_truthy()
                        || self.eval(*rhs, frame).await?.is_truthy();
                    RuntimeValue::literal(Value::Bool(result))
                }
                NodeKind::Not(operand) => {
                    RuntimeValue::literal(Value::Bool(!self.eval(*operand, frame).await?.is_truthy()))
                }
                _ => return Err(ExecutionError::render("Expected an expression", location)),
            };
            Ok(value)
        }
        .boxed()
    }

    /// Calls are method calls on builder handles: `value()`, `limit(n)`
    /// and `offset(n)`.
    fn call<'s>(
        &'s self,
        callee: NodeId,
        args: &'s [NodeId],
        frame: &'s Frame,
        location: Location,
    ) -> BoxFuture<'s, Result<RuntimeValue, ExecutionError>> {
        async move {
            let (target, method) = match self.ast().kind(callee) {
                NodeKind::Lookup {
                    target,
                    key,
                } => match self.ast().kind(*key) {
                    NodeKind::Literal(Value::String(method)) => (*target, method.as_str()),
                    _ => return Err(ExecutionError::render("Expected a method name", location)),
                },
                NodeKind::Symbol(name) => {
                    return Err(ExecutionError::render(format!("Unknown function \"{name}\""), location));
                }
                _ => return Err(ExecutionError::render("Expression is not callable", location)),
            };

            let handle = match self.eval(target, frame).await? {
                RuntimeValue::Builder(handle) => handle,
                RuntimeValue::Data {
                    ..
                } => {
                    if let NodeKind::Symbol(name) = self.ast().kind(target)
                        && is_builder_method(method)
                        && self.resolve_symbol(name, frame).is_none()
                    {
                        return Err(self.undeclared(name));
                    }
                    return Err(ExecutionError::render(format!("\"{method}\" is not a function"), location));
                }
            };

            match method {
                VALUE_METHOD => {
                    if !args.is_empty() {
                        return Err(ExecutionError::render("value() takes no arguments", location));
                    }
                    let value = self.materialize(handle, frame.builder.clone()).await?;
                    Ok(RuntimeValue::literal(value))
                }
                LIMIT_METHOD | OFFSET_METHOD => {
                    let amount = match args {
                        [arg] => into_data(self.eval(*arg, frame).await?, location)?.0.as_u64(),
                        _ => None,
                    };
                    let Some(amount) = amount else {
                        return Err(ExecutionError::render(
                            format!("{method}() expects one non-negative integer"),
                            location,
                        ));
                    };
                    handle.configure(method, |options| {
                        if method == LIMIT_METHOD {
                            options.limit = Some(amount);
                        } else {
                            options.offset = Some(amount);
                        }
                    })?;
                    Ok(RuntimeValue::Builder(handle))
                }
                other => Err(ExecutionError::render(
                    format!("Builder \"{}\" has no method \"{other}\"", handle.name()),
                    location,
                )),
            }
        }
        .boxed()
    }
}

fn is_builder_method(method: &str) -> bool {
    matches!(method, VALUE_METHOD | LIMIT_METHOD | OFFSET_METHOD)
}

fn unmaterialized(handle: &BuilderHandle, location: Location) -> ExecutionError {
    ExecutionError::render(
        format!("Builder \"{}\" must be materialized with value() before use", handle.name()),
        location,
    )
}

fn into_data(value: RuntimeValue, location: Location) -> Result<(Value, bool), ExecutionError> {
    match value {
        RuntimeValue::Data {
            value,
            bound,
        } => Ok((value, bound)),
        RuntimeValue::Builder(handle) => Err(unmaterialized(&handle, location)),
    }
}

fn write_value(value: RuntimeValue, location: Location, frame: &mut Frame) -> Result<(), ExecutionError> {
    let (value, bound) = into_data(value, location)?;
    if bound {
        let token = frame.table.bind(value);
        tracing::trace!(builder = frame.builder.as_deref(), %token, "Bound parameter");
        frame.token_offsets.push(frame.out.len());
        frame.out.push_str(&token);
    } else {
        frame.out.push_str(&render_literal(&value));
    }
    Ok(())
}

/// Items of a `for` loop. Items inherit the taint of the iterable; object
/// iteration yields keys.
fn iteration_items(iterable: RuntimeValue, location: Location) -> Result<Vec<RuntimeValue>, ExecutionError> {
    let (value, bound) = into_data(iterable, location)?;
    let wrap = |value: Value| RuntimeValue::Data {
        value,
        bound,
    };
    match value {
        Value::Null => Ok(Vec::new()),
        Value::Array(items) => Ok(items.into_iter().map(wrap).collect()),
        Value::Object(map) => Ok(map.into_iter().map(|(key, _)| wrap(Value::String(key))).collect()),
        other => Err(ExecutionError::render(
            format!("Cannot iterate over {}", type_name(&other)),
            location,
        )),
    }
}

const fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}
