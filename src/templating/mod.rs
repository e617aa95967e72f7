//! Template compiler and execution engine.
//!
//! A template is text with embedded builder blocks. Each builder block
//! declares a named query; at most one is marked `main` and its rows become
//! the result of the template:
//!
//! ```text
//! {% req user %}
//! select * from users where id = {{ params.userId }};
//! {% endreq %}
//!
//! {% req groups main %}
//! select * from groups where owner = '{{ user.value()[0].id }}';
//! {% endreq %}
//! ```
//!
//! # Compilation
//!
//! [`TemplateCompiler::compile`] lexes and parses the source, then runs every
//! registered [`AstVisitor`] over the tree in lexical order. The built-in
//! visitors collect builder declarations (`"builders"` metadata) and
//! references to caller parameters (`"parameters"` metadata). Structural
//! problems are reported as a [`CompileError`] with a 0-based location.
//!
//! # Execution
//!
//! [`ExecutionEngine::execute`] runs a [`CompiledTemplate`] against an
//! [`ExecutionContext`]:
//!
//! - `{{ params.x }}` and anything read from `context` is written as a
//!   positional token (`$1`, `$2`, ...) and bound in the builder's
//!   [`ParameterTable`]; caller input never becomes query text.
//! - `{{ other.value() }}` runs the `other` builder first (once per
//!   execution) and inlines its rows as literal text.
//! - `other.limit(n)` / `other.offset(n)` configure a builder before it runs.
//! - Data source failures abort the whole execution and are returned as-is.
//!
//! # Syntax
//!
//! - Output: `{{ expr }}`
//! - Blocks: `{% if %}`/`{% elif %}`/`{% else %}`/`{% endif %}`,
//!   `{% for x in expr %}`/`{% endfor %}` (with `loop.index`, `loop.first`,
//!   `loop.last`), `{% req name [main] %}`/`{% endreq %}`
//! - Comments: `{# ... #}`
//! - Expressions: literals, lists, `a.b`, `a[0]`, calls, comparisons,
//!   `and`/`or`/`not`

pub mod ast;
pub mod builder;
pub mod cache;
pub mod compiler;
pub mod context;
pub mod error;
pub mod extension;
pub mod graph;
pub mod handle;
pub mod lexer;
pub mod parameters;
pub mod parser;
pub mod renderer;
mod value;


pub use ast::{Ast, Location, NodeId, NodeKind};
pub use builder::BuilderDeclaration;
pub use cache::TemplateStore;
pub use compiler::{CompiledTemplate, TemplateCompiler};
pub use context::{ExecutionContext, ParameterTable, UserInfo};
pub use error::{CompileError, ExecutionError};
pub use extension::{AstVisitor, CompileOptions, ExtensionError, ExtensionRegistry, TagExtension};
pub use handle::{BuilderHandle, HandleState};
pub use parameters::ParameterReference;
pub use renderer::{EngineOptions, ExecutionEngine, RenderedResult};
