//! sqlweave - template-driven SQL builders with injection-safe binding
//!
//! A template is plain query text plus named builder blocks. Each block is a
//! query of its own; blocks may read each other's results, and every value
//! that comes from the caller is bound as a positional parameter instead of
//! being spliced into the text.
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
//! # Core Modules
//!
//! - [`templating`] - lexer, parser, visitors, compiler and execution engine
//! - [`datasource`] - the [`DataSource`](datasource::DataSource) seam plus the
//!   dry-run and fixture adapters
//! - [`config`] - `sqlweave.toml` loading and profile selection
//! - [`cli`] - the `sqlweave` command line
//! - [`core`] - application errors and user-facing error reporting
//! - [`constants`] - reserved identifiers and shared limits
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use sqlweave_cli::datasource::DryRunDataSource;
//! use sqlweave_cli::templating::{ExecutionContext, ExecutionEngine, TemplateCompiler};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let template = TemplateCompiler::default()
//!     .compile("{% req users main %}select * from users where id = {{ params.id }}{% endreq %}")?;
//! let engine = ExecutionEngine::new(Arc::new(DryRunDataSource));
//! let result = engine
//!     .execute(&template, ExecutionContext::new().with_parameter("id", 42))
//!     .await?;
//! println!("{}", serde_json::to_string_pretty(&result)?);
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod config;
pub mod constants;
pub mod core;
pub mod datasource;
pub mod templating;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
